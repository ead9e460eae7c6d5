//! # tidings-api
//!
//! HTTP surface of tidings: the NDJSON live stream, the comment polling
//! fallback, notification endpoints for end users, and internal entry points
//! for collaborating services.

use std::sync::Arc;

use axum::{
    http::{header, Method},
    routing::{delete, get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use tidings_core::TopicActivitySource;
use tidings_realtime::{ConnectionRegistry, EventPublisher, NotificationService, PollConfig, WatcherSupervisor};

pub mod config;
pub mod error;
pub mod handlers;

pub use config::{ServerConfig, StreamConfig};
pub use error::ApiError;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub publisher: EventPublisher,
    pub supervisor: WatcherSupervisor,
    pub notifications: NotificationService,
    pub topics: Arc<dyn TopicActivitySource>,
    pub stream: StreamConfig,
    pub poll: PollConfig,
    /// Process-wide shutdown signal; ends every open stream when cancelled.
    pub shutdown: CancellationToken,
}

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    use handlers::{health, internal, notifications, stream, topics};

    Router::new()
        .route("/health", get(health::health_check))
        // Live delivery
        .route("/api/v1/stream", get(stream::stream))
        .route("/api/v1/topics/:kind/:id/updates", get(topics::topic_updates))
        // Notifications
        .route("/api/v1/notifications", get(notifications::list_notifications))
        .route(
            "/api/v1/notifications/unread-count",
            get(notifications::unread_count),
        )
        .route(
            "/api/v1/notifications/read-all",
            post(notifications::mark_all_read),
        )
        .route(
            "/api/v1/notifications/:id/read",
            post(notifications::mark_read),
        )
        .route(
            "/api/v1/notifications/:id",
            delete(notifications::delete_notification),
        )
        // Collaborator entry points
        .route("/internal/v1/notifications", post(internal::notify))
        .route("/internal/v1/notifications/all", post(internal::notify_all))
        .route("/internal/v1/events", post(internal::broadcast_event))
        // Middleware
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ACCEPT_LANGUAGE]),
        )
        .with_state(state)
}

//! Entry points for collaborating services (CRUD handlers, schedulers).
//!
//! Mounted under `/internal`; the deployment is expected to keep this prefix
//! off the public ingress.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tidings_core::{NewNotification, Notification, RawEvent};

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub notification: NewNotification,
}

#[derive(Debug, Serialize)]
pub struct NotifyAllResponse {
    pub created: usize,
}

#[derive(Debug, Serialize)]
pub struct BroadcastResponse {
    pub attempted: usize,
    pub delivered: usize,
}

/// `POST /internal/v1/notifications`
pub async fn notify(
    State(state): State<AppState>,
    Json(req): Json<NotifyRequest>,
) -> Result<(StatusCode, Json<Notification>), ApiError> {
    let created = state
        .notifications
        .notify(req.user_id, &req.notification)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `POST /internal/v1/notifications/all`
pub async fn notify_all(
    State(state): State<AppState>,
    Json(req): Json<NewNotification>,
) -> Result<Json<NotifyAllResponse>, ApiError> {
    let created = state.notifications.notify_all(&req).await?;
    Ok(Json(NotifyAllResponse { created }))
}

/// `POST /internal/v1/events`: broadcast `{"type", "data"}` to every stream.
pub async fn broadcast_event(
    State(state): State<AppState>,
    Json(event): Json<RawEvent>,
) -> Result<(StatusCode, Json<BroadcastResponse>), ApiError> {
    if event.kind.trim().is_empty() {
        return Err(ApiError::BadRequest("event type is required".into()));
    }
    let report = state.publisher.broadcast_raw(event.kind, event.data)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(BroadcastResponse {
            attempted: report.attempted,
            delivered: report.delivered,
        }),
    ))
}

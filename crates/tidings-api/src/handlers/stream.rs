//! Long-lived NDJSON stream endpoint.
//!
//! Each connection gets a bounded channel whose receiver becomes the response
//! body. The sending half is registered in the [`ConnectionRegistry`] under the
//! broadcast scope (and the caller's user scope), so publishers never touch the
//! socket directly. Dropping the body (client gone, server shutdown) drops the
//! registration guard and the watcher lease with it.
//!
//! [`ConnectionRegistry`]: tidings_realtime::ConnectionRegistry

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use tidings_core::{encode_frame, Scope, StreamEvent, HEARTBEAT_FRAME};
use tidings_realtime::ConnectionHandle;

use crate::{ApiError, AppState};

/// Content type of every streaming response.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    /// Identity asserted by the upstream auth layer; enables notification delivery.
    pub user_id: Option<Uuid>,
}

/// `GET /api/v1/stream`
pub async fn stream(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Result<Response, ApiError> {
    let (tx, rx) = mpsc::channel(state.stream.buffer_capacity.max(1));

    // Queued before registration so it is always the first frame
    let hello = encode_frame(&StreamEvent::Connected)?;
    tx.try_send(Bytes::from(hello))
        .map_err(|e| ApiError::Internal(tidings_core::Error::Internal(e.to_string())))?;

    let handle = ConnectionHandle::new(state.registry.next_connection_id(), tx);
    let connection_id = handle.id();
    let mut scopes = vec![Scope::Broadcast];
    if let Some(user_id) = params.user_id {
        scopes.push(Scope::User(user_id));
    }
    let guard = state.registry.attach(scopes, handle);
    let lease = state.supervisor.acquire();

    info!(
        subsystem = "api",
        component = "stream",
        connection_id,
        user_id = params.user_id.map(|u| u.to_string()).as_deref().unwrap_or("-"),
        active = state.registry.total_connections(),
        "Stream connection opened"
    );

    Ok(ndjson_response(
        rx,
        state.stream.heartbeat,
        state.shutdown.clone(),
        (guard, lease),
    ))
}

/// Build a streaming NDJSON response from a frame channel.
///
/// `resources` live exactly as long as the body and are released when it is
/// dropped.
pub(crate) fn ndjson_response<R: Send + 'static>(
    rx: mpsc::Receiver<Bytes>,
    heartbeat: Duration,
    shutdown: CancellationToken,
    resources: R,
) -> Response {
    let body = Body::from_stream(frame_stream(rx, heartbeat, shutdown, resources));
    (
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

struct FrameSource<R> {
    rx: mpsc::Receiver<Bytes>,
    heartbeat: Interval,
    shutdown: CancellationToken,
    _resources: R,
}

fn frame_stream<R: Send + 'static>(
    rx: mpsc::Receiver<Bytes>,
    heartbeat: Duration,
    shutdown: CancellationToken,
    resources: R,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let source = FrameSource {
        rx,
        heartbeat: ticker,
        shutdown,
        _resources: resources,
    };

    futures::stream::unfold(source, |mut source| async move {
        let frame = tokio::select! {
            biased;
            _ = source.shutdown.cancelled() => return None,
            frame = source.rx.recv() => {
                // heartbeats only fill idle gaps
                source.heartbeat.reset();
                frame?
            }
            _ = source.heartbeat.tick() => Bytes::from_static(HEARTBEAT_FRAME),
        };
        Some((Ok(frame), source))
    })
}

//! Polling fallback endpoint for comment threads.

use axum::{
    extract::{Path, State},
    response::Response,
};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use tidings_core::Topic;
use tidings_realtime::TopicPoller;

use super::stream::ndjson_response;
use crate::{ApiError, AppState};

/// `GET /api/v1/topics/:kind/:id/updates`
///
/// Streams `update` frames when the topic's newest comment advances and
/// `error` frames when a poll fails.
pub async fn topic_updates(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Response, ApiError> {
    if kind.is_empty()
        || kind.len() > 64
        || !kind
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ApiError::BadRequest(format!("invalid topic kind: {}", kind)));
    }
    let topic = Topic::new(kind, id);

    let (tx, rx) = mpsc::channel(state.stream.buffer_capacity.max(1));
    let cancel = state.shutdown.child_token();
    // Stops the poller once the response body is dropped
    let stop_on_drop = cancel.clone().drop_guard();

    debug!(
        subsystem = "api",
        component = "topics",
        topic = %topic,
        "Polling stream opened"
    );

    let poller = TopicPoller::new(state.topics.clone(), topic);
    tokio::spawn(poller.run(state.poll, tx, cancel));

    Ok(ndjson_response(
        rx,
        state.stream.heartbeat,
        state.shutdown.clone(),
        stop_on_drop,
    ))
}

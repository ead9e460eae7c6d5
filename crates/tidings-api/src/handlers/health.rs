use axum::{extract::State, response::IntoResponse, Json};

use crate::AppState;

/// `GET /health`: liveness plus open connections and watcher states.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let watchers: serde_json::Map<String, serde_json::Value> = state
        .supervisor
        .states()
        .into_iter()
        .map(|(collection, s)| (collection, s.as_str().into()))
        .collect();

    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.registry.total_connections(),
        "watchers": watchers,
    }))
}

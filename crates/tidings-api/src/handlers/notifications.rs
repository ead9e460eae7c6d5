//! Notification query and mutation endpoints for end users.
//!
//! The caller is identified by the `user_id` query parameter, which the
//! upstream auth layer is trusted to set. A notification owned by someone else
//! is reported as not found.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tidings_core::{Error, NotificationView};

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub user_id: Uuid,
    /// Language tag; falls back to `Accept-Language`, then the primary locale.
    pub locale: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsResponse {
    pub notifications: Vec<NotificationView>,
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

/// `GET /api/v1/notifications`
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<ListNotificationsQuery>,
    headers: HeaderMap,
) -> Result<Json<ListNotificationsResponse>, ApiError> {
    let locale = query.locale.or_else(|| accept_language(&headers));
    let page = state
        .notifications
        .list(query.user_id, locale.as_deref(), query.limit, query.offset)
        .await?;

    Ok(Json(ListNotificationsResponse {
        notifications: page.notifications,
        unread_count: page.unread_count,
    }))
}

/// `GET /api/v1/notifications/unread-count`
pub async fn unread_count(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let unread_count = state.notifications.unread_count(query.user_id).await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

/// `POST /api/v1/notifications/:id/read`
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<StatusCode, ApiError> {
    if state.notifications.mark_as_read(id, query.user_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotificationNotFound(id).into())
    }
}

/// `POST /api/v1/notifications/read-all`
pub async fn mark_all_read(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<MarkAllReadResponse>, ApiError> {
    let updated = state.notifications.mark_all_as_read(query.user_id).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}

/// `DELETE /api/v1/notifications/:id`
pub async fn delete_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<StatusCode, ApiError> {
    state.notifications.delete_owned(id, query.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// First language tag of an `Accept-Language` header.
fn accept_language(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::ACCEPT_LANGUAGE)?.to_str().ok()?;
    value
        .split(',')
        .next()
        .map(|tag| tag.split(';').next().unwrap_or(tag).trim())
        .filter(|tag| !tag.is_empty() && *tag != "*")
        .map(String::from)
}

//! HTTP error mapping.

use axum::{http::StatusCode, response::IntoResponse, Json};
use tracing::error;

/// Message returned for unexpected failures; details go to the log only.
pub const RETRY_MESSAGE: &str = "Something went wrong, please try again";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Internal(tidings_core::Error),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
}

impl From<tidings_core::Error> for ApiError {
    fn from(err: tidings_core::Error) -> Self {
        use tidings_core::Error;
        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::NotificationNotFound(id) => {
                ApiError::NotFound(format!("Notification {} not found", id))
            }
            Error::InvalidInput(msg) | Error::Config(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(err) => {
                error!(subsystem = "api", error = %err, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, RETRY_MESSAGE.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_core_error_mapping() {
        let not_owned = ApiError::from(tidings_core::Error::NotificationNotFound(Uuid::nil()));
        assert!(matches!(not_owned, ApiError::NotFound(_)));

        let invalid = ApiError::from(tidings_core::Error::InvalidInput("empty".into()));
        assert!(matches!(invalid, ApiError::BadRequest(_)));

        let feed = ApiError::from(tidings_core::Error::Feed("listener gone".into()));
        assert!(matches!(feed, ApiError::Internal(_)));
    }

    #[test]
    fn test_internal_error_hides_detail() {
        let response =
            ApiError::Internal(tidings_core::Error::Internal("secret detail".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

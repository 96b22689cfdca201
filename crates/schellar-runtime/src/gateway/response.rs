use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use schellar_core::{SchellarError, StoreError};
use serde::{Deserialize, Serialize};

/// JSON body of every non-list response: `{"message": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

/// A status code with a message, rendered as [`MessageBody`].
#[derive(Debug, Clone)]
pub struct ApiMessage {
    pub status: StatusCode,
    pub message: String,
}

impl ApiMessage {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiMessage {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CACHE_CONTROL, "no-store")],
            Json(MessageBody {
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<SchellarError> for ApiMessage {
    fn from(e: SchellarError) -> Self {
        match e {
            SchellarError::Validation(msg) => {
                Self::bad_request(format!("Error handling post results. err={}", msg))
            }
            SchellarError::Duplicate(_) => Self::bad_request(e.to_string()),
            SchellarError::NotFound(msg) => Self::not_found(msg),
            other => {
                tracing::error!(error = %other, "Request failed");
                Self::internal(other.to_string())
            }
        }
    }
}

impl From<StoreError> for ApiMessage {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "Storage call failed");
        Self::internal(format!("Storage error: {}", e))
    }
}

/// Result type for request handlers.
pub type ApiResult<T> = std::result::Result<T, ApiMessage>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let validation: ApiMessage = SchellarError::Validation("'name' is required".into()).into();
        assert_eq!(validation.status, StatusCode::BAD_REQUEST);
        assert!(validation.message.contains("'name' is required"));

        let duplicate: ApiMessage = SchellarError::Duplicate("nightly".into()).into();
        assert_eq!(duplicate.status, StatusCode::BAD_REQUEST);
        assert_eq!(duplicate.message, "Duplicate schedule name 'nightly'");

        let missing: ApiMessage = SchellarError::NotFound("nope".into()).into();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let storage: ApiMessage = StoreError::Unavailable("down".into()).into();
        assert_eq!(storage.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_message_response_headers() {
        let response = ApiMessage::ok("done").into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    }
}

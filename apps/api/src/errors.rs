use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::LlmError;
use crate::uploads::UploadError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    /// A failure reported by the assistant provider. `status` is passed through
    /// to the caller when it is a valid HTTP status.
    #[error("{message}")]
    Provider { status: u16, message: String },

    /// The multipart body could not be read (malformed, or over the body limit).
    #[error("{}", .0.body_text())]
    Multipart(#[from] MultipartError),

    /// The request was not a multipart body at all (wrong content type, no boundary).
    #[error("{}", .0.body_text())]
    MultipartRejection(#[from] MultipartRejection),

    #[error("{0}")]
    Upload(#[from] UploadError),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Provider { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            AppError::Multipart(e) => e.status(),
            AppError::MultipartRejection(e) => e.status(),
            AppError::Upload(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        let status = match &err {
            LlmError::Api { status, .. } => *status,
            LlmError::PollTimeout { .. } => StatusCode::GATEWAY_TIMEOUT.as_u16(),
            _ => StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        };
        let message = match err {
            LlmError::Api { message, .. } => message,
            other => other.to_string(),
        };
        AppError::Provider { status, message }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::Validation(msg) => tracing::debug!("Rejected request: {msg}"),
            AppError::Provider { status, message } => {
                tracing::error!("Provider error (status {status}): {message}")
            }
            AppError::Multipart(e) => tracing::debug!("Rejected multipart body: {}", e.body_text()),
            AppError::MultipartRejection(e) => {
                tracing::debug!("Rejected non-multipart request: {}", e.body_text())
            }
            AppError::Upload(e) => tracing::error!("Upload error: {e}"),
            AppError::Internal(e) => tracing::error!("Internal error: {e:?}"),
        }

        let body = Json(json!({ "error": self.to_string() }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_status_is_passed_through() {
        let err = AppError::from(LlmError::Api {
            status: 429,
            message: "Rate limit reached for gpt-4o".to_string(),
        });
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.to_string(), "Rate limit reached for gpt-4o");
    }

    #[test]
    fn test_invalid_provider_status_defaults_to_500() {
        let err = AppError::Provider {
            status: 42,
            message: "nonsense".to_string(),
        };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_non_api_llm_errors_default_to_500() {
        let err = AppError::from(LlmError::EmptyContent);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "assistant returned no text reply");
    }

    #[test]
    fn test_poll_timeout_maps_to_gateway_timeout() {
        let err = AppError::from(LlmError::PollTimeout {
            what: "run run_123".to_string(),
            secs: 600,
        });
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_error_body_is_flat_error_message() {
        let response = AppError::Validation("missing required field: text".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, json!({ "error": "missing required field: text" }));
    }
}

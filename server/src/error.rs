use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tts_core::RelayError;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Voice synthesis failed: {0}")]
    Upstream(#[from] RelayError),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Upstream(RelayError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Upstream(e) => {
                tracing::error!("Voice synthesis error: {}", e);
                let status = match &e {
                    RelayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    RelayError::UpstreamUnavailable(_)
                    | RelayError::UpstreamRejected { .. }
                    | RelayError::UpstreamMalformed(_) => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, format!("Voice synthesis failed: {e}"))
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("LLM error: {0}")]
    Llm(anyhow::Error),

    #[error("Speech error: {0}")]
    Speech(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
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
            ApiError::Llm(e) => {
                tracing::error!("LLM error: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("LLM error: {e}"))
            }
            ApiError::Speech(e) => {
                tracing::error!("Speech error: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Speech error: {e}"))
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

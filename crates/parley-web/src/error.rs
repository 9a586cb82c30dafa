//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parley_rs::chat::ChatError;
use parley_rs::memory::MemoryError;
use serde_json::json;
use thiserror::Error;

/// Errors a handler can return. Rendered as `{"detail": "<message>"}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("Memory disabled")]
    MemoryDisabled,
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Chat(ChatError::EmptyMessage) => StatusCode::BAD_REQUEST,
            ApiError::Chat(ChatError::MessageTooLong { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::MemoryDisabled => StatusCode::NOT_FOUND,
            ApiError::Memory(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

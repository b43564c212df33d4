//! Errors surfaced to HTTP callers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::auth::AuthError;
use crate::dm::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Credential missing or unresolvable. Nothing was registered or stored.
    #[error("unauthenticated: {0}")]
    Unauthenticated(#[from] AuthError),
    #[error("{0}")]
    InvalidMessage(String),
    #[error("message text exceeds {0} characters")]
    MessageTooLarge(usize),
    /// Persisting failed; the message was not delivered to anyone.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ChatError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
            ChatError::MessageTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ChatError::Storage(_) | ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ChatError::Storage(_) | ChatError::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };
        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}

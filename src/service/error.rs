//! Error types for service handlers.

use serde_json::json;

use crate::message::CompletionPayload;
use crate::validation::ValidationError;

/// Error type for CRUD handler operations.
///
/// Handlers never let an error escape onto the bus: every variant is turned
/// into a completion payload with a status code and a structured body.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandlerError {
    /// One or more validation rules failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Payload decode / deserialization failed.
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    /// Entity not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Business logic rejected the request.
    #[error("rejected: {0}")]
    Rejected(String),
    /// A downstream call failed (connection, timeout).
    #[error("transport error: {0}")]
    Transport(String),
    /// A downstream response could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
    /// Other error.
    #[error("handler error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::DecodeFailed(err.to_string())
    }
}

impl HandlerError {
    /// Map this error to an HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self {
            HandlerError::Validation(_) => 400,
            HandlerError::DecodeFailed(_) => 400,
            HandlerError::NotFound(_) => 404,
            HandlerError::Rejected(_) => 422,
            HandlerError::Transport(_) => 502,
            HandlerError::Parse(_) => 502,
            HandlerError::Other(_) => 500,
        }
    }

    /// The completion payload reported for this error.
    ///
    /// Validation failures keep their `{message, errors}` shape; everything
    /// else is reported as `{message}`.
    pub fn to_completion(&self) -> CompletionPayload {
        CompletionPayload::from_handler_error(self)
    }
}

impl CompletionPayload {
    pub fn from_handler_error(err: &HandlerError) -> Self {
        let body = match err {
            HandlerError::Validation(inner) => {
                serde_json::to_value(inner).unwrap_or_else(|_| json!({ "message": inner.message }))
            }
            other => json!({ "message": other.to_string() }),
        };
        CompletionPayload::status(err.status_code(), body)
    }
}

//! Resource client error types.

use jobsync_models::ModelError;
use thiserror::Error;

/// Result type for resource client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while talking to the platform API.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rejected: {0}")]
    ValidationRejected(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Server unavailable: {message}")]
    ServerUnavailable { status: Option<u16>, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::ValidationRejected(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ServerUnavailable {
            status: None,
            message: msg.into(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Map a non-success HTTP status to a typed error.
    pub fn from_http_status(status: u16, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match status {
            404 => Self::NotFound(detail),
            400 | 409 | 413 | 415 | 422 => Self::ValidationRejected(detail),
            401 | 403 => Self::Unauthorized(detail),
            _ => Self::ServerUnavailable {
                status: Some(status),
                message: detail,
            },
        }
    }

    /// Transport, availability and decode failures may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::ServerUnavailable { .. } | ClientError::Transport(_) | ClientError::Decode(_)
        )
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, ClientError::Decode(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ClientError::from_http_status(status.as_u16(), e.to_string())
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}

impl From<ModelError> for ClientError {
    fn from(e: ModelError) -> Self {
        ClientError::Decode(e.to_string())
    }
}

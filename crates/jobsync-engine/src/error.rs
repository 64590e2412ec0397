//! Engine error types.

use jobsync_client::ClientError;
use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Typed outcome of a failed engine operation.
///
/// Cloneable so that views and selections can hold their last error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("Rejected: {0}")]
    ValidationRejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Already in progress: {0}")]
    AlreadyInProgress(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Server unavailable: {0}")]
    ServerUnavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Closed: {0}")]
    Closed(String),
}

impl SyncError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn already_in_progress(msg: impl Into<String>) -> Self {
        Self::AlreadyInProgress(msg.into())
    }

    pub fn closed(msg: impl Into<String>) -> Self {
        Self::Closed(msg.into())
    }

    /// Failures that a later fetch may clear; views keep their data on these.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_) | SyncError::ServerUnavailable(_) | SyncError::Decode(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }
}

impl From<ClientError> for SyncError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::NotFound(m) => SyncError::NotFound(m),
            ClientError::ValidationRejected(m) => SyncError::ValidationRejected(m),
            ClientError::Unauthorized(m) => SyncError::Unauthorized(m),
            ClientError::ServerUnavailable { message, .. } => SyncError::ServerUnavailable(message),
            ClientError::Transport(m) => SyncError::Transport(m),
            ClientError::Decode(m) => SyncError::Decode(m),
        }
    }
}

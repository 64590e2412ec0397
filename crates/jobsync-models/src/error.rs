//! Model error types.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid {kind} record {id}: {reason}")]
    InvariantViolation {
        kind: &'static str,
        id: String,
        reason: String,
    },

    #[error("Unknown {kind} status: {value}")]
    UnknownStatus { kind: &'static str, value: String },

    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),
}

impl ModelError {
    pub fn invariant(kind: &'static str, id: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvariantViolation {
            kind,
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

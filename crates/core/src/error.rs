//! Errors raised by pure domain logic.

use thiserror::Error;

use crate::job::AlignJobStatus;

pub type DomainResult<T> = Result<T, DomainError>;

/// Failures that depend only on the inputs: malformed values and status
/// changes the job state machine refuses. IO errors live in the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed value, e.g. an unknown tool or status name.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An id string that does not parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: AlignJobStatus,
        to: AlignJobStatus,
    },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

//! Session store errors

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session already initialized: {0}")]
    AlreadyInitialized(String),

    #[error("Index {index} out of range (1..={len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Nothing to roll back")]
    NothingToRollback,

    #[error("No pending proposal")]
    NoPendingProposal,

    #[error("Plan changed since the proposal was made")]
    StaleProposal,
}

/// Result alias for store operations
pub type SessionResult<T> = Result<T, SessionError>;

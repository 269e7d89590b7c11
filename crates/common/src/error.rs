//! Common error types and handling for NeoFab

use crate::state::StateError;

/// Common result type
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the NeoFab engine.
///
/// Every operation exposed by the engine reports failures through this
/// taxonomy; nothing is swallowed. `Conflict` and `Timeout` are retryable
/// after a re-read, everything else is terminal for the request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Illegal transition: {0}")]
    IllegalTransition(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unsupported attachment kind: {0}")]
    UnsupportedKind(String),

    #[error("Content too large: {size} bytes exceeds maximum of {max}")]
    TooLarge { size: u64, max: u64 },

    #[error("Empty input: {0}")]
    Empty(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl Error {
    /// Get the error code for reporting layers
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::IllegalTransition(_) => "ILLEGAL_TRANSITION",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::Conflict(_) => "CONFLICT",
            Error::UnsupportedKind(_) => "UNSUPPORTED_KIND",
            Error::TooLarge { .. } => "TOO_LARGE",
            Error::Empty(_) => "EMPTY",
            Error::StorageFailure(_) => "STORAGE_FAILURE",
            Error::Timeout(_) => "TIMEOUT",
        }
    }

    /// Whether the caller may re-read and retry the operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::Timeout(_))
    }
}

impl From<StateError> for Error {
    fn from(err: StateError) -> Self {
        match err {
            StateError::InvalidTransition { from, to } => {
                Error::IllegalTransition(format!("cannot transition from {} to {}", from, to))
            }
            StateError::TerminalState(state) => {
                Error::IllegalTransition(format!("{} is a terminal state", state))
            }
            StateError::GuardFailed(msg) => Error::IllegalTransition(msg),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("record not found".to_string()),
            sqlx::Error::PoolTimedOut => Error::Timeout("database pool timed out".to_string()),
            other => Error::StorageFailure(other.to_string()),
        }
    }
}

//! Error taxonomy for engine operations.

use crate::storage::DatabaseError;

/// Coarse error classification for callers that map failures onto a
/// transport's status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    Unavailable,
    TransactionFailure,
    Storage,
}

/// Errors returned by engine components.
///
/// Duplicate punches and skipped batch lines are outcomes, not errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("terminal {serial} unavailable: {source}")]
    TerminalUnavailable {
        serial: String,
        #[source]
        source: DatabaseError,
    },

    #[error("transaction rolled back: {0}")]
    Transaction(#[source] DatabaseError),

    #[error("storage error: {0}")]
    Storage(#[source] DatabaseError),
}

impl EngineError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::TerminalUnavailable { .. } => ErrorKind::Unavailable,
            Self::Transaction(_) => ErrorKind::TransactionFailure,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<DatabaseError> for EngineError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(key) => Self::NotFound {
                entity: "record",
                key,
            },
            other => Self::Storage(other),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.into())
    }
}

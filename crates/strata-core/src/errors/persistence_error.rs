//! Aggregate error for the persistence engine.

use super::error_code::StrataErrorCode;
use super::{ConfigError, GraphError, SchemaError, StatementError, StorageError};

/// Errors that can occur anywhere in the persistence engine.
/// Aggregates subsystem errors via `From` conversions so callers can
/// pattern-match on the error kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Statement error: {0}")]
    Statement(#[from] StatementError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

impl PersistenceError {
    /// Returns true for errors a client can correct and resubmit.
    pub fn is_client_correctable(&self) -> bool {
        matches!(
            self,
            Self::Statement(
                StatementError::Insertion { .. }
                    | StatementError::InvalidPayload { .. }
                    | StatementError::CardinalityViolation { .. }
                    | StatementError::OptimisticLock { .. }
                    | StatementError::ConstraintNotFound { .. }
            )
        )
    }
}

impl StrataErrorCode for PersistenceError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Schema(e) => e.error_code(),
            Self::Graph(e) => e.error_code(),
            Self::Statement(e) => e.error_code(),
            Self::Storage(e) => e.error_code(),
            Self::Config(e) => e.error_code(),
        }
    }
}

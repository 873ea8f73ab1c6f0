//! Statement generation and execution errors.

use super::error_code::{self, StrataErrorCode};

/// Errors raised by the statement processors and the statement executor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatementError {
    #[error("insertion of {entity} failed on '{feature}': {reason}")]
    Insertion {
        entity: String,
        feature: String,
        reason: String,
    },

    #[error("invalid payload for {entity}: {reason}")]
    InvalidPayload { entity: String, reason: String },

    #[error("cardinality violation on '{reference}': {actual} outside [{lower}, {}]", display_upper(.upper))]
    CardinalityViolation {
        reference: String,
        lower: u32,
        upper: Option<u32>,
        actual: usize,
    },

    #[error("optimistic lock failed for {entity} {id}: version {version} is stale")]
    OptimisticLock {
        entity: String,
        id: String,
        version: i64,
    },

    #[error("{operation} rejected: execution context is stateless")]
    StatelessOperation { operation: String },

    #[error("{entity} {id} not found")]
    ConstraintNotFound { entity: String, id: String },

    #[error("reference '{reference}' cannot be mutated directly: {reason}")]
    ReferenceNotMutable { reference: String, reason: String },

    #[error("pending identifier #{key} was never produced by an insert")]
    UnresolvedPending { key: usize },

    #[error("statement batch contains an unbreakable dependency cycle: {statements}")]
    OrderingCycle { statements: String },
}

impl StrataErrorCode for StatementError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Insertion { .. } => error_code::INSERTION_ERROR,
            Self::InvalidPayload { .. } => error_code::INVALID_PAYLOAD,
            Self::CardinalityViolation { .. } => error_code::CARDINALITY_VIOLATION,
            Self::OptimisticLock { .. } => error_code::OPTIMISTIC_LOCK_ERROR,
            Self::StatelessOperation { .. } => error_code::STATELESS_OPERATION,
            Self::ConstraintNotFound { .. } => error_code::CONSTRAINT_NOT_FOUND,
            Self::ReferenceNotMutable { .. } => error_code::REFERENCE_NOT_MUTABLE,
            Self::UnresolvedPending { .. } | Self::OrderingCycle { .. } => {
                error_code::STATEMENT_ORDERING_ERROR
            }
        }
    }
}

fn display_upper(upper: &Option<u32>) -> String {
    upper.map_or_else(|| "*".to_string(), |u| u.to_string())
}

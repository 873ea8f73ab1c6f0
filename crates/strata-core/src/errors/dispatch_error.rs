//! Operation dispatch errors.

use super::error_code::{self, StrataErrorCode};
use super::PersistenceError;

/// Errors raised while routing an operation call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown operation '{name}'")]
    UnknownOperation { name: String },

    #[error("operation '{name}' is not exposed")]
    OperationNotExposed { name: String },

    #[error("invalid input for '{operation}': {message}")]
    InvalidInput { operation: String, message: String },

    #[error("identifier signature rejected: {message}")]
    Signature { message: String },

    #[error("business fault {code}: {message}")]
    Business {
        code: String,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("behavior of '{operation}' failed: {message}")]
    Behavior { operation: String, message: String },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl StrataErrorCode for DispatchError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownOperation { .. } => error_code::UNKNOWN_OPERATION,
            Self::OperationNotExposed { .. } => error_code::OPERATION_NOT_EXPOSED,
            Self::InvalidInput { .. } => error_code::INVALID_INPUT,
            Self::Signature { .. } => error_code::SIGNATURE_ERROR,
            Self::Business { .. } => error_code::BUSINESS_ERROR,
            Self::Behavior { .. } => error_code::INTERNAL_ERROR,
            Self::Persistence(e) => e.error_code(),
        }
    }
}

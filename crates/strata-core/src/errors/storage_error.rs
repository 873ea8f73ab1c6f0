//! Storage-layer errors for SQLite operations.

use super::error_code::{self, StrataErrorCode};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    SqliteError { message: String },

    #[error("cannot convert column '{column}': {message}")]
    ValueConversion { column: String, message: String },
}

impl StrataErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        error_code::STORAGE_ERROR
    }
}

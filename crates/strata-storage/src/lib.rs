//! # strata-storage
//!
//! SQLite persistence engine for model-mapped entities.
//! Schema resolution, reference storage rules, select plans and instance graph
//! collection, statement processing and dependency-ordered execution, and the
//! `StorageEngine` facade implementing `EntityStore`.

pub mod connection;
pub mod engine;
pub mod executor;
pub mod graph;
pub mod parameters;
pub mod queries;
pub mod rules;
pub mod schema;
pub mod statements;

pub use engine::StorageEngine;

use strata_core::errors::StorageError;

/// Convert any displayable driver error into a `StorageError`.
pub(crate) fn to_storage_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::SqliteError {
        message: e.to_string(),
    }
}

//! Error handling for Strata.
//! One error enum per subsystem, `thiserror` only, zero `anyhow`.

pub mod config_error;
pub mod dispatch_error;
pub mod error_code;
pub mod graph_error;
pub mod persistence_error;
pub mod schema_error;
pub mod statement_error;
pub mod storage_error;

pub use config_error::ConfigError;
pub use dispatch_error::DispatchError;
pub use error_code::StrataErrorCode;
pub use graph_error::GraphError;
pub use persistence_error::{PersistenceError, PersistenceResult};
pub use schema_error::SchemaError;
pub use statement_error::StatementError;
pub use storage_error::StorageError;

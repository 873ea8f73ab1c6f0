//! # strata-core
//!
//! Foundation crate for the Strata persistence runtime.
//! Defines model descriptors, the schema mapping trace, payloads, query customizers,
//! errors, config and the storage trait. Every other crate in the workspace depends on this.

pub mod config;
pub mod constants;
pub mod errors;
pub mod graph;
pub mod mapping;
pub mod model;
pub mod payload;
pub mod query;
pub mod tracing_setup;
pub mod traits;

// Re-export the most commonly used types at the crate root.
pub use config::StrataConfig;
pub use errors::{PersistenceError, PersistenceResult};
pub use graph::{InstanceGraph, InstanceNode};
pub use mapping::SchemaMapping;
pub use model::{EntityTypeId, Model, ReferenceId};
pub use payload::{Id, Payload, Value};

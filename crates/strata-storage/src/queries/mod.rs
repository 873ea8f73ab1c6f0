//! Reads: attribute rows, filtered searches, counts and payload assembly.

pub mod assembler;
pub mod query_factory;

pub use assembler::PayloadAssembler;
pub use query_factory::{FromClause, QueryFactory};

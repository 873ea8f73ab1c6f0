//! Instance graph collection errors.

use super::error_code::{self, StrataErrorCode};

/// Errors raised while collecting an instance graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("graph collection failed for {entity}: parent id {parent_id} is not in the current frontier ({edge})")]
    GraphCollection {
        entity: String,
        parent_id: String,
        edge: String,
    },
}

impl StrataErrorCode for GraphError {
    fn error_code(&self) -> &'static str {
        error_code::GRAPH_COLLECTION_ERROR
    }
}

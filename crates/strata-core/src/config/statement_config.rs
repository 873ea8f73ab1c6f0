//! Statement generation and execution configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_IN_LIST, DEFAULT_VARCHAR_LENGTH};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StatementConfig {
    /// Honor per-entity version columns on update. Default: true.
    pub optimistic_locking: Option<bool>,
    /// When false, every mutation is rejected as a stateless operation. Default: true.
    pub stateful: Option<bool>,
    /// Largest IN-list bound in one query; longer lists are chunked. Default: 500.
    pub max_in_list: Option<usize>,
    /// Length used for bounded VARCHAR type names. Default: 255.
    pub varchar_length: Option<u32>,
}

impl StatementConfig {
    pub fn effective_optimistic_locking(&self) -> bool {
        self.optimistic_locking.unwrap_or(true)
    }

    pub fn effective_stateful(&self) -> bool {
        self.stateful.unwrap_or(true)
    }

    pub fn effective_max_in_list(&self) -> usize {
        self.max_in_list.unwrap_or(DEFAULT_MAX_IN_LIST)
    }

    pub fn effective_varchar_length(&self) -> u32 {
        self.varchar_length.unwrap_or(DEFAULT_VARCHAR_LENGTH)
    }
}

//! Instance graph collector configuration.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_PLAN_CACHE_CAPACITY;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CollectorConfig {
    /// Maximum number of memoized select plans. Default: 1024.
    pub plan_cache_capacity: Option<u64>,
}

impl CollectorConfig {
    pub fn effective_plan_cache_capacity(&self) -> u64 {
        self.plan_cache_capacity.unwrap_or(DEFAULT_PLAN_CACHE_CAPACITY)
    }
}

//! Storage configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_READ_POOL_SIZE, MAX_READ_POOL_SIZE};

/// Dialects with registered RDBMS type-name rules.
pub const KNOWN_DIALECTS: &[&str] = &["sqlite", "postgres"];

/// Configuration for the SQLite connection layer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Number of read connections. Default: 4, clamped to 1..=8.
    pub read_pool_size: Option<usize>,
    /// RDBMS dialect used for parameter type names. Default: "sqlite".
    pub dialect: Option<String>,
    /// SQLite busy timeout in milliseconds. Default: 5000.
    pub busy_timeout_ms: Option<u64>,
}

impl StorageConfig {
    pub fn effective_read_pool_size(&self) -> usize {
        self.read_pool_size
            .unwrap_or(DEFAULT_READ_POOL_SIZE)
            .clamp(1, MAX_READ_POOL_SIZE)
    }

    pub fn effective_dialect(&self) -> &str {
        self.dialect.as_deref().unwrap_or("sqlite")
    }

    pub fn effective_busy_timeout_ms(&self) -> u64 {
        self.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS)
    }
}

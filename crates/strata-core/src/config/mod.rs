//! Configuration system for Strata.
//! TOML-based, 4-layer resolution: CLI > env > project > user > defaults.

pub mod collector_config;
pub mod logging_config;
pub mod statement_config;
pub mod storage_config;
pub mod strata_config;

pub use collector_config::CollectorConfig;
pub use logging_config::LoggingConfig;
pub use statement_config::StatementConfig;
pub use storage_config::StorageConfig;
pub use strata_config::{CliOverrides, StrataConfig};

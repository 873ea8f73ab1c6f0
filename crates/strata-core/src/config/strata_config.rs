//! Top-level Strata configuration with layered resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::storage_config::KNOWN_DIALECTS;
use super::{CollectorConfig, LoggingConfig, StatementConfig, StorageConfig};
use crate::errors::ConfigError;

/// Top-level configuration aggregating all sub-configs.
///
/// Resolution order (highest priority first):
/// 1. CLI flags (applied via `apply_cli_overrides`)
/// 2. Environment variables (`STRATA_*`)
/// 3. Project config (`strata.toml` in project root)
/// 4. User config (`~/.strata/config.toml`)
/// 5. Compiled defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StrataConfig {
    pub storage: StorageConfig,
    pub statements: StatementConfig,
    pub collector: CollectorConfig,
    pub logging: LoggingConfig,
}

/// CLI override arguments that can be applied to a config.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub read_pool_size: Option<usize>,
    pub dialect: Option<String>,
    pub stateful: Option<bool>,
    pub log_filter: Option<String>,
}

impl StrataConfig {
    /// Load configuration with layered resolution.
    pub fn load(root: &Path, cli_overrides: Option<&CliOverrides>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Layer 4 (lowest priority): user config
        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                match Self::merge_toml_file(&mut config, &user_config_path) {
                    Ok(()) => {}
                    Err(e @ ConfigError::ParseError { .. }) => return Err(e),
                    Err(e) => {
                        tracing::warn!(error = %e, "ignoring unreadable user config");
                    }
                }
            }
        }

        // Layer 3: project config
        let project_config_path = root.join("strata.toml");
        if project_config_path.exists() {
            Self::merge_toml_file(&mut config, &project_config_path)?;
        }

        // Layer 2: environment variables
        Self::apply_env_overrides(&mut config);

        // Layer 1 (highest priority): CLI flags
        if let Some(cli) = cli_overrides {
            Self::apply_cli_overrides(&mut config, cli);
        }

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::ParseError {
            path: "<string>".to_string(),
            message: e.to_string(),
        })
    }

    /// Validate the configuration values.
    pub fn validate(config: &StrataConfig) -> Result<(), ConfigError> {
        if config.storage.read_pool_size == Some(0) {
            return Err(ConfigError::ValidationFailed {
                field: "storage.read_pool_size".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if let Some(ref dialect) = config.storage.dialect {
            if !KNOWN_DIALECTS.contains(&dialect.as_str()) {
                return Err(ConfigError::ValidationFailed {
                    field: "storage.dialect".to_string(),
                    message: format!("unknown dialect '{dialect}', expected one of {KNOWN_DIALECTS:?}"),
                });
            }
        }
        if config.statements.max_in_list == Some(0) {
            return Err(ConfigError::ValidationFailed {
                field: "statements.max_in_list".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if config.statements.varchar_length == Some(0) {
            return Err(ConfigError::ValidationFailed {
                field: "statements.varchar_length".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if config.collector.plan_cache_capacity == Some(0) {
            return Err(ConfigError::ValidationFailed {
                field: "collector.plan_cache_capacity".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Returns the user config path: `~/.strata/config.toml`.
    fn user_config_path() -> Option<PathBuf> {
        dirs_path().map(|d| d.join("config.toml"))
    }

    /// Merge a TOML file into the existing config.
    /// Unknown keys are silently ignored.
    fn merge_toml_file(config: &mut StrataConfig, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let file_config: StrataConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        Self::merge(config, &file_config);
        Ok(())
    }

    /// Merge `other` into `base`; `other` wins only where it has a `Some` value.
    fn merge(base: &mut StrataConfig, other: &StrataConfig) {
        // Storage
        if other.storage.read_pool_size.is_some() {
            base.storage.read_pool_size = other.storage.read_pool_size;
        }
        if other.storage.dialect.is_some() {
            base.storage.dialect = other.storage.dialect.clone();
        }
        if other.storage.busy_timeout_ms.is_some() {
            base.storage.busy_timeout_ms = other.storage.busy_timeout_ms;
        }

        // Statements
        if other.statements.optimistic_locking.is_some() {
            base.statements.optimistic_locking = other.statements.optimistic_locking;
        }
        if other.statements.stateful.is_some() {
            base.statements.stateful = other.statements.stateful;
        }
        if other.statements.max_in_list.is_some() {
            base.statements.max_in_list = other.statements.max_in_list;
        }
        if other.statements.varchar_length.is_some() {
            base.statements.varchar_length = other.statements.varchar_length;
        }

        // Collector
        if other.collector.plan_cache_capacity.is_some() {
            base.collector.plan_cache_capacity = other.collector.plan_cache_capacity;
        }

        // Logging
        if other.logging.filter.is_some() {
            base.logging.filter = other.logging.filter.clone();
        }
        if other.logging.json.is_some() {
            base.logging.json = other.logging.json;
        }
    }

    /// Apply environment variable overrides.
    /// Pattern: `STRATA_STORAGE_READ_POOL_SIZE`, `STRATA_STATEMENTS_STATEFUL`, etc.
    fn apply_env_overrides(config: &mut StrataConfig) {
        if let Ok(val) = std::env::var("STRATA_STORAGE_READ_POOL_SIZE") {
            if let Ok(v) = val.parse::<usize>() {
                config.storage.read_pool_size = Some(v);
            }
        }
        if let Ok(val) = std::env::var("STRATA_STORAGE_DIALECT") {
            config.storage.dialect = Some(val);
        }
        if let Ok(val) = std::env::var("STRATA_STORAGE_BUSY_TIMEOUT_MS") {
            if let Ok(v) = val.parse::<u64>() {
                config.storage.busy_timeout_ms = Some(v);
            }
        }
        if let Ok(val) = std::env::var("STRATA_STATEMENTS_OPTIMISTIC_LOCKING") {
            if let Ok(v) = val.parse::<bool>() {
                config.statements.optimistic_locking = Some(v);
            }
        }
        if let Ok(val) = std::env::var("STRATA_STATEMENTS_STATEFUL") {
            if let Ok(v) = val.parse::<bool>() {
                config.statements.stateful = Some(v);
            }
        }
        if let Ok(val) = std::env::var("STRATA_STATEMENTS_MAX_IN_LIST") {
            if let Ok(v) = val.parse::<usize>() {
                config.statements.max_in_list = Some(v);
            }
        }
        if let Ok(val) = std::env::var("STRATA_COLLECTOR_PLAN_CACHE_CAPACITY") {
            if let Ok(v) = val.parse::<u64>() {
                config.collector.plan_cache_capacity = Some(v);
            }
        }
        if let Ok(val) = std::env::var("STRATA_LOGGING_JSON") {
            if let Ok(v) = val.parse::<bool>() {
                config.logging.json = Some(v);
            }
        }
    }

    /// Apply CLI overrides (highest priority).
    fn apply_cli_overrides(config: &mut StrataConfig, cli: &CliOverrides) {
        if let Some(v) = cli.read_pool_size {
            config.storage.read_pool_size = Some(v);
        }
        if let Some(ref v) = cli.dialect {
            config.storage.dialect = Some(v.clone());
        }
        if let Some(v) = cli.stateful {
            config.statements.stateful = Some(v);
        }
        if let Some(ref v) = cli.log_filter {
            config.logging.filter = Some(v.clone());
        }
    }

    /// Serialize the config back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            path: "<serialization>".to_string(),
            message: e.to_string(),
        })
    }
}

/// Returns the user-level config directory: `~/.strata/`.
fn dirs_path() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".strata"))
}

/// Cross-platform home directory resolution.
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

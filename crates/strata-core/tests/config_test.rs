//! Tests for the Strata configuration system.

use std::sync::Mutex;

use strata_core::config::strata_config::{CliOverrides, StrataConfig};
use strata_core::errors::ConfigError;

/// Serializes tests that touch `STRATA_*` environment variables.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn clear_strata_env_vars() {
    for key in [
        "STRATA_STORAGE_READ_POOL_SIZE",
        "STRATA_STORAGE_DIALECT",
        "STRATA_STORAGE_BUSY_TIMEOUT_MS",
        "STRATA_STATEMENTS_OPTIMISTIC_LOCKING",
        "STRATA_STATEMENTS_STATEFUL",
        "STRATA_STATEMENTS_MAX_IN_LIST",
        "STRATA_COLLECTOR_PLAN_CACHE_CAPACITY",
        "STRATA_LOGGING_JSON",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn cli_beats_env_beats_project_file() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_strata_env_vars();

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("strata.toml"),
        r#"
[storage]
read_pool_size = 2
dialect = "postgres"

[statements]
stateful = true
max_in_list = 50
"#,
    )
    .unwrap();
    std::env::set_var("STRATA_STORAGE_READ_POOL_SIZE", "6");
    std::env::set_var("STRATA_STATEMENTS_STATEFUL", "false");

    let cli = CliOverrides {
        stateful: Some(true),
        ..Default::default()
    };
    let config = StrataConfig::load(dir.path(), Some(&cli)).unwrap();

    assert_eq!(config.storage.read_pool_size, Some(6));
    assert_eq!(config.storage.effective_dialect(), "postgres");
    assert_eq!(config.statements.stateful, Some(true));
    assert_eq!(config.statements.effective_max_in_list(), 50);

    clear_strata_env_vars();
}

#[test]
fn missing_project_file_falls_back_to_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_strata_env_vars();

    let dir = tempfile::tempdir().unwrap();
    let config = StrataConfig::load(dir.path(), None).unwrap();

    assert_eq!(config.storage.effective_read_pool_size(), 4);
    assert_eq!(config.storage.effective_dialect(), "sqlite");
    assert!(config.statements.effective_optimistic_locking());
    assert!(config.statements.effective_stateful());
    assert_eq!(config.statements.effective_varchar_length(), 255);
    assert_eq!(config.collector.effective_plan_cache_capacity(), 1_024);
}

#[test]
fn unparsable_env_values_are_ignored() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_strata_env_vars();

    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("STRATA_STATEMENTS_MAX_IN_LIST", "lots");

    let config = StrataConfig::load(dir.path(), None).unwrap();
    assert_eq!(config.statements.max_in_list, None);

    clear_strata_env_vars();
}

#[test]
fn invalid_toml_is_a_parse_error() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_strata_env_vars();

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("strata.toml"), "[storage\nread_pool_size = ").unwrap();

    match StrataConfig::load(dir.path(), None) {
        Err(ConfigError::ParseError { path, .. }) => assert!(path.ends_with("strata.toml")),
        other => panic!("expected ParseError, got {other:?}"),
    }
}

#[test]
fn zero_sizes_fail_validation() {
    for (toml, field) in [
        ("[storage]\nread_pool_size = 0", "storage.read_pool_size"),
        ("[statements]\nmax_in_list = 0", "statements.max_in_list"),
        ("[statements]\nvarchar_length = 0", "statements.varchar_length"),
        ("[collector]\nplan_cache_capacity = 0", "collector.plan_cache_capacity"),
    ] {
        let config = StrataConfig::from_toml(toml).unwrap();
        match StrataConfig::validate(&config) {
            Err(ConfigError::ValidationFailed { field: got, .. }) => assert_eq!(got, field),
            other => panic!("expected {field} to fail validation, got {other:?}"),
        }
    }
}

#[test]
fn unknown_dialect_fails_validation() {
    let config = StrataConfig::from_toml("[storage]\ndialect = \"oracle\"").unwrap();
    let err = StrataConfig::validate(&config).unwrap_err();
    assert!(err.to_string().contains("oracle"));
}

#[test]
fn read_pool_size_is_clamped() {
    let config = StrataConfig::from_toml("[storage]\nread_pool_size = 64").unwrap();
    assert_eq!(config.storage.effective_read_pool_size(), 8);
}

#[test]
fn config_survives_a_toml_round_trip() {
    let config = StrataConfig::from_toml(
        "[statements]\noptimistic_locking = false\n\n[logging]\nfilter = \"strata=debug\"",
    )
    .unwrap();

    let reparsed = StrataConfig::from_toml(&config.to_toml().unwrap()).unwrap();

    assert_eq!(reparsed.statements.optimistic_locking, Some(false));
    assert_eq!(reparsed.logging.effective_filter(), "strata=debug");
}

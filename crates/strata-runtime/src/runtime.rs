//! StrataRuntime: one loaded model, its storage engine and its dispatcher.
//!
//! Each runtime owns its caches; there is no process-wide instance.

use std::path::PathBuf;
use std::sync::Arc;

use strata_core::config::StrataConfig;
use strata_core::errors::{ConfigError, PersistenceError, PersistenceResult};
use strata_core::mapping::SchemaMapping;
use strata_core::model::{Model, ModelDefinition};
use strata_core::traits::EntityStore;
use strata_storage::StorageEngine;

use crate::collaborators::Collaborators;
use crate::dispatcher::Dispatcher;

/// Options for opening a runtime.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Database file. If None, the database lives in memory.
    pub db_path: Option<PathBuf>,
    /// Model definition, TOML.
    pub model_toml: String,
    /// Schema mapping trace, TOML.
    pub mapping_toml: String,
    /// Configuration, TOML. If None, uses defaults.
    pub config_toml: Option<String>,
    /// DDL run once after opening, e.g. for in-memory databases.
    pub schema_ddl: Option<String>,
    /// Install a global tracing subscriber from the logging config.
    pub init_tracing: bool,
}

pub struct StrataRuntime {
    pub config: StrataConfig,
    pub engine: Arc<StorageEngine>,
    pub dispatcher: Dispatcher,
}

impl std::fmt::Debug for StrataRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrataRuntime")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StrataRuntime {
    pub fn open(opts: RuntimeOptions) -> PersistenceResult<Self> {
        Self::open_with(opts, Collaborators::default())
    }

    pub fn open_with(opts: RuntimeOptions, collaborators: Collaborators) -> PersistenceResult<Self> {
        let config = match &opts.config_toml {
            Some(toml_str) => {
                let config = StrataConfig::from_toml(toml_str)?;
                StrataConfig::validate(&config)?;
                config
            }
            None => StrataConfig::default(),
        };
        if opts.init_tracing {
            strata_core::tracing_setup::init_tracing(&config.logging);
        }

        let definition = ModelDefinition::from_toml(&opts.model_toml).map_err(|e| parse_error("<model>", e))?;
        let model = Arc::new(Model::from_definition(definition)?);
        let mapping = SchemaMapping::from_toml(&opts.mapping_toml).map_err(|e| parse_error("<mapping>", e))?;

        let engine = match &opts.db_path {
            Some(path) => StorageEngine::open(path, Arc::clone(&model), mapping, &config)?,
            None => StorageEngine::open_in_memory(Arc::clone(&model), mapping, &config)?,
        };
        if let Some(ddl) = &opts.schema_ddl {
            engine.database().execute_ddl(ddl)?;
        }
        let engine = Arc::new(engine);

        let store = Arc::clone(&engine) as Arc<dyn EntityStore>;
        let dispatcher = Dispatcher::with_collaborators(store, model, collaborators);
        tracing::info!(
            entities = dispatcher.model().entities().count(),
            in_memory = opts.db_path.is_none(),
            "strata runtime opened"
        );
        Ok(Self {
            config,
            engine,
            dispatcher,
        })
    }
}

fn parse_error(path: &str, e: toml::de::Error) -> PersistenceError {
    ConfigError::ParseError {
        path: path.to_string(),
        message: e.to_string(),
    }
    .into()
}

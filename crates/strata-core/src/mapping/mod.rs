//! Transformation trace from model elements to physical relational names.

pub mod rule;

pub use rule::{IdType, MappingRule};

use serde::{Deserialize, Serialize};

/// The precomputed mapping of a model onto an externally owned schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaMapping {
    pub rules: Vec<MappingRule>,
}

impl SchemaMapping {
    pub fn new(rules: Vec<MappingRule>) -> Self {
        Self { rules }
    }

    pub fn from_toml(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    pub fn push(&mut self, rule: MappingRule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// Rules mentioning `entity`, in declaration order.
    pub fn rules_for<'a>(&'a self, entity: &'a str) -> impl Iterator<Item = &'a MappingRule> + 'a {
        self.rules.iter().filter(move |r| r.entity() == entity)
    }
}

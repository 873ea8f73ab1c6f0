//! Serializable model definitions, loaded from TOML or JSON.

use serde::{Deserialize, Serialize};

use super::DataType;
use crate::query::Filter;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelDefinition {
    pub entities: Vec<EntityDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    #[serde(default)]
    pub supertype: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub optimistic_locking: bool,
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
    #[serde(default)]
    pub references: Vec<ReferenceDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub lower: u32,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Resolved SQL expression for derived attributes.
    #[serde(default)]
    pub derived: Option<String>,
    /// Constant value for static attributes.
    #[serde(default, rename = "static")]
    pub static_value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceDefinition {
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub lower: u32,
    /// Upper bound; `-1` means unbounded.
    #[serde(default = "default_upper")]
    pub upper: i64,
    #[serde(default)]
    pub containment: bool,
    #[serde(default)]
    pub derived: bool,
    #[serde(default)]
    pub opposite: Option<String>,
    #[serde(default)]
    pub embedded: bool,
    #[serde(default)]
    pub range: Option<Filter>,
}

fn default_upper() -> i64 {
    1
}

impl ModelDefinition {
    pub fn from_toml(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }
}

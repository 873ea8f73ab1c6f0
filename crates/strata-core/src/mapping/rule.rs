//! Individual mapping trace rules. Model elements are referenced by name.

use serde::{Deserialize, Serialize};

/// Physical type of an entity's identifier column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    /// Row id generated by the database.
    #[default]
    Integer,
    /// UUID text generated by the engine.
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingRule {
    EntityTable {
        entity: String,
        table: String,
        #[serde(default = "default_id_column")]
        id_column: String,
        #[serde(default)]
        id_type: IdType,
        #[serde(default)]
        version_column: Option<String>,
    },
    AttributeColumn {
        entity: String,
        attribute: String,
        column: String,
    },
    /// The reference owner's row holds the target id.
    ForeignKey {
        entity: String,
        reference: String,
        table: String,
        column: String,
    },
    /// The target's row holds the owner id.
    InverseForeignKey {
        entity: String,
        reference: String,
        table: String,
        column: String,
    },
    JoinTable {
        entity: String,
        reference: String,
        table: String,
        source_column: String,
        target_column: String,
    },
}

fn default_id_column() -> String {
    "id".to_string()
}

impl MappingRule {
    pub fn entity(&self) -> &str {
        match self {
            Self::EntityTable { entity, .. }
            | Self::AttributeColumn { entity, .. }
            | Self::ForeignKey { entity, .. }
            | Self::InverseForeignKey { entity, .. }
            | Self::JoinTable { entity, .. } => entity,
        }
    }

    /// Name of the mapped feature, if the rule maps one.
    pub fn feature(&self) -> Option<&str> {
        match self {
            Self::EntityTable { .. } => None,
            Self::AttributeColumn { attribute, .. } => Some(attribute),
            Self::ForeignKey { reference, .. }
            | Self::InverseForeignKey { reference, .. }
            | Self::JoinTable { reference, .. } => Some(reference),
        }
    }

    pub fn entity_table(entity: &str, table: &str) -> Self {
        Self::EntityTable {
            entity: entity.to_string(),
            table: table.to_string(),
            id_column: default_id_column(),
            id_type: IdType::Integer,
            version_column: None,
        }
    }

    pub fn attribute_column(entity: &str, attribute: &str, column: &str) -> Self {
        Self::AttributeColumn {
            entity: entity.to_string(),
            attribute: attribute.to_string(),
            column: column.to_string(),
        }
    }

    pub fn foreign_key(entity: &str, reference: &str, table: &str, column: &str) -> Self {
        Self::ForeignKey {
            entity: entity.to_string(),
            reference: reference.to_string(),
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    pub fn inverse_foreign_key(entity: &str, reference: &str, table: &str, column: &str) -> Self {
        Self::InverseForeignKey {
            entity: entity.to_string(),
            reference: reference.to_string(),
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    pub fn join_table(
        entity: &str,
        reference: &str,
        table: &str,
        source_column: &str,
        target_column: &str,
    ) -> Self {
        Self::JoinTable {
            entity: entity.to_string(),
            reference: reference.to_string(),
            table: table.to_string(),
            source_column: source_column.to_string(),
            target_column: target_column.to_string(),
        }
    }
}

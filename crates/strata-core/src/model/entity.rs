//! Entity type and attribute descriptors.

use super::{AttributeId, DataType, EntityTypeId, ReferenceId};
use crate::payload::Value;

/// A node in the model graph. Immutable once the model is loaded.
#[derive(Debug, Clone)]
pub struct EntityType {
    pub id: EntityTypeId,
    pub name: String,
    pub supertype: Option<EntityTypeId>,
    pub is_abstract: bool,
    /// Updates carry a version-match predicate when enabled.
    pub optimistic_locking: bool,
    /// Attributes declared on this type (inherited ones live on the supertype).
    pub attributes: Vec<AttributeId>,
    /// References declared on this type.
    pub references: Vec<ReferenceId>,
}

/// How an attribute obtains its value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    /// Persisted in a mapped column.
    Stored,
    /// Computed by a resolved SQL expression; `{self}` is replaced by the row alias.
    Derived { expression: String },
    /// Class-level constant, never stored, injected into output payloads.
    Static { value: Value },
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub id: AttributeId,
    pub name: String,
    /// Declaring entity type.
    pub owner: EntityTypeId,
    pub data_type: DataType,
    /// A lower bound of one makes the attribute mandatory.
    pub lower: u32,
    pub default: Option<Value>,
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn is_stored(&self) -> bool {
        matches!(self.kind, AttributeKind::Stored)
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.kind, AttributeKind::Derived { .. })
    }

    pub fn is_mandatory(&self) -> bool {
        self.lower > 0 && self.is_stored()
    }
}

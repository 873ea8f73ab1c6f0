//! Model descriptors: entity types, attributes and references.
//!
//! The model is built once from a [`ModelDefinition`] and is immutable afterwards.
//! Traversal algorithms work over these plain descriptors; nothing inspects types at runtime.

pub mod datatype;
pub mod definition;
pub mod entity;
pub mod ids;
pub mod reference;
pub mod registry;

pub use datatype::DataType;
pub use definition::{AttributeDefinition, EntityDefinition, ModelDefinition, ReferenceDefinition};
pub use entity::{Attribute, AttributeKind, EntityType};
pub use ids::{AttributeId, EntityTypeId, ReferenceId};
pub use reference::{Multiplicity, Reference};
pub use registry::Model;

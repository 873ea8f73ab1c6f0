//! Operation definitions and the behaviors they resolve to.

use std::sync::Arc;

use strata_core::errors::DispatchError;
use strata_core::payload::{Id, Payload, Value};
use strata_core::query::QueryCustomizer;
use strata_core::traits::EntityStore;
use strata_core::Model;

use crate::collaborators::Actor;

/// Default parameter name holding an operation's input.
pub const DEFAULT_INPUT: &str = "input";
/// Default key the behavior result is returned under.
pub const DEFAULT_OUTPUT: &str = "output";

/// DAO primitives an operation can map onto directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrudPrimitive {
    GetByIdentifier,
    Search,
    Count,
    Create,
    Update,
    Delete,
    SetReference { reference: String },
    AddReferences { reference: String },
    RemoveReferences { reference: String },
    GetRangeOf { reference: String },
    CountRangeOf { reference: String },
    Template,
}

impl CrudPrimitive {
    /// Primitives that run against an existing instance.
    pub fn needs_instance(&self) -> bool {
        matches!(
            self,
            Self::GetByIdentifier
                | Self::Update
                | Self::Delete
                | Self::SetReference { .. }
                | Self::AddReferences { .. }
                | Self::RemoveReferences { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GetByIdentifier => "getByIdentifier",
            Self::Search => "search",
            Self::Count => "count",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::SetReference { .. } => "setReference",
            Self::AddReferences { .. } => "addReferences",
            Self::RemoveReferences { .. } => "removeReferences",
            Self::GetRangeOf { .. } => "getRangeOf",
            Self::CountRangeOf { .. } => "countRangeOf",
            Self::Template => "template",
        }
    }
}

/// Everything an SDK behavior sees of the call it serves.
pub struct OperationContext<'a> {
    pub operation: &'a OperationDefinition,
    pub store: &'a dyn EntityStore,
    pub model: &'a Model,
    pub entity: Option<&'a str>,
    /// Verified identifier of the instance a bound operation runs on.
    pub instance: Option<&'a Id>,
    pub actor: Option<&'a Actor>,
    pub customizer: Option<&'a QueryCustomizer>,
}

/// Hand-written behavior implementation.
///
/// A result payload carrying the reserved `__fault` key is a business fault,
/// not a result.
pub trait OperationHandler: Send + Sync {
    fn invoke(&self, context: &OperationContext<'_>, input: Payload) -> Result<Value, DispatchError>;
}

#[derive(Clone)]
pub enum Behavior {
    Crud(CrudPrimitive),
    Sdk(Arc<dyn OperationHandler>),
}

impl std::fmt::Debug for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Crud(primitive) => f.debug_tuple("Crud").field(primitive).finish(),
            Self::Sdk(_) => f.write_str("Sdk(..)"),
        }
    }
}

/// A callable operation.
///
/// Bound operations run on one instance of `entity`, named by the exchange's
/// instance identifier. Unbound operations without an `entity` take the type
/// from the exchange's discriminator.
#[derive(Debug, Clone)]
pub struct OperationDefinition {
    /// Fully qualified name, e.g. `shop.Order.create`.
    pub name: String,
    pub entity: Option<String>,
    pub bound: bool,
    /// Internal operations are callable only through [`crate::Dispatcher::call`].
    pub exposed: bool,
    pub behavior: Behavior,
    pub input: String,
    pub output: String,
}

impl OperationDefinition {
    /// An exposed, unbound operation with default parameter names.
    pub fn new(name: &str, entity: Option<&str>, behavior: Behavior) -> Self {
        let bound = matches!(&behavior, Behavior::Crud(p) if p.needs_instance());
        Self {
            name: name.to_string(),
            entity: entity.map(str::to_string),
            bound,
            exposed: true,
            behavior,
            input: DEFAULT_INPUT.to_string(),
            output: DEFAULT_OUTPUT.to_string(),
        }
    }

    pub fn crud(entity: &str, primitive: CrudPrimitive) -> Self {
        let name = match &primitive {
            CrudPrimitive::SetReference { reference }
            | CrudPrimitive::AddReferences { reference }
            | CrudPrimitive::RemoveReferences { reference }
            | CrudPrimitive::GetRangeOf { reference }
            | CrudPrimitive::CountRangeOf { reference } => {
                format!("{entity}.{reference}.{}", primitive.name())
            }
            _ => format!("{entity}.{}", primitive.name()),
        };
        Self::new(&name, Some(entity), Behavior::Crud(primitive))
    }

    pub fn sdk(name: &str, entity: Option<&str>, handler: Arc<dyn OperationHandler>) -> Self {
        Self::new(name, entity, Behavior::Sdk(handler))
    }

    pub fn bound(mut self) -> Self {
        self.bound = true;
        self
    }

    pub fn internal(mut self) -> Self {
        self.exposed = false;
        self
    }

    pub fn with_input(mut self, name: &str) -> Self {
        self.input = name.to_string();
        self
    }

    pub fn with_output(mut self, name: &str) -> Self {
        self.output = name.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crud_names_follow_entity_and_reference() {
        let create = OperationDefinition::crud("Order", CrudPrimitive::Create);
        assert_eq!(create.name, "Order.create");
        assert!(!create.bound);

        let tags = OperationDefinition::crud(
            "Order",
            CrudPrimitive::AddReferences {
                reference: "tags".into(),
            },
        );
        assert_eq!(tags.name, "Order.tags.addReferences");
        assert!(tags.bound);
        assert!(tags.exposed);
    }
}

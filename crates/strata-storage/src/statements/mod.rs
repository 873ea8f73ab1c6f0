//! Statement processors: walk payload trees and emit ordered statement batches.
//!
//! Processors follow containment edges only. Plain references are maintained as
//! link statements and never recurse into the referenced instance.

pub mod client_reference;
pub mod delete;
pub mod insert;
pub mod reference;
pub mod statement;
pub mod update;

pub use client_reference::ClientReferences;
pub use delete::DeleteProcessor;
pub use insert::InsertProcessor;
pub use reference::{minimal_delta, ReferenceProcessor};
pub use update::UpdateProcessor;
pub use statement::{
    ColumnWrite, DeleteRows, ForeignKeyWrite, IdRef, InsertRow, PendingKey, ReferenceLink, Statement,
    StatementBatch, UpdateRow, VersionCheck,
};

use std::sync::Arc;

use rusqlite::Connection;
use strata_core::errors::{PersistenceResult, SchemaError, StatementError};
use strata_core::model::{AttributeId, EntityTypeId, Model, ReferenceId};
use strata_core::payload::coerce::coerce;
use strata_core::payload::{Id, Payload, Value};

use crate::graph::InstanceGraphCollector;
use crate::queries::QueryFactory;
use crate::rules::StorageRule;
use crate::schema::SchemaResolver;

/// Shared read access for processors: the open transaction plus the read components.
pub struct StatementContext<'a> {
    pub conn: &'a Connection,
    pub collector: &'a InstanceGraphCollector,
    pub queries: &'a QueryFactory,
    pub optimistic_locking: bool,
}

impl<'a> StatementContext<'a> {
    pub fn model(&self) -> &Arc<Model> {
        self.collector.resolver().model()
    }

    pub fn resolver(&self) -> &Arc<SchemaResolver> {
        self.collector.resolver()
    }

    pub fn classify(&self, reference: ReferenceId) -> Result<StorageRule, SchemaError> {
        self.collector.classifier().classify(reference)
    }

    pub fn entity_name(&self, entity: EntityTypeId) -> String {
        self.model().entity(entity).name.clone()
    }

    pub(crate) fn invalid(&self, entity: EntityTypeId, reason: impl Into<String>) -> StatementError {
        StatementError::InvalidPayload {
            entity: self.entity_name(entity),
            reason: reason.into(),
        }
    }

    /// Concrete type of `payload`: its `__type` discriminator, or `declared`.
    pub fn concrete_type(&self, declared: EntityTypeId, payload: &Payload) -> PersistenceResult<EntityTypeId> {
        let Some(name) = payload.type_name() else {
            return Ok(declared);
        };
        let model = self.model();
        let entity = model.entity_by_name(name)?.id;
        if !model.is_subtype_of(entity, declared) {
            return Err(self
                .invalid(declared, format!("'{name}' is not a subtype of {}", model.entity(declared).name))
                .into());
        }
        Ok(entity)
    }

    /// Reject keys that are neither reserved nor features of `entity`.
    pub fn check_features(&self, entity: EntityTypeId, payload: &Payload) -> PersistenceResult<()> {
        let model = self.model();
        for (key, _) in payload.features() {
            let known = model.find_attribute(entity, key).is_some() || model.find_reference(entity, key).is_some();
            if !known {
                return Err(self.invalid(entity, format!("unknown feature '{key}'")).into());
            }
        }
        Ok(())
    }

    /// Coerce `value` onto a stored attribute and resolve its column.
    pub fn column_write(
        &self,
        entity: EntityTypeId,
        attribute: AttributeId,
        value: &Value,
    ) -> PersistenceResult<ColumnWrite> {
        let model = self.model();
        let attr = model.attribute(attribute);
        let coerced = coerce(value, &attr.data_type).map_err(|reason| {
            self.invalid(entity, format!("'{}': {reason}", attr.name))
        })?;
        let column = self.resolver().attribute_column(entity, attribute)?;
        Ok(ColumnWrite {
            table: column.table,
            column: column.column,
            value: coerced,
            data_type: attr.data_type.clone(),
        })
    }

    /// Identifiers of nested reference payloads. Every entry must carry `__id`.
    pub fn stub_ids(&self, entity: EntityTypeId, reference: ReferenceId, nested: &[&Payload]) -> PersistenceResult<Vec<Id>> {
        let model = self.model();
        nested
            .iter()
            .map(|stub| {
                stub.id().ok_or_else(|| {
                    self.invalid(
                        entity,
                        format!(
                            "'{}' refers to existing instances, which must carry an identifier",
                            model.qualified_name(reference)
                        ),
                    )
                    .into()
                })
            })
            .collect()
    }

    /// Fail with `ConstraintNotFound` unless every id exists as `entity`.
    pub fn require_existing(&self, entity: EntityTypeId, ids: &[Id]) -> PersistenceResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let found = self.queries.existing_ids(self.conn, entity, ids)?;
        if let Some(missing) = ids.iter().find(|id| !found.contains(id)) {
            return Err(StatementError::ConstraintNotFound {
                entity: self.entity_name(entity),
                id: missing.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub(crate) fn cardinality_error(&self, reference: ReferenceId, actual: usize) -> StatementError {
        let r = self.model().reference(reference);
        StatementError::CardinalityViolation {
            reference: self.model().qualified_name(reference),
            lower: r.lower(),
            upper: r.upper(),
            actual,
        }
    }

    pub(crate) fn link(&self, reference: ReferenceId, owner: IdRef, target: Option<IdRef>) -> PersistenceResult<ReferenceLink> {
        let r = self.model().reference(reference);
        Ok(ReferenceLink {
            reference,
            rule: self.classify(reference)?,
            owner,
            owner_entity: r.owner,
            target,
            target_entity: r.target,
        })
    }
}

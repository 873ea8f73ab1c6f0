//! Insert processor.
//!
//! Emits one insert per containment level. A node's insert precedes the inserts of
//! children that point back at it (inverse foreign key, junction) and follows the
//! inserts of children it points at itself (foreign key on the container row).

use strata_core::errors::{PersistenceResult, StatementError};
use strata_core::model::{AttributeKind, EntityTypeId, ReferenceId};
use strata_core::payload::Payload;
use tracing::debug;

use super::reference::ReferenceProcessor;
use super::{ForeignKeyWrite, IdRef, InsertRow, Statement, StatementBatch, StatementContext};
use crate::rules::StorageRule;

/// The container a nested payload is inserted under.
#[derive(Debug, Clone)]
pub struct ContainerRef {
    pub containment: ReferenceId,
    pub container: IdRef,
    pub container_entity: EntityTypeId,
}

pub struct InsertProcessor<'c, 'a> {
    ctx: &'c StatementContext<'a>,
    check_mandatory: bool,
}

impl<'c, 'a> InsertProcessor<'c, 'a> {
    pub fn new(ctx: &'c StatementContext<'a>) -> Self {
        Self {
            ctx,
            check_mandatory: true,
        }
    }

    /// Skip mandatory-feature checks, e.g. for template or range payloads.
    pub fn without_mandatory_checks(mut self) -> Self {
        self.check_mandatory = false;
        self
    }

    /// Emit the statements inserting `payload` and everything it contains.
    pub fn insert(
        &self,
        batch: &mut StatementBatch,
        declared: EntityTypeId,
        payload: &Payload,
        container: Option<ContainerRef>,
    ) -> PersistenceResult<IdRef> {
        let ctx = self.ctx;
        let model = ctx.model();
        let entity = ctx.concrete_type(declared, payload)?;
        if model.entity(entity).is_abstract {
            return Err(ctx.invalid(entity, "abstract types cannot be instantiated").into());
        }
        if payload.is_immutable() {
            return Err(ctx.invalid(entity, "payload is marked immutable").into());
        }
        ctx.check_features(entity, payload)?;

        let key = batch.pending();
        let mut row = InsertRow {
            key,
            entity,
            id: payload.id(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        };

        for attribute_id in model.all_attributes(entity) {
            let attribute = model.attribute(attribute_id);
            if !matches!(attribute.kind, AttributeKind::Stored) {
                continue;
            }
            let value = match payload.get(&attribute.name).filter(|v| !v.is_null()) {
                Some(value) => value.clone(),
                None => match &attribute.default {
                    Some(default) => default.clone(),
                    None if attribute.is_mandatory() && self.check_mandatory => {
                        return Err(StatementError::Insertion {
                            entity: model.entity(entity).name.clone(),
                            feature: attribute.name.clone(),
                            reason: "mandatory feature is missing".to_string(),
                        }
                        .into());
                    }
                    None => continue,
                },
            };
            row.columns.push(ctx.column_write(entity, attribute_id, &value)?);
        }

        // Statements that must follow this node's insert.
        let mut after: Vec<Deferred<'_>> = Vec::new();

        let implied = container
            .as_ref()
            .and_then(|c| model.reference(c.containment).opposite);
        if let Some(c) = &container {
            match ctx.classify(c.containment)? {
                StorageRule::InverseForeignKey { table, column } => row.foreign_keys.push(ForeignKeyWrite {
                    reference: c.containment,
                    table,
                    column,
                    target: c.container.clone(),
                    target_entity: c.container_entity,
                    deferrable: false,
                }),
                StorageRule::JoinTable { .. } => {
                    let link = ctx.link(c.containment, c.container.clone(), Some(IdRef::Pending(key)))?;
                    after.push(Deferred::Statement(Statement::AddReference(link)));
                }
                // The container's own row holds the column.
                StorageRule::ForeignKey { .. } => {}
            }
        }

        for reference_id in model.all_references(entity) {
            let reference = model.reference(reference_id);
            if reference.derived || Some(reference_id) == implied {
                continue;
            }
            let nested = payload.nested(&reference.name);
            if reference.upper().is_some_and(|u| nested.len() > u as usize) {
                return Err(ctx.cardinality_error(reference_id, nested.len()).into());
            }
            if self.check_mandatory && nested.len() < reference.lower() as usize {
                return Err(StatementError::Insertion {
                    entity: model.entity(entity).name.clone(),
                    feature: reference.name.clone(),
                    reason: format!(
                        "mandatory reference needs at least {} instance(s), got {}",
                        reference.lower(),
                        nested.len()
                    ),
                }
                .into());
            }
            if nested.is_empty() {
                continue;
            }
            let rule = ctx.classify(reference_id)?;

            if reference.containment {
                let child_container = ContainerRef {
                    containment: reference_id,
                    container: IdRef::Pending(key),
                    container_entity: entity,
                };
                match rule {
                    StorageRule::ForeignKey { table, column } => {
                        // Single-valued by construction of the rule; the child goes first.
                        for child in nested {
                            let child_ref = self.insert(batch, reference.target, child, Some(child_container.clone()))?;
                            row.foreign_keys.push(ForeignKeyWrite {
                                reference: reference_id,
                                table: table.clone(),
                                column: column.clone(),
                                target: child_ref,
                                target_entity: reference.target,
                                deferrable: reference.lower() == 0,
                            });
                        }
                    }
                    _ => {
                        for child in nested {
                            after.push(Deferred::Child(reference.target, child, child_container.clone()));
                        }
                    }
                }
                continue;
            }

            let targets = ctx.stub_ids(entity, reference_id, &nested)?;
            ctx.require_existing(reference.target, &targets)?;
            ReferenceProcessor::new(ctx).check_counterparts(reference_id, None, &targets, &[])?;
            for target in targets {
                match &rule {
                    StorageRule::ForeignKey { table, column } => row.foreign_keys.push(ForeignKeyWrite {
                        reference: reference_id,
                        table: table.clone(),
                        column: column.clone(),
                        target: IdRef::Existing(target),
                        target_entity: reference.target,
                        deferrable: reference.lower() == 0,
                    }),
                    _ => {
                        let link = ctx.link(reference_id, IdRef::Pending(key), Some(IdRef::Existing(target)))?;
                        after.push(Deferred::Statement(Statement::AddReference(link)));
                    }
                }
            }
        }

        if let Some(token) = payload.client_reference_id() {
            batch.client_references.push((key, token.to_string()));
        }
        debug!(
            entity = %model.entity(entity).name,
            key,
            columns = row.columns.len(),
            foreign_keys = row.foreign_keys.len(),
            "insert emitted"
        );
        batch.push(Statement::Insert(row));

        for deferred in after {
            match deferred {
                Deferred::Statement(statement) => batch.push(statement),
                Deferred::Child(target, child, child_container) => {
                    self.insert(batch, target, child, Some(child_container))?;
                }
            }
        }
        Ok(IdRef::Pending(key))
    }
}

enum Deferred<'p> {
    Statement(Statement),
    Child(EntityTypeId, &'p Payload, ContainerRef),
}

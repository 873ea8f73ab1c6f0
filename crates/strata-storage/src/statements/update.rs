//! Update processor: diff the submitted payload against the stored instance.
//!
//! Absent keys are left untouched. Contained children are matched by identifier:
//! known ids are updated, payloads without an id are inserted, and stored
//! children missing from the submitted list are deleted.

use strata_core::errors::{PersistenceResult, StatementError};
use strata_core::graph::InstanceGraph;
use strata_core::model::{AttributeKind, EntityTypeId};
use strata_core::payload::coerce::coerce;
use strata_core::payload::{Id, Payload};
use tracing::debug;

use super::insert::{ContainerRef, InsertProcessor};
use super::{
    DeleteProcessor, IdRef, ReferenceProcessor, Statement, StatementBatch, StatementContext, UpdateRow, VersionCheck,
};
use crate::rules::StorageRule;

pub struct UpdateProcessor<'c, 'a> {
    ctx: &'c StatementContext<'a>,
}

impl<'c, 'a> UpdateProcessor<'c, 'a> {
    pub fn new(ctx: &'c StatementContext<'a>) -> Self {
        Self { ctx }
    }

    /// Emit the statements turning the stored instance into `payload`.
    pub fn update(&self, batch: &mut StatementBatch, entity: EntityTypeId, payload: &Payload) -> PersistenceResult<Id> {
        let ctx = self.ctx;
        let id = payload
            .id()
            .ok_or_else(|| ctx.invalid(entity, "updates need an identifier"))?;
        let graph = ctx.collector.collect_graph(ctx.conn, entity, std::slice::from_ref(&id))?;
        if graph.roots.is_empty() {
            return Err(StatementError::ConstraintNotFound {
                entity: ctx.entity_name(entity),
                id: id.to_string(),
            }
            .into());
        }
        self.update_node(batch, &graph, entity, &id, payload, true)?;
        Ok(id)
    }

    fn update_node(
        &self,
        batch: &mut StatementBatch,
        graph: &InstanceGraph,
        entity: EntityTypeId,
        id: &Id,
        payload: &Payload,
        is_root: bool,
    ) -> PersistenceResult<()> {
        let ctx = self.ctx;
        let model = ctx.model();
        if payload.is_immutable() {
            return Err(ctx.invalid(entity, "payload is marked immutable").into());
        }
        let concrete = ctx.concrete_type(entity, payload)?;
        ctx.check_features(concrete, payload)?;

        let stored = ctx
            .queries
            .load_attributes(ctx.conn, concrete, std::slice::from_ref(id), None)?
            .remove(id)
            .ok_or_else(|| StatementError::ConstraintNotFound {
                entity: ctx.entity_name(concrete),
                id: id.to_string(),
            })?;

        let mut columns = Vec::new();
        for attribute_id in model.all_attributes(concrete) {
            let attribute = model.attribute(attribute_id);
            if !matches!(attribute.kind, AttributeKind::Stored) {
                continue;
            }
            let Some(value) = payload.get(&attribute.name) else {
                continue;
            };
            if value.is_null() && attribute.is_mandatory() {
                return Err(StatementError::Insertion {
                    entity: ctx.entity_name(concrete),
                    feature: attribute.name.clone(),
                    reason: "mandatory feature cannot be cleared".to_string(),
                }
                .into());
            }
            let coerced = coerce(value, &attribute.data_type)
                .map_err(|reason| ctx.invalid(concrete, format!("'{}': {reason}", attribute.name)))?;
            if stored.get(&attribute.name) == Some(&coerced) {
                continue;
            }
            columns.push(ctx.column_write(concrete, attribute_id, &coerced)?);
        }

        let locking = ctx.optimistic_locking && model.entity(concrete).optimistic_locking;
        let version = ctx.resolver().version_column(concrete)?.map(|column| VersionCheck {
            table: column.table,
            column: column.column,
            expected: if locking { payload.version() } else { None },
        });
        let checks_version = version.as_ref().is_some_and(|v| v.expected.is_some());
        if !columns.is_empty() || (is_root && checks_version) {
            debug!(
                entity = %ctx.entity_name(concrete),
                id = %id,
                columns = columns.len(),
                "update emitted"
            );
            batch.push(Statement::Update(UpdateRow {
                entity: concrete,
                id: id.clone(),
                columns,
                version,
            }));
        }

        let node_key = (entity, id.clone());

        for reference_id in model.all_references(concrete) {
            let reference = model.reference(reference_id);
            if reference.derived || !payload.contains_key(&reference.name) {
                continue;
            }
            let nested = payload.nested(&reference.name);
            if reference.upper().is_some_and(|u| nested.len() > u as usize) || nested.len() < reference.lower() as usize {
                return Err(ctx.cardinality_error(reference_id, nested.len()).into());
            }

            if !reference.containment {
                let targets = ctx.stub_ids(concrete, reference_id, &nested)?;
                ReferenceProcessor::new(ctx).set(batch, reference_id, id, &targets)?;
                continue;
            }

            let stored_children: Vec<Id> = graph
                .node(&node_key)
                .map(|node| node.contained(reference_id).iter().map(|k| k.1.clone()).collect())
                .unwrap_or_default();
            let kept: Vec<Id> = nested.iter().filter_map(|child| child.id()).collect();
            let removed: Vec<Id> = stored_children.iter().filter(|c| !kept.contains(c)).cloned().collect();
            if !removed.is_empty() {
                DeleteProcessor::new(ctx)
                    .replacing(reference_id, id.clone())
                    .delete(batch, reference.target, &removed)?;
            }

            for child in &nested {
                match child.id() {
                    Some(child_id) if stored_children.contains(&child_id) => {
                        self.update_node(batch, graph, reference.target, &child_id, child, false)?;
                    }
                    Some(child_id) => {
                        return Err(ctx
                            .invalid(
                                concrete,
                                format!(
                                    "{} {child_id} is not contained in '{}'",
                                    ctx.entity_name(reference.target),
                                    model.qualified_name(reference_id)
                                ),
                            )
                            .into());
                    }
                    None => {
                        let container = ContainerRef {
                            containment: reference_id,
                            container: IdRef::Existing(id.clone()),
                            container_entity: concrete,
                        };
                        let child_ref = InsertProcessor::new(ctx).insert(batch, reference.target, child, Some(container))?;
                        // A container-side column must be pointed at the new child.
                        if let StorageRule::ForeignKey { .. } = ctx.classify(reference_id)? {
                            let link = ctx.link(reference_id, IdRef::Existing(id.clone()), Some(child_ref))?;
                            batch.push(Statement::SetReference(link));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

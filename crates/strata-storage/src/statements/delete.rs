//! Delete processor.
//!
//! Children held through an inverse foreign key live in the deleted row's
//! ownership and are deleted with it. Children held through a container-side
//! column or a junction table are detached and survive. Links from surviving
//! instances are removed first, unless that would break the survivor's lower
//! bound.

use rustc_hash::FxHashSet;
use strata_core::errors::PersistenceResult;
use strata_core::graph::{InstanceGraph, NodeKey};
use strata_core::model::{EntityTypeId, ReferenceId};
use strata_core::payload::Id;
use tracing::info;

use super::{DeleteRows, IdRef, Statement, StatementBatch, StatementContext};
use crate::rules::StorageRule;

pub struct DeleteProcessor<'c, 'a> {
    ctx: &'c StatementContext<'a>,
    /// Link whose lower bound is restored by the surrounding update.
    replacing: Option<(ReferenceId, Id)>,
}

impl<'c, 'a> DeleteProcessor<'c, 'a> {
    pub fn new(ctx: &'c StatementContext<'a>) -> Self {
        Self { ctx, replacing: None }
    }

    /// Skip the lower-bound check for `owner`'s `reference`; the caller refills it.
    pub fn replacing(mut self, reference: ReferenceId, owner: Id) -> Self {
        self.replacing = Some((reference, owner));
        self
    }

    /// Emit the statements deleting `ids` and their owned children.
    /// Returns how many of the requested instances exist.
    pub fn delete(&self, batch: &mut StatementBatch, entity: EntityTypeId, ids: &[Id]) -> PersistenceResult<usize> {
        let ctx = self.ctx;
        let graph = ctx.collector.collect_graph(ctx.conn, entity, ids)?;

        let mut doomed: Vec<NodeKey> = Vec::new();
        let mut detach: Vec<Statement> = Vec::new();
        for root in &graph.roots {
            self.collect_doomed(&graph, root, &mut doomed, &mut detach)?;
        }
        let doomed_ids: FxHashSet<(EntityTypeId, Id)> = doomed
            .iter()
            .map(|(e, id)| (self.root_of(*e), id.clone()))
            .collect();

        let mut seen: FxHashSet<(ReferenceId, Id, Id)> = FxHashSet::default();
        for (e, id) in &doomed {
            self.detach_links(*e, id, &doomed_ids, &mut seen, &mut detach)?;
        }

        for statement in detach {
            batch.push(statement);
        }
        for (e, id) in &doomed {
            batch.push(Statement::Delete(DeleteRows {
                entity: *e,
                ids: vec![id.clone()],
            }));
        }
        Ok(graph.roots.len())
    }

    fn root_of(&self, entity: EntityTypeId) -> EntityTypeId {
        self.ctx.model().lineage(entity).first().copied().unwrap_or(entity)
    }

    /// Post-order walk of the containment tree: children before their container.
    fn collect_doomed(
        &self,
        graph: &InstanceGraph,
        key: &NodeKey,
        doomed: &mut Vec<NodeKey>,
        detach: &mut Vec<Statement>,
    ) -> PersistenceResult<()> {
        if doomed.contains(key) {
            return Ok(());
        }
        let Some(node) = graph.node(key) else {
            return Ok(());
        };
        for (reference, children) in &node.containments {
            match self.ctx.classify(*reference)? {
                StorageRule::InverseForeignKey { .. } => {
                    for child in children {
                        self.collect_doomed(graph, child, doomed, detach)?;
                    }
                }
                StorageRule::JoinTable { .. } => {
                    for child in children {
                        let link = self.ctx.link(
                            *reference,
                            IdRef::Existing(key.1.clone()),
                            Some(IdRef::Existing(child.1.clone())),
                        )?;
                        detach.push(Statement::RemoveReference(link));
                    }
                }
                // The column disappears with the container row.
                StorageRule::ForeignKey { .. } => {}
            }
        }
        doomed.push(key.clone());
        Ok(())
    }

    /// One reference of each bidirectional pair is enough; prefer the containment.
    fn is_canonical(&self, reference: ReferenceId) -> bool {
        let model = self.ctx.model();
        let r = model.reference(reference);
        match r.opposite {
            None => true,
            Some(o) => {
                let opposite = model.reference(o);
                if r.containment != opposite.containment {
                    r.containment
                } else {
                    reference < o
                }
            }
        }
    }

    fn detach_links(
        &self,
        entity: EntityTypeId,
        id: &Id,
        doomed: &FxHashSet<(EntityTypeId, Id)>,
        seen: &mut FxHashSet<(ReferenceId, Id, Id)>,
        detach: &mut Vec<Statement>,
    ) -> PersistenceResult<()> {
        let ctx = self.ctx;
        let model = ctx.model();
        let references: Vec<ReferenceId> = model
            .references()
            .filter(|r| !r.derived)
            .map(|r| r.id)
            .filter(|r| self.is_canonical(*r))
            .collect();

        for reference_id in references {
            let reference = model.reference(reference_id);
            let rule = ctx.classify(reference_id)?;

            // The doomed instance owns the link; targets survive.
            if model.is_subtype_of(entity, reference.owner) && !reference.containment {
                let targets = ctx.collector.current_targets(ctx.conn, reference_id, id)?;
                for target in targets {
                    if doomed.contains(&(self.root_of(reference.target), target.clone())) {
                        continue;
                    }
                    if let Some(opposite) = reference.opposite {
                        self.check_survivor(opposite, &target, doomed, reference.owner)?;
                    }
                    if matches!(rule, StorageRule::ForeignKey { .. }) {
                        continue;
                    }
                    if seen.insert((reference_id, id.clone(), target.clone())) {
                        let link = ctx.link(reference_id, IdRef::Existing(id.clone()), Some(IdRef::Existing(target)))?;
                        detach.push(Statement::RemoveReference(link));
                    }
                }
            }

            // The doomed instance is the target; owners survive.
            if model.is_subtype_of(entity, reference.target) {
                let owners = ctx.collector.current_owners(ctx.conn, reference_id, id)?;
                for owner in owners {
                    if doomed.contains(&(self.root_of(reference.owner), owner.clone())) {
                        continue;
                    }
                    self.check_survivor(reference_id, &owner, doomed, reference.target)?;
                    if matches!(rule, StorageRule::InverseForeignKey { .. }) {
                        continue;
                    }
                    if seen.insert((reference_id, owner.clone(), id.clone())) {
                        info!(
                            reference = %model.qualified_name(reference_id),
                            owner = %owner,
                            target = %id,
                            "detaching link to deleted instance"
                        );
                        let link = ctx.link(reference_id, IdRef::Existing(owner), Some(IdRef::Existing(id.clone())))?;
                        detach.push(Statement::RemoveReference(link));
                    }
                }
            }
        }
        Ok(())
    }

    /// Fail when `owner` would drop below the lower bound of `reference`.
    fn check_survivor(
        &self,
        reference: ReferenceId,
        owner: &Id,
        doomed: &FxHashSet<(EntityTypeId, Id)>,
        target_type: EntityTypeId,
    ) -> PersistenceResult<()> {
        let ctx = self.ctx;
        let lower = ctx.model().reference(reference).lower() as usize;
        if lower == 0 {
            return Ok(());
        }
        if self
            .replacing
            .as_ref()
            .is_some_and(|(r, o)| *r == reference && o == owner)
        {
            return Ok(());
        }
        let target_root = self.root_of(target_type);
        let remaining = ctx
            .collector
            .current_targets(ctx.conn, reference, owner)?
            .into_iter()
            .filter(|t| !doomed.contains(&(target_root, t.clone())))
            .count();
        if remaining < lower {
            return Err(ctx.cardinality_error(reference, remaining).into());
        }
        Ok(())
    }
}

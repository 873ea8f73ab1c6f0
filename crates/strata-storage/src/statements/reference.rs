//! Reference mutation: set, add and remove links of one owner.
//!
//! The stored target set is read first and only the difference is emitted.
//! Bounds are checked against the resulting set before anything is emitted.

use strata_core::errors::{PersistenceResult, StatementError};
use strata_core::model::ReferenceId;
use strata_core::payload::Id;
use tracing::debug;

use super::{IdRef, Statement, StatementBatch, StatementContext};
use crate::rules::StorageRule;

/// Targets to add (`requested \ current`) and to remove (`current \ requested`),
/// each in first-seen order without duplicates.
pub fn minimal_delta(current: &[Id], requested: &[Id]) -> (Vec<Id>, Vec<Id>) {
    let mut adds: Vec<Id> = Vec::new();
    for id in requested {
        if !current.contains(id) && !adds.contains(id) {
            adds.push(id.clone());
        }
    }
    let mut removes: Vec<Id> = Vec::new();
    for id in current {
        if !requested.contains(id) && !removes.contains(id) {
            removes.push(id.clone());
        }
    }
    (adds, removes)
}

pub struct ReferenceProcessor<'c, 'a> {
    ctx: &'c StatementContext<'a>,
}

impl<'c, 'a> ReferenceProcessor<'c, 'a> {
    pub fn new(ctx: &'c StatementContext<'a>) -> Self {
        Self { ctx }
    }

    /// Make `targets` the complete target set of `owner`'s `reference`.
    pub fn set(&self, batch: &mut StatementBatch, reference: ReferenceId, owner: &Id, targets: &[Id]) -> PersistenceResult<usize> {
        let current = self.prepare(reference, owner, targets)?;
        let requested = dedup(targets);
        self.check_bounds(reference, requested.len())?;
        let (adds, removes) = minimal_delta(&current, &requested);
        self.check_counterparts(reference, Some(owner), &adds, &removes)?;
        self.emit(batch, reference, owner, &adds, &removes)
    }

    /// Add `targets` to the stored set; targets already present are ignored.
    pub fn add(&self, batch: &mut StatementBatch, reference: ReferenceId, owner: &Id, targets: &[Id]) -> PersistenceResult<usize> {
        let current = self.prepare(reference, owner, targets)?;
        let mut resulting = current.clone();
        for id in dedup(targets) {
            if !resulting.contains(&id) {
                resulting.push(id);
            }
        }
        self.check_bounds(reference, resulting.len())?;
        let (adds, _) = minimal_delta(&current, &resulting);
        self.check_counterparts(reference, Some(owner), &adds, &[])?;
        self.emit(batch, reference, owner, &adds, &[])
    }

    /// Remove `targets` from the stored set; targets not present are ignored.
    pub fn remove(&self, batch: &mut StatementBatch, reference: ReferenceId, owner: &Id, targets: &[Id]) -> PersistenceResult<usize> {
        let current = self.prepare(reference, owner, &[])?;
        let resulting: Vec<Id> = current.iter().filter(|id| !targets.contains(id)).cloned().collect();
        self.check_bounds(reference, resulting.len())?;
        let (_, removes) = minimal_delta(&current, &resulting);
        self.check_counterparts(reference, Some(owner), &[], &removes)?;
        self.emit(batch, reference, owner, &[], &removes)
    }

    /// Validate the reference, owner and targets; return the stored targets.
    fn prepare(&self, reference: ReferenceId, owner: &Id, targets: &[Id]) -> PersistenceResult<Vec<Id>> {
        let ctx = self.ctx;
        let model = ctx.model();
        let r = model.reference(reference);
        if r.containment {
            return Err(StatementError::ReferenceNotMutable {
                reference: model.qualified_name(reference),
                reason: "containments are maintained through their container".to_string(),
            }
            .into());
        }
        if r.derived {
            return Err(StatementError::ReferenceNotMutable {
                reference: model.qualified_name(reference),
                reason: "derived references are computed".to_string(),
            }
            .into());
        }
        ctx.require_existing(r.owner, std::slice::from_ref(owner))?;
        ctx.require_existing(r.target, &dedup(targets))?;
        ctx.collector.current_targets(ctx.conn, reference, owner)
    }

    fn check_bounds(&self, reference: ReferenceId, resulting: usize) -> PersistenceResult<()> {
        let r = self.ctx.model().reference(reference);
        if !r.multiplicity.admits(resulting) {
            return Err(self.ctx.cardinality_error(reference, resulting).into());
        }
        Ok(())
    }

    /// Check the bounds of the other instances a delta changes.
    ///
    /// A target of an inverse foreign key carries a single owner column, so
    /// linking it moves it away from its previous owner, which must keep its
    /// lower bound. A removed target loses `owner` from its opposite set.
    /// `owner` is None for an instance not yet inserted.
    pub(crate) fn check_counterparts(
        &self,
        reference: ReferenceId,
        owner: Option<&Id>,
        adds: &[Id],
        removes: &[Id],
    ) -> PersistenceResult<()> {
        let ctx = self.ctx;
        let model = ctx.model();
        let r = model.reference(reference);

        let lower = r.lower() as usize;
        if lower > 0 && !adds.is_empty() && matches!(ctx.classify(reference)?, StorageRule::InverseForeignKey { .. }) {
            let mut moved: Vec<(Id, usize)> = Vec::new();
            for target in adds {
                for previous in ctx.collector.current_owners(ctx.conn, reference, target)? {
                    if owner == Some(&previous) {
                        continue;
                    }
                    match moved.iter_mut().find(|(o, _)| *o == previous) {
                        Some((_, count)) => *count += 1,
                        None => moved.push((previous, 1)),
                    }
                }
            }
            for (previous, count) in moved {
                let remaining = ctx
                    .collector
                    .current_targets(ctx.conn, reference, &previous)?
                    .len()
                    .saturating_sub(count);
                if remaining < lower {
                    return Err(ctx.cardinality_error(reference, remaining).into());
                }
                debug!(
                    reference = %model.qualified_name(reference),
                    previous = %previous,
                    count,
                    "targets move to a new owner"
                );
            }
        }

        if let (Some(opposite), Some(owner)) = (r.opposite, owner) {
            let opposite_lower = model.reference(opposite).lower() as usize;
            if opposite_lower > 0 {
                for target in removes {
                    let remaining = ctx
                        .collector
                        .current_targets(ctx.conn, opposite, target)?
                        .iter()
                        .filter(|o| *o != owner)
                        .count();
                    if remaining < opposite_lower {
                        return Err(ctx.cardinality_error(opposite, remaining).into());
                    }
                }
            }
        }
        Ok(())
    }

    fn emit(
        &self,
        batch: &mut StatementBatch,
        reference: ReferenceId,
        owner: &Id,
        adds: &[Id],
        removes: &[Id],
    ) -> PersistenceResult<usize> {
        let ctx = self.ctx;
        let rule = ctx.classify(reference)?;
        let owner_ref = IdRef::Existing(owner.clone());
        let mut emitted = 0;

        if let StorageRule::ForeignKey { .. } = rule {
            // Single column on the owner row: one overwrite covers add and remove.
            if !adds.is_empty() || !removes.is_empty() {
                let target = adds.first().cloned().map(IdRef::Existing);
                batch.push(Statement::SetReference(ctx.link(reference, owner_ref, target)?));
                emitted = 1;
            }
        } else {
            for target in removes {
                let link = ctx.link(reference, owner_ref.clone(), Some(IdRef::Existing(target.clone())))?;
                batch.push(Statement::RemoveReference(link));
                emitted += 1;
            }
            for target in adds {
                let link = ctx.link(reference, owner_ref.clone(), Some(IdRef::Existing(target.clone())))?;
                batch.push(Statement::AddReference(link));
                emitted += 1;
            }
        }
        debug!(
            reference = %ctx.model().qualified_name(reference),
            owner = %owner,
            adds = adds.len(),
            removes = removes.len(),
            "reference delta"
        );
        Ok(emitted)
    }
}

fn dedup(ids: &[Id]) -> Vec<Id> {
    let mut out: Vec<Id> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}

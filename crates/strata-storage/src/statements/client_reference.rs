//! Client-reference correlation for results of inserts and updates.

use rustc_hash::FxHashMap;
use strata_core::constants::keys;
use strata_core::model::{EntityTypeId, Model};
use strata_core::payload::{Id, Payload, Value};

/// Correlation tokens and created markers keyed by instance.
///
/// Instances are keyed by the root type of their lineage, which is where the
/// identifier space lives.
#[derive(Debug, Clone, Default)]
pub struct ClientReferences {
    entries: FxHashMap<(EntityTypeId, Id), Entry>,
}

#[derive(Debug, Clone, Default)]
struct Entry {
    created: bool,
    token: Option<String>,
}

impl ClientReferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an instance inserted by the current call.
    pub fn created(&mut self, model: &Model, entity: EntityTypeId, id: &Id, token: Option<String>) {
        let entry = self.entries.entry((root_of(model, entity), id.clone())).or_default();
        entry.created = true;
        if token.is_some() {
            entry.token = token;
        }
    }

    /// Record a token carried by a pre-existing instance.
    pub fn existing(&mut self, model: &Model, entity: EntityTypeId, id: &Id, token: String) {
        let entry = self.entries.entry((root_of(model, entity), id.clone())).or_default();
        entry.token = Some(token);
    }

    /// Collect tokens of every identified node of a submitted payload tree.
    pub fn collect_existing(&mut self, model: &Model, entity: EntityTypeId, payload: &Payload) {
        if let (Some(id), Some(token)) = (payload.id(), payload.client_reference_id()) {
            let concrete = payload
                .type_name()
                .and_then(|name| model.entity_by_name(name).ok())
                .map_or(entity, |e| e.id);
            self.existing(model, concrete, &id, token.to_string());
        }
        for reference_id in model.all_references(entity) {
            let reference = model.reference(reference_id);
            if !reference.containment {
                continue;
            }
            for child in payload.nested(&reference.name) {
                self.collect_existing(model, reference.target, child);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-attach tokens and `__created` markers throughout a result tree.
    pub fn apply(&self, model: &Model, result: &mut Payload) {
        if self.entries.is_empty() {
            return;
        }
        result.walk_mut(&mut |node| {
            let Some(id) = node.id() else {
                return;
            };
            let Some(entity) = node.type_name().and_then(|name| model.entity_by_name(name).ok()) else {
                return;
            };
            let Some(entry) = self.entries.get(&(root_of(model, entity.id), id)) else {
                return;
            };
            if entry.created {
                node.insert(keys::CREATED, Value::Bool(true));
            }
            if let Some(token) = &entry.token {
                node.insert(keys::CLIENT_REFERENCE_ID, Value::Text(token.clone()));
            }
        });
    }
}

fn root_of(model: &Model, entity: EntityTypeId) -> EntityTypeId {
    model.lineage(entity).first().copied().unwrap_or(entity)
}

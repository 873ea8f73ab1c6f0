//! Turn a collected instance graph plus attribute rows into payload trees.

use rusqlite::Connection;
use rustc_hash::FxHashMap;
use strata_core::constants::keys;
use strata_core::errors::PersistenceResult;
use strata_core::graph::{InstanceGraph, NodeKey};
use strata_core::model::{EntityTypeId, Model};
use strata_core::payload::{Id, Payload, Value};
use strata_core::query::AttributeMask;

use super::QueryFactory;

/// Builds nested payloads: containments in full, plain references as id stubs.
pub struct PayloadAssembler<'a> {
    factory: &'a QueryFactory,
    mask: Option<&'a AttributeMask>,
    root_rows: FxHashMap<NodeKey, Payload>,
    rows: FxHashMap<NodeKey, Payload>,
}

impl<'a> PayloadAssembler<'a> {
    pub fn new(factory: &'a QueryFactory, mask: Option<&'a AttributeMask>) -> Self {
        Self {
            factory,
            mask,
            root_rows: FxHashMap::default(),
            rows: FxHashMap::default(),
        }
    }

    /// Load attributes for every node reachable from the roots over containment.
    ///
    /// The mask names attributes of the requested type, so it applies to roots only;
    /// nested instances load in full.
    pub fn load(&mut self, conn: &Connection, graph: &InstanceGraph) -> PersistenceResult<()> {
        let mut roots: FxHashMap<EntityTypeId, Vec<Id>> = FxHashMap::default();
        for key in &graph.roots {
            roots.entry(key.0).or_default().push(key.1.clone());
        }

        let mut nested: FxHashMap<EntityTypeId, Vec<Id>> = FxHashMap::default();
        if self.includes_containments() {
            let mut stack: Vec<NodeKey> = graph.roots.clone();
            let mut seen: Vec<NodeKey> = Vec::new();
            while let Some(key) = stack.pop() {
                let Some(node) = graph.node(&key) else {
                    continue;
                };
                for child in node.containments.values().flatten() {
                    if !seen.contains(child) {
                        seen.push(child.clone());
                        nested.entry(child.0).or_default().push(child.1.clone());
                        stack.push(child.clone());
                    }
                }
            }
        }

        for (entity, ids) in sorted(nested) {
            for (id, payload) in self.factory.load_attributes(conn, entity, &ids, None)? {
                self.rows.insert((entity, id), payload);
            }
        }
        for (entity, ids) in sorted(roots) {
            for (id, payload) in self.factory.load_attributes(conn, entity, &ids, self.mask)? {
                self.root_rows.insert((entity, id), payload);
            }
        }
        Ok(())
    }

    fn includes_containments(&self) -> bool {
        self.mask.map_or(true, |m| m.include_containments)
    }

    /// Payload of the root `key`, or `None` when it was not found.
    pub fn root_payload(&self, model: &Model, graph: &InstanceGraph, key: &NodeKey) -> Option<Payload> {
        let row = self.root_rows.get(key)?.clone();
        self.build(model, graph, key, row)
    }

    fn nested_payload(&self, model: &Model, graph: &InstanceGraph, key: &NodeKey) -> Option<Payload> {
        let row = self.rows.get(key)?.clone();
        self.build(model, graph, key, row)
    }

    fn build(&self, model: &Model, graph: &InstanceGraph, key: &NodeKey, mut payload: Payload) -> Option<Payload> {
        let node = graph.node(key)?;
        let include_containments = self.includes_containments();

        for reference_id in model.all_references(key.0) {
            let reference = model.reference(reference_id);
            if reference.derived {
                continue;
            }
            if reference.containment {
                if !include_containments {
                    continue;
                }
                let children: Vec<Payload> = node
                    .contained(reference_id)
                    .iter()
                    .filter_map(|child| self.nested_payload(model, graph, child))
                    .collect();
                payload.insert(&reference.name, shape(reference.is_to_one(), children));
            } else {
                let targets: Vec<Payload> = node
                    .references
                    .get(&reference_id)
                    .map(|found| found.iter().map(|k| reference_stub(model, k)).collect())
                    .unwrap_or_default();
                payload.insert(&reference.name, shape(reference.is_to_one(), targets));
            }
        }
        Some(payload)
    }
}

fn sorted(groups: FxHashMap<EntityTypeId, Vec<Id>>) -> Vec<(EntityTypeId, Vec<Id>)> {
    let mut groups: Vec<_> = groups.into_iter().collect();
    groups.sort_by_key(|(entity, _)| *entity);
    groups
}

fn shape(to_one: bool, mut items: Vec<Payload>) -> Value {
    if to_one {
        match items.pop() {
            Some(item) => Value::Payload(Box::new(item)),
            None => Value::Null,
        }
    } else {
        Value::List(items)
    }
}

fn reference_stub(model: &Model, key: &NodeKey) -> Payload {
    let mut stub = Payload::stub(&key.1);
    stub.insert(keys::TYPE, Value::Text(model.entity(key.0).name.clone()));
    stub
}

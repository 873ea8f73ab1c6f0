//! Instance graphs returned by graph collection.
//!
//! A graph is built fresh per call and owned by the caller. Node keys are unique
//! within one result; cycles in the data are represented by repeated keys in edge lists.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::model::{EntityTypeId, ReferenceId};
use crate::payload::Id;

/// Identity of a node: the entity type it was reached as, and its identifier.
pub type NodeKey = (EntityTypeId, Id);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Containment,
    Reference,
    BackReference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceNode {
    pub entity: EntityTypeId,
    pub id: Id,
    pub containments: BTreeMap<ReferenceId, Vec<NodeKey>>,
    pub references: BTreeMap<ReferenceId, Vec<NodeKey>>,
    /// Keyed by the inbound reference, pointing at its owners.
    pub back_references: BTreeMap<ReferenceId, Vec<NodeKey>>,
}

impl InstanceNode {
    pub fn new(entity: EntityTypeId, id: Id) -> Self {
        Self {
            entity,
            id,
            containments: BTreeMap::new(),
            references: BTreeMap::new(),
            back_references: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> NodeKey {
        (self.entity, self.id.clone())
    }

    pub fn edges(&self, kind: EdgeKind) -> &BTreeMap<ReferenceId, Vec<NodeKey>> {
        match kind {
            EdgeKind::Containment => &self.containments,
            EdgeKind::Reference => &self.references,
            EdgeKind::BackReference => &self.back_references,
        }
    }

    /// Record an edge once; repeated links are ignored.
    pub fn link(&mut self, kind: EdgeKind, reference: ReferenceId, target: NodeKey) {
        let edges = match kind {
            EdgeKind::Containment => &mut self.containments,
            EdgeKind::Reference => &mut self.references,
            EdgeKind::BackReference => &mut self.back_references,
        };
        let targets = edges.entry(reference).or_default();
        if !targets.contains(&target) {
            targets.push(target);
        }
    }

    pub fn contained(&self, reference: ReferenceId) -> &[NodeKey] {
        self.containments.get(&reference).map_or(&[], Vec::as_slice)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceGraph {
    /// Requested ids that exist, in request order.
    pub roots: Vec<NodeKey>,
    pub nodes: IndexMap<NodeKey, InstanceNode>,
}

impl InstanceGraph {
    pub fn node(&self, key: &NodeKey) -> Option<&InstanceNode> {
        self.nodes.get(key)
    }

    pub fn node_mut_or_insert(&mut self, entity: EntityTypeId, id: &Id) -> &mut InstanceNode {
        self.nodes
            .entry((entity, id.clone()))
            .or_insert_with(|| InstanceNode::new(entity, id.clone()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Longest containment chain below `key`, counting `key` itself as depth 1.
    pub fn containment_depth(&self, key: &NodeKey) -> usize {
        let mut visited = Vec::new();
        self.depth_from(key, &mut visited)
    }

    fn depth_from(&self, key: &NodeKey, visited: &mut Vec<NodeKey>) -> usize {
        if visited.contains(key) {
            return 0;
        }
        let Some(node) = self.nodes.get(key) else {
            return 0;
        };
        visited.push(key.clone());
        let below = node
            .containments
            .values()
            .flatten()
            .map(|child| self.depth_from(child, visited))
            .max()
            .unwrap_or(0);
        visited.pop();
        1 + below
    }

    /// Number of nodes reachable from `key` over containment edges, excluding `key`.
    pub fn contained_count(&self, key: &NodeKey) -> usize {
        let mut seen = Vec::new();
        let mut stack = vec![key.clone()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                for child in node.containments.values().flatten() {
                    if !seen.contains(child) {
                        seen.push(child.clone());
                        stack.push(child.clone());
                    }
                }
            }
        }
        seen.iter().filter(|k| *k != key).count()
    }
}

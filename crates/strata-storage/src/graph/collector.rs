//! Instance graph collection: run a memoized select plan and reassemble the rows.
//!
//! The root unit is filtered by the requested ids. Every sub-select then runs with
//! only the ids its parent node discovered in the previous step, so each query is
//! bounded by the actual fan-out. Ids already expanded at a plan node are never
//! expanded again, which keeps recursive sub-selects finite on cyclic data.

use std::collections::VecDeque;
use std::sync::Arc;

use moka::sync::Cache;
use rusqlite::Connection;
use rustc_hash::{FxHashMap, FxHashSet};
use strata_core::errors::{GraphError, PersistenceResult, SchemaError};
use strata_core::graph::{EdgeKind, InstanceGraph, NodeKey};
use strata_core::model::{EntityTypeId, ReferenceId};
use strata_core::payload::Id;
use tracing::debug;

use super::links::{linked_pairs, read_id};
use super::plan::{PlanBuilder, PlanEdge, PlanId, SelectPlan, UnitSql};
use crate::parameters::source::chunked;
use crate::parameters::{ParameterMapper, ParameterSource};
use crate::rules::{EdgeLink, ReferenceRuleClassifier};
use crate::schema::SchemaResolver;
use crate::to_storage_err;

/// Ids newly discovered per plan node during one unit.
type Discovered = FxHashMap<PlanId, Vec<Id>>;

pub struct InstanceGraphCollector {
    classifier: Arc<ReferenceRuleClassifier>,
    mapper: Arc<ParameterMapper>,
    max_in_list: usize,
    plans: Cache<EntityTypeId, Arc<SelectPlan>>,
}

impl InstanceGraphCollector {
    pub fn new(
        classifier: Arc<ReferenceRuleClassifier>,
        mapper: Arc<ParameterMapper>,
        plan_cache_capacity: u64,
        max_in_list: usize,
    ) -> Self {
        Self {
            classifier,
            mapper,
            max_in_list: max_in_list.max(1),
            plans: Cache::builder().max_capacity(plan_cache_capacity).build(),
        }
    }

    pub fn resolver(&self) -> &Arc<SchemaResolver> {
        self.classifier.resolver()
    }

    pub fn classifier(&self) -> &Arc<ReferenceRuleClassifier> {
        &self.classifier
    }

    /// The select plan of `entity`, built on first use.
    ///
    /// Concurrent first calls for the same type build the plan once; the others wait.
    pub fn plan(&self, entity: EntityTypeId) -> Result<Arc<SelectPlan>, SchemaError> {
        self.plans
            .try_get_with(entity, || {
                let plan = PlanBuilder::new(&self.classifier).build(entity)?;
                debug!(
                    entity = %self.resolver().model().entity(entity).name,
                    nodes = plan.nodes.len(),
                    "built select plan"
                );
                Ok::<_, SchemaError>(Arc::new(plan))
            })
            .map_err(|e| (*e).clone())
    }

    /// Collect the instance graph below `ids`. Missing ids are left out of `roots`.
    pub fn collect_graph(
        &self,
        conn: &Connection,
        entity: EntityTypeId,
        ids: &[Id],
    ) -> PersistenceResult<InstanceGraph> {
        let plan = self.plan(entity)?;
        let mut graph = InstanceGraph::default();
        let mut expanded: FxHashSet<(PlanId, Id)> = FxHashSet::default();

        let mut requested: Vec<Id> = Vec::with_capacity(ids.len());
        for id in ids {
            if !requested.contains(id) {
                requested.push(id.clone());
            }
        }
        if requested.is_empty() {
            return Ok(graph);
        }

        let mut discovered = Discovered::default();
        for chunk in chunked(&requested, self.max_in_list) {
            self.run_unit(
                conn,
                &plan,
                &plan.root_sql,
                None,
                entity,
                chunk,
                &mut graph,
                &mut expanded,
                &mut discovered,
            )?;
        }

        for id in &requested {
            let key = (entity, id.clone());
            if graph.nodes.contains_key(&key) {
                graph.roots.push(key);
            }
        }

        let mut frontier: VecDeque<(PlanId, Vec<Id>)> = discovered.into_iter().collect();
        frontier.make_contiguous().sort_by_key(|(node, _)| *node);

        while let Some((parent, parent_ids)) = frontier.pop_front() {
            let parent_entity = plan.node(parent).entity;
            for sub in &plan.node(parent).sub_selects {
                let mut step = Discovered::default();
                for chunk in chunked(&parent_ids, self.max_in_list) {
                    self.run_unit(
                        conn,
                        &plan,
                        &sub.sql,
                        Some((parent, &sub.edge, chunk)),
                        parent_entity,
                        chunk,
                        &mut graph,
                        &mut expanded,
                        &mut step,
                    )?;
                }
                let mut step: Vec<(PlanId, Vec<Id>)> = step.into_iter().collect();
                step.sort_by_key(|(node, _)| *node);
                for (node, fresh) in step {
                    if !fresh.is_empty() && !plan.node(node).sub_selects.is_empty() {
                        frontier.push_back((node, fresh));
                    }
                }
            }
        }

        debug!(
            entity = %self.resolver().model().entity(entity).name,
            requested = requested.len(),
            roots = graph.roots.len(),
            nodes = graph.len(),
            "collected instance graph"
        );
        Ok(graph)
    }

    /// Current target ids of `reference` for one owner, in id order.
    pub fn current_targets(
        &self,
        conn: &Connection,
        reference: ReferenceId,
        owner: &Id,
    ) -> PersistenceResult<Vec<Id>> {
        let rule = self.classifier.classify(reference)?;
        let link = EdgeLink::forward(&rule);
        let owner_entity = self.resolver().model().reference(reference).owner;
        let pairs = linked_pairs(
            conn,
            self.resolver(),
            &self.mapper,
            self.max_in_list,
            &link,
            owner_entity,
            std::slice::from_ref(owner),
        )?;
        Ok(pairs.into_iter().map(|(_, target)| target).collect())
    }

    /// Owner ids currently pointing at `target` through `reference`.
    pub fn current_owners(
        &self,
        conn: &Connection,
        reference: ReferenceId,
        target: &Id,
    ) -> PersistenceResult<Vec<Id>> {
        let rule = self.classifier.classify(reference)?;
        let link = EdgeLink::backward(&rule);
        let target_entity = self.resolver().model().reference(reference).target;
        let pairs = linked_pairs(
            conn,
            self.resolver(),
            &self.mapper,
            self.max_in_list,
            &link,
            target_entity,
            std::slice::from_ref(target),
        )?;
        Ok(pairs.into_iter().map(|(_, owner)| owner).collect())
    }

    /// Execute one query unit for `ids` and fold its rows into `graph`.
    ///
    /// `correlation` is set for sub-selects: the parent plan node, the edge being
    /// followed and the exact id set the parent contributed.
    #[allow(clippy::too_many_arguments)]
    fn run_unit(
        &self,
        conn: &Connection,
        plan: &SelectPlan,
        unit: &UnitSql,
        correlation: Option<(PlanId, &PlanEdge, &[Id])>,
        id_entity: EntityTypeId,
        ids: &[Id],
        graph: &mut InstanceGraph,
        expanded: &mut FxHashSet<(PlanId, Id)>,
        discovered: &mut Discovered,
    ) -> PersistenceResult<()> {
        let id_type = self.resolver().identifier_type(id_entity)?;
        let mut source = ParameterSource::new();
        let params = ids
            .iter()
            .enumerate()
            .map(|(i, id)| self.mapper.create_id_parameter(id_type, id, &format!("id_{i}")))
            .collect();
        let placeholders = source.add_list(params);
        let sql = unit.sql(&placeholders);

        let mut stmt = conn.prepare_cached(&sql).map_err(to_storage_err)?;
        let mut rows = stmt
            .query(source.as_named().as_slice())
            .map_err(to_storage_err)?;

        while let Some(row) = rows.next().map_err(to_storage_err)? {
            let mut row_ids: FxHashMap<PlanId, Id> = FxHashMap::default();
            for node in &unit.nodes {
                let Some(column) = unit.column_of(*node) else {
                    continue;
                };
                if let Some(id) = read_id(row, column)? {
                    let entity = plan.node(*node).entity;
                    graph.node_mut_or_insert(entity, &id);
                    if expanded.insert((*node, id.clone())) {
                        discovered.entry(*node).or_default().push(id.clone());
                    }
                    row_ids.insert(*node, id);
                }
            }

            if let Some((parent, edge, frontier)) = correlation {
                let Some(parent_id) = read_id(row, 0)? else {
                    continue;
                };
                if !frontier.contains(&parent_id) {
                    return Err(GraphError::GraphCollection {
                        entity: self.resolver().model().entity(plan.node(parent).entity).name.clone(),
                        parent_id: parent_id.to_string(),
                        edge: self.resolver().model().qualified_name(edge.reference),
                    }
                    .into());
                }
                if let Some(child_id) = row_ids.get(&edge.child) {
                    let parent_key = (plan.node(parent).entity, parent_id);
                    let child_key = (plan.node(edge.child).entity, child_id.clone());
                    link(plan, graph, edge, parent_key, child_key);
                }
            }

            for (parent, edge) in &unit.edges {
                let (Some(parent_id), Some(child_id)) = (row_ids.get(parent), row_ids.get(&edge.child))
                else {
                    continue;
                };
                let parent_key = (plan.node(*parent).entity, parent_id.clone());
                let child_key = (plan.node(edge.child).entity, child_id.clone());
                link(plan, graph, edge, parent_key, child_key);
            }
        }
        Ok(())
    }
}

/// Record one discovered edge. Containment also records the implied container link.
fn link(plan: &SelectPlan, graph: &mut InstanceGraph, edge: &PlanEdge, parent: NodeKey, child: NodeKey) {
    graph
        .node_mut_or_insert(parent.0, &parent.1)
        .link(edge.kind, edge.reference, child.clone());
    if edge.kind == EdgeKind::Containment {
        let contained = graph.node_mut_or_insert(child.0, &child.1);
        contained.link(EdgeKind::BackReference, edge.reference, parent.clone());
        if let Some(opposite) = plan.node(edge.child).container.and_then(|c| c.opposite) {
            contained.link(EdgeKind::Reference, opposite, parent);
        }
    }
}

//! Select plans: per-entity-type trees of JOINs and SUB-SELECTs.
//!
//! A plan is built once per entity type and memoized by the collector. Nodes live
//! in an arena; a cycle-closing sub-select points back at the node first built
//! for the repeated reference instead of growing the tree.

use std::fmt::Write as _;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use strata_core::errors::SchemaError;
use strata_core::graph::EdgeKind;
use strata_core::model::{EntityTypeId, Model, ReferenceId};

use crate::rules::{EdgeLink, ReferenceRuleClassifier};
use crate::schema::TableInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlanId(pub usize);

/// One edge of the plan tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEdge {
    pub kind: EdgeKind,
    pub reference: ReferenceId,
    pub link: EdgeLink,
    pub child: PlanId,
}

/// The link from a contained node back to the container it was reached from.
/// Implied by the traversal itself, so no SQL is generated for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerLink {
    pub containment: ReferenceId,
    /// The contained side's own reference to its container, if declared.
    pub opposite: Option<ReferenceId>,
}

#[derive(Debug, Clone)]
pub struct SubSelect {
    pub edge: PlanEdge,
    /// True when `edge.child` is an earlier node reused to close a cycle.
    pub recursive: bool,
    pub sql: UnitSql,
}

#[derive(Debug, Clone)]
pub struct PlanNode {
    pub id: PlanId,
    pub entity: EntityTypeId,
    /// Mapped tables of the lineage, root first. The last one anchors the node.
    pub chain: Vec<TableInfo>,
    pub joins: Vec<PlanEdge>,
    pub sub_selects: Vec<SubSelect>,
    pub container: Option<ContainerLink>,
}

impl PlanNode {
    pub fn anchor(&self) -> &TableInfo {
        // Chains are checked non-empty when the node is allocated.
        &self.chain[self.chain.len() - 1]
    }

    fn chain_table(&self, table: &str) -> Option<&TableInfo> {
        self.chain.iter().find(|t| t.table == table)
    }
}

/// Precomputed statement for one query unit: a node plus everything JOINed beneath it.
#[derive(Debug, Clone, Default)]
pub struct UnitSql {
    /// `SELECT ... FROM ... JOIN ...`, without the id filter.
    pub select_from: String,
    /// Column filtered by `IN (...)`.
    pub filter_column: String,
    /// True when the first selected column is the correlating parent id.
    pub has_parent_column: bool,
    /// Plan nodes whose ids follow, in column order.
    pub nodes: Vec<PlanId>,
    /// JOIN edges inside the unit as `(parent, edge)`, in column order of the child.
    pub edges: Vec<(PlanId, PlanEdge)>,
}

impl UnitSql {
    /// Full statement for a placeholder group such as `(:id_0, :id_1)`.
    /// Rows come back ordered by parent id, then by the unit's own id.
    pub fn sql(&self, placeholders: &str) -> String {
        let order = if self.has_parent_column { "1, 2" } else { "1" };
        format!(
            "{} WHERE {} IN {} ORDER BY {order}",
            self.select_from, self.filter_column, placeholders
        )
    }

    /// Column offset of `node`'s id in a result row.
    pub fn column_of(&self, node: PlanId) -> Option<usize> {
        let offset = usize::from(self.has_parent_column);
        self.nodes.iter().position(|n| *n == node).map(|p| p + offset)
    }
}

#[derive(Debug, Clone)]
pub struct SelectPlan {
    pub root: PlanId,
    pub nodes: Vec<PlanNode>,
    pub root_sql: UnitSql,
}

impl SelectPlan {
    pub fn node(&self, id: PlanId) -> &PlanNode {
        &self.nodes[id.0]
    }

    /// Every JOIN edge as `(parent, edge)`.
    pub fn join_edges(&self) -> Vec<(PlanId, &PlanEdge)> {
        self.nodes
            .iter()
            .flat_map(|n| n.joins.iter().map(move |e| (n.id, e)))
            .collect()
    }

    /// Every SUB-SELECT as `(parent, sub-select)`.
    pub fn sub_selects(&self) -> Vec<(PlanId, &SubSelect)> {
        self.nodes
            .iter()
            .flat_map(|n| n.sub_selects.iter().map(move |s| (n.id, s)))
            .collect()
    }

    /// Human-readable plan tree.
    pub fn describe(&self, model: &Model) -> String {
        let mut out = String::new();
        let root = self.node(self.root);
        let _ = writeln!(out, "{} [{}]", model.entity(root.entity).name, root.anchor().table);
        self.describe_node(model, self.root, 1, &mut out);
        out
    }

    fn describe_node(&self, model: &Model, id: PlanId, depth: usize, out: &mut String) {
        let node = self.node(id);
        let indent = "  ".repeat(depth);
        if let Some(container) = node.container {
            let _ = writeln!(
                out,
                "{indent}CONTAINER {} (implied)",
                model.qualified_name(container.containment)
            );
        }
        for edge in &node.joins {
            let child = self.node(edge.child);
            let _ = writeln!(
                out,
                "{indent}JOIN {} -> {} ({:?})",
                model.qualified_name(edge.reference),
                model.entity(child.entity).name,
                edge.kind
            );
            self.describe_node(model, edge.child, depth + 1, out);
        }
        for sub in &node.sub_selects {
            let child = self.node(sub.edge.child);
            let _ = writeln!(
                out,
                "{indent}SUB-SELECT {} -> {} ({:?}{})",
                model.qualified_name(sub.edge.reference),
                model.entity(child.entity).name,
                sub.edge.kind,
                if sub.recursive { ", recursive" } else { "" }
            );
            if !sub.recursive {
                self.describe_node(model, sub.edge.child, depth + 1, out);
            }
        }
    }
}

enum Placement {
    Join,
    SubSelect { recursive: bool },
}

/// Builds select plans from the model and the reference storage rules.
pub struct PlanBuilder<'a> {
    classifier: &'a ReferenceRuleClassifier,
    nodes: Vec<PlanNode>,
    /// Containment → node first built for it, the target of cycle-closing sub-selects.
    first_built: FxHashMap<ReferenceId, PlanId>,
    pending_subs: Vec<(PlanId, PlanEdge, bool)>,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(classifier: &'a ReferenceRuleClassifier) -> Self {
        Self {
            classifier,
            nodes: Vec::new(),
            first_built: FxHashMap::default(),
            pending_subs: Vec::new(),
        }
    }

    pub fn build(mut self, entity: EntityTypeId) -> Result<SelectPlan, SchemaError> {
        let root = self.alloc(entity, None)?;
        let mut path = Vec::new();
        self.expand(root, &mut path, None)?;

        let mut plan = SelectPlan {
            root,
            nodes: self.nodes,
            root_sql: UnitSql::default(),
        };
        plan.root_sql = root_unit(&plan, root)?;
        for (parent, edge, recursive) in self.pending_subs {
            let sql = sub_select_unit(&plan, parent, &edge)?;
            plan.nodes[parent.0].sub_selects.push(SubSelect {
                edge,
                recursive,
                sql,
            });
        }
        Ok(plan)
    }

    fn model(&self) -> &Model {
        self.classifier.resolver().model()
    }

    fn alloc(
        &mut self,
        entity: EntityTypeId,
        container: Option<ContainerLink>,
    ) -> Result<PlanId, SchemaError> {
        let chain = self.classifier.resolver().table_chain(entity)?;
        if chain.is_empty() {
            return Err(SchemaError::SchemaMapping {
                element: self.model().entity(entity).name.clone(),
                count: 0,
            });
        }
        let id = PlanId(self.nodes.len());
        self.nodes.push(PlanNode {
            id,
            entity,
            chain: chain.as_ref().clone(),
            joins: Vec::new(),
            sub_selects: Vec::new(),
            container,
        });
        Ok(id)
    }

    /// Add the edges of `node`. `path` lists the containments traversed from the root.
    fn expand(
        &mut self,
        node: PlanId,
        path: &mut Vec<ReferenceId>,
        incoming: Option<ReferenceId>,
    ) -> Result<(), SchemaError> {
        let entity = self.nodes[node.0].entity;
        let model = Arc::clone(self.classifier.resolver().model());

        for reference_id in model.all_references(entity) {
            let reference = model.reference(reference_id);
            if reference.derived {
                continue;
            }
            if incoming.is_some() && reference.opposite == incoming {
                self.nodes[node.0].container = incoming.map(|containment| ContainerLink {
                    containment,
                    opposite: Some(reference_id),
                });
                continue;
            }

            let rule = self.classifier.classify(reference_id)?;
            let link = EdgeLink::forward(&rule);
            let cyclic = path.contains(&reference_id);

            if reference.containment && cyclic {
                let child = self.first_built.get(&reference_id).copied().ok_or_else(|| {
                    SchemaError::invalid_model(format!(
                        "containment '{}' repeats without a first node",
                        model.qualified_name(reference_id)
                    ))
                })?;
                let placement = Placement::SubSelect { recursive: true };
                self.place(node, EdgeKind::Containment, reference_id, link, child, placement);
                continue;
            }

            let placement = if link.is_junction() || cyclic || !reference.is_to_one() {
                Placement::SubSelect { recursive: false }
            } else {
                Placement::Join
            };

            if reference.containment {
                let container = ContainerLink {
                    containment: reference_id,
                    opposite: None,
                };
                let child = self.alloc(reference.target, Some(container))?;
                self.first_built.entry(reference_id).or_insert(child);
                self.place(node, EdgeKind::Containment, reference_id, link, child, placement);
                path.push(reference_id);
                let result = self.expand(child, path, Some(reference_id));
                path.pop();
                result?;
            } else {
                let child = self.alloc(reference.target, None)?;
                self.place(node, EdgeKind::Reference, reference_id, link, child, placement);
            }
        }

        for reference_id in model.references_targeting(entity) {
            let reference = model.reference(reference_id);
            if reference.derived || reference.opposite.is_some() {
                continue;
            }
            if incoming == Some(reference_id) {
                continue;
            }
            let rule = self.classifier.classify(reference_id)?;
            let link = EdgeLink::backward(&rule);
            let cyclic = path.contains(&reference_id);
            // A contained instance has at most one container through a given containment.
            let to_one = reference.containment;
            let placement = if link.is_junction() || cyclic || !to_one {
                Placement::SubSelect { recursive: false }
            } else {
                Placement::Join
            };
            let child = self.alloc(reference.owner, None)?;
            self.place(node, EdgeKind::BackReference, reference_id, link, child, placement);
        }
        Ok(())
    }

    fn place(
        &mut self,
        parent: PlanId,
        kind: EdgeKind,
        reference: ReferenceId,
        link: EdgeLink,
        child: PlanId,
        placement: Placement,
    ) {
        let edge = PlanEdge {
            kind,
            reference,
            link,
            child,
        };
        match placement {
            Placement::Join => self.nodes[parent.0].joins.push(edge),
            Placement::SubSelect { recursive } => self.pending_subs.push((parent, edge, recursive)),
        }
    }
}

/// Accumulates one SQL statement over a query unit.
struct UnitWriter<'p> {
    plan: &'p SelectPlan,
    next_alias: usize,
    select: Vec<String>,
    from: String,
    aliases: FxHashMap<(PlanId, String), String>,
    nodes: Vec<PlanId>,
    edges: Vec<(PlanId, PlanEdge)>,
}

impl<'p> UnitWriter<'p> {
    fn new(plan: &'p SelectPlan) -> Self {
        Self {
            plan,
            next_alias: 0,
            select: Vec::new(),
            from: String::new(),
            aliases: FxHashMap::default(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    fn alias(&mut self) -> String {
        let a = format!("t{}", self.next_alias);
        self.next_alias += 1;
        a
    }

    /// Add `node`'s tables entering through `entry`. `on` uses `{e}` for the entry alias;
    /// `None` makes the entry table the FROM clause.
    fn attach(
        &mut self,
        node: PlanId,
        entry: &str,
        on: Option<(&str, String)>,
        chain_join: &str,
    ) -> Result<String, SchemaError> {
        let plan = self.plan;
        let plan_node = plan.node(node);
        let entry_info = plan_node
            .chain_table(entry)
            .ok_or_else(|| {
                SchemaError::invalid_model(format!(
                    "table '{entry}' is outside the lineage of {}",
                    plan_node.entity
                ))
            })?
            .clone();
        let e = self.alias();
        match on {
            None => {
                let _ = write!(self.from, "FROM {} {}", entry_info.table, e);
            }
            Some((keyword, clause)) => {
                let _ = write!(
                    self.from,
                    " {keyword} {} {e} ON {}",
                    entry_info.table,
                    clause.replace("{e}", &e)
                );
            }
        }
        self.aliases.insert((node, entry_info.table.clone()), e.clone());
        for other in &plan_node.chain {
            if other.table == entry_info.table {
                continue;
            }
            let a = self.alias();
            let _ = write!(
                self.from,
                " {chain_join} {} {a} ON {a}.{} = {e}.{}",
                other.table, other.id_column, entry_info.id_column
            );
            self.aliases.insert((node, other.table.clone()), a);
        }
        self.select.push(format!("{e}.{}", entry_info.id_column));
        self.nodes.push(node);

        for edge in &plan_node.joins {
            self.attach_join(node, &e, &entry_info, edge)?;
        }
        Ok(e)
    }

    fn attach_join(
        &mut self,
        parent: PlanId,
        parent_alias: &str,
        parent_entry: &TableInfo,
        edge: &PlanEdge,
    ) -> Result<(), SchemaError> {
        let child = self.plan.node(edge.child);
        let child_anchor = child.anchor().clone();
        match &edge.link {
            EdgeLink::OnParent { table, column } => {
                let holder = self
                    .aliases
                    .get(&(parent, table.clone()))
                    .cloned()
                    .ok_or_else(|| {
                        SchemaError::invalid_model(format!(
                            "foreign key table '{table}' is not joined for its owner"
                        ))
                    })?;
                let on = format!("{{e}}.{} = {holder}.{column}", child_anchor.id_column);
                self.edges.push((parent, edge.clone()));
                self.attach(edge.child, &child_anchor.table, Some(("LEFT JOIN", on)), "LEFT JOIN")?;
            }
            EdgeLink::OnChild { table, column } => {
                let on = format!("{{e}}.{column} = {parent_alias}.{}", parent_entry.id_column);
                self.edges.push((parent, edge.clone()));
                self.attach(edge.child, table, Some(("LEFT JOIN", on)), "LEFT JOIN")?;
            }
            EdgeLink::Junction { .. } => {
                return Err(SchemaError::invalid_model("junction edges cannot be joined inline"));
            }
        }
        Ok(())
    }

    fn finish(self, filter_column: String, parent_column: Option<String>) -> UnitSql {
        let mut columns = Vec::with_capacity(self.select.len() + 1);
        let has_parent_column = parent_column.is_some();
        columns.extend(parent_column);
        columns.extend(self.select);
        UnitSql {
            select_from: format!("SELECT {} {}", columns.join(", "), self.from),
            filter_column,
            has_parent_column,
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

fn root_unit(plan: &SelectPlan, root: PlanId) -> Result<UnitSql, SchemaError> {
    let mut writer = UnitWriter::new(plan);
    let anchor = plan.node(root).anchor().clone();
    let e = writer.attach(root, &anchor.table, None, "JOIN")?;
    Ok(writer.finish(format!("{e}.{}", anchor.id_column), None))
}

fn sub_select_unit(plan: &SelectPlan, parent: PlanId, edge: &PlanEdge) -> Result<UnitSql, SchemaError> {
    let mut writer = UnitWriter::new(plan);
    let child = plan.node(edge.child);
    let child_anchor = child.anchor().clone();
    match &edge.link {
        EdgeLink::OnChild { table, column } => {
            let e = writer.attach(edge.child, table, None, "JOIN")?;
            let parent_col = format!("{e}.{column}");
            Ok(writer.finish(parent_col.clone(), Some(parent_col)))
        }
        EdgeLink::OnParent { table, column } => {
            let holder = plan.node(parent).chain_table(table).cloned().ok_or_else(|| {
                SchemaError::invalid_model(format!(
                    "foreign key table '{table}' is outside its owner's lineage"
                ))
            })?;
            let p = writer.alias();
            writer.from = format!("FROM {} {p}", holder.table);
            let on = format!("{{e}}.{} = {p}.{column}", child_anchor.id_column);
            writer.attach(edge.child, &child_anchor.table, Some(("JOIN", on)), "JOIN")?;
            let parent_col = format!("{p}.{}", holder.id_column);
            Ok(writer.finish(parent_col.clone(), Some(parent_col)))
        }
        EdgeLink::Junction {
            table,
            parent_column,
            child_column,
        } => {
            // Same rows as an EXISTS over the junction, but keeps the parent
            // column each child row is correlated by.
            let j = writer.alias();
            writer.from = format!("FROM {table} {j}");
            let on = format!("{{e}}.{} = {j}.{child_column}", child_anchor.id_column);
            writer.attach(edge.child, &child_anchor.table, Some(("INNER JOIN", on)), "JOIN")?;
            let parent_col = format!("{j}.{parent_column}");
            Ok(writer.finish(parent_col.clone(), Some(parent_col)))
        }
    }
}

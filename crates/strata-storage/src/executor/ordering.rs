//! Dependency ordering of a statement batch.
//!
//! A statement that mentions a pending instance runs after the insert producing it.
//! The order is otherwise the processors' order (stable Kahn). Circular insert
//! chains are broken by moving one deferrable foreign key into a trailing
//! set-reference statement.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use rustc_hash::FxHashMap;
use strata_core::errors::StatementError;
use tracing::debug;

use crate::rules::StorageRule;
use crate::statements::{IdRef, ReferenceLink, Statement};

/// Reorder `statements` so every pending id is produced before it is used.
pub fn order_statements(mut statements: Vec<Statement>) -> Result<Vec<Statement>, StatementError> {
    loop {
        let graph = dependency_graph(&statements)?;
        match stable_topological_order(&graph) {
            Ok(order) => {
                let mut slots: Vec<Option<Statement>> = statements.into_iter().map(Some).collect();
                return Ok(order.into_iter().filter_map(|i| slots[i].take()).collect());
            }
            Err(cycle) => {
                if !break_cycle(&mut statements, &cycle) {
                    let described: Vec<String> = cycle
                        .iter()
                        .map(|i| format!("#{i} {}", statements[*i].kind_name()))
                        .collect();
                    return Err(StatementError::OrderingCycle {
                        statements: described.join(", "),
                    });
                }
            }
        }
    }
}

fn dependency_graph(statements: &[Statement]) -> Result<DiGraph<usize, ()>, StatementError> {
    let mut graph = DiGraph::with_capacity(statements.len(), statements.len());
    let nodes: Vec<NodeIndex> = (0..statements.len()).map(|i| graph.add_node(i)).collect();
    let producers: FxHashMap<usize, usize> = statements
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.produces().map(|key| (key, i)))
        .collect();
    for (i, statement) in statements.iter().enumerate() {
        for key in statement.dependencies() {
            let producer = producers
                .get(&key)
                .copied()
                .ok_or(StatementError::UnresolvedPending { key })?;
            graph.update_edge(nodes[producer], nodes[i], ());
        }
    }
    Ok(graph)
}

/// Kahn's algorithm, always taking the lowest ready index. On failure returns
/// the statement indices of one cycle.
fn stable_topological_order(graph: &DiGraph<usize, ()>) -> Result<Vec<usize>, Vec<usize>> {
    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(in_degree.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for next in graph.neighbors_directed(NodeIndex::new(i), Direction::Outgoing) {
            let slot = &mut in_degree[next.index()];
            *slot -= 1;
            if *slot == 0 {
                ready.push(Reverse(next.index()));
            }
        }
    }
    if order.len() == in_degree.len() {
        return Ok(order);
    }

    let cycle = tarjan_scc(graph)
        .into_iter()
        .find(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .map(|scc| {
            let mut members: Vec<usize> = scc.into_iter().map(NodeIndex::index).collect();
            members.sort_unstable();
            members
        })
        .unwrap_or_default();
    Err(cycle)
}

/// Defer one foreign key inside `cycle`. Returns false when none is deferrable.
fn break_cycle(statements: &mut Vec<Statement>, cycle: &[usize]) -> bool {
    let in_cycle: Vec<usize> = cycle
        .iter()
        .filter_map(|i| statements[*i].produces())
        .collect();

    for &i in cycle {
        let Statement::Insert(row) = &mut statements[i] else {
            continue;
        };
        let Some(position) = row.foreign_keys.iter().position(|fk| {
            fk.deferrable && fk.target.pending_key().is_some_and(|k| in_cycle.contains(&k))
        }) else {
            continue;
        };
        let fk = row.foreign_keys.remove(position);
        debug!(key = row.key, column = %fk.column, "deferring foreign key to break insert cycle");
        let link = ReferenceLink {
            reference: fk.reference,
            rule: StorageRule::ForeignKey {
                table: fk.table,
                column: fk.column,
            },
            owner: IdRef::Pending(row.key),
            owner_entity: row.entity,
            target: Some(fk.target),
            target_entity: fk.target_entity,
        };
        statements.push(Statement::SetReference(link));
        return true;
    }
    false
}

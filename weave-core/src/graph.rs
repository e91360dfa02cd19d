//! Dependency graph construction and Kahn's-algorithm topological sort.
//!
//! Grounded on `r2e-core::beans::BeanRegistry::topological_sort`, but with a
//! `VecDeque`-backed FIFO queue instead of the teacher's `Vec::pop()` (LIFO) queue:
//! `SPEC_FULL.md` §8 requires strict insertion-order determinism whenever more than
//! one node reaches zero indegree at the same step, which a LIFO queue would violate.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};

use crate::error::WeaveError;

/// Topologically sort `nodes` given `edges` (`from` must precede `to`).
///
/// Deterministic: ties are broken by the insertion order of `nodes`. On a cycle,
/// returns [`WeaveError::Cycle`] naming every node with residual indegree, in
/// `nodes`' insertion order.
pub fn topo_sort(
    nodes: &IndexSet<String>,
    edges: &[(String, String)],
) -> Result<Vec<String>, WeaveError> {
    let mut indegree: IndexMap<String, usize> = nodes.iter().map(|n| (n.clone(), 0)).collect();
    let mut adjacency: IndexMap<String, Vec<String>> =
        nodes.iter().map(|n| (n.clone(), Vec::new())).collect();

    for (from, to) in edges {
        if !nodes.contains(from) || !nodes.contains(to) {
            continue;
        }
        adjacency.get_mut(from).unwrap().push(to.clone());
        *indegree.get_mut(to).unwrap() += 1;
    }

    let mut queue: VecDeque<String> = nodes
        .iter()
        .filter(|n| indegree[n.as_str()] == 0)
        .cloned()
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(node) = queue.pop_front() {
        order.push(node.clone());
        for dependent in &adjacency[&node] {
            let degree = indegree.get_mut(dependent).unwrap();
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(dependent.clone());
            }
        }
    }

    if order.len() != nodes.len() {
        let remaining: Vec<String> = nodes
            .iter()
            .filter(|n| indegree[n.as_str()] > 0)
            .cloned()
            .collect();
        return Err(WeaveError::Cycle { kinds: remaining });
    }

    Ok(order)
}

/// Build the edge list for a set of facet kinds given each kind's declared
/// dependencies (from hook `required` plus any `Facet::add_dependency` calls).
/// A dependency naming a kind outside `nodes` is a [`WeaveError::MissingDependency`].
pub fn build_edges(
    nodes: &IndexSet<String>,
    required_by_kind: &IndexMap<String, Vec<String>>,
) -> Result<Vec<(String, String)>, WeaveError> {
    let mut edges = Vec::new();
    for (kind, deps) in required_by_kind {
        for dep in deps {
            if dep == kind {
                // a hook may legally require its own kind only as an override
                // predecessor; that edge is synthesized separately by hook ordering,
                // not by the kind-level graph.
                continue;
            }
            if !nodes.contains(dep) {
                return Err(WeaveError::MissingDependency {
                    kind: kind.clone(),
                    dependency: dep.clone(),
                });
            }
            edges.push((dep.clone(), kind.clone()));
        }
    }
    Ok(edges)
}

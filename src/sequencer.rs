//! Traversal ordering of the scope graph.

use crate::scope::{ScopeGraph, ScopeId};

/// Scope ids grouped by depth, shallowest first. Within one depth the
/// creation order of the decomposer is kept, so a parent always comes
/// before its children.
pub fn sequence(graph: &ScopeGraph) -> Vec<ScopeId> {
    let mut buckets: Vec<Vec<ScopeId>> = Vec::new();
    for node in graph.nodes() {
        if buckets.len() <= node.depth {
            buckets.resize_with(node.depth + 1, Vec::new);
        }
        buckets[node.depth].push(node.id);
    }
    buckets.into_iter().flatten().collect()
}

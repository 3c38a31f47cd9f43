//! BLAKE3 content fingerprint of an attack graph.
//!
//! Computes a deterministic hash over every node (id, kind, description,
//! probability bits, predecessors in order) so that analysis reports can be
//! tied to the exact graph they were computed from.

use iotag_core::{NodeId, NodeKind};
use serde::Serialize;

use crate::graph::AttackGraph;

/// Hashable representation of a node (excludes derived fields).
#[derive(Serialize)]
struct HashableNode<'a> {
    id: NodeId,
    kind: NodeKind,
    description: &'a str,
    probability_bits: u64,
    predecessors: &'a [NodeId],
}

/// Compute the BLAKE3 fingerprint of a graph.
///
/// Nodes are serialized to canonical JSON in insertion order and hashed.
/// Returns the hex-encoded hash.
pub fn graph_fingerprint(graph: &AttackGraph) -> String {
    let hashable: Vec<HashableNode<'_>> = graph
        .nodes()
        .iter()
        .map(|n| HashableNode {
            id: n.id,
            kind: n.kind,
            description: &n.description,
            probability_bits: n.probability.to_bits(),
            predecessors: &n.predecessors,
        })
        .collect();

    let json = serde_json::to_vec(&hashable).expect("Graph serialization should not fail");
    blake3::hash(&json).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(probability: f64, extra_edge: bool) -> AttackGraph {
        let mut b = AttackGraph::builder();
        b.add_node(NodeId(1), NodeKind::Primitive, "a", 1.0).unwrap();
        b.add_node(NodeId(2), NodeKind::Primitive, "b", 1.0).unwrap();
        b.add_node(NodeId(3), NodeKind::Or, "c", probability).unwrap();
        b.add_edge(NodeId(1), NodeId(3)).unwrap();
        if extra_edge {
            b.add_edge(NodeId(2), NodeId(3)).unwrap();
        }
        b.build().unwrap()
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let a = graph_fingerprint(&build(0.5, true));
        let b = graph_fingerprint(&build(0.5, true));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_detects_changes() {
        let base = graph_fingerprint(&build(0.5, true));
        assert_ne!(base, graph_fingerprint(&build(0.6, true)));
        assert_ne!(base, graph_fingerprint(&build(0.5, false)));
    }
}

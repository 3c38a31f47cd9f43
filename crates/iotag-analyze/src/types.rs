//! Result types for analysis operations.

use chrono::{DateTime, Utc};
use iotag_core::NodeId;
use iotag_graph::GraphStats;
use serde::Serialize;
use uuid::Uuid;

use crate::trace::ShortestTrace;

/// A vulnerability fact and its position in evidence vectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vulnerability {
    /// Bit position in every evidence vector.
    pub index: usize,
    pub node_id: NodeId,
    pub description: String,
}

/// Derived facts that a single vulnerability is enough to reach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VulnerabilityBlast {
    pub vulnerability: Vulnerability,
    /// OR nodes attributable to this vulnerability alone, in insertion order.
    pub affected: Vec<NodeId>,
}

/// Blast radius of every vulnerability, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlastRadiusResult {
    pub radii: Vec<VulnerabilityBlast>,
}

impl BlastRadiusResult {
    /// Affected nodes of the vulnerability fact `vulnerability_id`.
    pub fn get(&self, vulnerability_id: NodeId) -> Option<&[NodeId]> {
        self.radii
            .iter()
            .find(|r| r.vulnerability.node_id == vulnerability_id)
            .map(|r| r.affected.as_slice())
    }
}

/// Everything the engine can compute about one graph.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub id: Uuid,
    pub computed_at: DateTime<Utc>,
    /// BLAKE3 fingerprint of the analysed graph.
    pub graph_fingerprint: String,
    pub stats: GraphStats,
    /// Shortest trace to each goal node.
    pub goal_traces: Vec<ShortestTrace>,
    pub blast_radius: BlastRadiusResult,
    pub computation_ms: u64,
}

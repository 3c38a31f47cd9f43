//! iotag-analyze: Trace and blast-radius analysis for iotag attack graphs.
//!
//! Loads an AND/OR attack graph once and answers two questions about it:
//! how shallow is the cheapest derivation of a fact (shortest trace), and
//! which derived facts a single vulnerability is enough to reach (exclusive
//! blast radius). Results are serde-serializable for the CLI.

pub mod blast;
pub mod error;
pub mod evidence;
pub mod trace;
pub mod types;

pub use error::AnalyzeError;
pub use trace::{ShortestTrace, TraceFinder, TraceNode, TraceStep};
pub use types::{AnalysisReport, BlastRadiusResult, Vulnerability, VulnerabilityBlast};

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use iotag_core::{AnalysisConfig, NodeId};
use iotag_graph::fingerprint::graph_fingerprint;
use iotag_graph::stats::compute_stats;
use iotag_graph::{AttackGraph, GraphStats};
use uuid::Uuid;

/// The analysis engine over one immutable attack graph.
///
/// Cheap to clone; the graph is shared behind an `Arc` and every query keeps
/// its working state private to the call.
#[derive(Debug, Clone)]
pub struct AnalysisEngine {
    graph: Arc<AttackGraph>,
    config: AnalysisConfig,
}

impl AnalysisEngine {
    /// Create an engine with default configuration.
    pub fn new(graph: impl Into<Arc<AttackGraph>>) -> Self {
        Self {
            graph: graph.into(),
            config: AnalysisConfig::default(),
        }
    }

    /// Load the vertex and arc tables and wrap the graph in an engine.
    pub fn load(vertices: impl AsRef<Path>, arcs: impl AsRef<Path>) -> error::Result<Self> {
        let graph = iotag_graph::load_graph(vertices, arcs)?;
        Ok(Self::new(graph))
    }

    /// Set a custom analysis configuration.
    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn graph(&self) -> &AttackGraph {
        &self.graph
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Shortest trace to `node_id`.
    pub fn shortest_trace(&self, node_id: NodeId) -> error::Result<ShortestTrace> {
        trace::shortest_trace(&self.graph, node_id, &self.config.limits)
    }

    /// Shortest trace to every goal node.
    pub fn goal_traces(&self) -> error::Result<Vec<ShortestTrace>> {
        trace::shortest_traces_to_goals(&self.graph, &self.config.limits)
    }

    /// Exclusive blast radius of every vulnerability.
    pub fn blast_radius(&self) -> error::Result<BlastRadiusResult> {
        blast::compute_blast_radius(&self.graph, &self.config)
    }

    pub fn stats(&self) -> GraphStats {
        compute_stats(&self.graph, &self.config.vulnerability_marker)
    }

    /// Run every analysis and bundle the results.
    pub fn report(&self) -> error::Result<AnalysisReport> {
        let start = std::time::Instant::now();

        let stats = self.stats();
        let goal_traces = self.goal_traces()?;
        let blast_radius = self.blast_radius()?;
        let computation_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            nodes = stats.total_nodes,
            goals = goal_traces.len(),
            vulnerabilities = blast_radius.radii.len(),
            computation_ms,
            "Analysis report complete"
        );

        Ok(AnalysisReport {
            id: Uuid::new_v4(),
            computed_at: Utc::now(),
            graph_fingerprint: graph_fingerprint(&self.graph),
            stats,
            goal_traces,
            blast_radius,
            computation_ms,
        })
    }
}

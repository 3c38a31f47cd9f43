//! iotag-graph: AND/OR attack graph model for iotag.
//!
//! Loads the vertex and arc tables produced by an upstream attack-graph
//! generator into an immutable in-memory [`AttackGraph`], indexed by node id
//! and carrying a precomputed topological order for the analyses.

pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod loader;
pub mod stats;

pub use error::GraphError;
pub use graph::{AttackGraph, AttackGraphBuilder, Node};
pub use loader::{load_graph, load_graph_from_readers};
pub use stats::{GoalProbability, GraphStats};

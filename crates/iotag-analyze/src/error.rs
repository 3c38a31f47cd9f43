//! Error types for the iotag-analyze crate.

use iotag_core::NodeId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Graph error: {0}")]
    Graph(#[from] iotag_graph::GraphError),

    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: NodeId },

    #[error("Resource exhausted: {resource} exceeded limit of {limit}")]
    ResourceExhausted { resource: &'static str, limit: usize },
}

pub type Result<T> = std::result::Result<T, AnalyzeError>;

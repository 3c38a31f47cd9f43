//! Error types for the iotag-graph crate.

use iotag_core::NodeId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Malformed {table} row {row}: {message}")]
    Format {
        table: &'static str,
        row: usize,
        message: String,
    },

    #[error("Duplicate node id: {node_id}")]
    DuplicateNode { node_id: NodeId },

    #[error("Invalid node type {code:?} for node {node_id} (expected AND, OR or LEAF)")]
    InvalidNodeType { node_id: NodeId, code: String },

    #[error("Edge {from} -> {to} references unknown node {missing}")]
    Reference {
        from: NodeId,
        to: NodeId,
        missing: NodeId,
    },

    #[error("Invalid graph structure at node {node_id}: {message}")]
    Structure { node_id: NodeId, message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;

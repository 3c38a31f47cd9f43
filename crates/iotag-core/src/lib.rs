//! iotag-core: Shared types, configuration, and error handling for iotag.
//!
//! This crate provides the foundational pieces used by the other iotag crates:
//! - Node identifiers and the closed set of attack-graph node kinds
//! - Analysis configuration and resource budgets
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use crate::config::{AnalysisConfig, PropagationOrder, ResourceLimits};
pub use error::IotagError;
pub use types::{NodeId, NodeKind};

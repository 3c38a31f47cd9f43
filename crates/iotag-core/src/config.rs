//! Configuration for iotag analyses.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`IOTAG_ANALYSIS__` prefix)
//! 2. Config file (`iotag.toml`, `[analysis]` section)
//! 3. Defaults

use serde::{Deserialize, Serialize};

use crate::error::IotagError;

/// Analysis configuration shared by the trace finder and blast-radius analyzer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    /// Substring that marks a primitive node as a vulnerability fact.
    #[serde(default = "default_vulnerability_marker")]
    pub vulnerability_marker: String,

    /// How evidence sets are propagated through the graph.
    #[serde(default)]
    pub propagation: PropagationOrder,

    /// Budgets that bound a single analysis call.
    #[serde(default)]
    pub limits: ResourceLimits,
}

/// Order in which the blast-radius analyzer visits derived nodes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PropagationOrder {
    /// Visit every derived node once, in topological order.
    #[default]
    Topological,
    /// FIFO worklist seeded with the successors of vulnerability facts.
    Worklist,
}

/// Per-call resource budgets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum number of distinct evidence vectors held by one node.
    #[serde(default = "default_max_evidence_set_size")]
    pub max_evidence_set_size: usize,

    /// Maximum number of worklist dequeues during propagation.
    #[serde(default = "default_max_propagation_steps")]
    pub max_propagation_steps: usize,

    /// Maximum depth of a shortest trace.
    #[serde(default = "default_max_trace_depth")]
    pub max_trace_depth: usize,
}

fn default_vulnerability_marker() -> String {
    "vulExists(".to_string()
}

fn default_max_evidence_set_size() -> usize {
    4096
}

fn default_max_propagation_steps() -> usize {
    1_000_000
}

fn default_max_trace_depth() -> usize {
    100_000
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            vulnerability_marker: default_vulnerability_marker(),
            propagation: PropagationOrder::default(),
            limits: ResourceLimits::default(),
        }
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_evidence_set_size: default_max_evidence_set_size(),
            max_propagation_steps: default_max_propagation_steps(),
            max_trace_depth: default_max_trace_depth(),
        }
    }
}

/// Load the `[analysis]` section from `<file_prefix>.toml` (optional) and
/// `IOTAG_ANALYSIS__*` environment variables.
///
/// A missing file or section yields the defaults; a malformed one is an error.
pub fn load_analysis_config(file_prefix: &str) -> Result<AnalysisConfig, IotagError> {
    let cfg = ::config::Config::builder()
        .add_source(::config::File::with_name(file_prefix).required(false))
        .add_source(environment())
        .build()?;

    analysis_section(&cfg)
}

/// `IOTAG_ANALYSIS__LIMITS__MAX_TRACE_DEPTH=10` -> `analysis.limits.max_trace_depth`.
fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix("IOTAG")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Extract the `[analysis]` section, falling back to defaults when absent.
fn analysis_section(cfg: &::config::Config) -> Result<AnalysisConfig, IotagError> {
    match cfg.get::<AnalysisConfig>("analysis") {
        Ok(c) => Ok(c),
        Err(::config::ConfigError::NotFound(_)) => {
            tracing::debug!("No [analysis] config section, using defaults");
            Ok(AnalysisConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

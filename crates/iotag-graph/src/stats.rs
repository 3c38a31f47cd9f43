//! Summary statistics for a loaded attack graph.
//!
//! Counts node kinds, goals and vulnerability facts, and tallies the CVE
//! identifiers, IoT app rules and indirect physical dependencies that occur in
//! the graph.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use iotag_core::{NodeId, NodeKind};
use regex::Regex;
use serde::Serialize;

use crate::graph::AttackGraph;

/// Statistics about an attack graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub primitive_count: usize,
    pub and_count: usize,
    pub or_count: usize,
    pub goal_count: usize,
    pub vulnerability_count: usize,
    /// Occurrences of each CVE id across vulnerability facts.
    pub cve_counts: BTreeMap<String, usize>,
    /// Occurrences of each app id (`App <n>`) across rule applications.
    pub app_counts: BTreeMap<String, usize>,
    /// Derived OR facts per physical channel (temperature, smoke, ...).
    /// Every channel is present, with zero when unused.
    pub indirect_dependency_counts: BTreeMap<String, usize>,
    /// Finalized probability of each goal node, in insertion order.
    pub goal_probabilities: Vec<GoalProbability>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalProbability {
    pub node_id: NodeId,
    pub probability: f64,
}

/// Physical channels through which one device's actions reach another,
/// keyed by the description prefixes of the OR facts that assert them.
const INDIRECT_CHANNELS: &[(&str, &[&str])] = &[
    ("temperature", &["high(temperature)", "low(temperature)"]),
    ("humidity", &["high(humidity)", "low(humidity)"]),
    ("smoke", &["exists(smoke)"]),
    ("voice", &["voice("]),
    ("illuminance", &["high(illuminance)", "low(illuminance)"]),
    ("water", &["exists(waterLeakage)"]),
];

fn cve_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"CVE-\d{4}-\d{4,7}").expect("CVE pattern is valid"))
}

fn app_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"App [0-9]+").expect("app pattern is valid"))
}

/// Compute statistics for `graph`, treating primitive nodes whose description
/// contains `vulnerability_marker` as vulnerability facts.
pub fn compute_stats(graph: &AttackGraph, vulnerability_marker: &str) -> GraphStats {
    let mut stats = GraphStats {
        total_nodes: graph.node_count(),
        total_edges: graph.edge_count(),
        primitive_count: 0,
        and_count: 0,
        or_count: 0,
        goal_count: 0,
        vulnerability_count: 0,
        cve_counts: BTreeMap::new(),
        app_counts: BTreeMap::new(),
        indirect_dependency_counts: INDIRECT_CHANNELS
            .iter()
            .map(|(channel, _)| (channel.to_string(), 0))
            .collect(),
        goal_probabilities: Vec::new(),
    };

    for node in graph.nodes() {
        if node.is_goal {
            stats.goal_count += 1;
            stats.goal_probabilities.push(GoalProbability {
                node_id: node.id,
                probability: node.probability,
            });
        }

        match node.kind {
            NodeKind::Primitive => {
                stats.primitive_count += 1;
                if node.description.contains(vulnerability_marker) {
                    stats.vulnerability_count += 1;
                    tally(&mut stats.cve_counts, cve_pattern(), &node.description);
                }
            }
            NodeKind::And => {
                stats.and_count += 1;
                if node.description.starts_with("RULE") {
                    tally(&mut stats.app_counts, app_pattern(), &node.description);
                }
            }
            NodeKind::Or => {
                stats.or_count += 1;
                for (channel, prefixes) in INDIRECT_CHANNELS {
                    if prefixes.iter().any(|p| node.description.starts_with(p)) {
                        *stats
                            .indirect_dependency_counts
                            .entry(channel.to_string())
                            .or_insert(0) += 1;
                    }
                }
            }
        }
    }

    stats
}

fn tally(counts: &mut BTreeMap<String, usize>, pattern: &Regex, text: &str) {
    for m in pattern.find_iter(text) {
        *counts.entry(m.as_str().to_string()).or_insert(0) += 1;
    }
}

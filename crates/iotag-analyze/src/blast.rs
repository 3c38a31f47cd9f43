//! Exclusive blast radius of each vulnerability.
//!
//! Every node carries an evidence set: the distinct combinations of
//! vulnerabilities that can derive it. Vulnerability facts start with their
//! own unit vector, every other node with the all-zero vector. Derived nodes
//! are rebuilt from scratch by folding their predecessors' sets in
//! predecessor order (union for OR, pairwise elementwise maximum for AND).
//! Once propagation settles, an OR node belongs to the blast radius of
//! vulnerability `i` when one of its vectors requires `i` and nothing else.

use std::collections::{HashSet, VecDeque};

use iotag_core::{AnalysisConfig, NodeId, NodeKind, PropagationOrder, ResourceLimits};
use iotag_graph::AttackGraph;

use crate::error::{AnalyzeError, Result};
use crate::evidence::{EvidenceSet, EvidenceVector};
use crate::types::{BlastRadiusResult, Vulnerability, VulnerabilityBlast};

/// Settled evidence sets for every node of a graph.
#[derive(Debug, Clone)]
pub struct EvidenceMap {
    /// Known vulnerabilities, in discovery order.
    pub vulnerabilities: Vec<Vulnerability>,
    /// `sets[i]` = evidence set of the node at dense index `i`.
    sets: Vec<EvidenceSet>,
}

impl EvidenceMap {
    /// Evidence set of node at dense index `index`.
    pub fn at(&self, index: usize) -> &EvidenceSet {
        &self.sets[index]
    }

    /// Number of vulnerabilities (the width of every evidence vector).
    pub fn width(&self) -> usize {
        self.vulnerabilities.len()
    }
}

/// List the vulnerability facts of `graph` in node insertion order.
pub fn enumerate_vulnerabilities(graph: &AttackGraph, marker: &str) -> Vec<Vulnerability> {
    graph
        .vulnerability_facts(marker)
        .into_iter()
        .enumerate()
        .map(|(index, node_index)| {
            let node = graph.node_at(node_index);
            Vulnerability {
                index,
                node_id: node.id,
                description: node.description.clone(),
            }
        })
        .collect()
}

/// Propagate evidence sets until every derived node is settled.
pub fn propagate_evidence(graph: &AttackGraph, config: &AnalysisConfig) -> Result<EvidenceMap> {
    let vulnerabilities = enumerate_vulnerabilities(graph, &config.vulnerability_marker);
    let width = vulnerabilities.len();

    let mut sets = vec![EvidenceSet::singleton(EvidenceVector::zeros(width)); graph.node_count()];
    let vuln_indices: Vec<usize> = vulnerabilities
        .iter()
        .filter_map(|v| graph.index_of(v.node_id))
        .collect();
    for (i, &node_index) in vuln_indices.iter().enumerate() {
        sets[node_index] = EvidenceSet::singleton(EvidenceVector::unit(width, i));
    }

    tracing::debug!(
        vulnerabilities = width,
        order = ?config.propagation,
        "Propagating vulnerability evidence"
    );

    match config.propagation {
        PropagationOrder::Topological => propagate_topological(graph, &mut sets, &config.limits)?,
        PropagationOrder::Worklist => {
            propagate_worklist(graph, &mut sets, &vuln_indices, &config.limits)?
        }
    }

    Ok(EvidenceMap {
        vulnerabilities,
        sets,
    })
}

/// Visit every derived node once, after all of its predecessors.
fn propagate_topological(
    graph: &AttackGraph,
    sets: &mut [EvidenceSet],
    limits: &ResourceLimits,
) -> Result<()> {
    for &index in graph.topological_order() {
        if !graph.node_at(index).kind.is_derived() {
            continue;
        }
        sets[index] = fold_predecessors(graph, index, sets, limits)?;
    }
    Ok(())
}

/// FIFO worklist seeded with the successors of every vulnerability fact.
///
/// A node is queued at most once at a time; each dequeue rebuilds the node
/// from its predecessors' current sets and requeues its successors.
fn propagate_worklist(
    graph: &AttackGraph,
    sets: &mut [EvidenceSet],
    vuln_indices: &[usize],
    limits: &ResourceLimits,
) -> Result<()> {
    let mut queue: VecDeque<usize> = VecDeque::new();
    let mut queued: HashSet<usize> = HashSet::new();

    for &vuln in vuln_indices {
        for &succ in graph.successor_indices(vuln) {
            if queued.insert(succ) {
                queue.push_back(succ);
            }
        }
    }

    let mut steps = 0usize;
    while let Some(index) = queue.pop_front() {
        queued.remove(&index);

        steps += 1;
        if steps > limits.max_propagation_steps {
            tracing::warn!(steps, "Propagation step budget exhausted");
            return Err(AnalyzeError::ResourceExhausted {
                resource: "propagation steps",
                limit: limits.max_propagation_steps,
            });
        }

        if !graph.node_at(index).kind.is_derived() {
            continue;
        }
        sets[index] = fold_predecessors(graph, index, sets, limits)?;

        for &succ in graph.successor_indices(index) {
            if queued.insert(succ) {
                queue.push_back(succ);
            }
        }
    }

    tracing::debug!(steps, "Worklist propagation settled");
    Ok(())
}

/// Rebuild a derived node's evidence set from its predecessors.
fn fold_predecessors(
    graph: &AttackGraph,
    index: usize,
    sets: &[EvidenceSet],
    limits: &ResourceLimits,
) -> Result<EvidenceSet> {
    let node = graph.node_at(index);
    let preds = graph.predecessor_indices(index);
    let Some((&first, rest)) = preds.split_first() else {
        return Ok(sets[index].clone());
    };

    let mut folded = sets[first].clone();
    for &pred in rest {
        let merged = match node.kind {
            NodeKind::And => folded.merge_and(&sets[pred], limits.max_evidence_set_size),
            _ => folded.merge_or(&sets[pred], limits.max_evidence_set_size),
        };
        folded = match merged {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!(node = %node.id, error = %e, "Evidence set budget exhausted");
                return Err(e);
            }
        };
    }
    Ok(folded)
}

/// Collect, per vulnerability, the OR nodes with a single-cause vector for it.
pub fn attribute(graph: &AttackGraph, evidence: &EvidenceMap) -> BlastRadiusResult {
    let mut affected: Vec<Vec<NodeId>> = vec![Vec::new(); evidence.width()];

    for node in graph.nodes().iter().filter(|n| n.kind == NodeKind::Or) {
        for vector in evidence.at(node.index) {
            if let Some(vuln) = vector.single() {
                let list = &mut affected[vuln];
                if list.last() != Some(&node.id) {
                    list.push(node.id);
                }
            }
        }
    }

    let radii = evidence
        .vulnerabilities
        .iter()
        .cloned()
        .zip(affected)
        .map(|(vulnerability, affected)| VulnerabilityBlast {
            vulnerability,
            affected,
        })
        .collect();

    BlastRadiusResult { radii }
}

/// Compute the exclusive blast radius of every vulnerability in `graph`.
pub fn compute_blast_radius(graph: &AttackGraph, config: &AnalysisConfig) -> Result<BlastRadiusResult> {
    let evidence = propagate_evidence(graph, config)?;
    let result = attribute(graph, &evidence);
    tracing::debug!(
        vulnerabilities = result.radii.len(),
        attributed = result.radii.iter().map(|r| r.affected.len()).sum::<usize>(),
        "Blast radius computed"
    );
    Ok(result)
}

//! In-memory AND/OR attack graph.
//!
//! Nodes are stored densely in insertion order (vertex-table order) with a
//! map from generator-assigned id to dense index for O(1) lookup. Adjacency
//! is kept as dense index lists so the analyses never hash on the hot path.
//! The graph is immutable once built and safe to share across threads.

use std::collections::{HashMap, HashSet, VecDeque};

use iotag_core::{NodeId, NodeKind};
use serde::Serialize;

use crate::error::{GraphError, Result};

/// A single attack-graph node.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    /// Dense index (0..N-1), equal to the vertex-table position.
    pub index: usize,
    /// Id assigned by the attack-graph generator.
    pub id: NodeId,
    pub kind: NodeKind,
    /// Fact or rule text, with any goal marker already removed.
    pub description: String,
    /// Probability finalized upstream. Carried through, never recomputed.
    pub probability: f64,
    /// Preconditions in edge-insertion order.
    pub predecessors: Vec<NodeId>,
    pub successors: Vec<NodeId>,
    /// True iff the node has no successors.
    pub is_goal: bool,
}

/// The immutable attack graph shared by every analysis.
#[derive(Debug, Clone)]
pub struct AttackGraph {
    nodes: Vec<Node>,
    /// `predecessors[i]` = dense indices of the preconditions of node `i`.
    predecessors: Vec<Vec<usize>>,
    /// `successors[i]` = dense indices of the nodes that node `i` feeds.
    successors: Vec<Vec<usize>>,
    node_index: HashMap<NodeId, usize>,
    topo_order: Vec<usize>,
    edge_count: usize,
}

impl AttackGraph {
    /// Start assembling a graph node by node.
    pub fn builder() -> AttackGraphBuilder {
        AttackGraphBuilder::default()
    }

    /// Look up a node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.node_index.get(&id).map(|&i| &self.nodes[i])
    }

    /// Dense index of a node id.
    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.node_index.get(&id).copied()
    }

    /// Node at a dense index.
    ///
    /// Panics if `index >= node_count()`.
    pub fn node_at(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Dense predecessor indices of the node at `index`, in edge-insertion order.
    pub fn predecessor_indices(&self, index: usize) -> &[usize] {
        &self.predecessors[index]
    }

    /// Dense successor indices of the node at `index`, in edge-insertion order.
    pub fn successor_indices(&self, index: usize) -> &[usize] {
        &self.successors[index]
    }

    /// Dense indices in a topological order: every node after all of its
    /// predecessors.
    pub fn topological_order(&self) -> &[usize] {
        &self.topo_order
    }

    /// Ids of all goal nodes (nodes with no successors), in insertion order.
    pub fn goal_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_goal)
            .map(|n| n.id)
            .collect()
    }

    /// Dense indices of primitive nodes whose description contains `marker`,
    /// in insertion order.
    pub fn vulnerability_facts(&self, marker: &str) -> Vec<usize> {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Primitive && n.description.contains(marker))
            .map(|n| n.index)
            .collect()
    }

    /// Number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Incremental, validating constructor for [`AttackGraph`].
///
/// Nodes must be added before the edges that reference them. [`build`]
/// finalizes goal flags and rejects structurally invalid graphs.
///
/// [`build`]: AttackGraphBuilder::build
#[derive(Debug, Default)]
pub struct AttackGraphBuilder {
    nodes: Vec<Node>,
    predecessors: Vec<Vec<usize>>,
    successors: Vec<Vec<usize>>,
    node_index: HashMap<NodeId, usize>,
    edges: HashSet<(usize, usize)>,
}

impl AttackGraphBuilder {
    /// Add a node. Returns its dense index.
    pub fn add_node(
        &mut self,
        id: NodeId,
        kind: NodeKind,
        description: impl Into<String>,
        probability: f64,
    ) -> Result<usize> {
        if self.node_index.contains_key(&id) {
            return Err(GraphError::DuplicateNode { node_id: id });
        }

        let index = self.nodes.len();
        self.node_index.insert(id, index);
        self.nodes.push(Node {
            index,
            id,
            kind,
            description: description.into(),
            probability,
            predecessors: Vec::new(),
            successors: Vec::new(),
            is_goal: false,
        });
        self.predecessors.push(Vec::new());
        self.successors.push(Vec::new());
        Ok(index)
    }

    /// Add the edge `source -> destination` (source is a precondition of
    /// destination).
    ///
    /// Returns `false` when the edge already exists; duplicates keep the
    /// position of their first insertion.
    pub fn add_edge(&mut self, source: NodeId, destination: NodeId) -> Result<bool> {
        let lookup = |missing: NodeId| GraphError::Reference {
            from: source,
            to: destination,
            missing,
        };
        let src = *self.node_index.get(&source).ok_or_else(|| lookup(source))?;
        let dst = *self
            .node_index
            .get(&destination)
            .ok_or_else(|| lookup(destination))?;

        if !self.edges.insert((src, dst)) {
            return Ok(false);
        }

        self.successors[src].push(dst);
        self.predecessors[dst].push(src);
        self.nodes[src].successors.push(destination);
        self.nodes[dst].predecessors.push(source);
        Ok(true)
    }

    /// Validate structure, set goal flags, and compute the topological order.
    pub fn build(mut self) -> Result<AttackGraph> {
        for node in &mut self.nodes {
            node.is_goal = node.successors.is_empty();

            match node.kind {
                NodeKind::Primitive if !node.predecessors.is_empty() => {
                    return Err(GraphError::Structure {
                        node_id: node.id,
                        message: "primitive node has predecessors".to_string(),
                    });
                }
                NodeKind::And | NodeKind::Or if node.predecessors.is_empty() => {
                    return Err(GraphError::Structure {
                        node_id: node.id,
                        message: format!("{} node has no predecessors", node.kind),
                    });
                }
                _ => {}
            }
        }

        let topo_order = topological_sort(&self.predecessors, &self.successors);
        if topo_order.len() < self.nodes.len() {
            let mut ordered = vec![false; self.nodes.len()];
            for &i in &topo_order {
                ordered[i] = true;
            }
            let stuck = ordered.iter().position(|done| !done).unwrap_or(0);
            return Err(GraphError::Structure {
                node_id: self.nodes[stuck].id,
                message: "node lies on a cycle".to_string(),
            });
        }

        Ok(AttackGraph {
            nodes: self.nodes,
            predecessors: self.predecessors,
            successors: self.successors,
            node_index: self.node_index,
            topo_order,
            edge_count: self.edges.len(),
        })
    }
}

/// Kahn's algorithm. Sources are taken in insertion order so the result is
/// deterministic. Nodes on (or downstream of) a cycle are left out.
fn topological_sort(predecessors: &[Vec<usize>], successors: &[Vec<usize>]) -> Vec<usize> {
    let mut in_degree: Vec<usize> = predecessors.iter().map(Vec::len).collect();
    let mut queue: VecDeque<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| i)
        .collect();

    let mut order = Vec::with_capacity(predecessors.len());
    while let Some(node) = queue.pop_front() {
        order.push(node);
        for &succ in &successors[node] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                queue.push_back(succ);
            }
        }
    }
    order
}

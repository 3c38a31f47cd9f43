//! Shortest attack traces under AND/OR semantics.
//!
//! The depth of a primitive fact is 0. An OR node is as deep as its
//! shallowest precondition plus one; an AND node needs every precondition and
//! is as deep as its deepest one plus one. The trace tree records the
//! preconditions that witness that depth.
//!
//! Evaluation walks the graph with an explicit post-order stack and memoizes
//! every node it finishes, so each node is expanded once per finder and
//! shared sub-derivations are shared subtrees.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;

use iotag_core::{NodeId, NodeKind, ResourceLimits};
use iotag_graph::AttackGraph;
use serde::Serialize;

use crate::error::{AnalyzeError, Result};

/// A node of a trace tree: a graph node and the preconditions chosen for it.
///
/// Subtrees are shared through `Arc`, so a tree over a DAG can be
/// exponentially larger than the number of distinct nodes it contains. Walk
/// it with [`TraceNode::steps`] or [`TraceNode::render`], which visit each
/// distinct node once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceNode {
    pub node_id: NodeId,
    pub children: Vec<Arc<TraceNode>>,
}

/// One distinct node of a trace and the ids of its chosen preconditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceStep {
    pub node_id: NodeId,
    pub children: Vec<NodeId>,
}

impl TraceNode {
    fn leaf(node_id: NodeId) -> Self {
        Self {
            node_id,
            children: Vec::new(),
        }
    }

    /// Flatten the tree into a step table in pre-order, each node once.
    pub fn steps(&self) -> Vec<TraceStep> {
        let mut steps = Vec::new();
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<&TraceNode> = vec![self];

        while let Some(node) = stack.pop() {
            if !seen.insert(node.node_id) {
                continue;
            }
            steps.push(TraceStep {
                node_id: node.node_id,
                children: node.children.iter().map(|c| c.node_id).collect(),
            });
            for child in node.children.iter().rev() {
                stack.push(child);
            }
        }

        steps
    }

    /// Render the tree as indented text, one node per line:
    ///
    /// ```text
    /// 1 [OR] execCode(hub,root)
    ///   2 [AND] RULE 2 (remote exploit of a server program)
    ///     8 [LEAF] vulExists(hub,'CVE-2018-1000001',httpd)
    /// ```
    ///
    /// A derived node that was already expanded is printed once more with a
    /// trailing `^` and not expanded again.
    pub fn render(&self, graph: &AttackGraph) -> String {
        let mut out = String::new();
        let mut expanded: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<(&TraceNode, usize)> = vec![(self, 0)];

        while let Some((node, indent)) = stack.pop() {
            let (kind, description) = graph
                .node(node.node_id)
                .map(|n| (n.kind.code(), n.description.as_str()))
                .unwrap_or(("?", ""));
            let repeat = !node.children.is_empty() && !expanded.insert(node.node_id);
            let _ = writeln!(
                out,
                "{:indent$}{} [{}] {}{}",
                "",
                node.node_id,
                kind,
                description,
                if repeat { " ^" } else { "" },
                indent = indent * 2
            );
            if repeat {
                continue;
            }
            for child in node.children.iter().rev() {
                stack.push((child, indent + 1));
            }
        }

        out
    }
}

/// The shortest trace to one node.
///
/// Serializes as the step table rather than the nested tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShortestTrace {
    pub node_id: NodeId,
    pub depth: usize,
    #[serde(skip)]
    pub trace: Arc<TraceNode>,
    pub steps: Vec<TraceStep>,
}

/// Computes shortest traces over one graph, memoizing per instance.
///
/// A finder is meant to live for a single analysis call; the memo is never
/// shared between calls.
pub struct TraceFinder<'g> {
    graph: &'g AttackGraph,
    max_depth: usize,
    memo: HashMap<usize, (usize, Arc<TraceNode>)>,
}

impl<'g> TraceFinder<'g> {
    pub fn new(graph: &'g AttackGraph, limits: &ResourceLimits) -> Self {
        Self {
            graph,
            max_depth: limits.max_trace_depth,
            memo: HashMap::new(),
        }
    }

    /// Shortest trace to `node_id`.
    pub fn shortest_trace(&mut self, node_id: NodeId) -> Result<ShortestTrace> {
        let root = self
            .graph
            .index_of(node_id)
            .ok_or(AnalyzeError::NodeNotFound { node_id })?;

        // (dense index, predecessors already pushed)
        let mut stack: Vec<(usize, bool)> = vec![(root, false)];

        while let Some((index, expanded)) = stack.pop() {
            if self.memo.contains_key(&index) {
                continue;
            }

            let node = self.graph.node_at(index);
            if node.kind == NodeKind::Primitive {
                self.memo
                    .insert(index, (0, Arc::new(TraceNode::leaf(node.id))));
                continue;
            }

            if !expanded {
                stack.push((index, true));
                for &pred in self.graph.predecessor_indices(index).iter().rev() {
                    if !self.memo.contains_key(&pred) {
                        stack.push((pred, false));
                    }
                }
                continue;
            }

            let entry = self.combine(index)?;
            self.memo.insert(index, entry);
        }

        let (depth, trace) = self.memo[&root].clone();
        Ok(ShortestTrace {
            node_id,
            depth,
            steps: trace.steps(),
            trace,
        })
    }

    /// Combine the memoized traces of a derived node's predecessors.
    fn combine(&self, index: usize) -> Result<(usize, Arc<TraceNode>)> {
        let node = self.graph.node_at(index);
        let preds = self.graph.predecessor_indices(index);

        let (depth, children) = match node.kind {
            NodeKind::Or => {
                // Strict comparison: the earliest predecessor wins ties.
                let mut best: Option<&(usize, Arc<TraceNode>)> = None;
                for pred in preds {
                    let candidate = &self.memo[pred];
                    if best.map_or(true, |b| candidate.0 < b.0) {
                        best = Some(candidate);
                    }
                }
                match best {
                    Some((d, child)) => (d + 1, vec![Arc::clone(child)]),
                    None => (0, Vec::new()),
                }
            }
            NodeKind::And => {
                let mut deepest = 0;
                let mut children = Vec::with_capacity(preds.len());
                for pred in preds {
                    let (d, child) = &self.memo[pred];
                    deepest = deepest.max(*d);
                    children.push(Arc::clone(child));
                }
                (deepest + 1, children)
            }
            NodeKind::Primitive => (0, Vec::new()),
        };

        if depth > self.max_depth {
            tracing::warn!(node = %node.id, depth, "Trace depth limit exceeded");
            return Err(AnalyzeError::ResourceExhausted {
                resource: "trace depth",
                limit: self.max_depth,
            });
        }

        Ok((
            depth,
            Arc::new(TraceNode {
                node_id: node.id,
                children,
            }),
        ))
    }
}

/// Shortest trace to a single node.
pub fn shortest_trace(
    graph: &AttackGraph,
    node_id: NodeId,
    limits: &ResourceLimits,
) -> Result<ShortestTrace> {
    TraceFinder::new(graph, limits).shortest_trace(node_id)
}

/// Shortest traces to every goal node, sharing one memo across goals.
pub fn shortest_traces_to_goals(
    graph: &AttackGraph,
    limits: &ResourceLimits,
) -> Result<Vec<ShortestTrace>> {
    let mut finder = TraceFinder::new(graph, limits);
    graph
        .goal_nodes()
        .into_iter()
        .map(|goal| finder.shortest_trace(goal))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(b: &mut iotag_graph::AttackGraphBuilder, id: u64) {
        b.add_node(NodeId(id), NodeKind::Primitive, format!("fact{id}"), 1.0)
            .unwrap();
    }

    fn derived(b: &mut iotag_graph::AttackGraphBuilder, id: u64, kind: NodeKind, preds: &[u64]) {
        b.add_node(NodeId(id), kind, format!("derived{id}"), 1.0).unwrap();
        for &p in preds {
            b.add_edge(NodeId(p), NodeId(id)).unwrap();
        }
    }

    /// Three branches of depth 3, 1 and 2 feeding node 100 of the given kind.
    ///
    /// ```text
    /// 1 -> 11(OR) -> 12(OR) -> 13(OR) ─┐
    /// 2 -> 21(OR) ─────────────────────┼─> 100
    /// 3 -> 31(OR) -> 32(OR) ───────────┘
    /// ```
    fn build_branches(kind: NodeKind) -> AttackGraph {
        let mut b = AttackGraph::builder();
        for id in [1, 2, 3] {
            leaf(&mut b, id);
        }
        derived(&mut b, 11, NodeKind::Or, &[1]);
        derived(&mut b, 12, NodeKind::Or, &[11]);
        derived(&mut b, 13, NodeKind::Or, &[12]);
        derived(&mut b, 21, NodeKind::Or, &[2]);
        derived(&mut b, 31, NodeKind::Or, &[3]);
        derived(&mut b, 32, NodeKind::Or, &[31]);
        derived(&mut b, 100, kind, &[13, 21, 32]);
        b.build().unwrap()
    }

    #[test]
    fn test_primitive_trace() {
        let graph = build_branches(NodeKind::Or);
        let trace = shortest_trace(&graph, NodeId(2), &ResourceLimits::default()).unwrap();
        assert_eq!(trace.depth, 0);
        assert!(trace.trace.children.is_empty());
        assert_eq!(trace.trace.node_id, NodeId(2));
    }

    #[test]
    fn test_or_takes_shallowest_predecessor() {
        let graph = build_branches(NodeKind::Or);
        let trace = shortest_trace(&graph, NodeId(100), &ResourceLimits::default()).unwrap();

        assert_eq!(trace.depth, 2);
        assert_eq!(trace.trace.children.len(), 1);
        assert_eq!(trace.trace.children[0].node_id, NodeId(21));
        assert_eq!(trace.trace.children[0].children[0].node_id, NodeId(2));
    }

    #[test]
    fn test_and_takes_deepest_and_keeps_all() {
        let graph = build_branches(NodeKind::And);
        let trace = shortest_trace(&graph, NodeId(100), &ResourceLimits::default()).unwrap();

        assert_eq!(trace.depth, 4);
        let children: Vec<_> = trace.trace.children.iter().map(|c| c.node_id).collect();
        assert_eq!(children, vec![NodeId(13), NodeId(21), NodeId(32)]);
    }

    #[test]
    fn test_or_tie_prefers_earliest_predecessor() {
        let mut b = AttackGraph::builder();
        leaf(&mut b, 1);
        leaf(&mut b, 2);
        derived(&mut b, 10, NodeKind::Or, &[2]);
        derived(&mut b, 11, NodeKind::Or, &[1]);
        derived(&mut b, 20, NodeKind::Or, &[10, 11]);
        let graph = b.build().unwrap();

        let trace = shortest_trace(&graph, NodeId(20), &ResourceLimits::default()).unwrap();
        assert_eq!(trace.depth, 2);
        assert_eq!(trace.trace.children[0].node_id, NodeId(10));
    }

    #[test]
    fn test_unknown_node() {
        let graph = build_branches(NodeKind::Or);
        let err = shortest_trace(&graph, NodeId(999), &ResourceLimits::default()).unwrap_err();
        assert!(matches!(err, AnalyzeError::NodeNotFound { node_id } if node_id == NodeId(999)));
    }

    #[test]
    fn test_depth_limit() {
        let graph = build_branches(NodeKind::And);
        let limits = ResourceLimits {
            max_trace_depth: 3,
            ..ResourceLimits::default()
        };
        let err = shortest_trace(&graph, NodeId(100), &limits).unwrap_err();
        assert!(matches!(
            err,
            AnalyzeError::ResourceExhausted { resource: "trace depth", limit: 3 }
        ));

        // The shallower goal stays within the limit.
        let ok = shortest_trace(&build_branches(NodeKind::Or), NodeId(100), &limits).unwrap();
        assert_eq!(ok.depth, 2);
    }

    #[test]
    fn test_shared_subtrees_are_memoized() {
        // A ladder of AND nodes where every rung depends on the previous rung
        // twice over (via two OR nodes). Without memoization the trace tree
        // would double in size per rung.
        let mut b = AttackGraph::builder();
        leaf(&mut b, 1);
        derived(&mut b, 2, NodeKind::Or, &[1]);
        let mut prev = 2;
        for rung in 0..40u64 {
            let left = 1000 + rung * 10;
            let right = left + 1;
            let join = left + 2;
            derived(&mut b, left, NodeKind::Or, &[prev]);
            derived(&mut b, right, NodeKind::Or, &[prev]);
            derived(&mut b, join, NodeKind::And, &[left, right]);
            prev = join;
        }
        let graph = b.build().unwrap();

        let trace = shortest_trace(&graph, NodeId(prev), &ResourceLimits::default()).unwrap();
        assert_eq!(trace.depth, 1 + 40 * 2);

        let left = &trace.trace.children[0].children[0];
        let right = &trace.trace.children[1].children[0];
        assert!(Arc::ptr_eq(left, right));
    }

    #[test]
    fn test_traces_to_goals() {
        let mut b = AttackGraph::builder();
        leaf(&mut b, 1);
        leaf(&mut b, 2);
        derived(&mut b, 10, NodeKind::Or, &[1]);
        derived(&mut b, 11, NodeKind::And, &[10, 2]);
        derived(&mut b, 12, NodeKind::Or, &[10]);
        let graph = b.build().unwrap();

        let traces = shortest_traces_to_goals(&graph, &ResourceLimits::default()).unwrap();
        let summary: Vec<_> = traces.iter().map(|t| (t.node_id, t.depth)).collect();
        assert_eq!(summary, vec![(NodeId(11), 2), (NodeId(12), 2)]);
    }

    #[test]
    fn test_render() {
        let mut b = AttackGraph::builder();
        leaf(&mut b, 1);
        leaf(&mut b, 2);
        derived(&mut b, 3, NodeKind::And, &[1, 2]);
        let graph = b.build().unwrap();

        let trace = shortest_trace(&graph, NodeId(3), &ResourceLimits::default()).unwrap();
        assert_eq!(
            trace.trace.render(&graph),
            "3 [AND] derived3\n  1 [LEAF] fact1\n  2 [LEAF] fact2\n"
        );
    }

    fn ladder(rungs: u64) -> (AttackGraph, NodeId) {
        let mut b = AttackGraph::builder();
        leaf(&mut b, 1);
        derived(&mut b, 2, NodeKind::Or, &[1]);
        let mut prev = 2;
        for rung in 0..rungs {
            let left = 1000 + rung * 10;
            derived(&mut b, left, NodeKind::Or, &[prev]);
            derived(&mut b, left + 1, NodeKind::Or, &[prev]);
            derived(&mut b, left + 2, NodeKind::And, &[left, left + 1]);
            prev = left + 2;
        }
        (b.build().unwrap(), NodeId(prev))
    }

    #[test]
    fn test_steps_list_each_node_once() {
        let (graph, top) = ladder(18);
        let trace = shortest_trace(&graph, top, &ResourceLimits::default()).unwrap();

        assert_eq!(trace.steps.len(), graph.node_count());
        assert_eq!(trace.steps[0].node_id, top);
        assert_eq!(
            trace.steps[0].children,
            vec![NodeId(1000 + 17 * 10), NodeId(1000 + 17 * 10 + 1)]
        );

        let json = serde_json::to_value(&trace).unwrap();
        assert_eq!(json["steps"].as_array().unwrap().len(), graph.node_count());
        assert!(json.get("trace").is_none());
    }

    #[test]
    fn test_render_expands_shared_subtrees_once() {
        let (graph, top) = ladder(18);
        let trace = shortest_trace(&graph, top, &ResourceLimits::default()).unwrap();
        let rendered = trace.trace.render(&graph);

        // Every node once, plus one back-reference per rung.
        assert_eq!(rendered.lines().count(), graph.node_count() + 18);
        assert_eq!(rendered.lines().filter(|l| l.ends_with(" ^")).count(), 18);
        assert!(rendered.lines().any(|l| l.trim_start() == "2 [OR] derived2 ^"));
    }
}

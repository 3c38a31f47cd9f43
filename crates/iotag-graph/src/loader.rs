//! Vertex and arc table loading.
//!
//! The attack-graph generator writes two comma-separated tables without a
//! header row:
//!
//! ```text
//! VERTICES: id,"description","AND|OR|LEAF",probability
//! ARCS:     destination_id,source_id,metadata
//! ```
//!
//! Descriptions are double-quoted and routinely contain commas. Loading is
//! all-or-nothing: any malformed row aborts the load.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use iotag_core::{NodeId, NodeKind};

use crate::error::{GraphError, Result};
use crate::graph::AttackGraph;

const VERTEX_FIELDS: usize = 4;
const ARC_FIELDS: usize = 3;

/// Marker the generator wraps around goal descriptions: `GOAL (<fact>)`.
const GOAL_MARKER: &str = "GOAL (";

/// A parsed row of the vertex table.
#[derive(Debug, Clone, PartialEq)]
struct VertexRow {
    id: NodeId,
    description: String,
    kind: NodeKind,
    probability: f64,
}

/// A parsed row of the arc table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ArcRow {
    destination: NodeId,
    source: NodeId,
}

/// Load an attack graph from vertex and arc table files.
pub fn load_graph(vertices: impl AsRef<Path>, arcs: impl AsRef<Path>) -> Result<AttackGraph> {
    let vertices = vertices.as_ref();
    let arcs = arcs.as_ref();
    tracing::debug!(vertices = %vertices.display(), arcs = %arcs.display(), "Loading attack graph");

    load_graph_from_readers(File::open(vertices)?, File::open(arcs)?)
}

/// Load an attack graph from any pair of readers.
pub fn load_graph_from_readers<V: Read, A: Read>(vertices: V, arcs: A) -> Result<AttackGraph> {
    let mut builder = AttackGraph::builder();

    for (row, record) in table_reader(vertices).records().enumerate() {
        let row = row + 1;
        let record = record.map_err(|e| record_error("vertices", row, e))?;
        let vertex = parse_vertex_record(row, &record)?;
        match builder.add_node(vertex.id, vertex.kind, vertex.description, vertex.probability) {
            Ok(_) => {}
            Err(GraphError::DuplicateNode { node_id }) => {
                return Err(format_error("vertices", row, format!("duplicate node id {node_id}")));
            }
            Err(e) => return Err(e),
        }
    }

    let mut duplicates = 0usize;
    for (row, record) in table_reader(arcs).records().enumerate() {
        let row = row + 1;
        let record = record.map_err(|e| record_error("arcs", row, e))?;
        let arc = parse_arc_record(row, &record)?;
        if !builder.add_edge(arc.source, arc.destination)? {
            duplicates += 1;
        }
    }
    if duplicates > 0 {
        tracing::debug!(duplicates, "Collapsed duplicate arcs");
    }

    let graph = builder.build()?;
    tracing::info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        goals = graph.goal_nodes().len(),
        "Attack graph loaded"
    );
    Ok(graph)
}

/// Strip the `GOAL (...)` wrapper from a description, if present.
pub fn unwrap_goal_marker(description: &str) -> &str {
    match description.strip_prefix(GOAL_MARKER) {
        Some(inner) if !inner.is_empty() => {
            let end = inner.char_indices().next_back().map_or(0, |(i, _)| i);
            &inner[..end]
        }
        _ => description,
    }
}

fn table_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

fn parse_vertex_record(row: usize, record: &csv::StringRecord) -> Result<VertexRow> {
    if record.len() != VERTEX_FIELDS {
        return Err(format_error("vertices", row, field_count_message(VERTEX_FIELDS, record.len())));
    }

    let id = parse_node_id(&record[0]).ok_or_else(|| {
        format_error("vertices", row, format!("invalid node id {:?}", &record[0]))
    })?;

    let code = &record[2];
    let kind = NodeKind::from_code(code).ok_or_else(|| GraphError::InvalidNodeType {
        node_id: id,
        code: code.to_string(),
    })?;

    let probability: f64 = record[3].parse().map_err(|_| {
        format_error("vertices", row, format!("invalid probability {:?}", &record[3]))
    })?;

    Ok(VertexRow {
        id,
        description: unwrap_goal_marker(&record[1]).to_string(),
        kind,
        probability,
    })
}

fn parse_arc_record(row: usize, record: &csv::StringRecord) -> Result<ArcRow> {
    if record.len() != ARC_FIELDS {
        return Err(format_error("arcs", row, field_count_message(ARC_FIELDS, record.len())));
    }

    let destination = parse_node_id(&record[0]).ok_or_else(|| {
        format_error("arcs", row, format!("invalid destination id {:?}", &record[0]))
    })?;
    let source = parse_node_id(&record[1]).ok_or_else(|| {
        format_error("arcs", row, format!("invalid source id {:?}", &record[1]))
    })?;

    Ok(ArcRow {
        destination,
        source,
    })
}

fn parse_node_id(field: &str) -> Option<NodeId> {
    field.parse::<u64>().ok().map(NodeId)
}

fn field_count_message(expected: usize, found: usize) -> String {
    format!("expected {expected} fields, found {found}")
}

/// A reader failure on one row is a format error; I/O failures stay `Csv`.
fn record_error(table: &'static str, row: usize, error: csv::Error) -> GraphError {
    if error.is_io_error() {
        return GraphError::Csv(error);
    }
    format_error(table, row, error.to_string())
}

fn format_error(table: &'static str, row: usize, message: String) -> GraphError {
    GraphError::Format {
        table,
        row,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[&str]) -> csv::StringRecord {
        csv::StringRecord::from(fields.to_vec())
    }

    #[test]
    fn test_unwrap_goal_marker() {
        assert_eq!(unwrap_goal_marker("GOAL (execCode(hub,root))"), "execCode(hub,root)");
        assert_eq!(unwrap_goal_marker("execCode(hub,root)"), "execCode(hub,root)");
        assert_eq!(unwrap_goal_marker("GOAL ("), "GOAL (");
        assert_eq!(unwrap_goal_marker("NOT A GOAL (x)"), "NOT A GOAL (x)");
    }

    #[test]
    fn test_parse_vertex_record() {
        let vertex =
            parse_vertex_record(1, &record(&["5", "vulExists(cam,'CVE-1')", "LEAF", "0.5"]))
                .unwrap();
        assert_eq!(vertex.id, NodeId(5));
        assert_eq!(vertex.kind, NodeKind::Primitive);
        assert_eq!(vertex.description, "vulExists(cam,'CVE-1')");
        assert!((vertex.probability - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_vertex_unwraps_goal() {
        let vertex =
            parse_vertex_record(1, &record(&["1", "GOAL (execCode(hub,root))", "OR", "0.12"]))
                .unwrap();
        assert_eq!(vertex.description, "execCode(hub,root)");
        assert_eq!(vertex.kind, NodeKind::Or);
    }

    #[test]
    fn test_parse_vertex_wrong_field_count() {
        let err = parse_vertex_record(3, &record(&["1", "x", "OR"])).unwrap_err();
        assert!(matches!(
            err,
            GraphError::Format { table: "vertices", row: 3, .. }
        ));
    }

    #[test]
    fn test_parse_vertex_bad_probability() {
        let err = parse_vertex_record(2, &record(&["1", "x", "OR", "high"])).unwrap_err();
        assert!(matches!(err, GraphError::Format { row: 2, .. }));
    }

    #[test]
    fn test_parse_vertex_bad_id() {
        let err = parse_vertex_record(1, &record(&["-1", "x", "OR", "0.1"])).unwrap_err();
        assert!(matches!(err, GraphError::Format { .. }));
    }

    #[test]
    fn test_parse_vertex_unknown_type() {
        let err = parse_vertex_record(1, &record(&["9", "x", "XOR", "0.1"])).unwrap_err();
        assert!(matches!(
            err,
            GraphError::InvalidNodeType { node_id, ref code } if node_id == NodeId(9) && code == "XOR"
        ));
    }

    #[test]
    fn test_parse_arc_record() {
        let arc = parse_arc_record(1, &record(&["2", "1", "-1"])).unwrap();
        assert_eq!(arc.destination, NodeId(2));
        assert_eq!(arc.source, NodeId(1));

        let err = parse_arc_record(4, &record(&["2", "1"])).unwrap_err();
        assert!(matches!(err, GraphError::Format { table: "arcs", row: 4, .. }));

        let err = parse_arc_record(5, &record(&["2", "one", "x"])).unwrap_err();
        assert!(matches!(err, GraphError::Format { table: "arcs", row: 5, .. }));
    }

    #[test]
    fn test_load_from_readers_quoted_descriptions() {
        let vertices = "1,\"vulExists(dev,'CVE-1')\",\"LEAF\",0.5\n2,\"derived\",\"OR\",0.5\n";
        let arcs = "2,1,\"rule\"\n";

        let graph = load_graph_from_readers(vertices.as_bytes(), arcs.as_bytes()).unwrap();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(
            graph.node(NodeId(1)).unwrap().description,
            "vulExists(dev,'CVE-1')"
        );
        assert_eq!(graph.goal_nodes(), vec![NodeId(2)]);
    }

    #[test]
    fn test_load_unknown_reference_fails() {
        let vertices = "1,\"a\",\"LEAF\",1.0\n";
        let arcs = "2,1,\"rule\"\n";

        let err = load_graph_from_readers(vertices.as_bytes(), arcs.as_bytes()).unwrap_err();
        assert!(matches!(err, GraphError::Reference { missing, .. } if missing == NodeId(2)));
    }

    #[test]
    fn test_load_duplicate_vertex_fails() {
        let vertices = "1,\"a\",\"LEAF\",1.0\n1,\"b\",\"OR\",1.0\n";
        let err = load_graph_from_readers(vertices.as_bytes(), "".as_bytes()).unwrap_err();
        assert!(matches!(err, GraphError::Format { table: "vertices", row: 2, .. }));
    }

    #[test]
    fn test_load_invalid_utf8_is_format_error() {
        let vertices: &[u8] = b"1,\"ok\",\"LEAF\",1.0\n2,\"bad\xff\",\"LEAF\",0.5\n";
        let err = load_graph_from_readers(vertices, "".as_bytes()).unwrap_err();
        assert!(matches!(err, GraphError::Format { table: "vertices", row: 2, .. }));

        let arcs: &[u8] = b"2,1,\"r\xffule\"\n";
        let vertices = "1,\"a\",\"LEAF\",1.0\n2,\"b\",\"OR\",1.0\n";
        let err = load_graph_from_readers(vertices.as_bytes(), arcs).unwrap_err();
        assert!(matches!(err, GraphError::Format { table: "arcs", row: 1, .. }));
    }
}

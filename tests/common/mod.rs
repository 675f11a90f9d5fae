//! Shared lookup helpers for integration tests. Mirrors the convenience the crate's own
//! `#[cfg(test)]` modules get from direct `GraphStore` access, but through the public
//! `LineageResult` surface the way an external caller would use it.

use tsql_lineage::graph::{ColumnNode, TableNode};
use tsql_lineage::{analyze, Dialect, Edge, EdgeKind, LineageRequest, LineageResult, Node, Operation};

pub fn run(sql: &str) -> LineageResult {
    let request = LineageRequest {
        sql: sql.to_string(),
        dialect: Dialect::MsSql,
        source_name: None,
        options: None,
        schema: None,
    };
    analyze(&request).expect("analysis should not fail for a well-formed script")
}

pub fn find_table<'a>(result: &'a LineageResult, name: &str) -> &'a TableNode {
    result
        .nodes
        .iter()
        .filter_map(Node::as_table)
        .find(|t| t.name.eq_ignore_ascii_case(name))
        .unwrap_or_else(|| panic!("expected a table node named '{name}', got: {:?}", table_names(result)))
}

pub fn table_names(result: &LineageResult) -> Vec<String> {
    result.nodes.iter().filter_map(Node::as_table).map(|t| t.name.clone()).collect()
}

pub fn find_column<'a>(result: &'a LineageResult, table: &str, column: &str) -> &'a ColumnNode {
    result
        .nodes
        .iter()
        .filter_map(Node::as_column)
        .find(|c| c.table_owner.eq_ignore_ascii_case(table) && c.name.eq_ignore_ascii_case(column))
        .unwrap_or_else(|| panic!("expected column '{table}.{column}', found columns: {:?}", column_names(result)))
}

pub fn try_find_column<'a>(result: &'a LineageResult, table: &str, column: &str) -> Option<&'a ColumnNode> {
    result
        .nodes
        .iter()
        .filter_map(Node::as_column)
        .find(|c| c.table_owner.eq_ignore_ascii_case(table) && c.name.eq_ignore_ascii_case(column))
}

pub fn column_names(result: &LineageResult) -> Vec<String> {
    result
        .nodes
        .iter()
        .filter_map(Node::as_column)
        .map(|c| format!("{}.{}", c.table_owner, c.name))
        .collect()
}

/// A table whose name matches the `Select_<uid>` pattern this crate's SELECT handler mints for
/// a query with no INSERT/CTE/SELECT-INTO target (§4.D "Handler: SELECT" step 1).
pub fn find_select_result<'a>(result: &'a LineageResult) -> &'a TableNode {
    result
        .nodes
        .iter()
        .filter_map(Node::as_table)
        .find(|t| t.name.starts_with("Select_"))
        .expect("expected a synthetic Select_<uid> result table")
}

pub fn edges_between<'a>(result: &'a LineageResult, source_id: &str, target_id: &str) -> Vec<&'a Edge> {
    result
        .edges
        .iter()
        .filter(|e| e.source_id == source_id && e.target_id == target_id)
        .collect()
}

pub fn has_edge(result: &LineageResult, source_id: &str, target_id: &str, kind: EdgeKind, operation: Operation) -> bool {
    result
        .edges
        .iter()
        .any(|e| e.source_id == source_id && e.target_id == target_id && e.kind == kind && e.operation == operation)
}

/// Every edge endpoint must reference a node that actually exists (§8 invariant 1).
pub fn assert_graph_integrity(result: &LineageResult) {
    let ids: std::collections::HashSet<&str> = result.nodes.iter().map(Node::id).collect();
    for edge in &result.edges {
        assert!(ids.contains(edge.source_id.as_str()), "dangling edge source: {edge:?}");
        assert!(ids.contains(edge.target_id.as_str()), "dangling edge target: {edge:?}");
    }
}

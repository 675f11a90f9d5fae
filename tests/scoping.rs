//! Alias/CTE scoping behavior, mirroring the crate's own `#[cfg(test)]` scope-stack unit tests
//! but exercised end to end through `analyze`.

mod common;

use common::*;
use tsql_lineage::{EdgeKind, Operation};

#[test]
fn alias_shadowing_in_a_correlated_exists_subquery_does_not_leak_outward() {
    let sql = "
        SELECT a.id
        FROM t1 AS a
        WHERE EXISTS (
            SELECT 1 FROM t2 AS a WHERE a.id = 10
        )
        AND a.id = 20
    ";
    let result = run(sql);
    assert_graph_integrity(&result);

    let t1 = find_table(&result, "t1");
    let t2 = find_table(&result, "t2");
    assert_ne!(t1.id, t2.id);

    // The outer `a.id` reference must resolve against t1, never t2, once the inner EXISTS
    // subquery's own `a` alias has gone out of scope.
    let t1_id_col = find_column(&result, "t1", "id");
    let t2_id_col = find_column(&result, "t2", "id");
    assert_ne!(t1_id_col.id, t2_id_col.id);

    let out = find_select_result(&result);
    let out_id = find_column(&result, &out.name, "id");
    assert!(has_edge(&result, &t1_id_col.id, &out_id.id, EdgeKind::Direct, Operation::Select));
}

#[test]
fn a_later_cte_can_reference_an_earlier_sibling_cte() {
    let sql = "
        WITH first AS (SELECT a FROM t),
             second AS (SELECT a FROM first)
        SELECT a FROM second
    ";
    let result = run(sql);
    assert_graph_integrity(&result);

    let t_a = find_column(&result, "t", "a");
    let first_a = find_column(&result, "first", "a");
    let second_a = find_column(&result, "second", "a");

    assert!(has_edge(&result, &t_a.id, &first_a.id, EdgeKind::Direct, Operation::Cte));
    assert!(has_edge(&result, &first_a.id, &second_a.id, EdgeKind::Direct, Operation::Cte));
}

#[test]
fn derived_table_alias_is_only_visible_inside_its_own_from_clause() {
    let sql = "SELECT d.a FROM (SELECT a FROM t) AS d";
    let result = run(sql);
    assert_graph_integrity(&result);

    let t_a = find_column(&result, "t", "a");
    let d_a = find_column(&result, "d", "a");
    assert!(has_edge(&result, &t_a.id, &d_a.id, EdgeKind::Direct, Operation::Select));

    // Two synthetic `Select_<id>` tables exist here: the derived table's own result (aliased
    // `d`) and the outer query's result. `find_select_result`'s "first match" would be
    // ambiguous, so pick the one that is not `d`'s own backing table.
    let out = result
        .nodes
        .iter()
        .filter_map(tsql_lineage::Node::as_table)
        .find(|t| t.name.starts_with("Select_") && !t.name.eq_ignore_ascii_case(&d_a.table_owner))
        .expect("expected a distinct outer Select_<uid> result table");
    let out_a = find_column(&result, &out.name, "a");
    assert!(has_edge(&result, &d_a.id, &out_a.id, EdgeKind::Direct, Operation::Select));
}

#[test]
fn multiple_visible_tables_with_no_qualifier_and_no_declared_match_is_left_unresolved() {
    // Neither t1 nor t2 declares `z` anywhere in the script, so an unqualified `z` is ambiguous
    // and must not silently attach to either one.
    let result = run("SELECT z FROM t1, t2");
    // Graph integrity must still hold even though this reference could not be resolved.
    assert_graph_integrity(&result);
    assert!(!result.issues.is_empty(), "an unresolved ambiguous column should surface as an issue");
}

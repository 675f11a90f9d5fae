//! Procedural handler scenarios: parameters, DECLARE/SET ownership, EXECUTE binding, and
//! IF/WHILE traversal.

mod common;

use common::*;
use tsql_lineage::{EdgeKind, Node, Operation, TableKind};

#[test]
fn procedure_parameters_are_attached_as_input_columns_of_the_procedure_table() {
    let result = run("CREATE PROCEDURE GetOrders @CustomerId INT AS SELECT * FROM orders WHERE CustomerId = @CustomerId");
    assert_graph_integrity(&result);

    let proc = find_table(&result, "GetOrders");
    assert_eq!(proc.kind, TableKind::StoredProcedure);

    let param = find_column(&result, "GetOrders", "CustomerId");
    assert_eq!(param.metadata.get("Direction").map(String::as_str), Some("Input"));
    assert!(proc.columns.iter().any(|id| id == &param.id));

    // The WHERE clause's `@CustomerId` reference must resolve back to this same declared
    // parameter, not lazily mint a spurious `@CustomerId` column on `orders` because the
    // parameter was never registered in the procedure body frame's `parameters` map.
    assert!(try_find_column(&result, "orders", "@CustomerId").is_none());
    assert!(try_find_column(&result, "orders", "CustomerId").is_none());
}

#[test]
fn execute_binds_actual_parameters_to_the_callees_declared_formal_names() {
    let result = run(
        "CREATE PROCEDURE GetOrders @CustomerId INT AS SELECT 1; EXECUTE GetOrders 42",
    );
    assert_graph_integrity(&result);

    let formal = find_column(&result, "GetOrders", "CustomerId");
    let execution = result
        .nodes
        .iter()
        .filter_map(Node::as_expression)
        .find(|e| e.name == "StoredProcedureExecution")
        .expect("EXECUTE should mint a StoredProcedureExecution expression node");

    assert!(has_edge(&result, &formal.id, &execution.id, EdgeKind::Direct, Operation::Execute));
}

#[test]
fn execute_without_a_known_procedure_falls_back_to_positional_param_names() {
    let result = run("EXECUTE UnknownProc 1, 2");
    assert_graph_integrity(&result);

    assert!(try_find_column(&result, "UnknownProc", "@Param1").is_some());
    assert!(try_find_column(&result, "UnknownProc", "@Param2").is_some());
}

#[test]
fn declare_with_initial_value_creates_a_variable_owned_by_the_enclosing_procedure() {
    let result = run("CREATE PROCEDURE P AS DECLARE @total INT = 0; SELECT @total AS t");
    assert_graph_integrity(&result);

    let variable = result
        .nodes
        .iter()
        .filter_map(Node::as_column)
        .find(|c| c.name.trim_start_matches('@').eq_ignore_ascii_case("total"))
        .expect("expected a variable column for @total");
    assert_eq!(variable.table_owner, "P");
}

#[test]
fn declare_outside_any_procedure_is_owned_by_the_variables_pseudo_table() {
    let result = run("DECLARE @x INT = 1");
    assert_graph_integrity(&result);

    let variable = result
        .nodes
        .iter()
        .filter_map(Node::as_column)
        .find(|c| c.name.trim_start_matches('@').eq_ignore_ascii_case("x"))
        .expect("expected a variable column for @x");
    assert_eq!(variable.table_owner, "Variables");
}

#[test]
fn if_branches_are_both_traversed_for_lineage() {
    let result = run("IF 1 = 1 SELECT a FROM t ELSE SELECT b FROM t");
    assert_graph_integrity(&result);

    assert!(try_find_column(&result, "t", "a").is_some(), "the IF branch should be traversed");
    assert!(try_find_column(&result, "t", "b").is_some(), "the ELSE branch should be traversed");
}

#[test]
fn while_body_is_traversed_once_for_lineage() {
    let result = run("WHILE 1 = 1 SELECT c FROM t");
    assert_graph_integrity(&result);

    assert!(try_find_column(&result, "t", "c").is_some());
}

//! Handler: INSERT (§4.D "Handler: INSERT").
//!
//! The VALUES and SELECT forms both flow through [`select::extract_query`] — a bare `VALUES
//! (...)` statement parses as a `Query` whose body is `SetExpr::Values`, so pointing the shared
//! target-table/target-columns machinery at it handles both forms without duplicating the
//! per-column linking logic.

use sqlparser::ast::Insert;

use crate::graph::Operation;

use super::{from, resolve_insert_target_columns, select, ExtractionContext};

pub fn extract_insert(insert: &Insert, ctx: &mut ExtractionContext<'_>) {
    let full_name = insert.table.to_string();
    let target_id = from::resolve_or_create_table(ctx, &full_name, None);

    let explicit_columns: Vec<String> = insert.columns.iter().map(|i| i.value.clone()).collect();
    let had_explicit_list = !explicit_columns.is_empty();
    let target_columns = resolve_insert_target_columns(ctx, &target_id, explicit_columns);
    ctx.scope.current_mut().flags.in_insert_column_list = had_explicit_list;
    ctx.scope.current_mut().insert_target_table = Some(target_id.clone());
    ctx.scope.current_mut().insert_target_columns = target_columns;
    ctx.scope.current_mut().insert_target_operation = Some(Operation::Insert);

    match &insert.source {
        Some(source) => {
            select::extract_query(source, ctx);
        }
        None => {
            // `INSERT INTO t DEFAULT VALUES` or a dialect-specific source this rewrite does not
            // model (e.g. `INSERT t EXEC proc`, which sqlparser's T-SQL support does not expose
            // as a structured AST shape): no source columns to link, target table still exists.
        }
    }

    ctx.scope.current_mut().insert_target_table = None;
    ctx.scope.current_mut().insert_target_columns.clear();
    ctx.scope.current_mut().insert_target_operation = None;
    ctx.scope.current_mut().flags.in_insert_column_list = false;
}

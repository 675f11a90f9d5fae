//! Handler: MERGE (§4.D "Handler: MERGE").
//!
//! Dispatches each `WHEN` clause by its action: `UPDATE` behaves like [`super::update`]'s
//! assignment handling tagged `merge-update`, `INSERT` like [`super::insert`]'s VALUES handling
//! tagged `merge-insert`, and `DELETE` produces no edges at all.

use sqlparser::ast::{
    Assignment, AssignmentTarget, Expr, MergeAction, MergeClause, MergeClauseKind, MergeInsertExpr,
    MergeInsertKind, TableFactor,
};

use crate::graph::Operation;
use crate::scope::FrameKind;

use super::expr::{link_value_into, resolve_only};
use super::{ensure_target_column, from, resolve_insert_target_columns, select, ExtractionContext};

pub fn extract_merge(
    table: &TableFactor,
    source: &TableFactor,
    on: &Expr,
    clauses: &[MergeClause],
    ctx: &mut ExtractionContext<'_>,
) {
    ctx.scope.push_frame(FrameKind::Merge);

    let target_id = resolve_table_factor(table, ctx);
    resolve_table_factor(source, ctx);

    ctx.scope.current_mut().flags.in_join_condition = true;
    resolve_only(ctx, on);
    ctx.scope.current_mut().flags.in_join_condition = false;

    if let Some(target_id) = target_id {
        for clause in clauses {
            ctx.scope.current_mut().flags.in_when_condition = true;
            if let Some(predicate) = &clause.predicate {
                resolve_only(ctx, predicate);
            }
            ctx.scope.current_mut().flags.in_when_condition = false;

            match (&clause.clause_kind, &clause.action) {
                (MergeClauseKind::Matched, MergeAction::Update { assignments }) => {
                    for assignment in assignments {
                        extract_merge_assignment(assignment, ctx, &target_id);
                    }
                }
                (_, MergeAction::Insert(insert_expr)) => {
                    extract_merge_insert(insert_expr, ctx, &target_id);
                }
                (_, MergeAction::Delete) => {
                    // Deleting a matched row carries no value-preserving flow (§4.D, same as
                    // DELETE's own handler).
                }
                _ => {}
            }
        }
    }

    ctx.scope.pop_frame();
}

fn resolve_table_factor(factor: &TableFactor, ctx: &mut ExtractionContext<'_>) -> Option<String> {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let full = name.to_string();
            let alias_name = alias.as_ref().map(|a| a.name.value.clone());
            Some(from::resolve_or_create_table(ctx, &full, alias_name.as_deref()))
        }
        TableFactor::Derived { subquery, alias, .. } => {
            let Ok(mut guard) = ctx.enter_nested() else { return None };
            let result = select::extract_query(subquery, &mut guard);
            if let (Some(id), Some(alias)) = (&result, alias) {
                from::register_derived_result(&mut guard, id, &alias.name.value);
            }
            result
        }
        _ => None,
    }
}

fn extract_merge_assignment(assignment: &Assignment, ctx: &mut ExtractionContext<'_>, target_table_id: &str) {
    let AssignmentTarget::ColumnName(name) = &assignment.target else {
        return;
    };
    let Some(part) = name.0.last() else { return };
    let column_name = part.to_string();
    let Some(col_id) = ensure_target_column(ctx, target_table_id, &column_name) else {
        return;
    };
    ctx.scope.current_mut().current_target_column = Some(col_id.clone());
    link_value_into(ctx, &assignment.value, "Assignment", &col_id, Operation::MergeUpdate, true);
    ctx.scope.current_mut().current_target_column = None;
}

fn extract_merge_insert(insert_expr: &MergeInsertExpr, ctx: &mut ExtractionContext<'_>, target_table_id: &str) {
    let explicit_columns: Vec<String> = insert_expr.columns.iter().map(|i| i.value.clone()).collect();
    let target_columns = resolve_insert_target_columns(ctx, target_table_id, explicit_columns);
    if target_columns.is_empty() {
        return;
    }
    if let MergeInsertKind::Values(values) = &insert_expr.kind {
        for row in &values.rows {
            for (position, expr) in row.iter().enumerate() {
                let Some(name) = target_columns.get(position) else { continue };
                let Some(col_id) = ensure_target_column(ctx, target_table_id, name) else {
                    continue;
                };
                link_value_into(ctx, expr, "InsertValue", &col_id, Operation::MergeInsert, true);
            }
        }
    }
}

//! Handlers: UPDATE and DELETE (§4.D "Handler: UPDATE" / "Handler: DELETE").

use sqlparser::ast::{Assignment, AssignmentTarget, Delete, Expr, FromTable, TableFactor, TableWithJoins, UpdateTableFromKind};

use crate::graph::Operation;
use crate::scope::FrameKind;

use super::expr::{link_value_into, resolve_only};
use super::{ensure_target_column, from, ExtractionContext};

pub fn extract_update(
    table: &TableWithJoins,
    assignments: &[Assignment],
    from_clause: Option<&UpdateTableFromKind>,
    selection: Option<&Expr>,
    ctx: &mut ExtractionContext<'_>,
) {
    ctx.scope.push_frame(FrameKind::Update);

    from::extract_table_with_joins(table, ctx);
    let target_table_id = target_table_from_relation(&table.relation, ctx);

    if let Some(from_kind) = from_clause {
        let tables: &[TableWithJoins] = match from_kind {
            UpdateTableFromKind::BeforeSet(ts) | UpdateTableFromKind::AfterSet(ts) => ts,
        };
        for twj in tables {
            from::extract_table_with_joins(twj, ctx);
        }
    }

    if let Some(target_id) = &target_table_id {
        ctx.scope.current_mut().flags.in_update_set_clause = true;
        for assignment in assignments {
            extract_assignment(assignment, ctx, target_id);
        }
        ctx.scope.current_mut().flags.in_update_set_clause = false;
    }

    if let Some(selection) = selection {
        ctx.scope.current_mut().flags.in_where_clause = true;
        resolve_only(ctx, selection);
        ctx.scope.current_mut().flags.in_where_clause = false;
    }

    ctx.scope.pop_frame();
}

fn target_table_from_relation(factor: &TableFactor, ctx: &ExtractionContext<'_>) -> Option<String> {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let full = name.to_string();
            let (_, short) = from::split_dotted_name(&full);
            let canonical = alias
                .as_ref()
                .and_then(|a| ctx.scope.resolve_alias(&a.name.value))
                .unwrap_or(short);
            ctx.graph.find_table_by_name(&canonical).map(|t| t.id.clone())
        }
        _ => None,
    }
}

fn extract_assignment(assignment: &Assignment, ctx: &mut ExtractionContext<'_>, target_table_id: &str) {
    let AssignmentTarget::ColumnName(name) = &assignment.target else {
        return;
    };
    let Some(part) = name.0.last() else { return };
    let column_name = part.to_string();

    let Some(col_id) = ensure_target_column(ctx, target_table_id, &column_name) else {
        return;
    };
    ctx.scope.current_mut().current_target_column = Some(col_id.clone());
    ctx.scope.current_mut().flags.processing_source_columns = true;
    link_value_into(ctx, &assignment.value, "Assignment", &col_id, Operation::Update, true);
    ctx.scope.current_mut().flags.processing_source_columns = false;
    ctx.scope.current_mut().current_target_column = None;
}

/// DELETE carries no value-preserving edges of its own (§4.D, mirroring MERGE's `WHEN
/// MATCHED...DELETE` clause): only the target and its sources are resolved, so `WHERE`/`USING`
/// column references don't produce spurious "unresolved reference" issues.
pub fn extract_delete(delete: &Delete, ctx: &mut ExtractionContext<'_>) {
    ctx.scope.push_frame(FrameKind::Delete);

    let tables: &[TableWithJoins] = match &delete.from {
        FromTable::WithFromKeyword(ts) | FromTable::WithoutKeyword(ts) => ts,
    };
    for twj in tables {
        from::extract_table_with_joins(twj, ctx);
    }
    if let Some(using) = &delete.using {
        for twj in using {
            from::extract_table_with_joins(twj, ctx);
        }
    }
    if let Some(selection) = &delete.selection {
        resolve_only(ctx, selection);
    }

    ctx.scope.pop_frame();
}

//! Handler: SELECT (§4.D "Handler: SELECT"), the core of lineage extraction — every other
//! handler that owns a query body (INSERT…SELECT, CTE bodies, SELECT INTO, MERGE's NOT
//! MATCHED…INSERT) delegates back into [`extract_query`].
//!
//! State machine per §4.D: push frame -> WITH -> FROM -> WHERE -> GROUP BY -> HAVING ->
//! SELECT list -> ORDER BY/OFFSET -> pop frame.

use sqlparser::ast::{
    GroupByExpr, Query, Select, SelectItem, SelectItemQualifiedWildcardKind, SetExpr, Values,
};

use crate::graph::{EdgeKind, ExpressionKind, Node, Operation, TableKind, TableNode, TABLE_PREFIX};
use crate::scope::FrameKind;

use super::expr::{emit_edge, link_value_into, propagate_column_type, resolve_only};
use super::{cte, from, ensure_target_column, ExtractionContext};

/// Runs a whole `Query` (its `WITH`, body, and trailing `ORDER BY`/`OFFSET`) as one fresh scope
/// frame. If the *parent* frame (the frame active when this is called) has `insertTargetTable`
/// or `selectIntoTable` set, that table — not a fresh `Select_<n>` result table — receives the
/// projected columns (§4.D step 1: "unless an insertTargetTable is set on the parent frame").
/// Returns the id of the table that ultimately received the projection, for callers that need to
/// register it under an alias (derived tables, CTEs).
pub fn extract_query(query: &Query, ctx: &mut ExtractionContext<'_>) -> Option<String> {
    let parent_target_table = ctx
        .scope
        .current()
        .insert_target_table
        .clone()
        .or_else(|| ctx.scope.current().select_into_table.clone());
    let parent_target_columns = ctx.scope.current().insert_target_columns.clone();
    let parent_target_operation = ctx.scope.current().insert_target_operation;

    let Ok(mut guard) = ctx.enter_nested() else { return None };

    guard.scope.push_frame(FrameKind::Select);
    if let Some(id) = &parent_target_table {
        guard.scope.current_mut().insert_target_table = Some(id.clone());
        guard.scope.current_mut().insert_target_columns = parent_target_columns.clone();
        guard.scope.current_mut().insert_target_operation = parent_target_operation;
    }

    cte::extract_with_clause(query.with.as_ref(), &mut guard);

    let operation = parent_target_operation.unwrap_or(Operation::Select);
    let result = extract_set_expr(&query.body, &mut guard, parent_target_table.as_deref(), &parent_target_columns, operation);

    if let Some(order_by) = &query.order_by {
        for item in &order_by.exprs {
            resolve_only(&mut guard, &item.expr);
        }
    }
    if let Some(offset) = &query.offset {
        resolve_only(&mut guard, &offset.value);
    }

    guard.scope.pop_frame();
    result
}

fn extract_set_expr(
    body: &SetExpr,
    ctx: &mut ExtractionContext<'_>,
    target_table_id: Option<&str>,
    target_columns: &[String],
    operation: Operation,
) -> Option<String> {
    match body {
        SetExpr::Select(select) => Some(extract_select_body(select, ctx, target_table_id, target_columns, operation)),
        SetExpr::SetOperation { left, right, .. } => {
            let result = extract_set_expr(left, ctx, target_table_id, target_columns, operation);
            extract_set_expr(right, ctx, target_table_id, target_columns, operation);
            result
        }
        SetExpr::Query(inner) => extract_query(inner, ctx),
        SetExpr::Values(values) => target_table_id.map(|id| {
            extract_values_into_target(values, ctx, id, target_columns, operation);
            id.to_string()
        }),
        _ => None,
    }
}

fn extract_values_into_target(
    values: &Values,
    ctx: &mut ExtractionContext<'_>,
    target_id: &str,
    target_columns: &[String],
    operation: Operation,
) {
    for row in &values.rows {
        for (position, expr) in row.iter().enumerate() {
            let name = target_columns
                .get(position)
                .cloned()
                .unwrap_or_else(|| format!("Col{}", position + 1));
            let Some(col_id) = ensure_target_column(ctx, target_id, &name) else { continue };
            link_value_into(ctx, expr, "InsertValue", &col_id, operation, true);
        }
    }
}

fn extract_select_body(
    select: &Select,
    ctx: &mut ExtractionContext<'_>,
    target_table_id: Option<&str>,
    target_columns: &[String],
    operation: Operation,
) -> String {
    let result_table_id = match target_table_id {
        Some(id) => id.to_string(),
        None => {
            let id = ctx.ids.next_id(TABLE_PREFIX);
            let node = TableNode::new(id.clone(), format!("Select_{id}"), TableKind::DerivedTable);
            ctx.graph.add_node(Node::Table(node), ctx.issues);
            id
        }
    };
    ctx.scope.current_mut().current_table_stack.push(result_table_id.clone());

    ctx.scope.current_mut().flags.in_from_clause = true;
    for twj in &select.from {
        from::extract_table_with_joins(twj, ctx);
    }
    ctx.scope.current_mut().flags.in_from_clause = false;

    if let Some(selection) = &select.selection {
        ctx.scope.current_mut().flags.in_where_clause = true;
        resolve_only(ctx, selection);
        ctx.scope.current_mut().flags.in_where_clause = false;
    }

    if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
        ctx.scope.current_mut().flags.in_group_by = true;
        for e in exprs {
            resolve_only(ctx, e);
        }
        ctx.scope.current_mut().flags.in_group_by = false;
    }

    if let Some(having) = &select.having {
        ctx.scope.current_mut().flags.in_having = true;
        resolve_only(ctx, having);
        ctx.scope.current_mut().flags.in_having = false;
    }

    ctx.scope.current_mut().flags.in_select_list = true;
    let mut position = 0usize;
    for item in &select.projection {
        extract_select_item(item, ctx, &result_table_id, target_columns, &mut position, operation);
    }
    ctx.scope.current_mut().flags.in_select_list = false;

    ctx.scope.current_mut().current_table_stack.pop();
    result_table_id
}

fn extract_select_item(
    item: &SelectItem,
    ctx: &mut ExtractionContext<'_>,
    result_table_id: &str,
    target_columns: &[String],
    position: &mut usize,
    operation: Operation,
) {
    match item {
        SelectItem::UnnamedExpr(expr) => {
            let name = target_columns
                .get(*position)
                .cloned()
                .unwrap_or_else(|| derive_column_name(expr, *position));
            extract_projection_column(expr, ctx, result_table_id, &name, operation);
            *position += 1;
        }
        SelectItem::ExprWithAlias { expr, alias } => {
            let name = target_columns
                .get(*position)
                .cloned()
                .unwrap_or_else(|| alias.value.clone());
            extract_projection_column(expr, ctx, result_table_id, &name, operation);
            *position += 1;
        }
        SelectItem::Wildcard(_) => {
            expand_wildcard(ctx, None, result_table_id, target_columns, position, operation);
        }
        SelectItem::QualifiedWildcard(kind, _) => {
            let qualifier = match kind {
                SelectItemQualifiedWildcardKind::ObjectName(name) => Some(name.to_string()),
                SelectItemQualifiedWildcardKind::Expr(expr) => Some(expr.to_string()),
            };
            expand_wildcard(ctx, qualifier.as_deref(), result_table_id, target_columns, position, operation);
        }
    }
}

/// Names an anonymous (non-aliased, non-bare-column) projection expression. Bare column
/// references keep their own name; everything else gets the same `Col<N>` placeholder scheme
/// used for CTE columns without an explicit list (§4.D CTE handler), for consistency across the
/// crate's naming of unnamed output columns.
fn derive_column_name(expr: &sqlparser::ast::Expr, position: usize) -> String {
    match super::expr::expr_to_parts(expr) {
        Some(parts) => parts.last().cloned().unwrap_or_else(|| format!("Col{}", position + 1)),
        None => format!("Col{}", position + 1),
    }
}

fn extract_projection_column(
    expr: &sqlparser::ast::Expr,
    ctx: &mut ExtractionContext<'_>,
    result_table_id: &str,
    name: &str,
    operation: Operation,
) {
    let Some(col_id) = ensure_target_column(ctx, result_table_id, name) else { return };
    ctx.scope.current_mut().current_target_column = Some(col_id.clone());
    let expr_id = link_value_into(ctx, expr, "SelectExpression", &col_id, operation, true);
    ctx.scope.current_mut().current_target_column = None;

    // A CTE's own projection list (§4.D "Handler: CTE": "otherwise create an
    // `ExpressionNode(kind=CteExpression)` with the same linking pattern as SELECT elements")
    // gets a construct-specific node kind/name rather than `link_value_into`'s generic
    // structural classification; retag the node it just minted, mirroring the EXECUTE
    // handler's retagging of `ParameterValue`.
    if operation == Operation::Cte {
        if let Some(expr_id) = expr_id {
            if let Some(Node::Expression(e)) = ctx.graph.get_node_by_id_mut(&expr_id) {
                e.expression_kind = ExpressionKind::CteExpression;
                e.name = "CteExpression".to_string();
            }
        }
    }
}

/// Expands `*` / `t.*` by copying every visible source column into a newly attached target
/// column of the same name (§4.D "SELECT * / t.* wildcard expansion"). Unqualified `*` expands
/// every table visible in the current frame's FROM clause, in a stable (sorted) order since the
/// scope stack's table map does not preserve FROM's left-to-right order.
fn expand_wildcard(
    ctx: &mut ExtractionContext<'_>,
    qualifier: Option<&str>,
    result_table_id: &str,
    target_columns: &[String],
    position: &mut usize,
    operation: Operation,
) {
    let table_names: Vec<String> = if let Some(q) = qualifier {
        let canonical = ctx.scope.resolve_alias(q).unwrap_or_else(|| q.to_string());
        vec![canonical]
    } else {
        let mut names: Vec<String> = ctx.scope.current().visible_tables.keys().cloned().collect();
        names.sort();
        names
    };

    for table_name in table_names {
        let columns: Vec<(String, String)> = match ctx.graph.find_table_by_name(&table_name) {
            Some(t) => t
                .columns
                .iter()
                .filter_map(|cid| {
                    ctx.graph
                        .get_node_by_id(cid)
                        .and_then(Node::as_column)
                        .map(|c| (cid.clone(), c.name.clone()))
                })
                .collect(),
            None => continue,
        };

        for (source_col_id, source_col_name) in columns {
            let target_name = target_columns
                .get(*position)
                .cloned()
                .unwrap_or(source_col_name);
            if let Some(target_col_id) = ensure_target_column(ctx, result_table_id, &target_name) {
                let text = format!("{table_name}.*");
                emit_edge(ctx, &source_col_id, &target_col_id, EdgeKind::Direct, operation, &text);
                propagate_column_type(ctx, &source_col_id, &target_col_id);
            }
            *position += 1;
        }
    }
}

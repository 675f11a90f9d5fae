//! Expression-tree traversal shared by every statement handler (§4.D "Extraction").
//!
//! Column-reference extraction is an explicit worklist over borrowed `Expr` nodes rather than a
//! recursive function (§9 "Reimplement ExtractColumnReferences as an explicit worklist") so a
//! deeply nested expression cannot blow the native call stack; `ExtractionContext::enter_nested`
//! guards the separate, statement-level recursion (subqueries, CTEs, procedure bodies).

use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, FunctionArguments, OrderByExpr, WindowFrameBound,
    WindowType,
};

use crate::graph::{Edge, EdgeKind, EXPR_PREFIX, ExpressionKind, ExpressionNode, Node, Operation};
use crate::scope::{resolve_column_reference, ColumnResolution};

use super::ExtractionContext;

/// Turns a bare or qualified column reference into its dotted identifier parts (§4.B "a column
/// reference `a.b.c.d`"). Returns `None` for anything that isn't an identifier chain.
pub fn expr_to_parts(expr: &Expr) -> Option<Vec<String>> {
    match expr {
        Expr::Identifier(ident) => Some(vec![ident.value.clone()]),
        Expr::CompoundIdentifier(parts) => Some(parts.iter().map(|i| i.value.clone()).collect()),
        _ => None,
    }
}

/// A [`Expr::Identifier`]/[`Expr::CompoundIdentifier`] is the only shape the SELECT-element and
/// INSERT…VALUES handlers treat as "simple" (§4.D: "If expression is a bare
/// `ColumnReferenceExpression`").
pub fn is_bare_column_ref(expr: &Expr) -> bool {
    matches!(expr, Expr::Identifier(_) | Expr::CompoundIdentifier(_))
}

fn is_variable_reference(parts: &[String]) -> bool {
    parts.len() == 1 && parts[0].starts_with('@')
}

/// Resolves already-split identifier parts to a node id: a variable/parameter if the sole part
/// starts with `@`, otherwise a column via [`resolve_column_reference`] (§4.B name-resolution
/// algorithm, including variables/parameters as the final fallback).
pub fn resolve_and_link_parts(ctx: &mut ExtractionContext<'_>, parts: &[String]) -> Option<String> {
    if is_variable_reference(parts) {
        if let Some(id) = ctx.scope.resolve_variable(&parts[0]) {
            return Some(id);
        }
        if let Some(id) = ctx.scope.resolve_parameter(&parts[0]) {
            return Some(id);
        }
    }
    match resolve_column_reference(ctx.scope, ctx.graph, ctx.ids, parts, ctx.issues) {
        ColumnResolution::Resolved(id) => Some(id),
        ColumnResolution::Unresolved => None,
    }
}

/// Resolves a single expression as a column/variable/parameter reference, or `None` if it isn't
/// an identifier chain at all.
pub fn resolve_expr(ctx: &mut ExtractionContext<'_>, expr: &Expr) -> Option<String> {
    let parts = expr_to_parts(expr)?;
    resolve_and_link_parts(ctx, &parts)
}

/// Collects every leaf column/variable reference inside `expr`, exhaustively across the
/// constructs enumerated in §4.D "Extraction": binary arithmetic, unary, parenthesis, function
/// calls (not their OVER clause — see [`collect_window_refs`]), CASE (searched and simple,
/// including WHEN condition booleans), COALESCE/NULLIF (both parsed as function calls), CAST,
/// CONVERT, and boolean predicates (comparison via BinaryOp, NOT, IS NULL family, BETWEEN, IN
/// with subquery or value list, LIKE with escape pattern).
pub fn collect_column_refs(expr: &Expr) -> Vec<&Expr> {
    let mut out = Vec::new();
    let mut stack = vec![expr];
    while let Some(e) = stack.pop() {
        match e {
            Expr::Identifier(_) | Expr::CompoundIdentifier(_) => out.push(e),
            Expr::BinaryOp { left, right, .. } => {
                stack.push(left);
                stack.push(right);
            }
            Expr::UnaryOp { expr, .. } => stack.push(expr),
            Expr::Nested(inner) => stack.push(inner),
            Expr::Cast { expr, .. } | Expr::TryCast { expr, .. } | Expr::Convert { expr, .. } => {
                stack.push(expr);
            }
            Expr::Extract { expr, .. } => stack.push(expr),
            Expr::Collate { expr, .. } => stack.push(expr),
            Expr::CompositeAccess { expr, .. } => stack.push(expr),
            Expr::Case { operand, conditions, results, else_result } => {
                if let Some(operand) = operand {
                    stack.push(operand);
                }
                for cond in conditions {
                    stack.push(cond);
                }
                for res in results {
                    stack.push(res);
                }
                if let Some(else_result) = else_result {
                    stack.push(else_result);
                }
            }
            Expr::Function(func) => {
                if let FunctionArguments::List(list) = &func.args {
                    for arg in &list.args {
                        if let Some(inner) = function_arg_expr(arg) {
                            stack.push(inner);
                        }
                    }
                }
                // OVER clause refs are linked separately with their own operations by the
                // caller via `collect_window_refs`, tagged `partition | order | windowFrame`
                // rather than the generic `reference`.
            }
            Expr::Between { expr, low, high, .. } => {
                stack.push(expr);
                stack.push(low);
                stack.push(high);
            }
            Expr::InList { expr, list, .. } => {
                stack.push(expr);
                for item in list {
                    stack.push(item);
                }
            }
            Expr::InSubquery { expr, .. } => stack.push(expr),
            Expr::IsNull(e)
            | Expr::IsNotNull(e)
            | Expr::IsTrue(e)
            | Expr::IsNotTrue(e)
            | Expr::IsFalse(e)
            | Expr::IsNotFalse(e)
            | Expr::IsUnknown(e)
            | Expr::IsNotUnknown(e) => stack.push(e),
            Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
                stack.push(expr);
                stack.push(pattern);
            }
            Expr::Tuple(exprs) => {
                for e in exprs {
                    stack.push(e);
                }
            }
            Expr::AnyOp { left, right, .. } | Expr::AllOp { left, right, .. } => {
                stack.push(left);
                stack.push(right);
            }
            // A subquery's internal column references are resolved when that subquery is
            // traversed as its own Select frame, not flattened into the parent expression's refs.
            Expr::Subquery(_) | Expr::Exists { .. } => {}
            _ => {}
        }
    }
    out
}

fn function_arg_expr(arg: &FunctionArg) -> Option<&Expr> {
    match arg {
        FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => Some(e),
        FunctionArg::Named { arg: FunctionArgExpr::Expr(e), .. } => Some(e),
        FunctionArg::ExprNamed { arg: FunctionArgExpr::Expr(e), .. } => Some(e),
        _ => None,
    }
}

/// Operation tag to use for one of the three window-clause reference groups.
#[derive(Clone, Copy)]
pub enum WindowRefGroup {
    Partition,
    Order,
    Frame,
}

impl WindowRefGroup {
    pub fn operation(self) -> Operation {
        match self {
            WindowRefGroup::Partition => Operation::Partition,
            WindowRefGroup::Order => Operation::Order,
            WindowRefGroup::Frame => Operation::WindowFrame,
        }
    }
}

/// Collects PARTITION BY / ORDER BY / frame-bound column references from a function's OVER
/// clause, tagged by which group they came from (§4.D "Window functions (OVER clause)").
pub fn collect_window_refs(over: &WindowType) -> Vec<(WindowRefGroup, &Expr)> {
    let mut out = Vec::new();
    if let WindowType::WindowSpec(spec) = over {
        for e in &spec.partition_by {
            out.push((WindowRefGroup::Partition, e));
        }
        for ob in &spec.order_by {
            out.push((WindowRefGroup::Order, order_by_expr(ob)));
        }
        if let Some(frame) = &spec.window_frame {
            if let Some(e) = frame_bound_expr(&frame.start_bound) {
                out.push((WindowRefGroup::Frame, e));
            }
            if let Some(end) = &frame.end_bound {
                if let Some(e) = frame_bound_expr(end) {
                    out.push((WindowRefGroup::Frame, e));
                }
            }
        }
    }
    out
}

fn order_by_expr(ob: &OrderByExpr) -> &Expr {
    &ob.expr
}

fn frame_bound_expr(bound: &WindowFrameBound) -> Option<&Expr> {
    match bound {
        WindowFrameBound::Preceding(Some(e)) | WindowFrameBound::Following(Some(e)) => Some(e),
        _ => None,
    }
}

/// Structurally classifies an expression into one of §3's `ExpressionKind` variants. COALESCE
/// and NULLIF have no dedicated AST node — the underlying parser represents them as ordinary
/// function calls — so they're recognized here by callee name.
pub fn classify_expression_kind(expr: &Expr) -> ExpressionKind {
    match expr {
        Expr::Case { .. } => ExpressionKind::Case,
        Expr::Cast { .. } | Expr::TryCast { .. } => ExpressionKind::Cast,
        Expr::Convert { .. } => ExpressionKind::Convert,
        Expr::Nested(_) => ExpressionKind::Grouped,
        Expr::UnaryOp { .. } => ExpressionKind::Unary,
        Expr::BinaryOp { .. } => ExpressionKind::Calculation,
        Expr::Function(f) => match f.name.to_string().to_uppercase().as_str() {
            "COALESCE" => ExpressionKind::Coalesce,
            "NULLIF" => ExpressionKind::NullIf,
            _ => ExpressionKind::Function,
        },
        _ => ExpressionKind::Calculation,
    }
}

/// Creates an `ExpressionNode` for `expr` (kind chosen structurally), wires it to `target_id`
/// with `operation`, emits `Indirect(ref → expr, operation=reference)` for every leaf column
/// reference found inside it, and — if `expr` is a window function — additionally emits the
/// partition/order/frame indirect edges tagged per §4.D. Returns the new expression node's id.
pub fn classify_and_link_expression(
    ctx: &mut ExtractionContext<'_>,
    expr: &Expr,
    expr_kind_name: &str,
    target_id: &str,
    operation: Operation,
) -> String {
    process_nested_subqueries(ctx, expr);
    let kind = classify_expression_kind(expr);
    let sql_text = expr.to_string();
    let expr_id = ctx.ids.next_id(EXPR_PREFIX);
    let node = ExpressionNode::new(expr_id.clone(), expr_kind_name, kind, sql_text.clone());
    ctx.graph.add_node(Node::Expression(node), ctx.issues);

    emit_edge(ctx, &expr_id, target_id, EdgeKind::Direct, operation, &sql_text);

    for leaf in collect_column_refs(expr) {
        if let Some(parts) = expr_to_parts(leaf) {
            if let Some(source_id) = resolve_and_link_parts(ctx, &parts) {
                emit_edge(ctx, &source_id, &expr_id, EdgeKind::Indirect, Operation::Reference, &leaf.to_string());
            }
        }
    }

    if let Expr::Function(func) = expr {
        if let Some(over) = &func.over {
            if let Some(Node::Expression(e)) = ctx.graph.get_node_by_id_mut(&expr_id) {
                e.mark_window_function();
            }
            for (group, leaf) in collect_window_refs(over) {
                if let Some(parts) = expr_to_parts(leaf) {
                    if let Some(source_id) = resolve_and_link_parts(ctx, &parts) {
                        emit_edge(
                            ctx,
                            &source_id,
                            &expr_id,
                            EdgeKind::Indirect,
                            group.operation(),
                            &leaf.to_string(),
                        );
                    }
                }
            }
        }
    }

    expr_id
}

/// The common "bare column ref or build an expression node" branch used by SELECT elements,
/// INSERT…VALUES, DEFAULT/computed columns, and assignments (§4.D, multiple handlers). When
/// `expr` is a bare column reference the source column's declared type is propagated onto the
/// target if the target's type is still unknown and `propagate_type` is set.
/// Returns the id of the `ExpressionNode` it created, or `None` when `expr` was a bare column
/// reference linked directly (no intermediate node minted). Callers that need to retag a
/// structurally-classified node's kind for a construct-specific shape (e.g. CTE projections,
/// §4.D "Handler: CTE") use this to find the node to retag.
pub fn link_value_into(
    ctx: &mut ExtractionContext<'_>,
    expr: &Expr,
    expr_kind_name: &str,
    target_id: &str,
    operation: Operation,
    propagate_type: bool,
) -> Option<String> {
    if is_bare_column_ref(expr) {
        if let Some(source_id) = resolve_expr(ctx, expr) {
            emit_edge(ctx, &source_id, target_id, EdgeKind::Direct, operation, &expr.to_string());
            if propagate_type {
                propagate_column_type(ctx, &source_id, target_id);
            }
            return None;
        }
    }
    Some(classify_and_link_expression(ctx, expr, expr_kind_name, target_id, operation))
}

/// Copies `source`'s declared type onto `target` if `target`'s type is still "unknown"
/// (§4.D SELECT element handler, §3 ColumnNode.dataType).
pub fn propagate_column_type(ctx: &mut ExtractionContext<'_>, source_id: &str, target_id: &str) {
    let source_type = ctx
        .graph
        .get_node_by_id(source_id)
        .and_then(Node::as_column)
        .map(|c| c.data_type.clone());
    let Some(source_type) = source_type else { return };
    if let Some(Node::Column(target)) = ctx.graph.get_node_by_id_mut(target_id) {
        if target.data_type == "unknown" && source_type != "unknown" {
            target.data_type = source_type;
        }
    }
}

fn collect_subqueries<'e>(expr: &'e Expr, out: &mut Vec<&'e sqlparser::ast::Query>) {
    let mut stack = vec![expr];
    while let Some(e) = stack.pop() {
        match e {
            Expr::Subquery(q) => out.push(q),
            Expr::Exists { subquery, .. } => out.push(subquery),
            Expr::InSubquery { subquery, expr: inner, .. } => {
                out.push(subquery);
                stack.push(inner);
            }
            Expr::BinaryOp { left, right, .. } => {
                stack.push(left);
                stack.push(right);
            }
            Expr::UnaryOp { expr, .. }
            | Expr::Nested(expr)
            | Expr::Cast { expr, .. }
            | Expr::TryCast { expr, .. }
            | Expr::Convert { expr, .. }
            | Expr::Extract { expr, .. }
            | Expr::Collate { expr, .. }
            | Expr::CompositeAccess { expr, .. } => stack.push(expr),
            Expr::Case { operand, conditions, results, else_result } => {
                if let Some(operand) = operand {
                    stack.push(operand);
                }
                for cond in conditions {
                    stack.push(cond);
                }
                for res in results {
                    stack.push(res);
                }
                if let Some(else_result) = else_result {
                    stack.push(else_result);
                }
            }
            Expr::Function(func) => {
                if let FunctionArguments::List(list) = &func.args {
                    for arg in &list.args {
                        if let Some(inner) = function_arg_expr(arg) {
                            stack.push(inner);
                        }
                    }
                }
            }
            Expr::Between { expr, low, high, .. } => {
                stack.push(expr);
                stack.push(low);
                stack.push(high);
            }
            Expr::InList { expr, list, .. } => {
                stack.push(expr);
                for item in list {
                    stack.push(item);
                }
            }
            Expr::IsNull(e)
            | Expr::IsNotNull(e)
            | Expr::IsTrue(e)
            | Expr::IsNotTrue(e)
            | Expr::IsFalse(e)
            | Expr::IsNotFalse(e)
            | Expr::IsUnknown(e)
            | Expr::IsNotUnknown(e) => stack.push(e),
            Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
                stack.push(expr);
                stack.push(pattern);
            }
            Expr::Tuple(exprs) => {
                for e in exprs {
                    stack.push(e);
                }
            }
            Expr::AnyOp { left, right, .. } | Expr::AllOp { left, right, .. } => {
                stack.push(left);
                stack.push(right);
            }
            _ => {}
        }
    }
}

/// Recurses into every subquery nested inside `expr` (correlated or not) as its own SELECT frame
/// (§4.D: "a subquery's internal column references are resolved when that subquery is traversed
/// as its own Select frame", not flattened into the parent expression).
pub fn process_nested_subqueries(ctx: &mut ExtractionContext<'_>, expr: &Expr) {
    let mut found = Vec::new();
    collect_subqueries(expr, &mut found);
    for query in found {
        let Ok(mut guard) = ctx.enter_nested() else { continue };
        super::select::extract_query(query, &mut guard);
    }
}

/// Resolves every leaf column/variable reference inside `expr` without emitting any edge, and
/// recurses into nested subqueries. Used for clauses that influence row selection but do not
/// themselves flow values anywhere (`WHERE`, `GROUP BY`, `HAVING`, `ORDER BY` — §4.D "(no edge...
/// but resolved and no warning)").
pub fn resolve_only(ctx: &mut ExtractionContext<'_>, expr: &Expr) {
    process_nested_subqueries(ctx, expr);
    for leaf in collect_column_refs(expr) {
        if let Some(parts) = expr_to_parts(leaf) {
            resolve_and_link_parts(ctx, &parts);
        }
    }
}

/// Inserts an edge with a freshly generated id, regardless of kind/operation. Thin wrapper
/// shared by every handler so edge construction stays one-liner at call sites.
pub fn emit_edge(
    ctx: &mut ExtractionContext<'_>,
    source_id: &str,
    target_id: &str,
    kind: EdgeKind,
    operation: Operation,
    sql_expression: &str,
) {
    let id = ctx.ids.next_id(crate::graph::EDGE_PREFIX);
    let edge = Edge::new(id, source_id, target_id, kind, operation, sql_expression);
    ctx.graph.add_edge(edge, ctx.issues);
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::MsSqlDialect;
    use sqlparser::parser::Parser;

    fn parse_expr(sql: &str) -> Expr {
        let full = format!("SELECT {sql}");
        let stmts = Parser::parse_sql(&MsSqlDialect {}, &full).unwrap();
        match &stmts[0] {
            Statement::Query(q) => match q.body.as_ref() {
                sqlparser::ast::SetExpr::Select(select) => match &select.projection[0] {
                    sqlparser::ast::SelectItem::UnnamedExpr(e) => e.clone(),
                    sqlparser::ast::SelectItem::ExprWithAlias { expr, .. } => expr.clone(),
                    _ => panic!("not an expr"),
                },
                _ => panic!("not a select"),
            },
            _ => panic!("not a query"),
        }
    }

    use sqlparser::ast::Statement;

    #[test]
    fn collects_refs_from_binary_arithmetic() {
        let expr = parse_expr("p + q");
        let refs = collect_column_refs(&expr);
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn collects_refs_from_case_including_when_condition() {
        let expr = parse_expr("CASE WHEN a > 0 THEN b ELSE c END");
        let refs = collect_column_refs(&expr);
        assert_eq!(refs.len(), 3, "expected a, b, c");
    }

    #[test]
    fn classifies_coalesce_by_function_name() {
        let expr = parse_expr("COALESCE(a, b)");
        assert_eq!(classify_expression_kind(&expr), ExpressionKind::Coalesce);
    }

    #[test]
    fn classifies_cast_and_binary_op() {
        assert_eq!(classify_expression_kind(&parse_expr("CAST(a AS INT)")), ExpressionKind::Cast);
        assert_eq!(classify_expression_kind(&parse_expr("a + 1")), ExpressionKind::Calculation);
    }

    #[test]
    fn bare_column_ref_is_not_a_complex_expression() {
        assert!(is_bare_column_ref(&parse_expr("a")));
        assert!(is_bare_column_ref(&parse_expr("t.a")));
        assert!(!is_bare_column_ref(&parse_expr("a + 1")));
    }
}

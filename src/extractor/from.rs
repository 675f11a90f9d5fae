//! Handler: FROM clause and JOINs (§4.D "Handler: FROM / JOIN").
//!
//! Resolves each `TableFactor` to a [`TableNode`] (creating it lazily if this is the first
//! sighting of a base table), registers aliases on the current frame, and — for a qualified
//! join condition — extracts top-level `AND`-connected equality terms between two different
//! tables and emits bidirectional `join` edges for each (§3 Edge: "join" is emitted from both
//! columns toward each other, not source->target in a single direction).

use sqlparser::ast::{
    BinaryOperator, Expr, Join, JoinConstraint, JoinOperator, TableFactor, TableWithJoins,
};

use crate::graph::{EdgeKind, JoinKind, Node, Operation, TableKind, TableNode, TABLE_PREFIX};

use super::expr::{emit_edge, expr_to_parts, resolve_and_link_parts};
use super::select;
use super::ExtractionContext;

/// Splits a dotted object name (as rendered by `ObjectName::to_string`) into `(schema, name)`,
/// right-to-left: the last segment is the table name, everything before it is the schema path.
pub fn split_dotted_name(full: &str) -> (Option<String>, String) {
    match full.rsplit_once('.') {
        Some((schema, name)) => (Some(schema.to_string()), name.to_string()),
        None => (None, full.to_string()),
    }
}

fn table_kind_for_name(name: &str) -> TableKind {
    if name.starts_with('#') {
        TableKind::TempTable
    } else if name.starts_with('@') {
        TableKind::TableVariable
    } else {
        TableKind::BaseTable
    }
}

/// Finds or creates the [`TableNode`] for `full_name`, preferring (in order) a CTE already
/// registered under that name, then an existing table node of any kind, then a freshly created
/// one. Registers `full_name` (and `alias`, if given) as visible on the current frame.
pub fn resolve_or_create_table(ctx: &mut ExtractionContext<'_>, full_name: &str, alias: Option<&str>) -> String {
    let (schema, name) = split_dotted_name(full_name);

    let table_id = if let Some(cte_id) = ctx.scope.resolve_cte(&name) {
        cte_id
    } else if let Some(existing) = ctx.graph.find_table_by_name(&name) {
        existing.id.clone()
    } else {
        // §5 "identifier strings ... are interned to reduce working set": a table referenced
        // from many FROM clauses across a script shares one backing allocation in the interner.
        let interned_name = ctx.interner.intern(&name);
        let id = ctx.ids.next_id(TABLE_PREFIX);
        let mut node = TableNode::new(id.clone(), interned_name.as_ref(), table_kind_for_name(&name));
        if let Some(schema) = &schema {
            node = node.with_schema(schema.clone());
        }
        ctx.graph.add_node(Node::Table(node), ctx.issues);
        id
    };

    ctx.scope.current_mut().register_table(&name, &table_id);
    if let Some(alias) = alias {
        ctx.scope.current_mut().register_alias(alias, &name);
    }
    table_id
}

/// Makes a derived table's (sub)query result visible under its `AS alias` on the current frame.
/// The result table's own synthetic name (`Select_<id>`, see `select::extract_select_body`) is
/// the canonical name columns are keyed by, so `alias` must map to *that*, the same way
/// [`resolve_or_create_table`] registers a real table's name alongside its alias.
pub fn register_derived_result(ctx: &mut ExtractionContext<'_>, table_id: &str, alias: &str) {
    let canonical_name = ctx
        .graph
        .get_node_by_id(table_id)
        .and_then(Node::as_table)
        .map(|t| t.name.clone())
        .unwrap_or_else(|| table_id.to_string());

    ctx.scope.current_mut().register_table(&canonical_name, table_id);
    ctx.scope.current_mut().register_alias(alias, &canonical_name);
}

/// Walks one `FROM`/`JOIN` chain: the base relation, then each join's relation and condition.
pub fn extract_table_with_joins(twj: &TableWithJoins, ctx: &mut ExtractionContext<'_>) {
    extract_table_factor(&twj.relation, ctx);
    for join in &twj.joins {
        extract_join(join, ctx);
    }
}

fn extract_table_factor(factor: &TableFactor, ctx: &mut ExtractionContext<'_>) {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let full_name = name.to_string();
            let alias_name = alias.as_ref().map(|a| a.name.value.clone());
            resolve_or_create_table(ctx, &full_name, alias_name.as_deref());
        }
        TableFactor::Derived { subquery, alias, .. } => {
            let Ok(mut guard) = ctx.enter_nested() else { return };
            let result_table = select::extract_query(subquery, &mut guard);
            if let (Some(table_id), Some(alias)) = (result_table, alias) {
                let alias_name = alias.name.value.clone();
                register_derived_result(&mut guard, &table_id, &alias_name);
            }
        }
        TableFactor::NestedJoin { table_with_joins, alias, .. } => {
            extract_table_with_joins(table_with_joins, ctx);
            // A nested join has no name of its own to register beyond its alias, which SQL
            // Server requires for column qualification; without one the inner relations remain
            // reachable only by their own names/aliases (already registered above).
            let _ = alias;
        }
        // Table-valued functions, UNNEST, PIVOT/UNPIVOT and friends carry no simple column
        // lineage in this rewrite's scope (§9 Non-goals: "dialect features beyond T-SQL").
        _ => {}
    }
}

fn join_operator_kind(op: &JoinOperator) -> Option<JoinKind> {
    match op {
        JoinOperator::Inner(_) | JoinOperator::Join(_) => Some(JoinKind::Inner),
        JoinOperator::Left(_) | JoinOperator::LeftOuter(_) | JoinOperator::LeftSemi(_) | JoinOperator::LeftAnti(_) => {
            Some(JoinKind::Left)
        }
        JoinOperator::Right(_) | JoinOperator::RightOuter(_) | JoinOperator::RightSemi(_) | JoinOperator::RightAnti(_) => {
            Some(JoinKind::Right)
        }
        JoinOperator::FullOuter(_) => Some(JoinKind::Full),
        JoinOperator::CrossJoin => Some(JoinKind::Cross),
        _ => None,
    }
}

fn join_constraint(op: &JoinOperator) -> Option<&JoinConstraint> {
    match op {
        JoinOperator::Inner(c)
        | JoinOperator::Join(c)
        | JoinOperator::Left(c)
        | JoinOperator::LeftOuter(c)
        | JoinOperator::LeftSemi(c)
        | JoinOperator::LeftAnti(c)
        | JoinOperator::Right(c)
        | JoinOperator::RightOuter(c)
        | JoinOperator::RightSemi(c)
        | JoinOperator::RightAnti(c)
        | JoinOperator::FullOuter(c) => Some(c),
        _ => None,
    }
}

fn extract_join(join: &Join, ctx: &mut ExtractionContext<'_>) {
    extract_table_factor(&join.relation, ctx);

    let Some(kind) = join_operator_kind(&join.join_operator) else { return };
    let Some(JoinConstraint::On(on_expr)) = join_constraint(&join.join_operator) else { return };

    ctx.scope.current_mut().flags.in_join_condition = true;
    let mut pairs = Vec::new();
    collect_equi_join_conjuncts(on_expr, &mut pairs);

    for (left_parts, right_parts) in pairs {
        if left_parts.is_empty() || right_parts.is_empty() {
            continue;
        }
        let left_id = resolve_and_link_parts(ctx, &left_parts);
        let right_id = resolve_and_link_parts(ctx, &right_parts);
        if let (Some(left_id), Some(right_id)) = (left_id, right_id) {
            if left_id == right_id {
                continue;
            }
            // §4.D: join edges are emitted only "for every pair of columns belonging to
            // different tables" — `t.a = t.b` is a same-table comparison, not a join predicate.
            let left_owner = ctx.graph.get_node_by_id(&left_id).and_then(Node::as_column).map(|c| c.table_owner.clone());
            let right_owner = ctx.graph.get_node_by_id(&right_id).and_then(Node::as_column).map(|c| c.table_owner.clone());
            let same_table = matches!(
                (&left_owner, &right_owner),
                (Some(l), Some(r)) if l.eq_ignore_ascii_case(r)
            );
            if same_table {
                continue;
            }
            let text = format!("{} = {}", left_parts.join("."), right_parts.join("."));
            emit_edge(ctx, &left_id, &right_id, EdgeKind::Direct, Operation::Join(kind), &text);
            emit_edge(ctx, &right_id, &left_id, EdgeKind::Direct, Operation::Join(kind), &text);
        }
    }
    ctx.scope.current_mut().flags.in_join_condition = false;
}

/// Descends through `AND` and parenthesization to gather every top-level `ColumnRef = ColumnRef`
/// equality, per §4.D "gather all equality terms connected by AND at the top level (descend
/// through parentheses)". A non-conjunctive condition (e.g. an `OR`) is left unexamined past
/// that point — it still produces no join edges, which is the conservative, documented behavior.
fn collect_equi_join_conjuncts(expr: &Expr, out: &mut Vec<(Vec<String>, Vec<String>)>) {
    let mut stack = vec![expr];
    while let Some(e) = stack.pop() {
        match e {
            Expr::BinaryOp { left, op: BinaryOperator::And, right } => {
                stack.push(left);
                stack.push(right);
            }
            Expr::Nested(inner) => stack.push(inner),
            Expr::BinaryOp { left, op: BinaryOperator::Eq, right } => {
                if let (Some(l), Some(r)) = (expr_to_parts(left), expr_to_parts(right)) {
                    out.push((l, r));
                }
            }
            _ => {}
        }
    }
}

//! Handler: Common Table Expressions (§4.D "Handler: CTE").
//!
//! A CTE's `TableNode` is registered in the enclosing frame's `cteRegistry` *before* its own
//! body is traversed, so a recursive CTE can reference itself and later sibling CTEs can
//! reference earlier ones (§4.B "CTEs registered in a frame are visible to ... all nested
//! frames").

use sqlparser::ast::{Cte, With};

use crate::graph::{Node, Operation, TableKind, TableNode, TABLE_PREFIX};
use crate::scope::FrameKind;

use super::{ensure_target_column, select, ExtractionContext};

pub fn extract_with_clause(with: Option<&With>, ctx: &mut ExtractionContext<'_>) {
    let Some(with) = with else { return };
    for cte in &with.cte_tables {
        extract_cte(cte, ctx);
    }
}

fn extract_cte(cte: &Cte, ctx: &mut ExtractionContext<'_>) {
    let name = cte.alias.name.value.clone();
    let explicit_columns: Vec<String> = cte.alias.columns.iter().map(|i| i.value.clone()).collect();

    let id = ctx.ids.next_id(TABLE_PREFIX);
    let node = TableNode::new(id.clone(), name.clone(), TableKind::Cte);
    ctx.graph.add_node(Node::Table(node), ctx.issues);

    // Self-register before recursing: a recursive CTE's anchor member resolves the CTE's own
    // name in its UNION-connected recursive member.
    ctx.scope.current_mut().register_cte(&name, &id);

    // Explicit column names are created up front so the anchor and recursive members agree on
    // column identity regardless of traversal order.
    for col_name in &explicit_columns {
        ensure_target_column(ctx, &id, col_name);
    }

    ctx.scope.push_frame(FrameKind::CteBody);
    ctx.scope.current_mut().insert_target_table = Some(id.clone());
    ctx.scope.current_mut().insert_target_columns = explicit_columns;
    ctx.scope.current_mut().insert_target_operation = Some(Operation::Cte);
    // `select::extract_query` handles UNION/INTERSECT/EXCEPT operands itself (§4.D "For
    // UNION/INTERSECT/EXCEPT: recurse into both operands and link each to the CTE's column
    // list") by threading the same target table/columns through every operand.
    select::extract_query(&cte.query, ctx);
    ctx.scope.pop_frame();
}

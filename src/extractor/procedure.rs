//! Handlers: CREATE PROCEDURE, DECLARE, SET, EXECUTE, IF, WHILE (§4.D "Handler: Procedural
//! constructs").
//!
//! Every procedure parameter is treated as `Direction=Input`: sqlparser's procedure AST carries
//! no OUTPUT marker, and this rewrite does not attempt to recover one by scanning the original
//! source text (the same judgment call this rewrite makes for `INSERT ... EXEC`: a structured
//! signal beats a brittle text scan, and here there is no structured signal at all).

use sqlparser::ast::{
    ConditionalStatementBlock, ConditionalStatements, Declare, DeclareAssignment, Expr, Ident,
    IfStatement, ObjectName, OneOrManyWithParens, ProcedureParam, Statement, WhileStatement,
};

use crate::graph::{
    ColumnNode, EdgeKind, ExpressionKind, ExpressionNode, Node, Operation, TableKind, TableNode,
    COLUMN_PREFIX, EXPR_PREFIX, TABLE_PREFIX,
};
use crate::scope::FrameKind;

use super::expr::{classify_and_link_expression, emit_edge, link_value_into, resolve_only};
use super::{ensure_target_column, ExtractionContext};

pub fn extract_create_procedure(
    name: &ObjectName,
    params: Option<&[ProcedureParam]>,
    body: &ConditionalStatements,
    ctx: &mut ExtractionContext<'_>,
) {
    let proc_name = name.to_string();
    let id = ctx.ids.next_id(TABLE_PREFIX);
    let node = TableNode::new(id.clone(), proc_name.clone(), TableKind::StoredProcedure);
    ctx.graph.add_node(Node::Table(node), ctx.issues);
    ctx.scope.current_mut().register_table(&proc_name, &id);

    let mut param_ids: Vec<(String, String)> = Vec::new();
    if let Some(params) = params {
        for param in params {
            let col_id = ctx.ids.next_id(COLUMN_PREFIX);
            let column = ColumnNode::new(col_id.clone(), proc_name.clone(), param.name.value.clone())
                .with_data_type(param.data_type.to_string());
            ctx.graph.add_node(Node::Column(column), ctx.issues);
            ctx.graph.attach_column_to_table(&id, &col_id);
            if let Some(Node::Column(col)) = ctx.graph.get_node_by_id_mut(&col_id) {
                col.metadata.insert("Direction".to_string(), "Input".to_string());
            }
            param_ids.push((param.name.value.trim_start_matches('@').to_string(), col_id));
        }
    }

    ctx.scope.push_frame(FrameKind::ProcedureBody);
    ctx.scope.current_mut().current_procedure = Some(proc_name);
    for (key, col_id) in param_ids {
        ctx.scope.current_mut().parameters.insert(key, col_id);
    }
    for stmt in statements_of(body) {
        super::extract_statement(stmt, ctx);
    }
    ctx.scope.pop_frame();
}

fn statements_of(body: &ConditionalStatements) -> &[Statement] {
    match body {
        ConditionalStatements::Sequence { statements } => statements,
        ConditionalStatements::BeginEnd(block) => &block.statements,
    }
}

fn variable_owner(ctx: &ExtractionContext<'_>) -> String {
    ctx.scope.current_procedure().unwrap_or_else(|| "Variables".to_string())
}

pub fn extract_declare(stmts: &[Declare], ctx: &mut ExtractionContext<'_>) {
    let owner = variable_owner(ctx);
    for decl in stmts {
        let data_type = decl.data_type.as_ref().map(|t| t.to_string());
        let assignment = declare_assignment_expr(decl);
        for ident in declare_names(decl) {
            let col_id = ctx.ids.next_id(COLUMN_PREFIX);
            let mut column = ColumnNode::new(col_id.clone(), owner.clone(), ident.value.clone());
            if let Some(dt) = &data_type {
                column = column.with_data_type(dt.clone());
            }
            ctx.graph.add_node(Node::Column(column), ctx.issues);
            let var_key = ident.value.trim_start_matches('@').to_string();
            ctx.scope.current_mut().variables.insert(var_key, col_id.clone());

            if let Some(expr) = assignment {
                classify_and_link_expression(ctx, expr, "InitialValue", &col_id, Operation::Assign);
            }
        }
    }
}

fn declare_names(decl: &Declare) -> Vec<&Ident> {
    decl.names.iter().collect()
}

fn declare_assignment_expr(decl: &Declare) -> Option<&Expr> {
    match &decl.assignment {
        Some(DeclareAssignment::Expr(e)) => Some(e),
        Some(DeclareAssignment::Default(e)) => Some(e),
        Some(DeclareAssignment::MsSqlDefault(exprs)) => exprs.first(),
        _ => None,
    }
}

pub fn extract_set_variable(variables: &OneOrManyWithParens<ObjectName>, value: &[Expr], ctx: &mut ExtractionContext<'_>) {
    let names: Vec<String> = match variables {
        OneOrManyWithParens::One(name) => vec![name.to_string()],
        OneOrManyWithParens::Many(names) => names.iter().map(|n| n.to_string()).collect(),
    };

    for (name, expr) in names.iter().zip(value.iter()) {
        let existing = ctx.scope.resolve_variable(name).or_else(|| ctx.scope.resolve_parameter(name));
        let col_id = match existing {
            Some(id) => id,
            None => {
                let owner = variable_owner(ctx);
                let id = ctx.ids.next_id(COLUMN_PREFIX);
                let column = ColumnNode::new(id.clone(), owner, name.clone());
                ctx.graph.add_node(Node::Column(column), ctx.issues);
                let var_key = name.trim_start_matches('@').to_string();
                ctx.scope.current_mut().variables.insert(var_key, id.clone());
                id
            }
        };

        ctx.scope.current_mut().current_target_column = Some(col_id.clone());
        link_value_into(ctx, expr, "Assignment", &col_id, Operation::Assign, true);
        ctx.scope.current_mut().current_target_column = None;
    }
}

/// The called procedure's declared formal parameter names, in declaration order, if the
/// procedure has been observed (via an earlier `CREATE PROCEDURE`) in this graph.
fn formal_parameter_names(ctx: &ExtractionContext<'_>, proc_name: &str) -> Vec<String> {
    let Some(proc_table) = ctx.graph.find_table_by_name(proc_name) else {
        return Vec::new();
    };
    proc_table
        .columns
        .iter()
        .filter_map(|id| ctx.graph.get_node_by_id(id).and_then(Node::as_column))
        .map(|c| c.name.clone())
        .collect()
}

/// §4.D "Handler: EXECUTE": for each actual parameter, fetch or lazily create the called
/// procedure's formal parameter `ColumnNode` (named from the declared parameter list if known,
/// else `@ParamN`), then link the actual value to it and the parameter to the execution
/// expression.
pub fn extract_execute(name: &ObjectName, parameters: &[Expr], ctx: &mut ExtractionContext<'_>) {
    let proc_name = name.to_string();
    let sql_text = format!("EXEC {name}");
    let expr_id = ctx.ids.next_id(EXPR_PREFIX);
    let node = ExpressionNode::new(
        expr_id.clone(),
        "StoredProcedureExecution",
        ExpressionKind::StoredProcedureExecution,
        sql_text,
    );
    ctx.graph.add_node(Node::Expression(node), ctx.issues);

    let formal_names = formal_parameter_names(ctx, &proc_name);
    let proc_table_id = from_resolve_or_create(ctx, &proc_name);

    for (position, actual) in parameters.iter().enumerate() {
        let param_name = formal_names
            .get(position)
            .cloned()
            .unwrap_or_else(|| format!("@Param{}", position + 1));
        let Some(param_id) = ensure_target_column(ctx, &proc_table_id, &param_name) else { continue };

        let actual_text = actual.to_string();
        if super::expr::is_bare_column_ref(actual) || is_variable_expr(actual) {
            if let Some(source_id) = super::resolve_expr(ctx, actual) {
                emit_edge(ctx, &source_id, &param_id, EdgeKind::Direct, Operation::Parameter, &actual_text);
            }
        } else {
            let value_expr_id = classify_and_link_expression(ctx, actual, "ParameterValue", &param_id, Operation::Parameter);
            // `classify_and_link_expression` already tagged the expression by its structural
            // kind; re-tag it as the execute-parameter shape the spec calls for.
            if let Some(Node::Expression(e)) = ctx.graph.get_node_by_id_mut(&value_expr_id) {
                e.expression_kind = ExpressionKind::ParameterValue;
            }
        }
        emit_edge(ctx, &param_id, &expr_id, EdgeKind::Direct, Operation::Execute, &actual_text);
    }
}

fn is_variable_expr(expr: &Expr) -> bool {
    matches!(expr, Expr::Identifier(ident) if ident.value.starts_with('@'))
}

fn from_resolve_or_create(ctx: &mut ExtractionContext<'_>, proc_name: &str) -> String {
    match ctx.graph.find_table_by_name(proc_name) {
        Some(existing) => existing.id.clone(),
        None => {
            let id = ctx.ids.next_id(TABLE_PREFIX);
            let node = TableNode::new(id.clone(), proc_name.to_string(), TableKind::StoredProcedure);
            ctx.graph.add_node(Node::Table(node), ctx.issues);
            id
        }
    }
}

pub fn extract_if(if_stmt: &IfStatement, ctx: &mut ExtractionContext<'_>) {
    run_conditional_block(&if_stmt.if_block, ctx);
    for block in &if_stmt.elseif_blocks {
        run_conditional_block(block, ctx);
    }
    if let Some(block) = &if_stmt.else_block {
        run_conditional_block(block, ctx);
    }
}

fn run_conditional_block(block: &ConditionalStatementBlock, ctx: &mut ExtractionContext<'_>) {
    if let Some(condition) = &block.condition {
        resolve_only(ctx, condition);
    }
    for stmt in statements_of(&block.conditional_statements) {
        super::extract_statement(stmt, ctx);
    }
}

/// A WHILE body runs conceptually many times but is traversed once: repeated traversal would
/// only duplicate edges that `GraphStore::add_edge`'s dedup already collapses (§4.D, §8
/// invariant 3).
pub fn extract_while(while_stmt: &WhileStatement, ctx: &mut ExtractionContext<'_>) {
    run_conditional_block(&while_stmt.while_block, ctx);
}

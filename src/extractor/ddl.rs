//! Handler: CREATE TABLE / ALTER TABLE (§4.D "Handler: DDL").
//!
//! `CREATE TABLE ... AS <query>` and `SELECT ... INTO` share the same target-table-creation +
//! `select::extract_query` delegation used by INSERT/CTE; everything else here is column and
//! constraint bookkeeping that never recurses into an expression tree deeper than a single
//! DEFAULT or computed-column expression.

use sqlparser::ast::{
    AlterColumnOperation, AlterTableOperation, ColumnDef, ColumnOption, CreateTable, ObjectName,
    TableConstraint,
};

use crate::graph::{ExpressionKind, ExpressionNode, Node, Operation, TableKind, TableNode, COLUMN_PREFIX, EXPR_PREFIX, TABLE_PREFIX};

use super::expr::{collect_column_refs, emit_edge, expr_to_parts, resolve_and_link_parts};
use super::{ensure_target_column, from, select, ExtractionContext};
use crate::graph::{ColumnNode, EdgeKind};

pub fn extract_create_table(create: &CreateTable, ctx: &mut ExtractionContext<'_>) {
    let full_name = create.name.to_string();
    let (schema, short_name) = from::split_dotted_name(&full_name);
    let kind = if create.temporary || short_name.starts_with('#') {
        TableKind::TempTable
    } else {
        TableKind::BaseTable
    };

    let table_id = match ctx.graph.find_table_by_name(&short_name) {
        Some(existing) => existing.id.clone(),
        None => {
            let id = ctx.ids.next_id(TABLE_PREFIX);
            let mut node = TableNode::new(id.clone(), short_name.clone(), kind);
            if let Some(schema) = &schema {
                node = node.with_schema(schema.clone());
            }
            ctx.graph.add_node(Node::Table(node), ctx.issues);
            id
        }
    };
    ctx.scope.current_mut().register_table(&short_name, &table_id);

    for column in &create.columns {
        create_column_from_def(ctx, &table_id, column);
    }
    for constraint in &create.constraints {
        apply_table_constraint(ctx, &table_id, constraint);
    }

    if let Some(query) = &create.query {
        ctx.scope.current_mut().select_into_table = Some(table_id.clone());
        select::extract_query(query, ctx);
        ctx.scope.current_mut().select_into_table = None;
    }
}

pub fn extract_alter_table(name: &ObjectName, operations: &[AlterTableOperation], ctx: &mut ExtractionContext<'_>) {
    let full_name = name.to_string();
    let table_id = from::resolve_or_create_table(ctx, &full_name, None);

    for op in operations {
        match op {
            AlterTableOperation::AddColumn { column_def, .. } => {
                create_column_from_def(ctx, &table_id, column_def);
            }
            AlterTableOperation::DropColumn { column_name, .. } => {
                if let Some(col_id) = ensure_target_column(ctx, &table_id, &column_name.value) {
                    // `DroppedAt` is a monotonic logical sequence number, not a wall-clock
                    // timestamp — §6's determinism guarantee (same input -> byte-identical
                    // graph) rules out stamping real time here (see DESIGN.md).
                    let dropped_at = ctx.ids.next_suffix("DROP");
                    if let Some(Node::Column(col)) = ctx.graph.get_node_by_id_mut(&col_id) {
                        col.metadata.insert("Dropped".to_string(), "true".to_string());
                        col.metadata.insert("DroppedAt".to_string(), dropped_at);
                    }
                }
            }
            AlterTableOperation::AlterColumn { column_name, op } => {
                let Some(col_id) = ensure_target_column(ctx, &table_id, &column_name.value) else {
                    continue;
                };
                apply_alter_column_operation(ctx, &col_id, op);
            }
            AlterTableOperation::AddConstraint(constraint) => {
                apply_table_constraint(ctx, &table_id, constraint);
            }
            _ => {
                // RENAME TABLE, RENAME COLUMN and other non-schema-shaping operations carry no
                // lineage of their own in this rewrite's scope.
            }
        }
    }
}

fn apply_alter_column_operation(ctx: &mut ExtractionContext<'_>, col_id: &str, op: &AlterColumnOperation) {
    match op {
        AlterColumnOperation::SetDataType { data_type, .. } => {
            let new_type = data_type.to_string();
            let Some(Node::Column(col)) = ctx.graph.get_node_by_id_mut(col_id) else { return };
            let previous = col.data_type.clone();
            col.data_type = new_type;
            let version: u32 = col
                .metadata
                .get("Version")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            col.metadata.insert("PreviousDataType".to_string(), previous);
            col.metadata.insert("Version".to_string(), (version + 1).to_string());
        }
        AlterColumnOperation::SetNotNull => {
            if let Some(Node::Column(col)) = ctx.graph.get_node_by_id_mut(col_id) {
                col.nullable = false;
            }
        }
        AlterColumnOperation::DropNotNull => {
            if let Some(Node::Column(col)) = ctx.graph.get_node_by_id_mut(col_id) {
                col.nullable = true;
            }
        }
        _ => {}
    }
}

fn create_column_from_def(ctx: &mut ExtractionContext<'_>, table_id: &str, column: &ColumnDef) -> Option<String> {
    let table_name = ctx.graph.get_node_by_id(table_id).and_then(Node::as_table).map(|t| t.name.clone())?;

    let mut nullable = true;
    let mut default_expr = None;
    let mut generated_expr = None;
    let mut is_primary = false;
    let mut fk_ref = None;

    for option in &column.options {
        match &option.option {
            ColumnOption::NotNull => nullable = false,
            ColumnOption::Null => nullable = true,
            ColumnOption::Default(expr) => default_expr = Some(expr.clone()),
            ColumnOption::Generated { generation_expr: Some(expr), .. } => generated_expr = Some(expr.clone()),
            ColumnOption::Unique { is_primary: true, .. } => is_primary = true,
            ColumnOption::ForeignKey { foreign_table, referred_columns, .. } => {
                if let Some(col) = referred_columns.first() {
                    fk_ref = Some((foreign_table.to_string(), col.value.clone()));
                }
            }
            _ => {}
        }
    }

    let id = ctx.ids.next_id(COLUMN_PREFIX);
    let mut node = ColumnNode::new(id.clone(), table_name, column.name.value.clone())
        .with_data_type(column.data_type.to_string())
        .with_nullable(nullable);
    if generated_expr.is_some() {
        node = node.with_computed(true);
    }
    if is_primary {
        node.metadata.insert("PrimaryKey".to_string(), "true".to_string());
    }
    ctx.graph.add_node(Node::Column(node), ctx.issues);
    ctx.graph.attach_column_to_table(table_id, &id);

    if let Some(expr) = default_expr {
        link_default_value(ctx, &expr, &id);
    }
    if let Some(expr) = generated_expr {
        link_computed_column(ctx, table_id, &expr, &id);
    }
    if let Some((foreign_table, ref_col_name)) = fk_ref {
        link_foreign_key(ctx, &id, &foreign_table, &ref_col_name);
    }

    Some(id)
}

fn link_default_value(ctx: &mut ExtractionContext<'_>, expr: &sqlparser::ast::Expr, column_id: &str) {
    let sql_text = expr.to_string();
    let expr_id = ctx.ids.next_id(EXPR_PREFIX);
    let node = ExpressionNode::new(expr_id.clone(), "DefaultValue", ExpressionKind::DefaultValue, sql_text.clone());
    ctx.graph.add_node(Node::Expression(node), ctx.issues);
    emit_edge(ctx, &expr_id, column_id, EdgeKind::Direct, Operation::Default, &sql_text);

    for leaf in collect_column_refs(expr) {
        if let Some(parts) = expr_to_parts(leaf) {
            if let Some(source_id) = resolve_and_link_parts(ctx, &parts) {
                emit_edge(ctx, &source_id, &expr_id, EdgeKind::Indirect, Operation::Reference, &leaf.to_string());
            }
        }
    }
}

/// Computed-column expressions only resolve bare (unqualified) column references against the
/// owning table — a T-SQL computed column cannot reach across tables (§4.D "Handler: DDL").
fn link_computed_column(ctx: &mut ExtractionContext<'_>, table_id: &str, expr: &sqlparser::ast::Expr, column_id: &str) {
    let sql_text = expr.to_string();
    let expr_id = ctx.ids.next_id(EXPR_PREFIX);
    let node = ExpressionNode::new(expr_id.clone(), "ComputedColumn", ExpressionKind::ComputedColumn, sql_text.clone());
    ctx.graph.add_node(Node::Expression(node), ctx.issues);
    emit_edge(ctx, &expr_id, column_id, EdgeKind::Direct, Operation::Compute, &sql_text);

    for leaf in collect_column_refs(expr) {
        let Some(parts) = expr_to_parts(leaf) else { continue };
        if parts.len() != 1 {
            continue;
        }
        if let Some(source_id) = ensure_target_column(ctx, table_id, &parts[0]) {
            emit_edge(ctx, &source_id, &expr_id, EdgeKind::Indirect, Operation::Reference, &leaf.to_string());
        }
    }
}

/// §4.D "FOREIGN KEY: ... emit `Direct(refCol → localCol, operation=foreignKey)`" — the
/// referenced column is the edge's source, the local column is its target.
fn link_foreign_key(ctx: &mut ExtractionContext<'_>, column_id: &str, foreign_table: &str, ref_column_name: &str) {
    let ref_table_id = from::resolve_or_create_table(ctx, foreign_table, None);
    if let Some(ref_col_id) = ensure_target_column(ctx, &ref_table_id, ref_column_name) {
        let text = format!("{foreign_table}.{ref_column_name}");
        emit_edge(ctx, &ref_col_id, column_id, EdgeKind::Direct, Operation::ForeignKey, &text);
        if let Some(Node::Column(local)) = ctx.graph.get_node_by_id_mut(column_id) {
            local.metadata.insert("ReferencesTable".to_string(), foreign_table.to_string());
            local.metadata.insert("ReferencesColumn".to_string(), ref_column_name.to_string());
        }
    }
}

fn apply_table_constraint(ctx: &mut ExtractionContext<'_>, table_id: &str, constraint: &TableConstraint) {
    match constraint {
        TableConstraint::PrimaryKey { columns, .. } => {
            for col in columns {
                let name = col.column.expr.to_string();
                if let Some(col_id) = ensure_target_column(ctx, table_id, &name) {
                    if let Some(Node::Column(c)) = ctx.graph.get_node_by_id_mut(&col_id) {
                        c.metadata.insert("PrimaryKey".to_string(), "true".to_string());
                    }
                }
            }
        }
        TableConstraint::Unique { columns, .. } => {
            for col in columns {
                let name = col.column.expr.to_string();
                if let Some(col_id) = ensure_target_column(ctx, table_id, &name) {
                    if let Some(Node::Column(c)) = ctx.graph.get_node_by_id_mut(&col_id) {
                        c.metadata.insert("Unique".to_string(), "true".to_string());
                    }
                }
            }
        }
        TableConstraint::ForeignKey { columns, foreign_table, referred_columns, .. } => {
            let foreign_table_name = foreign_table.to_string();
            for (col, ref_col) in columns.iter().zip(referred_columns.iter()) {
                if let Some(col_id) = ensure_target_column(ctx, table_id, &col.value) {
                    link_foreign_key(ctx, &col_id, &foreign_table_name, &ref_col.value);
                }
            }
        }
        _ => {}
    }
}

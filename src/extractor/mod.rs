//! Component D: AST Lineage Extractor (§4.D).
//!
//! Organized as per-construct handler modules dispatched from [`extract_statement`]. Unknown
//! statement kinds are left unhandled (no children to recurse into at the top level); within an
//! expression tree, unknown node kinds are simply not descended into by `expr::collect_column_refs`.

mod cte;
mod ddl;
mod expr;
mod from;
mod insert;
mod merge;
mod procedure;
mod select;
mod update;

use sqlparser::ast::Statement;

use crate::batch::{BatchAst, CancellationToken};
use crate::error::{Issue, LineageError};
use crate::graph::{GraphStore, IdGenerator};
use crate::interner::StringInterner;
use crate::request::AnalysisOptions;
use crate::scope::ScopeStack;

/// Everything a handler needs: the graph to write into, the scope stack for name resolution, an
/// id generator, the issue sink, and the options governing extraction (§4.D "Each handler
/// receives the current frame from (B) and the graph from (A)").
pub struct ExtractionContext<'a> {
    pub graph: &'a mut GraphStore,
    pub scope: &'a mut ScopeStack,
    pub ids: &'a mut dyn IdGenerator,
    pub issues: &'a mut Vec<Issue>,
    pub interner: &'a mut StringInterner,
    pub options: &'a AnalysisOptions,
    pub script_text: &'a str,
    depth: usize,
}

impl<'a> ExtractionContext<'a> {
    pub fn new(
        graph: &'a mut GraphStore,
        scope: &'a mut ScopeStack,
        ids: &'a mut dyn IdGenerator,
        issues: &'a mut Vec<Issue>,
        interner: &'a mut StringInterner,
        options: &'a AnalysisOptions,
        script_text: &'a str,
    ) -> Self {
        Self {
            graph,
            scope,
            ids,
            issues,
            interner,
            options,
            script_text,
            depth: 0,
        }
    }

    /// Guards against unbounded recursion through nested subqueries/CTEs/expressions
    /// (`maxNestedQueryDepth`, §6, §9 "Stack depth"). Returns `Err` without descending once the
    /// configured limit is hit; the caller should treat that subtree as unresolved and continue
    /// with siblings rather than panicking or overflowing the native stack.
    pub fn enter_nested(&mut self) -> Result<DepthGuard<'_, 'a>, ()> {
        if self.depth >= self.options.max_nested_query_depth as usize {
            self.issues.push(Issue::malformed_fragment(format!(
                "maxNestedQueryDepth ({}) exceeded; subtree skipped",
                self.options.max_nested_query_depth
            )));
            return Err(());
        }
        self.depth += 1;
        Ok(DepthGuard { ctx: self })
    }
}

/// RAII depth-tracking guard returned by [`ExtractionContext::enter_nested`].
pub struct DepthGuard<'b, 'a> {
    ctx: &'b mut ExtractionContext<'a>,
}

impl<'a> std::ops::Deref for DepthGuard<'_, 'a> {
    type Target = ExtractionContext<'a>;
    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl<'a> std::ops::DerefMut for DepthGuard<'_, 'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for DepthGuard<'_, '_> {
    fn drop(&mut self) {
        self.ctx.depth -= 1;
    }
}

/// Walks every batch's statements in order, extracting lineage into `ctx.graph`. Cancellation is
/// checked at batch boundaries and before each top-level statement (§5, §4.D Cancellation).
pub fn extract_script(
    batches: &[BatchAst],
    ctx: &mut ExtractionContext<'_>,
    cancellation: Option<&CancellationToken>,
) -> Result<(), LineageError> {
    for batch in batches {
        extract_batch(batch, ctx, cancellation)?;
    }
    Ok(())
}

/// Extracts lineage from a single already-parsed batch. Shared by [`extract_script`]'s
/// in-memory loop and the streaming driver (§4.C streaming mode: "each complete batch triggers
/// a callback allowing the extractor to run incrementally").
pub fn extract_batch(
    batch: &BatchAst,
    ctx: &mut ExtractionContext<'_>,
    cancellation: Option<&CancellationToken>,
) -> Result<(), LineageError> {
    if cancellation.is_some_and(CancellationToken::is_cancelled) {
        #[cfg(feature = "tracing")]
        tracing::debug!(batch_index = batch.batch_index, "cancelled at batch boundary");
        return Err(LineageError::Cancelled);
    }
    for stmt in &batch.statements {
        if cancellation.is_some_and(CancellationToken::is_cancelled) {
            #[cfg(feature = "tracing")]
            tracing::debug!(batch_index = batch.batch_index, "cancelled before statement");
            return Err(LineageError::Cancelled);
        }
        extract_statement(stmt, ctx);
    }
    Ok(())
}

/// Dispatches one top-level statement to its handler. A handler failing to match the AST shape
/// it expects logs a [`crate::error::IssueCode::MalformedFragment`] and returns without
/// propagating — siblings and subsequent statements are still processed (§4.D Failure semantics,
/// §7 "per-handler failures are contained").
pub fn extract_statement(stmt: &Statement, ctx: &mut ExtractionContext<'_>) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        dispatch_statement(stmt, ctx);
    }));
    if result.is_err() {
        ctx.issues.push(Issue::internal_error(format!(
            "handler panicked while processing a {} statement",
            statement_kind_name(stmt)
        )));
    }
    // A handler that panicked mid-traversal may have left frames it never got to pop; every
    // top-level statement starts clean at root scope (§4.B frames don't outlive their statement).
    ctx.scope.reset_to_root();
}

fn dispatch_statement(stmt: &Statement, ctx: &mut ExtractionContext<'_>) {
    match stmt {
        Statement::Query(query) => {
            select::extract_query(query, ctx);
        }
        Statement::Insert(insert) => insert::extract_insert(insert, ctx),
        Statement::Update { table, assignments, from, selection, .. } => {
            update::extract_update(table, assignments, from.as_ref(), selection.as_ref(), ctx);
        }
        Statement::Delete(delete) => update::extract_delete(delete, ctx),
        Statement::Merge { table, source, on, clauses, .. } => {
            merge::extract_merge(table, source, on, clauses, ctx);
        }
        Statement::CreateTable(create) => ddl::extract_create_table(create, ctx),
        Statement::AlterTable { name, operations, .. } => {
            ddl::extract_alter_table(name, operations, ctx);
        }
        Statement::CreateProcedure { name, params, body, .. } => {
            procedure::extract_create_procedure(name, params.as_deref(), body, ctx);
        }
        Statement::Declare { stmts } => procedure::extract_declare(stmts, ctx),
        Statement::SetVariable { variables, value, .. } => {
            procedure::extract_set_variable(variables, value, ctx);
        }
        Statement::Execute { name, parameters, .. } => {
            procedure::extract_execute(name, parameters, ctx);
        }
        Statement::If(if_stmt) => procedure::extract_if(if_stmt, ctx),
        Statement::While(while_stmt) => procedure::extract_while(while_stmt, ctx),
        _ => {
            // Not in §4.D's handler list (e.g. CREATE INDEX, GRANT, ...): no lineage implied.
        }
    }
}

fn statement_kind_name(stmt: &Statement) -> &'static str {
    match stmt {
        Statement::Query(_) => "SELECT",
        Statement::Insert(_) => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete(_) => "DELETE",
        Statement::Merge { .. } => "MERGE",
        Statement::CreateTable(_) => "CREATE TABLE",
        Statement::AlterTable { .. } => "ALTER TABLE",
        Statement::CreateProcedure { .. } => "CREATE PROCEDURE",
        Statement::Declare { .. } => "DECLARE",
        Statement::SetVariable { .. } => "SET",
        Statement::Execute { .. } => "EXECUTE",
        Statement::If(_) => "IF",
        Statement::While(_) => "WHILE",
        _ => "UNKNOWN",
    }
}

pub(crate) use expr::{
    classify_and_link_expression, collect_column_refs, link_value_into, process_nested_subqueries,
    resolve_and_link_parts, resolve_expr, resolve_only,
};

use crate::graph::{ColumnNode, Node as GraphNode, COLUMN_PREFIX};

/// §4.D "Handler: INSERT" step 2: "if an explicit column list is present, take those names;
/// otherwise take the table's declared columns in order (if none known, emit a warning and
/// stop)". Shared by INSERT and MERGE's `WHEN NOT MATCHED ... INSERT` (operation=`merge-insert`)
/// since both need the same column-list resolution before linking VALUES/SELECT by position.
pub(crate) fn resolve_insert_target_columns(
    ctx: &mut ExtractionContext<'_>,
    table_id: &str,
    explicit_columns: Vec<String>,
) -> Vec<String> {
    if !explicit_columns.is_empty() {
        return explicit_columns;
    }
    let declared: Vec<String> = match ctx.graph.get_node_by_id(table_id) {
        Some(GraphNode::Table(t)) => t
            .columns
            .iter()
            .filter_map(|id| ctx.graph.get_node_by_id(id).and_then(GraphNode::as_column))
            .map(|c| c.name.clone())
            .collect(),
        _ => Vec::new(),
    };
    if declared.is_empty() {
        ctx.issues.push(Issue::malformed_fragment(format!(
            "no explicit column list and target table '{table_id}' has no known declared columns; insert skipped"
        )));
    }
    declared
}

/// Finds or lazily creates the `ColumnNode` named `column_name` owned by `table_id`, attaching it
/// to the table's `columns` list. Shared by every handler that writes into a table's columns by
/// name rather than via `resolve_column_reference` (SELECT projection, INSERT target columns,
/// CTE/DDL column declarations).
pub(crate) fn ensure_target_column(
    ctx: &mut ExtractionContext<'_>,
    table_id: &str,
    column_name: &str,
) -> Option<String> {
    let table_name = match ctx.graph.get_node_by_id(table_id) {
        Some(GraphNode::Table(t)) => t.name.clone(),
        _ => return None,
    };
    if let Some(col) = ctx.graph.get_column_node(&table_name, column_name) {
        return Some(col.id.clone());
    }
    // Interning here, rather than in the graph store, keeps (A) free of a dependency on (D)'s
    // infrastructure while still deduping the identifier's backing allocation at its one true
    // first-creation site (§5 "identifier strings ... are interned to reduce working set").
    let interned_name = ctx.interner.intern(column_name);
    let id = ctx.ids.next_id(COLUMN_PREFIX);
    let node = GraphNode::Column(ColumnNode::new(id.clone(), table_name, interned_name.as_ref()));
    ctx.graph.add_node(node, ctx.issues);
    ctx.graph.attach_column_to_table(table_id, &id);
    Some(id)
}

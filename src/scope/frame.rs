//! A single scope frame (§4.B).

use std::collections::HashMap;

use crate::graph::Operation;

/// What kind of SQL scope a [`Frame`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Root,
    Select,
    Insert,
    Update,
    Delete,
    Merge,
    CteBody,
    ProcedureBody,
    Expression,
}

/// Traversal-role flags: which clause of the enclosing statement is currently being walked.
/// Grouped into their own struct so `Frame`'s constructor doesn't take a dozen bare bools.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraversalFlags {
    pub in_from_clause: bool,
    pub in_where_clause: bool,
    pub in_group_by: bool,
    pub in_having: bool,
    pub in_order_by: bool,
    pub in_join_condition: bool,
    pub in_insert_column_list: bool,
    pub in_update_set_clause: bool,
    pub in_select_list: bool,
    pub in_when_condition: bool,
    pub in_window_function: bool,
    pub processing_source_columns: bool,
    pub processing_target_columns: bool,
}

/// One entry on the [`super::ScopeStack`] (§4.B): captures every name visible within one SQL
/// scope (outermost script, a SELECT, a subquery/CTE body, a procedure body).
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub kind_slot: Option<FrameKind>,
    /// `tableName -> TableNode id` (keys stored lowercased; §3 invariant: case-insensitive).
    pub visible_tables: HashMap<String, String>,
    /// `alias -> canonical table name` (keys stored lowercased).
    pub table_aliases: HashMap<String, String>,
    /// Result-projection TableNode ids of the active SELECT, innermost last.
    pub current_table_stack: Vec<String>,
    /// `variable name (with or without @) -> ColumnNode id`.
    pub variables: HashMap<String, String>,
    /// `parameter name -> ColumnNode id`.
    pub parameters: HashMap<String, String>,
    /// `cteName -> TableNode id` (kind=Cte).
    pub cte_registry: HashMap<String, String>,
    pub flags: TraversalFlags,
    /// The column the enclosing SELECT element is writing into.
    pub current_target_column: Option<String>,
    /// The function ExpressionNode whose OVER clause is being processed.
    pub current_function_expression: Option<String>,
    pub insert_target_table: Option<String>,
    pub insert_target_columns: Vec<String>,
    /// Operation tag for edges writing into `insert_target_table`'s columns (§4.D: `insert` for
    /// INSERT…SELECT, `cte` for a CTE body, `merge-insert` for MERGE's NOT MATCHED…INSERT). `None`
    /// means the plain SELECT default of `select`.
    pub insert_target_operation: Option<Operation>,
    pub select_into_table: Option<String>,
    /// Set by `CREATE PROCEDURE`'s handler; consumed by `DECLARE`/`SET` to qualify variable
    /// ownership (§4.D "DECLARE: create a ColumnNode owner=CurrentProcedure or 'Variables'").
    pub current_procedure: Option<String>,
}

impl Frame {
    pub fn new(kind: FrameKind) -> Self {
        Self {
            kind_slot: Some(kind),
            ..Default::default()
        }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind_slot.unwrap_or(FrameKind::Root)
    }

    pub fn register_table(&mut self, name: &str, table_id: &str) {
        self.visible_tables.insert(name.to_lowercase(), table_id.to_string());
    }

    pub fn register_alias(&mut self, alias: &str, canonical_table_name: &str) {
        self.table_aliases
            .insert(alias.to_lowercase(), canonical_table_name.to_lowercase());
    }

    pub fn register_cte(&mut self, name: &str, table_id: &str) {
        self.cte_registry.insert(name.to_lowercase(), table_id.to_string());
    }

    pub fn resolve_alias(&self, alias: &str) -> Option<&str> {
        self.table_aliases.get(&alias.to_lowercase()).map(String::as_str)
    }

    pub fn lookup_table(&self, name: &str) -> Option<&str> {
        self.visible_tables.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn lookup_cte(&self, name: &str) -> Option<&str> {
        self.cte_registry.get(&name.to_lowercase()).map(String::as_str)
    }
}

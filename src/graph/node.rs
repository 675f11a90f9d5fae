//! Node types for the lineage graph (§3 Data model).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::request::Metadata;

/// A tagged node in the lineage graph: a table, a column, or an intermediate expression.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "nodeKind", rename_all = "camelCase")]
pub enum Node {
    Table(TableNode),
    Column(ColumnNode),
    Expression(ExpressionNode),
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Node::Table(t) => &t.id,
            Node::Column(c) => &c.id,
            Node::Expression(e) => &e.id,
        }
    }

    pub fn as_table(&self) -> Option<&TableNode> {
        match self {
            Node::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_table_mut(&mut self) -> Option<&mut TableNode> {
        match self {
            Node::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_column(&self) -> Option<&ColumnNode> {
        match self {
            Node::Column(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_column_mut(&mut self) -> Option<&mut ColumnNode> {
        match self {
            Node::Column(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_expression(&self) -> Option<&ExpressionNode> {
        match self {
            Node::Expression(e) => Some(e),
            _ => None,
        }
    }
}

/// Discriminates a [`Node`] without borrowing its payload; used by `GraphStore::get_nodes_of_kind`
/// and by `NodeKindConflict` detection (a duplicate id of a *different* kind is a conflict).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKindTag {
    Table,
    Column,
    Expression,
}

impl Node {
    pub fn kind_tag(&self) -> NodeKindTag {
        match self {
            Node::Table(_) => NodeKindTag::Table,
            Node::Column(_) => NodeKindTag::Column,
            Node::Expression(_) => NodeKindTag::Expression,
        }
    }
}

/// What kind of table-shaped thing a [`TableNode`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum TableKind {
    BaseTable,
    /// `#`-prefixed, session-scoped.
    TempTable,
    /// `@`-prefixed table-typed variable.
    TableVariable,
    Cte,
    DerivedTable,
    StoredProcedure,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableNode {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub kind: TableKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Ordered ids of this table's [`ColumnNode`]s, in declaration/projection order.
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_definition_text: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl TableNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: TableKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            schema: None,
            kind,
            alias: None,
            columns: Vec::new(),
            original_definition_text: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_original_definition_text(mut self, text: impl Into<String>) -> Self {
        self.original_definition_text = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnNode {
    pub id: String,
    /// The owning table's `name` (or "Variables"/procedure name for variables/parameters).
    pub table_owner: String,
    pub name: String,
    #[serde(default = "default_unknown_type")]
    pub data_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub is_computed: bool,
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_unknown_type() -> String {
    "unknown".to_string()
}

fn default_true() -> bool {
    true
}

impl ColumnNode {
    pub fn new(id: impl Into<String>, table_owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            table_owner: table_owner.into(),
            name: name.into(),
            data_type: default_unknown_type(),
            nullable: true,
            is_computed: false,
            metadata: Metadata::new(),
        }
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_computed(mut self, is_computed: bool) -> Self {
        self.is_computed = is_computed;
        self
    }

    /// Adopts `source`'s declared type if this column's type is still "unknown" (§4.D SELECT
    /// element handler: type propagation from a resolved bare column reference).
    pub fn propagate_type_from(&mut self, source: &ColumnNode) {
        if self.data_type == "unknown" && source.data_type != "unknown" {
            self.data_type = source.data_type.clone();
        }
    }
}

/// What an [`ExpressionNode`] structurally represents (§3 ExpressionNode.expressionKind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ExpressionKind {
    Value,
    Function,
    Case,
    Coalesce,
    NullIf,
    Cast,
    Convert,
    Calculation,
    Unary,
    Grouped,
    InsertExpression,
    CteExpression,
    ComputedColumn,
    DefaultValue,
    InitialValue,
    Assignment,
    ParameterValue,
    StoredProcedureExecution,
    StoredProcedureOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionNode {
    pub id: String,
    pub name: String,
    pub expression_kind: ExpressionKind,
    pub sql_text: String,
    #[serde(default = "default_unknown_type")]
    pub result_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_owner: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ExpressionNode {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        expression_kind: ExpressionKind,
        sql_text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            expression_kind,
            sql_text: sql_text.into(),
            result_type: default_unknown_type(),
            table_owner: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_table_owner(mut self, owner: impl Into<String>) -> Self {
        self.table_owner = Some(owner.into());
        self
    }

    pub fn mark_window_function(&mut self) {
        self.metadata
            .insert("WindowFunction".to_string(), "true".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_type_propagates_only_when_unknown() {
        let mut target = ColumnNode::new("COLUMN_1", "t", "x");
        let source = ColumnNode::new("COLUMN_2", "s", "y").with_data_type("int");
        target.propagate_type_from(&source);
        assert_eq!(target.data_type, "int");

        let source2 = ColumnNode::new("COLUMN_3", "s", "z").with_data_type("varchar");
        target.propagate_type_from(&source2);
        assert_eq!(target.data_type, "int", "already-known type must not be overwritten");
    }

    #[test]
    fn node_kind_tag_matches_variant() {
        let n = Node::Table(TableNode::new("TABLE_1", "t", TableKind::BaseTable));
        assert_eq!(n.kind_tag(), NodeKindTag::Table);
    }

    #[test]
    fn serializes_with_tag() {
        let n = Node::Column(ColumnNode::new("COLUMN_1", "t", "x"));
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains("\"nodeKind\":\"column\""));
    }
}

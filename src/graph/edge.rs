//! Edge types for the lineage graph (§3 Edge kinds).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Whether data flows value-preserving (`Direct`) or is merely referenced/influences without
/// flowing (`Indirect`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Direct,
    Indirect,
}

/// The join type carried on a `join` operation edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

/// The SQL operation that produced an edge (§3: `operation ∈ {select, insert, update, cte,
/// default, compute, assign, parameter, execute, reference, evaluate, foreignKey, join,
/// merge-insert, merge-update, partition, order, windowFrame}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Cte,
    Default,
    Compute,
    Assign,
    Parameter,
    Execute,
    Reference,
    Evaluate,
    ForeignKey,
    Join(JoinKind),
    #[serde(rename = "merge-insert")]
    MergeInsert,
    #[serde(rename = "merge-update")]
    MergeUpdate,
    Partition,
    Order,
    WindowFrame,
}

/// The key duplicate-edge suppression is keyed on (§4.A / §8 invariant 3): `(source, target,
/// kind, operation)`. Two edges differing only in `sql_expression` collapse into one.
pub type EdgeDedupKey = (String, String, EdgeKind, Operation);

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub kind: EdgeKind,
    pub operation: Operation,
    pub sql_expression: String,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        kind: EdgeKind,
        operation: Operation,
        sql_expression: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            kind,
            operation,
            sql_expression: sql_expression.into(),
        }
    }

    pub fn dedup_key(&self) -> EdgeDedupKey {
        (
            self.source_id.clone(),
            self.target_id.clone(),
            self.kind,
            self.operation,
        )
    }
}

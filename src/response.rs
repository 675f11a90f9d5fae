//! The crate's public output shape (§6 "Output: the Lineage Graph Store, ready for external
//! serialization").

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Issue, ParseError};
use crate::graph::{Edge, GraphStatistics, Node};

/// Everything [`crate::analyze`] produces: the lineage graph flattened to node/edge lists for
/// serialization, parse errors in script coordinates, accumulated non-fatal issues, and summary
/// statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineageResult {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub parse_errors: Vec<ParseError>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub statistics: GraphStatistics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_result_is_empty() {
        let result = LineageResult::default();
        assert!(result.nodes.is_empty());
        assert!(result.edges.is_empty());
        assert_eq!(result.statistics, GraphStatistics::default());
    }

    #[test]
    fn serializes_camel_case_field_names() {
        let json = serde_json::to_string(&LineageResult::default()).unwrap();
        assert!(json.contains("\"parseErrors\""));
    }
}

//! Request/configuration types for the lineage analysis API.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A request to extract column-level lineage from a T-SQL script.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineageRequest {
    /// The T-SQL script to analyze. May contain multiple `GO`-delimited batches.
    pub sql: String,
    /// SQL dialect used to select the underlying parser grammar.
    #[serde(default)]
    pub dialect: Dialect,
    /// Optional source name (file path or script identifier), carried through for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<AnalysisOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaMetadata>,
}

/// SQL dialect for parsing and default identifier normalization.
///
/// This crate targets T-SQL; the non-`MsSql` variants exist so the same pipeline can still
/// parse embedded or cross-dialect fragments (e.g. a linked-server query) without a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    MsSql,
    Generic,
}

impl Dialect {
    pub fn to_sqlparser_dialect(self) -> Box<dyn sqlparser::dialect::Dialect> {
        use sqlparser::dialect::{GenericDialect, MsSqlDialect};
        match self {
            Self::MsSql => Box::new(MsSqlDialect {}),
            Self::Generic => Box::new(GenericDialect {}),
        }
    }

    /// Default identifier-normalization behavior for this dialect (§4.B / §5 case-insensitive
    /// comparison with interned display-cased strings).
    pub fn default_case_sensitivity(self) -> CaseSensitivity {
        match self {
            // T-SQL's default collation (e.g. SQL_Latin1_General_CP1_CI_AS) is case-insensitive
            // but preserves the declared case for display — neither `Lower` nor `Upper` folding
            // is correct, so this gets its own strategy.
            Self::MsSql => CaseSensitivity::InsensitivePreserving,
            Self::Generic => CaseSensitivity::InsensitivePreserving,
        }
    }
}

/// Identifier comparison/normalization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub enum CaseSensitivity {
    /// Fold to lowercase before comparison and storage.
    Lower,
    /// Fold to uppercase before comparison and storage.
    Upper,
    /// Compare exactly; no folding.
    Exact,
    /// Compare case-insensitively but preserve the originally declared case for display
    /// (T-SQL's default collation behavior).
    #[default]
    InsensitivePreserving,
    /// Use the owning dialect's default strategy.
    Dialect,
}

impl CaseSensitivity {
    /// Normalize an identifier for use as a lookup key. Does not affect the display-cased
    /// string stored alongside it.
    pub fn normalize_key(self, ident: &str) -> String {
        match self {
            Self::Lower => ident.to_lowercase(),
            Self::Upper => ident.to_uppercase(),
            Self::Exact => ident.to_string(),
            Self::InsensitivePreserving | Self::Dialect => ident.to_lowercase(),
        }
    }
}

/// SQL Server compatibility level, affecting which syntax generation the parser accepts.
/// The crate does not implement per-level parser variants itself (out of scope, §1); this is
/// carried through purely as a hint a caller-provided parser front-end could act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub enum CompatibilityLevel {
    Sql2012,
    Sql2014,
    Sql2016,
    Sql2017,
    Sql2019,
    #[default]
    Sql2022,
}

/// Options controlling extraction behavior (§6 Configuration options).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOptions {
    #[serde(default = "default_true")]
    pub extract_table_references: bool,
    #[serde(default = "default_true")]
    pub extract_column_references: bool,
    #[serde(default = "default_true")]
    pub use_quoted_identifiers: bool,
    #[serde(default)]
    pub compatibility_level: CompatibilityLevel,
    /// 0 = unlimited.
    #[serde(default)]
    pub max_batch_size_bytes: usize,
    /// Streaming kicks in once the script exceeds `10 * max_fragment_size` bytes.
    #[serde(default = "default_max_fragment_size")]
    pub max_fragment_size: usize,
    #[serde(default = "default_max_nested_query_depth")]
    pub max_nested_query_depth: u32,
    /// Parse batches in parallel via a worker pool rather than sequentially.
    #[serde(default)]
    pub parallel: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            extract_table_references: true,
            extract_column_references: true,
            use_quoted_identifiers: true,
            compatibility_level: CompatibilityLevel::default(),
            max_batch_size_bytes: 0,
            max_fragment_size: default_max_fragment_size(),
            max_nested_query_depth: default_max_nested_query_depth(),
            parallel: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_fragment_size() -> usize {
    64 * 1024
}

fn default_max_nested_query_depth() -> u32 {
    32
}

/// Schema metadata for accurate column and table resolution, pre-seeded before extraction.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_catalog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitivity: Option<CaseSensitivity>,
    #[serde(default)]
    pub tables: Vec<SchemaTable>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchemaTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default)]
    pub nullable: bool,
}

/// Extra, open-ended metadata attached to nodes (e.g. `Direction`, `ReferencesTable`,
/// `Dropped`). Kept as a string map rather than a closed enum because the handlers in
/// `src/extractor/` each contribute their own small, unrelated set of keys.
pub type Metadata = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dialect_is_mssql() {
        assert_eq!(Dialect::default(), Dialect::MsSql);
    }

    #[test]
    fn mssql_case_sensitivity_is_insensitive_preserving() {
        assert_eq!(
            Dialect::MsSql.default_case_sensitivity(),
            CaseSensitivity::InsensitivePreserving
        );
    }

    #[test]
    fn serializes_camel_case() {
        let opts = AnalysisOptions::default();
        let json = serde_json::to_string(&opts).unwrap();
        assert!(json.contains("\"extractTableReferences\":true"));
        assert!(json.contains("\"maxNestedQueryDepth\":32"));
    }

    #[test]
    fn normalize_key_insensitive_preserving_folds_lower() {
        assert_eq!(
            CaseSensitivity::InsensitivePreserving.normalize_key("MyTable"),
            "mytable"
        );
    }
}

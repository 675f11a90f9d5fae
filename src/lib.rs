//! Column-level data lineage extraction for T-SQL scripts.
//!
//! Four cooperating components (§2), leaves-first:
//!
//! - [`graph`] (A) — the typed node/edge container lineage is written into.
//! - [`scope`] (B) — the per-statement alias/CTE/variable scope stack used for name resolution.
//! - [`batch`] (C) — splits a script at `GO` and parses each batch, sequentially or in parallel.
//! - [`extractor`] (D) — walks each batch's AST, dispatching to per-construct handlers that
//!   resolve names via (B) and write into (A).
//!
//! [`analyze`] is the single public entry point tying all four together: script text in,
//! [`response::LineageResult`] out.

pub mod batch;
pub mod error;
pub mod extractor;
pub mod graph;
pub mod interner;
pub mod pool;
pub mod request;
pub mod response;
pub mod scope;

pub use batch::CancellationToken;
pub use error::{Issue, IssueCode, LineageError, ParseError, ParseErrorKind, Position, Severity};
pub use graph::{Edge, EdgeKind, GraphStatistics, GraphStore, Node, NodeKindTag, Operation, TableKind};
pub use request::{AnalysisOptions, CaseSensitivity, Dialect, LineageRequest, SchemaMetadata};
pub use response::LineageResult;

#[cfg(feature = "tracing")]
use tracing::debug;

use batch::BatchParser;
use extractor::ExtractionContext;
use graph::{ColumnNode, CounterIdGenerator, IdGenerator, Node as GraphNode, TableKind as GraphTableKind, TableNode, COLUMN_PREFIX, TABLE_PREFIX};
use interner::StringInterner;
use scope::ScopeStack;

/// Runs the full pipeline (§2 Flow) against `request`, with no cancellation support.
///
/// Pure: the same `request` always produces the same [`LineageResult`] (modulo the id generator,
/// which is a deterministic per-prefix counter by default — §6 "Persisted state: none").
pub fn analyze(request: &LineageRequest) -> Result<LineageResult, LineageError> {
    analyze_with(request, None)
}

/// As [`analyze`], but observes `cancellation` at batch and statement boundaries (§5
/// Cancellation). Pass `None` to run to completion unconditionally.
pub fn analyze_with(
    request: &LineageRequest,
    cancellation: Option<&CancellationToken>,
) -> Result<LineageResult, LineageError> {
    let options = request.options.clone().unwrap_or_default();

    let mut graph = GraphStore::new();
    let mut scope = ScopeStack::new();
    let mut ids = CounterIdGenerator::new();
    let mut issues: Vec<Issue> = Vec::new();
    let mut interner = StringInterner::new();

    if let Some(schema) = &request.schema {
        seed_schema(schema, &mut graph, &mut scope, &mut ids, &mut issues);
    }

    let parser = BatchParser::new(request.dialect, options.max_batch_size_bytes);
    let local_token = CancellationToken::new();
    let token = cancellation.unwrap_or(&local_token);

    #[cfg(feature = "tracing")]
    debug!(parallel = options.parallel, "parsing batches");

    // Streaming mode (§4.C): scripts past 10x `maxFragmentSize` are parsed and extracted batch
    // by batch rather than collecting every `BatchAst` up front, bounding peak memory.
    let streaming_threshold = options.max_fragment_size.saturating_mul(10);
    let mut parse_errors = Vec::new();

    if streaming_threshold > 0 && request.sql.len() > streaming_threshold {
        if options.max_batch_size_bytes > 0 && request.sql.len() > options.max_batch_size_bytes {
            return Err(LineageError::BatchSizeExceeded {
                actual: request.sql.len(),
                limit: options.max_batch_size_bytes,
            });
        }
        let mut ctx = ExtractionContext::new(
            &mut graph,
            &mut scope,
            &mut ids,
            &mut issues,
            &mut interner,
            &options,
            &request.sql,
        );
        for outcome in parser.parse_streaming(&request.sql) {
            if token.is_cancelled() {
                return Err(LineageError::Cancelled);
            }
            match outcome {
                Ok(batch) => extractor::extract_batch(&batch, &mut ctx, cancellation)?,
                Err(err) => parse_errors.push(err),
            }
        }
    } else {
        let parsed = if options.parallel {
            parser.parse_parallel(&request.sql, token)?
        } else {
            parser.parse(&request.sql)?
        };
        parse_errors = parsed.errors;

        let mut ctx = ExtractionContext::new(
            &mut graph,
            &mut scope,
            &mut ids,
            &mut issues,
            &mut interner,
            &options,
            &request.sql,
        );
        extractor::extract_script(&parsed.batches, &mut ctx, cancellation)?;
    }

    graph.compact();

    Ok(LineageResult {
        nodes: graph.nodes().cloned().collect(),
        edges: graph.edges().cloned().collect(),
        parse_errors,
        issues,
        statistics: graph.statistics(),
    })
}

/// Pre-seeds the graph and root scope frame from caller-supplied [`SchemaMetadata`] (§6
/// Configuration: "`SchemaMetadata` for pre-seeding known tables/columns") so that `FROM`
/// references, `INSERT` column-list defaulting, and `SELECT *` expansion all see these tables'
/// declared columns even though no `CREATE TABLE` for them appears in the script.
fn seed_schema(
    schema: &SchemaMetadata,
    graph: &mut GraphStore,
    scope: &mut ScopeStack,
    ids: &mut dyn IdGenerator,
    issues: &mut Vec<Issue>,
) {
    for table in &schema.tables {
        let table_id = ids.next_id(TABLE_PREFIX);
        let mut node = TableNode::new(table_id.clone(), table.name.clone(), GraphTableKind::BaseTable);
        if let Some(table_schema) = &table.schema {
            node = node.with_schema(table_schema.clone());
        }
        graph.add_node(GraphNode::Table(node), issues);
        scope.current_mut().register_table(&table.name, &table_id);

        for column in &table.columns {
            let col_id = ids.next_id(COLUMN_PREFIX);
            let mut col = ColumnNode::new(col_id.clone(), table.name.clone(), column.name.clone())
                .with_nullable(column.nullable);
            if let Some(data_type) = &column.data_type {
                col = col.with_data_type(data_type.clone());
            }
            graph.add_node(GraphNode::Column(col), issues);
            graph.attach_column_to_table(&table_id, &col_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use request::{ColumnSchema, SchemaTable};

    #[test]
    fn analyzes_a_simple_select_into_a_graph() {
        let request = LineageRequest {
            sql: "SELECT id, name FROM Customers".to_string(),
            dialect: Dialect::MsSql,
            source_name: None,
            options: None,
            schema: None,
        };
        let result = analyze(&request).expect("analysis should not fail");
        assert!(result.parse_errors.is_empty());
        assert!(result.statistics.table_nodes >= 2, "source and result tables");
        assert!(result.statistics.column_nodes >= 4);
        assert!(result.statistics.direct_edges >= 2);
    }

    #[test]
    fn schema_metadata_seeds_known_columns_before_extraction() {
        let schema = SchemaMetadata {
            default_catalog: None,
            default_schema: None,
            case_sensitivity: None,
            tables: vec![SchemaTable {
                schema: None,
                name: "Customers".to_string(),
                columns: vec![
                    ColumnSchema { name: "Id".to_string(), data_type: Some("int".to_string()), nullable: false },
                    ColumnSchema { name: "Name".to_string(), data_type: Some("varchar".to_string()), nullable: true },
                ],
            }],
        };
        let request = LineageRequest {
            sql: "SELECT Id, Name FROM Customers".to_string(),
            dialect: Dialect::MsSql,
            source_name: None,
            options: None,
            schema: Some(schema),
        };
        let result = analyze(&request).expect("analysis should not fail");
        let id_col = result
            .nodes
            .iter()
            .filter_map(Node::as_column)
            .find(|c| c.table_owner.eq_ignore_ascii_case("customers") && c.name == "Id")
            .expect("seeded column should be present");
        assert_eq!(id_col.data_type, "int");
    }

    #[test]
    fn batch_size_limit_propagates_as_a_script_level_error() {
        let request = LineageRequest {
            sql: "SELECT 1".to_string(),
            dialect: Dialect::MsSql,
            source_name: None,
            options: Some(AnalysisOptions {
                max_batch_size_bytes: 4,
                ..AnalysisOptions::default()
            }),
            schema: None,
        };
        let result = analyze(&request);
        assert!(matches!(result, Err(LineageError::BatchSizeExceeded { .. })));
    }

    #[test]
    fn cancellation_token_stops_extraction_before_the_second_batch() {
        let token = CancellationToken::new();
        token.cancel();
        let request = LineageRequest {
            sql: "SELECT 1\nGO\nSELECT 2\n".to_string(),
            dialect: Dialect::MsSql,
            source_name: None,
            options: None,
            schema: None,
        };
        let result = analyze_with(&request, Some(&token));
        assert!(matches!(result, Err(LineageError::Cancelled)));
    }

    #[test]
    fn scripts_past_the_streaming_threshold_still_extract_every_batch() {
        // `max_fragment_size` of 1 byte puts the streaming threshold at 10 bytes, well under
        // the padding below, forcing `analyze_with` through its streaming branch (§4.C).
        let padding = "-- ".to_string() + &"x".repeat(64) + "\n";
        let sql = format!("{padding}SELECT a FROM t\nGO\n{padding}SELECT b FROM t2\n");
        let request = LineageRequest {
            sql,
            dialect: Dialect::MsSql,
            source_name: None,
            options: Some(AnalysisOptions {
                max_fragment_size: 1,
                ..AnalysisOptions::default()
            }),
            schema: None,
        };
        let result = analyze(&request).expect("streaming analysis should not fail");
        assert!(result.parse_errors.is_empty());
        let table_names: std::collections::HashSet<_> = result
            .nodes
            .iter()
            .filter_map(Node::as_table)
            .map(|t| t.name.to_ascii_lowercase())
            .collect();
        assert!(table_names.contains("t"));
        assert!(table_names.contains("t2"));
    }
}

//! Component C: Batch Parser Orchestrator (§4.C). Splits a script at `GO`, parses each batch
//! (sequentially or in parallel), and collects errors with offsets corrected back to script
//! coordinates.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use regex::Regex;
use sqlparser::ast::Statement;
use sqlparser::parser::Parser;

use crate::error::{LineageError, ParseError, Position};
use crate::pool::Pool;
use crate::request::Dialect;

/// One `GO`-delimited section of the script, already parsed.
#[derive(Debug, Clone)]
pub struct BatchAst {
    pub batch_index: usize,
    pub start_offset: usize,
    pub start_line: usize,
    pub text: String,
    pub statements: Vec<Statement>,
}

/// Result of orchestrating a whole script: every batch that parsed (possibly empty if all
/// batches failed) plus every parse error, already offset-corrected to script coordinates.
#[derive(Debug, Default)]
pub struct ParsedScript {
    pub batches: Vec<BatchAst>,
    pub errors: Vec<ParseError>,
}

/// Cooperative cancellation flag, checked at batch boundaries (§5).
#[derive(Debug, Default)]
pub struct CancellationToken(AtomicBool);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct RawBatch {
    text: String,
    start_offset: usize,
    start_line: usize,
}

/// Scans for `GO` tokens standing alone on a line (optionally followed by a repeat count), case
/// insensitive, and splits the script at each one (§4.C Batch splitting). The `GO` line itself
/// is not part of either surrounding batch.
fn split_batches(script: &str) -> Vec<RawBatch> {
    static GO_LINE: OnceLock<Regex> = OnceLock::new();
    let re = GO_LINE.get_or_init(|| {
        Regex::new(r"(?im)^[ \t]*GO[ \t]*(?:[0-9]+)?[ \t]*\r?$").expect("valid regex")
    });

    let mut batches = Vec::new();
    let mut cursor = 0usize;
    let mut start_offset = 0usize;
    let mut start_line = 1usize;

    for m in re.find_iter(script) {
        let text = script[cursor..m.start()].to_string();
        batches.push(RawBatch {
            text,
            start_offset,
            start_line,
        });
        // Advance line/offset trackers past the GO line, including its trailing newline.
        let consumed_end = script[m.end()..].find('\n').map(|i| m.end() + i + 1).unwrap_or(script.len());
        start_line += script[cursor..consumed_end].matches('\n').count();
        start_offset = consumed_end;
        cursor = consumed_end;
    }

    let tail = script[cursor..].to_string();
    if !tail.trim().is_empty() || batches.is_empty() {
        batches.push(RawBatch {
            text: tail,
            start_offset,
            start_line,
        });
    }

    batches
}

fn parse_one_batch(raw: &RawBatch, batch_index: usize, dialect: Dialect) -> Result<BatchAst, ParseError> {
    let dialect_box = dialect.to_sqlparser_dialect();
    match Parser::parse_sql(dialect_box.as_ref(), &raw.text) {
        Ok(statements) => Ok(BatchAst {
            batch_index,
            start_offset: raw.start_offset,
            start_line: raw.start_line,
            text: raw.text.clone(),
            statements,
        }),
        Err(err) => {
            let mut parse_err = ParseError::from_sqlparser(err).with_dialect(dialect);
            if parse_err.position.is_none() {
                parse_err = parse_err.with_position(Position {
                    line: 1,
                    column: 1,
                    start_offset: 0,
                    end_offset: 0,
                });
            }
            Err(parse_err.offset_by(raw.start_offset, raw.start_line))
        }
    }
}

/// Orchestrates batch splitting and per-batch parsing.
pub struct BatchParser {
    dialect: Dialect,
    max_batch_size_bytes: usize,
    dialect_pool: Pool<Dialect>,
}

impl BatchParser {
    pub fn new(dialect: Dialect, max_batch_size_bytes: usize) -> Self {
        Self {
            dialect,
            max_batch_size_bytes,
            dialect_pool: Pool::new(move || dialect, |_| {}),
        }
    }

    fn check_size(&self, script: &str) -> Result<(), LineageError> {
        if self.max_batch_size_bytes > 0 && script.len() > self.max_batch_size_bytes {
            return Err(LineageError::BatchSizeExceeded {
                actual: script.len(),
                limit: self.max_batch_size_bytes,
            });
        }
        Ok(())
    }

    /// Sequential parse: batches are parsed and collected in order. A failing batch does not
    /// stop later batches from being attempted (§4.C Failure modes).
    pub fn parse(&self, script: &str) -> Result<ParsedScript, LineageError> {
        self.check_size(script)?;
        let raw_batches = split_batches(script);
        let mut result = ParsedScript::default();

        for (index, raw) in raw_batches.iter().enumerate() {
            let guard = self.dialect_pool.checkout();
            match parse_one_batch(raw, index, *guard) {
                Ok(batch) => result.batches.push(batch),
                Err(err) => result.errors.push(err),
            }
        }

        result.batches.sort_by_key(|b| b.batch_index);
        Ok(result)
    }

    /// Parallel parse: each batch runs on its own worker (via `rayon`'s global pool); results
    /// are reordered by `batch_index` on collection so downstream analysis stays deterministic
    /// (§4.C Parallel mode, §5).
    pub fn parse_parallel(
        &self,
        script: &str,
        cancellation: &CancellationToken,
    ) -> Result<ParsedScript, LineageError> {
        self.check_size(script)?;
        let raw_batches = split_batches(script);

        if cancellation.is_cancelled() {
            return Err(LineageError::Cancelled);
        }

        let dialect = self.dialect;
        let outcomes: Vec<Result<BatchAst, ParseError>> = raw_batches
            .par_iter()
            .enumerate()
            .map(|(index, raw)| parse_one_batch(raw, index, dialect))
            .collect();

        if cancellation.is_cancelled() {
            return Err(LineageError::Cancelled);
        }

        let mut result = ParsedScript::default();
        for outcome in outcomes {
            match outcome {
                Ok(batch) => result.batches.push(batch),
                Err(err) => result.errors.push(err),
            }
        }
        result.batches.sort_by_key(|b| b.batch_index);
        Ok(result)
    }

    /// Streaming mode (§4.C): yields each batch as soon as it is split and parsed, rather than
    /// collecting the whole script's batches up front, bounding peak memory for very large
    /// scripts. The caller drives the iterator and may run the extractor incrementally.
    pub fn parse_streaming<'a>(
        &'a self,
        script: &'a str,
    ) -> impl Iterator<Item = Result<BatchAst, ParseError>> + 'a {
        split_batches(script)
            .into_iter()
            .enumerate()
            .map(move |(index, raw)| {
                let guard = self.dialect_pool.checkout();
                parse_one_batch(&raw, index, *guard)
            })
    }
}

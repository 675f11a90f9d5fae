//! Error types for SQL parsing and lineage analysis.
//!
//! # Error Handling Strategy
//!
//! This crate uses two complementary error handling patterns:
//!
//! - [`ParseError`]: Fatal errors that prevent SQL parsing. Returned as `Result<T, ParseError>`
//!   and stop processing of the affected batch.
//!
//! - [`Issue`]: Non-fatal warnings and errors collected during analysis (e.g., unresolved
//!   table references, malformed fragments). These are accumulated in a vector and returned
//!   alongside successful analysis results, allowing partial lineage extraction even when some
//!   references cannot be resolved.
//!
//! This separation allows the analyzer to be resilient: parsing must succeed, but analysis can
//! continue with incomplete information while reporting issues.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
#[cfg(feature = "tracing")]
use tracing::trace;

use crate::request::Dialect;

/// Error encountered while splitting or parsing a batch of SQL.
///
/// Preserves structured information from the underlying parser, including position
/// information when available.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, JsonSchema)]
#[error("{}", self.render())]
#[serde(rename_all = "camelCase")]
pub struct ParseError {
    /// Human-readable error message.
    pub message: String,
    /// Position where the error occurred, if available.
    pub position: Option<Position>,
    /// The SQL dialect being parsed when the error occurred.
    pub dialect: Option<Dialect>,
    /// The specific category of parse error.
    pub kind: ParseErrorKind,
}

/// Position information for a parse error, in script (not batch-local) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Line number (1-indexed).
    pub line: usize,
    /// Column number (1-indexed).
    pub column: usize,
    /// Byte offset from the start of the script.
    pub start_offset: usize,
    /// Byte offset one past the end of the offending token, if known.
    pub end_offset: usize,
}

/// Category of parse error for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ParseErrorKind {
    #[default]
    SyntaxError,
    MissingClause,
    UnexpectedEof,
    UnsupportedFeature,
    LexerError,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
            dialect: None,
            kind: ParseErrorKind::SyntaxError,
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    pub fn with_kind(mut self, kind: ParseErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Rebase a parse error's position by the byte/line offset of the batch it occurred in,
    /// translating it back into script coordinates. Never overwrites an already-absolute line 0.
    pub fn offset_by(mut self, batch_start_offset: usize, batch_start_line: usize) -> Self {
        if let Some(pos) = &mut self.position {
            pos.start_offset += batch_start_offset;
            pos.end_offset += batch_start_offset;
            // Line numbers from the parser are 1-indexed relative to the batch; only the first
            // line of a batch shares a line with the GO separator before it.
            pos.line = pos.line + batch_start_line - 1;
        }
        self
    }

    /// Parses `{line, column}` from sqlparser's error message format.
    ///
    /// sqlparser uses a format like "Expected ..., found ... at Line: X, Column: Y". This
    /// parsing is coupled to that format; it gracefully returns `None` when not found.
    fn parse_position_from_message(message: &str) -> Option<(usize, usize)> {
        static POSITION_REGEX: OnceLock<Regex> = OnceLock::new();
        let re = POSITION_REGEX.get_or_init(|| {
            Regex::new(r"Line:\s*(\d+)\s*,\s*Column:\s*(\d+)").expect("valid regex")
        });

        let result = re.captures(message).and_then(|caps| {
            let line: usize = caps.get(1)?.as_str().parse().ok()?;
            let column: usize = caps.get(2)?.as_str().parse().ok()?;
            Some((line, column))
        });

        #[cfg(feature = "tracing")]
        if result.is_none() && (message.contains("Line") || message.contains("Column")) {
            trace!(message, "failed to parse position from parser message");
        }

        result
    }

    fn infer_kind_from_message(message: &str) -> ParseErrorKind {
        let lower = message.to_lowercase();
        if lower.contains("unexpected end") || lower.contains("eof") {
            ParseErrorKind::UnexpectedEof
        } else if lower.contains("expected") {
            ParseErrorKind::MissingClause
        } else if lower.contains("not supported") || lower.contains("unsupported") {
            ParseErrorKind::UnsupportedFeature
        } else if lower.contains("lexer") || lower.contains("token") {
            ParseErrorKind::LexerError
        } else {
            ParseErrorKind::SyntaxError
        }
    }

    /// Build a `ParseError` from a raw `sqlparser` error plus the batch-local byte offset the
    /// batch started at (for position correction once combined with `offset_by`).
    pub fn from_sqlparser(err: sqlparser::parser::ParserError) -> Self {
        let message = err.to_string();
        let position = Self::parse_position_from_message(&message).map(|(line, column)| Position {
            line,
            column,
            start_offset: 0,
            end_offset: 0,
        });
        let kind = Self::infer_kind_from_message(&message);
        Self {
            message,
            position,
            dialect: None,
            kind,
        }
    }

    fn render(&self) -> String {
        let mut out = String::from("parse error");
        if let Some(dialect) = self.dialect {
            out.push_str(&format!(" ({dialect:?})"));
        }
        if let Some(pos) = self.position {
            out.push_str(&format!(" at line {}, column {}", pos.line, pos.column));
        }
        out.push_str(": ");
        out.push_str(&self.message);
        out
    }
}

impl From<sqlparser::parser::ParserError> for ParseError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        Self::from_sqlparser(err)
    }
}

/// A script-level failure that propagates all the way to the caller (§7: `BatchSizeExceeded`,
/// `Cancelled`). All other failure modes (`ParseFailure`, `UnresolvedReference`,
/// `MalformedFragment`, graph-integrity violations) are contained as [`Issue`]s.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LineageError {
    #[error("script of {actual} bytes exceeds configured maxBatchSizeBytes of {limit}")]
    BatchSizeExceeded { actual: usize, limit: usize },
    #[error("analysis was cancelled")]
    Cancelled,
}

/// Severity of a non-fatal [`Issue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// A non-fatal diagnostic accumulated during analysis. Never stops traversal.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<IssuePosition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct IssuePosition {
    pub line: usize,
    pub column: usize,
}

/// Machine-readable issue classification (§7 taxonomy, minus the script-level failures which
/// are `LineageError` instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum IssueCode {
    UnresolvedReference,
    MalformedFragment,
    DanglingEdge,
    NodeKindConflict,
    InternalError,
}

impl Issue {
    pub fn unresolved_reference(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: IssueCode::UnresolvedReference,
            message: message.into(),
            position: None,
        }
    }

    pub fn malformed_fragment(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: IssueCode::MalformedFragment,
            message: message.into(),
            position: None,
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        let message = message.into();
        #[cfg(feature = "tracing")]
        tracing::warn!(message = %message, "handler boundary caught an internal error");
        Self {
            severity: Severity::Error,
            code: IssueCode::InternalError,
            message,
            position: None,
        }
    }

    pub fn dangling_edge(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: IssueCode::DanglingEdge,
            message: message.into(),
            position: None,
        }
    }

    pub fn node_kind_conflict(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: IssueCode::NodeKindConflict,
            message: message.into(),
            position: None,
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}/{:?}] {}", self.severity, self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_position_from_sqlparser_style_message() {
        let msg = "Expected SELECT, found 'INSERT' at Line: 1, Column: 5";
        let pos = ParseError::parse_position_from_message(msg);
        assert_eq!(pos, Some((1, 5)));
    }

    #[test]
    fn no_position_when_absent() {
        let msg = "Unexpected token";
        assert_eq!(ParseError::parse_position_from_message(msg), None);
    }

    #[test]
    fn offset_by_preserves_batch_local_column() {
        let err = ParseError::new("bad token").with_position(Position {
            line: 2,
            column: 9,
            start_offset: 10,
            end_offset: 14,
        });
        let rebased = err.offset_by(100, 5);
        let pos = rebased.position.unwrap();
        assert_eq!(pos.start_offset, 110);
        assert_eq!(pos.end_offset, 114);
        assert_eq!(pos.line, 6);
    }

    #[test]
    fn infers_unsupported_feature() {
        assert_eq!(
            ParseError::infer_kind_from_message("MERGE is not supported here"),
            ParseErrorKind::UnsupportedFeature
        );
    }

    #[test]
    fn display_includes_dialect_and_position() {
        let e = ParseError::new("bad syntax")
            .with_position(Position {
                line: 1,
                column: 5,
                start_offset: 0,
                end_offset: 1,
            })
            .with_dialect(Dialect::MsSql);
        assert_eq!(e.to_string(), "parse error (MsSql) at line 1, column 5: bad syntax");
    }
}

//! Data models for schema context and generation results
//!
//! This module contains the catalog descriptors loaded from schema documents and
//! the transient per-request values that flow through the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Column data type as declared in a schema document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// `STRING`
    String,
    /// `INTEGER` (or `INT64`)
    Integer,
    /// `FLOAT64` (or `FLOAT`)
    Float64,
    /// Any other warehouse type, upper-cased
    Other(String),
}

impl ColumnType {
    /// Parse a declared type name. Never fails; unknown names become `Other`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();
        match upper.as_str() {
            "STRING" => Self::String,
            "INTEGER" | "INT64" => Self::Integer,
            "FLOAT64" | "FLOAT" => Self::Float64,
            _ => Self::Other(upper),
        }
    }

    /// Canonical type name
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "STRING",
            Self::Integer => "INTEGER",
            Self::Float64 => "FLOAT64",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column nullability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnMode {
    /// `REQUIRED`
    Required,
    /// `NULLABLE`
    Nullable,
}

impl ColumnMode {
    /// Parse a declared mode, case-insensitive
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "REQUIRED" => Some(Self::Required),
            "NULLABLE" => Some(Self::Nullable),
            _ => None,
        }
    }

    /// Canonical mode name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Required => "REQUIRED",
            Self::Nullable => "NULLABLE",
        }
    }
}

impl fmt::Display for ColumnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One column of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name, unique within its table
    pub name: String,
    /// Declared data type
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Declared mode
    pub mode: ColumnMode,
    /// Free-text description
    pub description: String,
}

/// One table of the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table name, unique within the catalog
    pub name: String,
    /// Free-text description
    pub description: String,
    /// Columns in declaration order
    pub columns: Vec<ColumnDescriptor>,
    /// `CREATE TABLE` statement, verbatim from the source document
    pub ddl: String,
}

impl TableDescriptor {
    /// Find a column by exact name
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in declaration order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// What a ranked item points at
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContextTarget<'a> {
    /// A whole table
    Table(&'a TableDescriptor),
    /// A single column of a table
    Column {
        /// Owning table
        table: &'a TableDescriptor,
        /// The column itself
        column: &'a ColumnDescriptor,
    },
}

impl<'a> ContextTarget<'a> {
    /// The table this target belongs to
    #[must_use]
    pub const fn table(&self) -> &'a TableDescriptor {
        match self {
            Self::Table(table) | Self::Column { table, .. } => *table,
        }
    }

    /// `table` or `table.column`
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Table(table) => table.name.clone(),
            Self::Column { table, column } => format!("{}.{}", table.name, column.name),
        }
    }
}

/// A scored context item, recomputed per request
#[derive(Debug, Clone, PartialEq)]
pub struct RankedContextItem<'a> {
    /// Table or column reference
    pub target: ContextTarget<'a>,
    /// Relevance in `[0, 1]`
    pub score: f64,
    /// 1-based position in the ranking
    pub rank: usize,
}

/// An assembled prompt, ready for the completion service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    text: String,
    context: Vec<String>,
    fallback: bool,
}

impl Prompt {
    pub(crate) const fn new(text: String, context: Vec<String>, fallback: bool) -> Self {
        Self {
            text,
            context,
            fallback,
        }
    }

    /// Full prompt text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in characters, the unit the budget is measured in
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Labels of the context items that made it into the prompt, in order
    #[must_use]
    pub fn context_labels(&self) -> &[String] {
        &self.context
    }

    /// True when this is the no-schema fallback template
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        self.fallback
    }
}

/// Why the model did not produce a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefusalCause {
    /// The completion did not return within the request timeout
    Timeout {
        /// Timeout that expired
        after_ms: u64,
    },
    /// The model answered with the refusal sentence
    Declined,
    /// Transport or provider failure
    Service(String),
}

impl fmt::Display for RefusalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { after_ms } => write!(f, "timed out after {after_ms} ms"),
            Self::Declined => f.write_str("model declined the request"),
            Self::Service(cause) => write!(f, "service failure: {cause}"),
        }
    }
}

/// Reason code attached to a fallback result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// No schema context matched the question
    NoContext,
    /// The completion service refused or failed
    ModelRefused(RefusalCause),
    /// The response did not contain exactly one well-formed statement
    UnparsableResponse(String),
}

impl FallbackReason {
    /// Stable reason code for logs and metrics
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoContext => "no_context",
            Self::ModelRefused(_) => "model_refused",
            Self::UnparsableResponse(_) => "unparsable_response",
        }
    }

    /// Message suitable for showing to the person who asked
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::NoContext => "No table in the schema matches this question.",
            Self::ModelRefused(_) | Self::UnparsableResponse(_) => {
                "Could not generate a query for this question. Please try rephrasing it."
            }
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoContext => f.write_str("no matching schema context"),
            Self::ModelRefused(cause) => write!(f, "model refused: {cause}"),
            Self::UnparsableResponse(detail) => write!(f, "unparsable response: {detail}"),
        }
    }
}

/// Outcome of one generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    /// A single validated SQL statement
    Sql(String),
    /// No statement; see the reason
    Fallback(FallbackReason),
}

impl GenerationResult {
    /// The statement, when one was produced
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Sql(sql) => Some(sql),
            Self::Fallback(_) => None,
        }
    }

    /// The fallback reason, when no statement was produced
    #[must_use]
    pub const fn fallback_reason(&self) -> Option<&FallbackReason> {
        match self {
            Self::Sql(_) => None,
            Self::Fallback(reason) => Some(reason),
        }
    }
}

//! Error types for the EV warehouse pipeline.
//!
//! The hierarchy follows the pipeline boundaries:
//!
//! - [`SourceError`] - fetching the raw extract (HTTP or file)
//! - [`CsvError`] - decoding and parsing the extract into raw records
//! - [`SchemaError`] - field schema / dimension definition mismatches
//! - [`LoadError`] - persisting tables to a sink
//! - [`PipelineError`] - top-level run failures
//!
//! Field-level and row-level defects never show up here: the cleaner
//! recovers the former and the parser/cleaner count the latter.
//! Conversion is automatic via `From`, so `?` works across boundaries.

use thiserror::Error;

// =============================================================================
// Source Errors
// =============================================================================

/// Errors while retrieving the raw extract.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The data provider answered with a non-success status.
    #[error("Failed to download dataset from {url}: HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    /// Transport-level failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Local file could not be read.
    #[error("Failed to read source file: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// CSV Parsing Errors
// =============================================================================

/// Fatal parse error with line context.
///
/// Only used for problems that make the whole input unusable (no header,
/// undecodable bytes). A single bad data row is dropped and counted instead.
#[derive(Debug, Clone)]
pub struct CsvError {
    pub line: usize,
    pub column: Option<String>,
    pub value: Option<String>,
    pub message: String,
}

impl std::fmt::Display for CsvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.column, &self.value) {
            (Some(col), Some(val)) => {
                write!(f, "Line {}, column '{}' (value '{}'): {}", self.line, col, val, self.message)
            }
            (Some(col), None) => {
                write!(f, "Line {}, column '{}': {}", self.line, col, self.message)
            }
            _ => {
                write!(f, "Line {}: {}", self.line, self.message)
            }
        }
    }
}

impl std::error::Error for CsvError {}

impl CsvError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column: None,
            value: None,
            message: message.into(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

// =============================================================================
// Schema Errors
// =============================================================================

/// A dimension, measure or profile references a field the schema lacks.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Field name not declared in the schema.
    #[error("Unknown field '{0}'")]
    UnknownField(String),

    /// A code column points at a field that is not one of the dimension's attributes.
    #[error("Code column '{column}' encodes '{field}', which is not an attribute of {table}")]
    CodeOutsideDimension {
        table: String,
        column: String,
        field: String,
    },

    /// A field was declared with the wrong kind for its use.
    #[error("Field '{field}' must be {expected}")]
    WrongKind { field: String, expected: &'static str },
}

// =============================================================================
// Load Errors
// =============================================================================

/// Errors while persisting the warehouse tables.
#[derive(Debug, Error)]
pub enum LoadError {
    /// SQLite failure; the surrounding transaction is rolled back.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// CSV writer failure.
    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem failure.
    #[error("Sink IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Nothing to load.
    #[error("No tables to load")]
    EmptyBatch,

    /// A fact table was handed over without one of the dimensions it references.
    #[error("Table '{table}' references missing table '{references}'")]
    MissingDependency { table: String, references: String },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level run errors. Any of these aborts the run before the sink is touched,
/// or (for [`PipelineError::Load`]) leaves the sink in its prior state.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Extraction failed.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Input could not be parsed at all.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Schema misconfiguration.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Persistence failed.
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// A dimension produced a different number of keys than there are records.
    #[error("{dimension} assigned {keys} keys for {records} records")]
    MisalignedKeys {
        dimension: &'static str,
        keys: usize,
        records: usize,
    },

    /// No usable records after parsing.
    #[error("No records to transform")]
    EmptyInput,

    /// A fact row points at a surrogate key its dimension does not contain.
    #[error("Fact row {row} references {column} = {key}, which is not in {table}")]
    OrphanKey {
        row: usize,
        table: String,
        column: String,
        key: u32,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

//! # evwarehouse - EV registration star-schema ETL
//!
//! Turns the flat Washington State electric-vehicle population extract into
//! a star schema: three dimensions with surrogate keys and one fact table.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Source    │────▶│   Parser    │────▶│   Cleaner   │────▶│ Dimensions  │────▶│   Loader    │
//! │ (HTTP/file) │     │  (auto-enc) │     │ (by kind)   │     │  + Facts    │     │ (SQLite/CSV)│
//! └─────────────┘     └─────────────┘     └──────┬──────┘     └─────────────┘     └─────────────┘
//!                                                │
//!                                                ▼
//!                                         ┌─────────────┐
//!                                         │  Profiler   │
//!                                         └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use evwarehouse::{transform_bytes, PipelineOptions};
//!
//! let bytes = std::fs::read("Electric_Vehicle_Population_Data.csv")?;
//! let output = transform_bytes(&bytes, &PipelineOptions::default())?;
//! println!("{} fact rows", output.star.facts.len());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`logs`] - Run log broadcaster
//! - [`models`] - Typed values, records, dimension and fact tables
//! - [`schema`] - Field kinds and the star-schema layout
//! - [`source`] - Raw extract retrieval
//! - [`parser`] - CSV/JSON parsing with auto-detection
//! - [`transform`] - Cleaner, encoder, dimension builder, fact resolver, pipeline
//! - [`profile`] - Summary statistics
//! - [`load`] - Loader and sinks

// Core modules
pub mod error;
pub mod logs;
pub mod models;
pub mod schema;

// Extraction
pub mod parser;
pub mod source;

// Transformation
pub mod transform;

// Reporting
pub mod profile;

// Persistence
pub mod load;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CsvError, LoadError, LoadResult, PipelineError, PipelineResult, SchemaError, SourceError,
    SourceResult,
};

// =============================================================================
// Re-exports - Models and schema
// =============================================================================

pub use models::{
    CleanedRecord, Column, ColumnRole, DimensionTable, DimensionTuple, FactRow, SqlType,
    SurrogateKey, Table, Value, Warehouse,
};

pub use schema::{
    normalize_column_name, vehicle_registration_schema, DimensionDef, FactDef, FieldKind,
    FieldSpec, Schema, StarSchema,
};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes, parse_bytes_auto, ParseResult,
    SkippedRow,
};
pub use source::{SourceLocation, DEFAULT_SOURCE_URL};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::{
    build_dimension, dimensionalize, fetch_and_transform, load_output, run, transform_bytes,
    transform_parsed, transform_records, CategoryCodes, Cleaner, DimensionBuilder, FactResolver, PipelineOptions, RunSummary,
    StarBuild, TransformOutput,
};

pub use profile::{Profile, Profiler};

// =============================================================================
// Re-exports - Load
// =============================================================================

pub use load::{CsvDirSink, LoadReport, Loader, Sink, SqliteSink};

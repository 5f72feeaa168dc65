//! Transformation module.
//!
//! This module turns raw records into the star schema:
//! - Cleaner: missing-value and type policy per declared field kind
//! - Encoder: integer codes for categorical attributes
//! - Dimension: distinct tuples and surrogate keys
//! - Fact: one fact row per cleaned record
//! - Pipeline: the end-to-end run

pub mod cleaner;
pub mod dimension;
pub mod encoder;
pub mod fact;
pub mod pipeline;

pub use cleaner::{CleanOutput, CleanStats, Cleaner, FieldStats};
pub use dimension::{build_dimension, DimensionBuild, DimensionBuilder};
pub use encoder::CategoryCodes;
pub use fact::{DimensionKeys, FactResolver, KeyAssignments};
pub use pipeline::*;

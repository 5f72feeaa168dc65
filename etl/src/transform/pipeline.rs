//! High-level pipeline API: raw extract → star-schema table set.
//!
//! Combines every stage: parsing, profiling, cleaning, dimensionalizing,
//! fact resolution and (optionally) loading.
//!
//! # Example
//!
//! ```rust,ignore
//! use evwarehouse::{run, PipelineOptions, SqliteSink};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut sink = SqliteSink::open("ev_datawarehouse.db")?;
//!     let output = run(&PipelineOptions::default(), Some(&mut sink)).await?;
//!
//!     println!("{}", output.summary);
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::cleaner::{CleanStats, Cleaner};
use super::dimension::build_dimension;
use super::fact::{FactResolver, KeyAssignments};
use crate::error::{PipelineError, PipelineResult, SchemaError};
use crate::load::{LoadReport, Loader, Sink};
use crate::logs::{log_info, log_info_indent, log_success, log_success_indent, log_warning};
use crate::models::{
    CleanedRecord, Column, ColumnRole, DimensionTable, FactRow, SqlType, Table, Value, Warehouse,
};
use crate::parser::{parse_bytes, ParseResult, SkippedRow, SKIPPED_SAMPLE};
use crate::profile::{Profile, Profiler};
use crate::schema::{
    vehicle_registration_schema, DimensionDef, FactDef, FieldKind, NumericType, Schema, StarSchema,
};
use crate::source::SourceLocation;

/// Format of the per-run `load_date` column.
pub const LOAD_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Options for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Where the raw extract comes from
    pub source: SourceLocation,

    /// Force an encoding instead of detecting it
    pub encoding: Option<String>,

    /// Force a delimiter instead of detecting it
    pub delimiter: Option<char>,

    /// Compute the profile report
    pub profile: bool,

    /// Values listed per categorical field in the profile
    pub top_n: usize,

    /// Fixed `load_date` for reproducible output; defaults to now
    pub load_date: Option<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            source: SourceLocation::default(),
            encoding: None,
            delimiter: None,
            profile: true,
            top_n: 10,
            load_date: None,
        }
    }
}

// =============================================================================
// Star build
// =============================================================================

/// The three dimensions, each record's keys, and the fact rows.
#[derive(Debug, Clone)]
pub struct StarBuild {
    pub vehicle: DimensionTable,
    pub location: DimensionTable,
    pub cafv: DimensionTable,
    pub keys: KeyAssignments,
    pub facts: Vec<FactRow>,
}

/// Build every dimension, then resolve one fact per record.
///
/// All dimensions are complete before the first fact is resolved.
pub fn dimensionalize(
    records: &[CleanedRecord],
    schema: &Schema,
    star: &StarSchema,
) -> PipelineResult<StarBuild> {
    let resolver = FactResolver::new(&star.fact, schema)?;

    let vehicle = build_dimension(&star.vehicle, schema, records)?;
    let location = build_dimension(&star.location, schema, records)?;
    let cafv = build_dimension(&star.cafv, schema, records)?;

    let keys = KeyAssignments {
        vehicle: vehicle.keys,
        location: location.keys,
        cafv: cafv.keys,
    };
    let facts = resolver.resolve_all(records, &keys)?;

    Ok(StarBuild {
        vehicle: vehicle.table,
        location: location.table,
        cafv: cafv.table,
        keys,
        facts,
    })
}

impl StarBuild {
    pub fn dimensions(&self) -> [&DimensionTable; 3] {
        [&self.vehicle, &self.location, &self.cafv]
    }

    /// Every fact key must exist in its dimension.
    pub fn check_integrity(&self) -> PipelineResult<()> {
        for (row, fact) in self.facts.iter().enumerate() {
            let refs = [
                (&self.vehicle, fact.vehicle_key),
                (&self.location, fact.location_key),
                (&self.cafv, fact.cafv_key),
            ];
            for (dim, key) in refs {
                if !dim.contains_key(key) {
                    return Err(PipelineError::OrphanKey {
                        row,
                        table: dim.name.clone(),
                        column: dim.key_column.clone(),
                        key,
                    });
                }
            }
        }
        Ok(())
    }

    /// Sink-facing tables, dimensions first.
    pub fn to_warehouse(
        &self,
        schema: &Schema,
        star: &StarSchema,
        load_date: &str,
    ) -> Result<Warehouse, SchemaError> {
        Ok(Warehouse {
            tables: vec![
                dimension_table(&self.vehicle, &star.vehicle, schema)?,
                dimension_table(&self.location, &star.location, schema)?,
                dimension_table(&self.cafv, &star.cafv, schema)?,
                self.fact_table(&star.fact, load_date),
            ],
        })
    }

    fn fact_table(&self, def: &FactDef, load_date: &str) -> Table {
        let fk = |dim: &DimensionTable| {
            Column::new(
                dim.key_column.clone(),
                SqlType::Integer,
                ColumnRole::ForeignKey {
                    table: dim.name.clone(),
                    column: dim.key_column.clone(),
                },
            )
        };

        let columns = vec![
            fk(&self.vehicle),
            fk(&self.location),
            fk(&self.cafv),
            Column::new("vin_prefix", SqlType::Text, ColumnRole::Attribute),
            Column::new("dol_vehicle_id", SqlType::Integer, ColumnRole::Attribute),
            Column::new("electric_range", SqlType::Integer, ColumnRole::Measure),
            Column::new("base_msrp", SqlType::Real, ColumnRole::Measure),
            Column::new("registration_count", SqlType::Integer, ColumnRole::Measure),
            Column::new("load_date", SqlType::Text, ColumnRole::Attribute),
        ];

        let rows = self
            .facts
            .iter()
            .map(|f| {
                vec![
                    Value::Int(f.vehicle_key as i64),
                    Value::Int(f.location_key as i64),
                    Value::Int(f.cafv_key as i64),
                    Value::Text(f.vin_prefix.clone()),
                    Value::Int(f.dol_vehicle_id),
                    Value::Int(f.electric_range),
                    Value::Decimal(f.base_msrp),
                    Value::Int(f.registration_count as i64),
                    Value::from(load_date),
                ]
            })
            .collect();

        Table {
            name: def.table.clone(),
            columns,
            rows,
        }
    }
}

fn sql_type(kind: &FieldKind) -> SqlType {
    match kind {
        FieldKind::Numeric {
            ty: NumericType::Integer,
            ..
        } => SqlType::Integer,
        FieldKind::Numeric {
            ty: NumericType::Decimal,
            ..
        } => SqlType::Real,
        FieldKind::Categorical { .. } | FieldKind::Identifier { .. } => SqlType::Text,
    }
}

/// Key column, attribute columns, then code columns.
fn dimension_table(
    dim: &DimensionTable,
    def: &DimensionDef,
    schema: &Schema,
) -> Result<Table, SchemaError> {
    let mut columns = vec![Column::new(
        dim.key_column.clone(),
        SqlType::Integer,
        ColumnRole::PrimaryKey,
    )];
    for attr in &def.attributes {
        let index = schema.require(&attr.field)?;
        let ty = schema
            .field(index)
            .map(|f| sql_type(&f.kind))
            .unwrap_or(SqlType::Text);
        columns.push(Column::new(attr.column.clone(), ty, ColumnRole::Attribute));
    }
    for code in &dim.code_columns {
        columns.push(Column::new(
            code.column.clone(),
            SqlType::Integer,
            ColumnRole::Attribute,
        ));
    }

    let rows = dim
        .iter()
        .enumerate()
        .map(|(i, (key, tuple))| {
            let mut row = Vec::with_capacity(columns.len());
            row.push(Value::Int(key as i64));
            row.extend(tuple.values().iter().cloned());
            row.extend(dim.code_columns.iter().map(|c| Value::Int(c.codes[i])));
            row
        })
        .collect();

    Ok(Table {
        name: dim.name.clone(),
        columns,
        rows,
    })
}

// =============================================================================
// Run summary
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub source: Option<String>,
    pub encoding: Option<String>,
    /// Rows seen by the parser, dropped ones included
    pub records_read: usize,
    pub records_dropped: usize,
    pub records_cleaned: usize,
    /// Tuple count per dimension table
    pub dimension_counts: BTreeMap<String, usize>,
    pub fact_count: usize,
    pub absent_columns: Vec<String>,
    pub skipped: Vec<SkippedRow>,
    pub load_date: String,
    pub load: Option<LoadReport>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {}", self.run_id)?;
        if let Some(source) = &self.source {
            writeln!(f, "  Source:          {}", source)?;
        }
        writeln!(f, "  Records read:    {}", self.records_read)?;
        writeln!(f, "  Records dropped: {}", self.records_dropped)?;
        writeln!(f, "  Records cleaned: {}", self.records_cleaned)?;
        for (table, count) in &self.dimension_counts {
            writeln!(f, "  {:<16} {} tuples", format!("{}:", table), count)?;
        }
        writeln!(f, "  Fact rows:       {}", self.fact_count)?;
        if let Some(load) = &self.load {
            writeln!(f, "  Loaded into:     {}", load.destination)?;
        }
        for row in &self.skipped {
            writeln!(f, "  skipped line {}: {}", row.line, row.reason)?;
        }
        Ok(())
    }
}

/// Everything one transformation produced.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub records: Vec<CleanedRecord>,
    pub stats: CleanStats,
    pub profile: Option<Profile>,
    pub star: StarBuild,
    pub warehouse: Warehouse,
    pub summary: RunSummary,
}

// =============================================================================
// Entry points
// =============================================================================

/// Transform parser output into the warehouse table set.
pub fn transform_parsed(
    parsed: ParseResult,
    options: &PipelineOptions,
) -> PipelineResult<TransformOutput> {
    let started_at = Utc::now();
    let schema = vehicle_registration_schema();
    let star = StarSchema::default();

    log_info(format!("Cleaning {} records", parsed.records.len()));
    let cleaned = Cleaner::new(&schema).clean_all(&parsed.records);
    for column in &cleaned.stats.absent_columns {
        log_warning(format!(
            "Column '{}' not found in source, defaulted in every row",
            column
        ));
    }
    if cleaned.dropped > 0 {
        log_warning(format!("Dropped {} malformed records", cleaned.dropped));
    }
    if cleaned.records.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    log_success(format!("Cleaned {} records", cleaned.records.len()));

    let profile = if options.profile {
        let report = Profiler::default()
            .with_top_n(options.top_n)
            .profile(&schema, &cleaned.records, &cleaned.stats)?;
        log_success(format!(
            "Profiled {} numeric and {} categorical fields",
            report.numeric.len(),
            report.categorical.len()
        ));
        Some(report)
    } else {
        None
    };

    log_info("Building dimensions");
    let build = dimensionalize(&cleaned.records, &schema, &star)?;
    for dim in build.dimensions() {
        log_success_indent(format!("{}: {} tuples", dim.name, dim.len()), 1);
    }
    build.check_integrity()?;
    log_success(format!("Resolved {} fact rows", build.facts.len()));

    let load_date = options
        .load_date
        .clone()
        .unwrap_or_else(|| Local::now().format(LOAD_DATE_FORMAT).to_string());
    let warehouse = build.to_warehouse(&schema, &star, &load_date)?;

    let mut skipped = parsed.skipped;
    skipped.extend(cleaned.skipped);
    skipped.truncate(SKIPPED_SAMPLE);

    let summary = RunSummary {
        run_id: Uuid::new_v4(),
        started_at,
        source: None,
        encoding: Some(parsed.encoding),
        records_read: parsed.records.len() + parsed.dropped,
        records_dropped: parsed.dropped + cleaned.dropped,
        records_cleaned: cleaned.records.len(),
        dimension_counts: build
            .dimensions()
            .iter()
            .map(|d| (d.name.clone(), d.len()))
            .collect(),
        fact_count: build.facts.len(),
        absent_columns: cleaned.stats.absent_columns.clone(),
        skipped,
        load_date,
        load: None,
    };

    Ok(TransformOutput {
        records: cleaned.records,
        stats: cleaned.stats,
        profile,
        star: build,
        warehouse,
        summary,
    })
}

/// Transform raw records that were already parsed elsewhere.
pub fn transform_records(
    raw: Vec<JsonValue>,
    options: &PipelineOptions,
) -> PipelineResult<TransformOutput> {
    transform_parsed(
        ParseResult {
            records: raw,
            encoding: "utf-8".to_string(),
            delimiter: ',',
            headers: Vec::new(),
            dropped: 0,
            skipped: Vec::new(),
        },
        options,
    )
}

/// Parse and transform an in-memory extract.
pub fn transform_bytes(bytes: &[u8], options: &PipelineOptions) -> PipelineResult<TransformOutput> {
    let parsed = parse_bytes(bytes, options.encoding.as_deref(), options.delimiter)?;
    log_info_indent(
        format!(
            "{} rows, encoding {}, delimiter {:?}",
            parsed.records.len(),
            parsed.encoding,
            parsed.delimiter
        ),
        1,
    );
    if parsed.dropped > 0 {
        log_warning(format!("Skipped {} malformed rows", parsed.dropped));
    }
    transform_parsed(parsed, options)
}

/// Extract and transform without touching any sink.
pub async fn fetch_and_transform(options: &PipelineOptions) -> PipelineResult<TransformOutput> {
    log_info(format!("Extracting {}", options.source.describe()));
    let bytes = options.source.fetch().await?;

    let mut output = transform_bytes(&bytes, options)?;
    output.summary.source = Some(options.source.describe());
    Ok(output)
}

/// Replace the sink's tables with the output's warehouse and record the report.
pub fn load_output(output: &mut TransformOutput, sink: &mut dyn Sink) -> PipelineResult<()> {
    let report = Loader::new(sink).load(&output.warehouse)?;
    output.summary.load = Some(report);
    Ok(())
}

/// Full batch: extract, transform and (when a sink is given) load.
///
/// Any failure before the load leaves the sink untouched; a failed load
/// leaves it in its prior state.
pub async fn run(
    options: &PipelineOptions,
    sink: Option<&mut dyn Sink>,
) -> PipelineResult<TransformOutput> {
    let mut output = fetch_and_transform(options).await?;

    if let Some(sink) = sink {
        load_output(&mut output, sink)?;
    }

    log_success(format!("Run {} complete", output.summary.run_id));
    Ok(output)
}

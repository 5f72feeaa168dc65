//! Cleaner/Normalizer: raw records → fully-typed, gap-free records.
//!
//! The policy is a function of the declared [`FieldKind`] only:
//!
//! | Kind        | Gap or bad value           | Otherwise                         |
//! |-------------|----------------------------|-----------------------------------|
//! | numeric     | constant or batch mode     | parsed integer / decimal          |
//! | categorical | sentinel (`"Unknown"`)     | trimmed, inner whitespace folded  |
//! | identifier  | sentinel (`"Unknown"`)     | alphanumeric, cut to prefix       |
//!
//! A bad value only ever fails its own field. A row that is not an object
//! at all is dropped and counted.

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};

use crate::models::{CleanedRecord, Value};
use crate::parser::{SkippedRow, SKIPPED_SAMPLE};
use crate::schema::{normalize_column_name, FieldKind, NumericDefault, NumericType, Schema};

/// Spellings treated as an empty cell.
const MISSING_MARKERS: &[&str] = &["na", "n/a", "#n/a", "nan", "null", "none", "<na>"];

/// Per-field defect counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldStats {
    /// Value absent or empty; default substituted.
    pub missing: usize,
    /// Value present but rejected; default substituted.
    pub unparseable: usize,
    /// Identifier longer than its prefix.
    pub truncated: usize,
}

impl FieldStats {
    pub fn imputed(&self) -> usize {
        self.missing + self.unparseable
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanStats {
    /// Keyed by normalized field name.
    pub fields: BTreeMap<String, FieldStats>,
    /// Declared fields that never appeared in any row.
    pub absent_columns: Vec<String>,
    /// Default substituted per field in this batch.
    pub defaults: BTreeMap<String, Value>,
}

/// Output of [`Cleaner::clean_all`].
#[derive(Debug, Clone)]
pub struct CleanOutput {
    /// One per accepted input row, in input order.
    pub records: Vec<CleanedRecord>,
    pub dropped: usize,
    pub skipped: Vec<SkippedRow>,
    pub stats: CleanStats,
}

/// Outcome of reading one field.
#[derive(Debug, Clone, PartialEq)]
enum Parsed {
    Value(Value),
    Missing,
    Unparseable,
}

pub struct Cleaner<'a> {
    schema: &'a Schema,
}

impl<'a> Cleaner<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Clean a batch. Order-preserving and one-to-one for every object row.
    ///
    /// Numeric fields with a [`NumericDefault::Mode`] default take the most
    /// frequent parsed value of the batch (smallest on ties).
    pub fn clean_all(&self, raw: &[JsonValue]) -> CleanOutput {
        let mut stats = CleanStats::default();
        for field in self.schema.fields() {
            stats.fields.insert(field.name.clone(), FieldStats::default());
        }

        let mut columns: HashMap<String, Option<usize>> = HashMap::new();
        let mut seen = vec![false; self.schema.len()];
        let mut parsed_rows = Vec::with_capacity(raw.len());
        let mut dropped = 0;
        let mut skipped = Vec::new();

        for (idx, row) in raw.iter().enumerate() {
            let Some(obj) = row.as_object() else {
                dropped += 1;
                if skipped.len() < SKIPPED_SAMPLE {
                    skipped.push(SkippedRow {
                        line: idx + 1,
                        reason: "record is not a field mapping".to_string(),
                    });
                }
                continue;
            };

            let slots = self.align(obj, &mut columns);
            for (i, slot) in slots.iter().enumerate() {
                seen[i] |= slot.is_some();
            }
            parsed_rows.push(self.parse_row(&slots, &mut stats));
        }

        stats.absent_columns = self
            .schema
            .fields()
            .iter()
            .zip(&seen)
            .filter(|(_, seen)| !**seen)
            .map(|(f, _)| f.name.clone())
            .collect();

        let defaults = self.batch_defaults(&parsed_rows);
        for (field, default) in self.schema.fields().iter().zip(&defaults) {
            stats.defaults.insert(field.name.clone(), default.clone());
        }

        let records = parsed_rows
            .into_iter()
            .map(|row| fill(row, &defaults))
            .collect();

        CleanOutput {
            records,
            dropped,
            skipped,
            stats,
        }
    }

    /// Clean one record in isolation. Mode defaults fall back to their constant.
    pub fn clean_record(&self, raw: &Map<String, JsonValue>) -> CleanedRecord {
        let mut columns = HashMap::new();
        let mut stats = CleanStats::default();
        let slots = self.align(raw, &mut columns);
        let row = self.parse_row(&slots, &mut stats);
        let defaults: Vec<Value> = self
            .schema
            .fields()
            .iter()
            .map(|f| static_default(&f.kind))
            .collect();
        fill(row, &defaults)
    }

    /// Render a cleaned record back into a raw record keyed by field name.
    pub fn to_raw(&self, record: &CleanedRecord) -> Map<String, JsonValue> {
        self.schema
            .fields()
            .iter()
            .zip(&record.values)
            .map(|(f, v)| (f.name.clone(), v.to_json()))
            .collect()
    }

    /// Map raw keys onto schema slots by normalized name. First non-empty value wins.
    fn align<'r>(
        &self,
        obj: &'r Map<String, JsonValue>,
        columns: &mut HashMap<String, Option<usize>>,
    ) -> Vec<Option<&'r JsonValue>> {
        let mut slots: Vec<Option<&JsonValue>> = vec![None; self.schema.len()];
        for (key, value) in obj {
            let index = *columns
                .entry(key.clone())
                .or_insert_with(|| self.schema.index_of(&normalize_column_name(key)));
            if let Some(i) = index {
                if slots[i].map_or(true, JsonValue::is_null) {
                    slots[i] = Some(value);
                }
            }
        }
        slots
    }

    fn parse_row(&self, slots: &[Option<&JsonValue>], stats: &mut CleanStats) -> Vec<Parsed> {
        self.schema
            .fields()
            .iter()
            .zip(slots)
            .map(|(field, raw)| {
                let (parsed, truncated) = match raw {
                    Some(raw) => parse_field(&field.kind, raw),
                    None => (Parsed::Missing, false),
                };
                let counters = stats.fields.entry(field.name.clone()).or_default();
                match parsed {
                    Parsed::Missing => counters.missing += 1,
                    Parsed::Unparseable => counters.unparseable += 1,
                    Parsed::Value(_) => {}
                }
                if truncated {
                    counters.truncated += 1;
                }
                parsed
            })
            .collect()
    }

    fn batch_defaults(&self, rows: &[Vec<Parsed>]) -> Vec<Value> {
        self.schema
            .fields()
            .iter()
            .enumerate()
            .map(|(i, field)| match &field.kind {
                FieldKind::Numeric {
                    ty,
                    default: NumericDefault::Mode { fallback },
                } => column_mode(rows, i).unwrap_or_else(|| numeric(*ty, *fallback)),
                kind => static_default(kind),
            })
            .collect()
    }
}

fn fill(row: Vec<Parsed>, defaults: &[Value]) -> CleanedRecord {
    let values = row
        .into_iter()
        .zip(defaults)
        .map(|(parsed, default)| match parsed {
            Parsed::Value(v) => v,
            Parsed::Missing | Parsed::Unparseable => default.clone(),
        })
        .collect();
    CleanedRecord::new(values)
}

fn numeric(ty: NumericType, value: i64) -> Value {
    match ty {
        NumericType::Integer => Value::Int(value),
        NumericType::Decimal => Value::Decimal(value as f64),
    }
}

fn static_default(kind: &FieldKind) -> Value {
    match kind {
        FieldKind::Numeric { ty, default } => match default {
            NumericDefault::Constant(c) => numeric(*ty, *c),
            NumericDefault::Mode { fallback } => numeric(*ty, *fallback),
        },
        FieldKind::Categorical { sentinel } | FieldKind::Identifier { sentinel, .. } => {
            Value::Text(sentinel.clone())
        }
    }
}

/// Most frequent parsed value of column `i`; ties go to the smallest value.
fn column_mode(rows: &[Vec<Parsed>], i: usize) -> Option<Value> {
    let mut counts: HashMap<&Value, usize> = HashMap::new();
    for row in rows {
        if let Some(Parsed::Value(v)) = row.get(i) {
            *counts.entry(v).or_insert(0) += 1;
        }
    }

    counts
        .into_iter()
        .max_by(|(va, ca), (vb, cb)| {
            ca.cmp(cb).then_with(|| {
                let (a, b) = (va.as_f64().unwrap_or(0.0), vb.as_f64().unwrap_or(0.0));
                b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
            })
        })
        .map(|(v, _)| v.clone())
}

// =============================================================================
// Field parsing
// =============================================================================

/// Returns the parse outcome and whether an identifier was truncated.
fn parse_field(kind: &FieldKind, raw: &JsonValue) -> (Parsed, bool) {
    match kind {
        FieldKind::Numeric {
            ty: NumericType::Integer,
            ..
        } => (parse_integer(raw), false),
        FieldKind::Numeric {
            ty: NumericType::Decimal,
            ..
        } => (parse_decimal(raw), false),
        FieldKind::Categorical { .. } => (parse_categorical(raw), false),
        FieldKind::Identifier {
            prefix_len,
            sentinel,
        } => parse_identifier(raw, *prefix_len, sentinel),
    }
}

fn is_missing_marker(s: &str) -> bool {
    s.is_empty() || MISSING_MARKERS.contains(&s.to_ascii_lowercase().as_str())
}

/// Text view of a scalar. `None` for an empty cell, `Err` for non-scalars.
fn scalar_text(raw: &JsonValue) -> Result<Option<String>, ()> {
    match raw {
        JsonValue::Null => Ok(None),
        JsonValue::String(s) => {
            let s = s.trim();
            if is_missing_marker(s) {
                Ok(None)
            } else {
                Ok(Some(s.to_string()))
            }
        }
        JsonValue::Number(n) => Ok(Some(match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        })),
        JsonValue::Bool(b) => Ok(Some(b.to_string())),
        JsonValue::Array(_) | JsonValue::Object(_) => Err(()),
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_integer(raw: &JsonValue) -> Parsed {
    if let JsonValue::Number(n) = raw {
        return match n.as_i64().or_else(|| n.as_f64().and_then(integral)) {
            Some(i) => Parsed::Value(Value::Int(i)),
            None => Parsed::Unparseable,
        };
    }
    match scalar_text(raw) {
        Ok(None) => Parsed::Missing,
        Ok(Some(s)) => s
            .parse::<i64>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().and_then(integral))
            .map(|i| Parsed::Value(Value::Int(i)))
            .unwrap_or(Parsed::Unparseable),
        Err(()) => Parsed::Unparseable,
    }
}

fn parse_decimal(raw: &JsonValue) -> Parsed {
    let parsed = match raw {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::Bool(_) => None,
        _ => match scalar_text(raw) {
            Ok(None) => return Parsed::Missing,
            Ok(Some(s)) => s.parse::<f64>().ok(),
            Err(()) => None,
        },
    };
    match parsed {
        Some(f) if f.is_finite() => Parsed::Value(Value::Decimal(f)),
        _ => Parsed::Unparseable,
    }
}

fn parse_categorical(raw: &JsonValue) -> Parsed {
    match scalar_text(raw) {
        Ok(None) => Parsed::Missing,
        Ok(Some(s)) => Parsed::Value(Value::Text(
            s.split_whitespace().collect::<Vec<_>>().join(" "),
        )),
        Err(()) => Parsed::Unparseable,
    }
}

fn parse_identifier(raw: &JsonValue, prefix_len: usize, sentinel: &str) -> (Parsed, bool) {
    match scalar_text(raw) {
        Ok(None) => (Parsed::Missing, false),
        // never cut the sentinel, whatever the prefix length
        Ok(Some(s)) if s == sentinel => (Parsed::Value(Value::Text(s)), false),
        Ok(Some(s)) if s.chars().all(|c| c.is_ascii_alphanumeric()) => {
            let truncated = s.chars().count() > prefix_len;
            let prefix: String = s.chars().take(prefix_len).collect();
            (Parsed::Value(Value::Text(prefix)), truncated)
        }
        _ => (Parsed::Unparseable, false),
    }
}

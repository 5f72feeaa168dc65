//! Profiler: summary statistics over the cleaned record set.
//!
//! Read-only. The report is for operators; nothing downstream checks it.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::error::SchemaError;
use crate::models::{CleanedRecord, Value};
use crate::schema::{FieldKind, NumericType, Schema, CAFV_FIELD};
use crate::transform::cleaner::CleanStats;

/// Most common values reported per integer field.
const MOST_COMMON: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct NumericSummary {
    pub field: String,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub p25: f64,
    pub p75: f64,
    /// Integer fields only; `(value, occurrences)`.
    pub most_common: Vec<(i64, usize)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoricalSummary {
    pub field: String,
    pub distinct: usize,
    pub top: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldQuality {
    pub field: String,
    pub missing: usize,
    pub unparseable: usize,
    /// Share of records whose value was imputed, in percent.
    pub imputed_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub record_count: usize,
    pub field_count: usize,
    pub quality: Vec<FieldQuality>,
    pub numeric: Vec<NumericSummary>,
    pub categorical: Vec<CategoricalSummary>,
}

/// Which fields to summarize.
#[derive(Debug, Clone)]
pub struct Profiler {
    pub numeric_fields: Vec<String>,
    pub categorical_fields: Vec<String>,
    pub top_n: usize,
}

impl Default for Profiler {
    fn default() -> Self {
        Self {
            numeric_fields: vec![
                "electric_range".to_string(),
                "model_year".to_string(),
                "base_msrp".to_string(),
            ],
            categorical_fields: vec![
                "make".to_string(),
                "electric_vehicle_type".to_string(),
                "county".to_string(),
                CAFV_FIELD.to_string(),
            ],
            top_n: 10,
        }
    }
}

impl Profiler {
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn profile(
        &self,
        schema: &Schema,
        records: &[CleanedRecord],
        stats: &CleanStats,
    ) -> Result<Profile, SchemaError> {
        let quality = schema
            .fields()
            .iter()
            .filter_map(|f| {
                let s = stats.fields.get(&f.name)?;
                if s.imputed() == 0 {
                    return None;
                }
                Some(FieldQuality {
                    field: f.name.clone(),
                    missing: s.missing,
                    unparseable: s.unparseable,
                    imputed_pct: percent(s.imputed(), records.len()),
                })
            })
            .collect();

        let numeric = self
            .numeric_fields
            .iter()
            .map(|name| {
                let index = schema.require(name)?;
                let integer = matches!(
                    schema.field(index).map(|f| &f.kind),
                    Some(FieldKind::Numeric {
                        ty: NumericType::Integer,
                        ..
                    })
                );
                Ok(numeric_summary(name, records, index, integer))
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;

        let categorical = self
            .categorical_fields
            .iter()
            .map(|name| {
                let index = schema.require(name)?;
                Ok(categorical_summary(name, records, index, self.top_n))
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;

        Ok(Profile {
            record_count: records.len(),
            field_count: schema.len(),
            quality,
            numeric,
            categorical,
        })
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

/// Linear-interpolated quantile of sorted data.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

fn numeric_summary(
    name: &str,
    records: &[CleanedRecord],
    index: usize,
    integer: bool,
) -> NumericSummary {
    let mut data: Vec<f64> = records
        .iter()
        .filter_map(|r| r.get(index).and_then(Value::as_f64))
        .collect();
    data.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let count = data.len();
    let mean = if count == 0 {
        0.0
    } else {
        data.iter().sum::<f64>() / count as f64
    };
    // Sample standard deviation (n - 1)
    let std_dev = if count < 2 {
        0.0
    } else {
        let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        var.sqrt()
    };

    let most_common = if integer {
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for r in records {
            if let Some(i) = r.get(index).and_then(Value::as_i64) {
                *counts.entry(i).or_insert(0) += 1;
            }
        }
        let mut counts: Vec<(i64, usize)> = counts.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        counts.truncate(MOST_COMMON);
        counts
    } else {
        Vec::new()
    };

    NumericSummary {
        field: name.to_string(),
        count,
        mean,
        median: quantile(&data, 0.5),
        std_dev,
        min: data.first().copied().unwrap_or(0.0),
        max: data.last().copied().unwrap_or(0.0),
        p25: quantile(&data, 0.25),
        p75: quantile(&data, 0.75),
        most_common,
    }
}

fn categorical_summary(
    name: &str,
    records: &[CleanedRecord],
    index: usize,
    top_n: usize,
) -> CategoricalSummary {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for r in records {
        if let Some(v) = r.get(index) {
            *counts.entry(v.to_string()).or_insert(0) += 1;
        }
    }

    let distinct = counts.len();
    let mut top: Vec<(String, usize)> = counts.into_iter().collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top.truncate(top_n);

    CategoricalSummary {
        field: name.to_string(),
        distinct,
        top,
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Records: {} ({} declared fields)", self.record_count, self.field_count)?;

        writeln!(f, "\nMissing values by column:")?;
        if self.quality.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for q in &self.quality {
            writeln!(
                f,
                "  {}: {} missing, {} unparseable ({:.1}%)",
                q.field, q.missing, q.unparseable, q.imputed_pct
            )?;
        }

        for n in &self.numeric {
            writeln!(f, "\n{}", n.field)?;
            writeln!(f, "  Count: {}", n.count)?;
            writeln!(f, "  Mean: {:.2}", n.mean)?;
            writeln!(f, "  Median: {:.2}", n.median)?;
            writeln!(f, "  Standard Deviation: {:.2}", n.std_dev)?;
            writeln!(f, "  Min: {:.2}", n.min)?;
            writeln!(f, "  Max: {:.2}", n.max)?;
            writeln!(f, "  25th Percentile: {:.2}", n.p25)?;
            writeln!(f, "  75th Percentile: {:.2}", n.p75)?;
            if !n.most_common.is_empty() {
                let common: Vec<String> = n
                    .most_common
                    .iter()
                    .map(|(v, c)| format!("{} ({})", v, c))
                    .collect();
                writeln!(f, "  Most common: {}", common.join(", "))?;
            }
        }

        for c in &self.categorical {
            writeln!(f, "\n{} distribution (top {} of {}):", c.field, c.top.len(), c.distinct)?;
            for (value, count) in &c.top {
                writeln!(f, "  {:<40} {}", value, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::vehicle_registration_schema;
    use crate::transform::cleaner::Cleaner;
    use serde_json::json;

    fn profile_of(rows: &[serde_json::Value]) -> Profile {
        let schema = vehicle_registration_schema();
        let out = Cleaner::new(&schema).clean_all(rows);
        Profiler::default()
            .profile(&schema, &out.records, &out.stats)
            .unwrap()
    }

    #[test]
    fn test_numeric_statistics() {
        let profile = profile_of(&[
            json!({"Electric Range": "10", "Model Year": "2020"}),
            json!({"Electric Range": "20", "Model Year": "2020"}),
            json!({"Electric Range": "30", "Model Year": "2021"}),
            json!({"Electric Range": "40", "Model Year": "2022"}),
        ]);

        let range = &profile.numeric[0];
        assert_eq!(range.field, "electric_range");
        assert_eq!(range.count, 4);
        assert!((range.mean - 25.0).abs() < 1e-9);
        assert!((range.median - 25.0).abs() < 1e-9);
        assert!((range.p25 - 17.5).abs() < 1e-9);
        assert!((range.p75 - 32.5).abs() < 1e-9);
        assert!((range.std_dev - 12.909944487358056).abs() < 1e-9);
        assert_eq!(range.min, 10.0);
        assert_eq!(range.max, 40.0);

        let year = &profile.numeric[1];
        assert_eq!(year.most_common[0], (2020, 2));

        let msrp = &profile.numeric[2];
        assert!(msrp.most_common.is_empty());
    }

    #[test]
    fn test_categorical_top_values() {
        let profile = Profiler::default().with_top_n(1);
        let schema = vehicle_registration_schema();
        let out = Cleaner::new(&schema).clean_all(&[
            json!({"Make": "TESLA"}),
            json!({"Make": "NISSAN"}),
            json!({"Make": "TESLA"}),
        ]);
        let report = profile.profile(&schema, &out.records, &out.stats).unwrap();

        let make = &report.categorical[0];
        assert_eq!(make.distinct, 2);
        assert_eq!(make.top, vec![("TESLA".to_string(), 2)]);
    }

    #[test]
    fn test_quality_reports_imputed_fields() {
        let profile = profile_of(&[json!({"Make": "KIA", "County": ""}), json!({"Make": "KIA"})]);

        let county = profile.quality.iter().find(|q| q.field == "county").unwrap();
        assert_eq!(county.missing, 2);
        assert!((county.imputed_pct - 100.0).abs() < 1e-9);
        assert!(profile.quality.iter().all(|q| q.field != "make"));
    }

    #[test]
    fn test_display_contains_sections() {
        let text = profile_of(&[json!({"Make": "KIA", "Electric Range": "256"})]).to_string();
        assert!(text.contains("Records: 1"));
        assert!(text.contains("electric_range"));
        assert!(text.contains("make distribution"));
    }

    #[test]
    fn test_unknown_profile_field() {
        let schema = vehicle_registration_schema();
        let profiler = Profiler {
            numeric_fields: vec!["horsepower".to_string()],
            ..Profiler::default()
        };
        assert!(profiler.profile(&schema, &[], &CleanStats::default()).is_err());
    }
}

//! Fact Resolver: one fact row per cleaned record.
//!
//! Dimension keys come from the builders; measures are copied straight
//! from the record. The cleaner already guarantees every measure is
//! present and typed; the only failure is a key list that does not line
//! up with the records.

use crate::error::{PipelineError, PipelineResult, SchemaError};
use crate::models::{CleanedRecord, FactRow, SurrogateKey, Value};
use crate::schema::{FactDef, FieldKind, Schema};

/// Dimension keys of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionKeys {
    pub vehicle: SurrogateKey,
    pub location: SurrogateKey,
    pub cafv: SurrogateKey,
}

/// Per-record keys from each dimension builder, aligned with the records.
#[derive(Debug, Clone, Default)]
pub struct KeyAssignments {
    pub vehicle: Vec<SurrogateKey>,
    pub location: Vec<SurrogateKey>,
    pub cafv: Vec<SurrogateKey>,
}

impl KeyAssignments {
    /// Every dimension must have assigned exactly one key per record.
    pub fn check_aligned(&self, records: usize) -> PipelineResult<()> {
        let lists = [
            ("dim_vehicle", &self.vehicle),
            ("dim_location", &self.location),
            ("dim_cafv", &self.cafv),
        ];
        for (dimension, keys) in lists {
            if keys.len() != records {
                return Err(PipelineError::MisalignedKeys {
                    dimension,
                    keys: keys.len(),
                    records,
                });
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = DimensionKeys> + '_ {
        self.vehicle
            .iter()
            .zip(&self.location)
            .zip(&self.cafv)
            .map(|((&vehicle, &location), &cafv)| DimensionKeys {
                vehicle,
                location,
                cafv,
            })
    }
}

pub struct FactResolver {
    vin: usize,
    dol_vehicle_id: usize,
    electric_range: usize,
    base_msrp: usize,
}

impl FactResolver {
    pub fn new(def: &FactDef, schema: &Schema) -> Result<Self, SchemaError> {
        let numeric = |name: &str| -> Result<usize, SchemaError> {
            let index = schema.require(name)?;
            match schema.field(index).map(|f| &f.kind) {
                Some(kind) if kind.is_numeric() => Ok(index),
                _ => Err(SchemaError::WrongKind {
                    field: name.to_string(),
                    expected: "numeric",
                }),
            }
        };

        let vin = schema.require(&def.vin_field)?;
        if matches!(
            schema.field(vin).map(|f| &f.kind),
            Some(FieldKind::Numeric { .. })
        ) {
            return Err(SchemaError::WrongKind {
                field: def.vin_field.clone(),
                expected: "textual",
            });
        }

        Ok(Self {
            vin,
            dol_vehicle_id: numeric(&def.dol_vehicle_id_field)?,
            electric_range: numeric(&def.electric_range_field)?,
            base_msrp: numeric(&def.base_msrp_field)?,
        })
    }

    pub fn resolve(&self, record: &CleanedRecord, keys: DimensionKeys) -> FactRow {
        FactRow {
            vehicle_key: keys.vehicle,
            location_key: keys.location,
            cafv_key: keys.cafv,
            vin_prefix: record
                .get(self.vin)
                .map(Value::to_string)
                .unwrap_or_default(),
            dol_vehicle_id: int_measure(record, self.dol_vehicle_id),
            electric_range: int_measure(record, self.electric_range),
            base_msrp: record
                .get(self.base_msrp)
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            registration_count: 1,
        }
    }

    /// Exactly one fact row per record, in record order.
    pub fn resolve_all(
        &self,
        records: &[CleanedRecord],
        keys: &KeyAssignments,
    ) -> PipelineResult<Vec<FactRow>> {
        keys.check_aligned(records.len())?;
        Ok(records
            .iter()
            .zip(keys.iter())
            .map(|(record, k)| self.resolve(record, k))
            .collect())
    }
}

fn int_measure(record: &CleanedRecord, index: usize) -> i64 {
    match record.get(index) {
        Some(Value::Int(i)) => *i,
        Some(Value::Decimal(d)) => d.round() as i64,
        _ => 0,
    }
}

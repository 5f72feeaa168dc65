//! Dimension Builder: distinct attribute tuples with surrogate keys.
//!
//! # Architecture
//!
//! ```text
//! Cleaned records                     dim_vehicle
//! ┌─────────────────────────────┐     ┌─────┬───────────────────────────┐
//! │ TESLA, MODEL 3, 2020, BEV   │ ─┐  │ key │ tuple                     │
//! │ TESLA, MODEL 3, 2020, BEV   │ ─┼▶ │  1  │ TESLA, MODEL 3, 2020, BEV │
//! │ Unknown, LEAF, 2019, BEV    │ ─┴▶ │  2  │ Unknown, LEAF, 2019, BEV  │
//! └─────────────────────────────┘     └─────┴───────────────────────────┘
//!            keys per record: [1, 1, 2]
//! ```
//!
//! Each builder owns its key-assignment table; nothing is shared between
//! dimensions or between runs. The first tuple seen gets key 1, the next
//! new one key 2, and so on, so a fixed input order always yields the
//! same keys.

use std::collections::HashMap;

use super::encoder::CategoryCodes;
use crate::error::SchemaError;
use crate::models::{CleanedRecord, CodeColumn, DimensionTable, DimensionTuple, SurrogateKey};
use crate::schema::{DimensionDef, Schema};

/// Code column resolved against the dimension's attributes.
struct CodeSlot {
    column: String,
    attribute: usize,
}

pub struct DimensionBuilder {
    def: DimensionDef,
    /// Schema index of each attribute, in attribute order.
    fields: Vec<usize>,
    code_slots: Vec<CodeSlot>,
    keys: HashMap<DimensionTuple, SurrogateKey>,
    tuples: Vec<DimensionTuple>,
}

impl DimensionBuilder {
    /// Resolve the definition against the schema. Fails on unknown fields.
    pub fn new(def: &DimensionDef, schema: &Schema) -> Result<Self, SchemaError> {
        let fields = def
            .attributes
            .iter()
            .map(|a| schema.require(&a.field))
            .collect::<Result<Vec<_>, _>>()?;

        let code_slots = def
            .code_columns
            .iter()
            .map(|c| {
                def.attributes
                    .iter()
                    .position(|a| a.field == c.field)
                    .map(|attribute| CodeSlot {
                        column: c.column.clone(),
                        attribute,
                    })
                    .ok_or_else(|| SchemaError::CodeOutsideDimension {
                        table: def.table.clone(),
                        column: c.column.clone(),
                        field: c.field.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            def: def.clone(),
            fields,
            code_slots,
            keys: HashMap::new(),
            tuples: Vec::new(),
        })
    }

    pub fn table_name(&self) -> &str {
        &self.def.table
    }

    /// Projection of a record onto this dimension's attributes.
    pub fn project(&self, record: &CleanedRecord) -> DimensionTuple {
        DimensionTuple(
            self.fields
                .iter()
                .filter_map(|&i| record.get(i).cloned())
                .collect(),
        )
    }

    /// Key for the record's tuple, assigning the next key if the tuple is new.
    pub fn assign(&mut self, record: &CleanedRecord) -> SurrogateKey {
        let tuple = self.project(record);
        if let Some(&key) = self.keys.get(&tuple) {
            return key;
        }

        let key = (self.tuples.len() + 1) as SurrogateKey;
        self.tuples.push(tuple.clone());
        self.keys.insert(tuple, key);
        key
    }

    /// Keys for every record, aligned with the input.
    pub fn assign_all(&mut self, records: &[CleanedRecord]) -> Vec<SurrogateKey> {
        records.iter().map(|r| self.assign(r)).collect()
    }

    pub fn lookup(&self, tuple: &DimensionTuple) -> Option<SurrogateKey> {
        self.keys.get(tuple).copied()
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Freeze into a table. Code columns are fitted over the distinct tuples.
    pub fn finish(self) -> DimensionTable {
        let code_columns = self
            .code_slots
            .iter()
            .map(|slot| {
                let categories =
                    CategoryCodes::fit(self.tuples.iter().map(|t| &t.values()[slot.attribute]));
                let codes = self
                    .tuples
                    .iter()
                    .map(|t| categories.code(&t.values()[slot.attribute]).unwrap_or(-1))
                    .collect();
                CodeColumn {
                    column: slot.column.clone(),
                    attribute: slot.attribute,
                    codes,
                    categories: categories.categories(),
                }
            })
            .collect();

        DimensionTable {
            name: self.def.table,
            key_column: self.def.key_column,
            attribute_columns: self.def.attributes.into_iter().map(|a| a.column).collect(),
            tuples: self.tuples,
            code_columns,
        }
    }
}

/// A finished dimension plus the key of every input record.
#[derive(Debug, Clone)]
pub struct DimensionBuild {
    pub table: DimensionTable,
    pub keys: Vec<SurrogateKey>,
}

/// Build one dimension over the whole record sequence.
pub fn build_dimension(
    def: &DimensionDef,
    schema: &Schema,
    records: &[CleanedRecord],
) -> Result<DimensionBuild, SchemaError> {
    let mut builder = DimensionBuilder::new(def, schema)?;
    let keys = builder.assign_all(records);
    Ok(DimensionBuild {
        table: builder.finish(),
        keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;
    use crate::schema::{FieldKind, FieldSpec};

    fn schema() -> Schema {
        Schema::new(vec![
            FieldSpec::new("make", FieldKind::categorical()),
            FieldSpec::new("model", FieldKind::categorical()),
            FieldSpec::new("model_year", FieldKind::integer(0)),
            FieldSpec::new("electric_range", FieldKind::integer(0)),
        ])
    }

    fn record(make: &str, model: &str, year: i64, range: i64) -> CleanedRecord {
        CleanedRecord::new(vec![
            Value::from(make),
            Value::from(model),
            Value::Int(year),
            Value::Int(range),
        ])
    }

    fn vehicle_def() -> DimensionDef {
        DimensionDef::new("dim_vehicle", "vehicle_key")
            .attribute("make")
            .attribute("model")
            .attribute("model_year")
            .code("make", "make_code")
    }

    #[test]
    fn test_identical_tuples_share_a_key() {
        let records = vec![
            record("TESLA", "MODEL 3", 2020, 250),
            record("TESLA", "MODEL 3", 2020, 260),
            record("Unknown", "LEAF", 2019, 0),
        ];

        let build = build_dimension(&vehicle_def(), &schema(), &records).unwrap();

        assert_eq!(build.keys, vec![1, 1, 2]);
        assert_eq!(build.table.len(), 2);
        assert_eq!(
            build.table.get(1).unwrap().values(),
            &[Value::from("TESLA"), Value::from("MODEL 3"), Value::Int(2020)]
        );
        assert_eq!(build.table.get(2).unwrap().values()[0], Value::from("Unknown"));
    }

    #[test]
    fn test_keys_follow_first_appearance() {
        let records = vec![
            record("VOLVO", "XC40", 2022, 0),
            record("AUDI", "Q4", 2023, 0),
            record("VOLVO", "XC40", 2022, 0),
            record("BMW", "I4", 2023, 0),
        ];

        let build = build_dimension(&vehicle_def(), &schema(), &records).unwrap();
        assert_eq!(build.keys, vec![1, 2, 1, 3]);
    }

    #[test]
    fn test_differing_attributes_get_distinct_keys() {
        let records = vec![
            record("KIA", "EV6", 2022, 0),
            record("KIA", "EV6", 2023, 0),
            record("KIA", "NIRO", 2022, 0),
        ];

        let build = build_dimension(&vehicle_def(), &schema(), &records).unwrap();
        assert_eq!(build.keys, vec![1, 2, 3]);
    }

    #[test]
    fn test_lookup_and_incremental_assign() {
        let schema = schema();
        let mut builder = DimensionBuilder::new(&vehicle_def(), &schema).unwrap();
        let a = record("FORD", "MUSTANG MACH-E", 2021, 230);

        assert!(builder.is_empty());
        assert_eq!(builder.assign(&a), 1);
        assert_eq!(builder.assign(&a), 1);
        assert_eq!(builder.lookup(&builder.project(&a)), Some(1));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_code_columns_sorted_over_tuples() {
        let records = vec![
            record("TESLA", "MODEL Y", 2022, 0),
            record("BMW", "I3", 2017, 0),
            record("TESLA", "MODEL 3", 2020, 0),
        ];

        let table = build_dimension(&vehicle_def(), &schema(), &records)
            .unwrap()
            .table;
        let codes = &table.code_columns[0];

        assert_eq!(codes.column, "make_code");
        assert_eq!(codes.codes, vec![1, 0, 1]);
        assert_eq!(codes.categories, vec!["BMW", "TESLA"]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let def = DimensionDef::new("dim_trim", "trim_key").attribute("trim");
        assert!(matches!(
            DimensionBuilder::new(&def, &schema()),
            Err(SchemaError::UnknownField(_))
        ));
    }

    #[test]
    fn test_code_outside_dimension_rejected() {
        let def = DimensionDef::new("dim_model", "model_key")
            .attribute("model")
            .code("make", "make_code");
        assert!(matches!(
            DimensionBuilder::new(&def, &schema()),
            Err(SchemaError::CodeOutsideDimension { .. })
        ));
    }
}

//! Domain models for the warehouse pipeline.
//!
//! - [`Value`] - a typed, non-missing scalar produced by the cleaner
//! - [`CleanedRecord`] - one fully-typed row, aligned with a [`crate::schema::Schema`]
//! - [`DimensionTuple`] / [`DimensionTable`] - distinct attribute combinations and their surrogate keys
//! - [`FactRow`] - one registration, keyed into every dimension
//! - [`Table`] / [`Warehouse`] - the sink-facing table set

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Run-local surrogate key. Dense, starting at 1.
pub type SurrogateKey = u32;

// =============================================================================
// Typed Values
// =============================================================================

/// A cleaned scalar. There is no "missing" variant: the cleaner resolves
/// every gap to a default before a `Value` is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Decimal(f64),
    Text(String),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Decimal(d) => Some(*d),
            Value::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render back into the untyped representation the cleaner accepts.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Decimal(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Canonical bit pattern for decimals (`-0.0` and `0.0` compare equal).
    fn decimal_bits(d: f64) -> u64 {
        if d == 0.0 {
            0
        } else {
            d.to_bits()
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => {
                Value::decimal_bits(*a) == Value::decimal_bits(*b)
            }
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Int(i) => i.hash(state),
            Value::Decimal(d) => Value::decimal_bits(*d).hash(state),
            Value::Text(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

// =============================================================================
// Cleaned Records
// =============================================================================

/// One row after cleaning. `values[i]` belongs to `schema.fields()[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedRecord {
    pub values: Vec<Value>,
}

impl CleanedRecord {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}

// =============================================================================
// Dimensions
// =============================================================================

/// Projection of a record onto a dimension's fields. Identity is value equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionTuple(pub Vec<Value>);

impl DimensionTuple {
    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

/// A code column derived from one of the dimension's attributes.
#[derive(Debug, Clone, Serialize)]
pub struct CodeColumn {
    pub column: String,
    /// Position of the encoded attribute inside the tuple.
    pub attribute: usize,
    /// Code per tuple, aligned with `DimensionTable::tuples`.
    pub codes: Vec<i64>,
    /// Category text indexed by code.
    pub categories: Vec<String>,
}

/// Surrogate key → tuple. Key `k` lives at `tuples[k - 1]`.
#[derive(Debug, Clone, Serialize)]
pub struct DimensionTable {
    pub name: String,
    pub key_column: String,
    pub attribute_columns: Vec<String>,
    pub tuples: Vec<DimensionTuple>,
    pub code_columns: Vec<CodeColumn>,
}

impl DimensionTable {
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn get(&self, key: SurrogateKey) -> Option<&DimensionTuple> {
        (key as usize).checked_sub(1).and_then(|i| self.tuples.get(i))
    }

    pub fn contains_key(&self, key: SurrogateKey) -> bool {
        self.get(key).is_some()
    }

    /// `(key, tuple)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (SurrogateKey, &DimensionTuple)> {
        self.tuples
            .iter()
            .enumerate()
            .map(|(i, t)| ((i + 1) as SurrogateKey, t))
    }
}

// =============================================================================
// Facts
// =============================================================================

/// One registered vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
    pub vehicle_key: SurrogateKey,
    pub location_key: SurrogateKey,
    pub cafv_key: SurrogateKey,
    pub vin_prefix: String,
    pub dol_vehicle_id: i64,
    pub electric_range: i64,
    pub base_msrp: f64,
    pub registration_count: u32,
}

// =============================================================================
// Sink-facing tables
// =============================================================================

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SqlType {
    Integer,
    Real,
    Text,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
        }
    }
}

/// What a column is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", content = "references")]
pub enum ColumnRole {
    PrimaryKey,
    ForeignKey { table: String, column: String },
    Attribute,
    Measure,
}

#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
    pub role: ColumnRole,
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: SqlType, role: ColumnRole) -> Self {
        Self {
            name: name.into(),
            sql_type,
            role,
        }
    }
}

/// A named table with a fixed column schema and ordered rows.
#[derive(Debug, Clone, Serialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Tables this one references through foreign keys.
    pub fn dependencies(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter_map(|c| match &c.role {
                ColumnRole::ForeignKey { table, .. } => Some(table.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// The full table set of one run, dimensions before facts.
#[derive(Debug, Clone, Serialize)]
pub struct Warehouse {
    pub tables: Vec<Table>,
}

impl Warehouse {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_decimal_zero_signs_are_equal() {
        assert_eq!(Value::Decimal(0.0), Value::Decimal(-0.0));

        let mut set = HashSet::new();
        set.insert(Value::Decimal(0.0));
        assert!(set.contains(&Value::Decimal(-0.0)));
    }

    #[test]
    fn test_int_and_decimal_are_distinct() {
        assert_ne!(Value::Int(1), Value::Decimal(1.0));
    }

    #[test]
    fn test_dimension_table_key_lookup() {
        let table = DimensionTable {
            name: "dim_cafv".into(),
            key_column: "cafv_key".into(),
            attribute_columns: vec!["cafv_eligibility".into()],
            tuples: vec![
                DimensionTuple(vec!["Eligible".into()]),
                DimensionTuple(vec!["Unknown".into()]),
            ],
            code_columns: vec![],
        };

        assert!(!table.contains_key(0));
        assert_eq!(table.get(2).unwrap().values()[0], Value::from("Unknown"));
        assert!(!table.contains_key(3));
        assert_eq!(table.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_table_dependencies() {
        let table = Table {
            name: "fact".into(),
            columns: vec![
                Column::new(
                    "vehicle_key",
                    SqlType::Integer,
                    ColumnRole::ForeignKey {
                        table: "dim_vehicle".into(),
                        column: "vehicle_key".into(),
                    },
                ),
                Column::new("electric_range", SqlType::Integer, ColumnRole::Measure),
            ],
            rows: vec![],
        };
        assert_eq!(table.dependencies(), vec!["dim_vehicle"]);
    }
}

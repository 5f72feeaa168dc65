//! Declared field kinds and the star-schema layout.
//!
//! Every source column the pipeline cares about is declared once here with
//! its kind. The cleaner consults the kind, never the runtime shape of a
//! value, to decide how to parse and what to substitute for a gap.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::SchemaError;

/// Sentinel for missing categorical and identifier values.
pub const UNKNOWN: &str = "Unknown";

/// Length of the VIN prefix published in the extract.
pub const VIN_PREFIX_LEN: usize = 10;

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));

/// Normalize a column header into a stable field name.
///
/// `"VIN (1-10)"` → `"vin_1_10"`, `"Clean Alternative Fuel Vehicle (CAFV) Eligibility"`
/// → `"clean_alternative_fuel_vehicle_cafv_eligibility"`.
pub fn normalize_column_name(header: &str) -> String {
    let lower = header.trim().to_lowercase();
    NON_ALNUM
        .replace_all(&lower, "_")
        .trim_matches('_')
        .to_string()
}

// =============================================================================
// Field kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NumericType {
    Integer,
    Decimal,
}

/// What a numeric gap becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NumericDefault {
    Constant(i64),
    /// Most frequent parsed value in the batch; `fallback` if there is none.
    Mode { fallback: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldKind {
    Numeric {
        #[serde(rename = "type")]
        ty: NumericType,
        default: NumericDefault,
    },
    Categorical {
        sentinel: String,
    },
    Identifier {
        prefix_len: usize,
        sentinel: String,
    },
}

impl FieldKind {
    pub fn integer(default: i64) -> Self {
        FieldKind::Numeric {
            ty: NumericType::Integer,
            default: NumericDefault::Constant(default),
        }
    }

    pub fn decimal(default: i64) -> Self {
        FieldKind::Numeric {
            ty: NumericType::Decimal,
            default: NumericDefault::Constant(default),
        }
    }

    pub fn categorical() -> Self {
        Self::categorical_or(UNKNOWN)
    }

    pub fn categorical_or(sentinel: &str) -> Self {
        FieldKind::Categorical {
            sentinel: sentinel.to_string(),
        }
    }

    pub fn identifier(prefix_len: usize) -> Self {
        FieldKind::Identifier {
            prefix_len,
            sentinel: UNKNOWN.to_string(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldKind::Numeric { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    /// Normalized column name.
    pub name: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    /// Declare a field from its source header; the name is normalized.
    pub fn new(header: &str, kind: FieldKind) -> Self {
        Self {
            name: normalize_column_name(header),
            kind,
        }
    }
}

/// Ordered field declarations. Cleaned records are aligned with this order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn require(&self, name: &str) -> Result<usize, SchemaError> {
        self.index_of(name)
            .ok_or_else(|| SchemaError::UnknownField(name.to_string()))
    }

    pub fn field(&self, index: usize) -> Option<&FieldSpec> {
        self.fields.get(index)
    }
}

/// Field schema of the Washington State EV population extract.
pub fn vehicle_registration_schema() -> Schema {
    Schema::new(vec![
        FieldSpec::new("VIN (1-10)", FieldKind::identifier(VIN_PREFIX_LEN)),
        FieldSpec::new("County", FieldKind::categorical()),
        FieldSpec::new("City", FieldKind::categorical()),
        FieldSpec::new("State", FieldKind::categorical_or("WA")),
        FieldSpec::new("Postal Code", FieldKind::categorical_or("00000")),
        FieldSpec::new(
            "Model Year",
            FieldKind::Numeric {
                ty: NumericType::Integer,
                default: NumericDefault::Mode { fallback: 2020 },
            },
        ),
        FieldSpec::new("Make", FieldKind::categorical()),
        FieldSpec::new("Model", FieldKind::categorical()),
        FieldSpec::new("Electric Vehicle Type", FieldKind::categorical()),
        FieldSpec::new(
            "Clean Alternative Fuel Vehicle (CAFV) Eligibility",
            FieldKind::categorical(),
        ),
        FieldSpec::new("Electric Range", FieldKind::integer(0)),
        FieldSpec::new("Base MSRP", FieldKind::decimal(0)),
        FieldSpec::new("Legislative District", FieldKind::integer(-1)),
        FieldSpec::new("DOL Vehicle ID", FieldKind::integer(0)),
        FieldSpec::new("2020 Census Tract", FieldKind::integer(-1)),
    ])
}

// =============================================================================
// Dimension definitions
// =============================================================================

/// One dimension attribute: schema field → output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionAttribute {
    pub field: String,
    pub column: String,
}

/// Integer code column derived from a categorical attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeColumnDef {
    pub field: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionDef {
    pub table: String,
    pub key_column: String,
    /// Ordered attributes; their values form the tuple identity.
    pub attributes: Vec<DimensionAttribute>,
    /// Derived columns, never part of the identity.
    pub code_columns: Vec<CodeColumnDef>,
}

impl DimensionDef {
    pub fn new(table: &str, key_column: &str) -> Self {
        Self {
            table: table.to_string(),
            key_column: key_column.to_string(),
            attributes: Vec::new(),
            code_columns: Vec::new(),
        }
    }

    /// Attribute whose column name equals the field name.
    pub fn attribute(self, field: &str) -> Self {
        self.attribute_as(field, field)
    }

    pub fn attribute_as(mut self, field: &str, column: &str) -> Self {
        self.attributes.push(DimensionAttribute {
            field: field.to_string(),
            column: column.to_string(),
        });
        self
    }

    pub fn code(mut self, field: &str, column: &str) -> Self {
        self.code_columns.push(CodeColumnDef {
            field: field.to_string(),
            column: column.to_string(),
        });
        self
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.attributes.iter().map(|a| a.field.as_str()).collect()
    }
}

/// Field carrying the CAFV eligibility category.
pub const CAFV_FIELD: &str = "clean_alternative_fuel_vehicle_cafv_eligibility";

pub fn vehicle_dimension() -> DimensionDef {
    DimensionDef::new("dim_vehicle", "vehicle_key")
        .attribute("make")
        .attribute("model")
        .attribute("model_year")
        .attribute("electric_vehicle_type")
        .code("make", "make_code")
        .code("electric_vehicle_type", "ev_type_code")
}

pub fn location_dimension() -> DimensionDef {
    DimensionDef::new("dim_location", "location_key")
        .attribute("county")
        .attribute("city")
        .attribute("state")
        .attribute("postal_code")
}

pub fn cafv_dimension() -> DimensionDef {
    DimensionDef::new("dim_cafv", "cafv_key")
        .attribute_as(CAFV_FIELD, "cafv_eligibility")
        .code(CAFV_FIELD, "cafv_code")
}

/// Fields copied into each fact row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactDef {
    pub table: String,
    pub vin_field: String,
    pub dol_vehicle_id_field: String,
    pub electric_range_field: String,
    pub base_msrp_field: String,
}

impl Default for FactDef {
    fn default() -> Self {
        Self {
            table: "fact_ev_registration".to_string(),
            vin_field: "vin_1_10".to_string(),
            dol_vehicle_id_field: "dol_vehicle_id".to_string(),
            electric_range_field: "electric_range".to_string(),
            base_msrp_field: "base_msrp".to_string(),
        }
    }
}

/// The three dimensions and the fact table of the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StarSchema {
    pub vehicle: DimensionDef,
    pub location: DimensionDef,
    pub cafv: DimensionDef,
    pub fact: FactDef,
}

impl Default for StarSchema {
    fn default() -> Self {
        Self {
            vehicle: vehicle_dimension(),
            location: location_dimension(),
            cafv: cafv_dimension(),
            fact: FactDef::default(),
        }
    }
}

impl StarSchema {
    pub fn dimensions(&self) -> [&DimensionDef; 3] {
        [&self.vehicle, &self.location, &self.cafv]
    }
}

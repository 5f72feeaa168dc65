//! Categorical code encoding.
//!
//! Distinct cleaned values are sorted and numbered from 0, so the same
//! batch always yields the same codes regardless of row order.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCodes {
    codes: BTreeMap<String, i64>,
}

impl CategoryCodes {
    /// Fit codes over every observed value.
    pub fn fit<'v>(values: impl IntoIterator<Item = &'v Value>) -> Self {
        let mut codes: BTreeMap<String, i64> = values
            .into_iter()
            .map(|v| (category_label(v), 0))
            .collect();

        for (code, slot) in codes.values_mut().enumerate() {
            *slot = code as i64;
        }

        Self { codes }
    }

    pub fn code(&self, value: &Value) -> Option<i64> {
        self.codes.get(&category_label(value)).copied()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// `(code, category)` pairs in code order.
    pub fn mapping(&self) -> Vec<(i64, &str)> {
        self.codes.iter().map(|(k, v)| (*v, k.as_str())).collect()
    }

    /// Categories indexed by code.
    pub fn categories(&self) -> Vec<String> {
        self.codes.keys().cloned().collect()
    }
}

fn category_label(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(makes: &[&str]) -> Vec<Value> {
        makes.iter().map(|m| Value::from(*m)).collect()
    }

    #[test]
    fn test_codes_follow_sorted_categories() {
        let codes = CategoryCodes::fit(&values(&["TESLA", "BMW", "TESLA", "NISSAN"]));

        assert_eq!(codes.len(), 3);
        assert_eq!(codes.code(&Value::from("BMW")), Some(0));
        assert_eq!(codes.code(&Value::from("NISSAN")), Some(1));
        assert_eq!(codes.code(&Value::from("TESLA")), Some(2));
        assert_eq!(codes.code(&Value::from("KIA")), None);
    }

    #[test]
    fn test_numeric_values_encode_by_text() {
        let codes = CategoryCodes::fit(&[Value::Int(2020), Value::Int(2019)]);
        assert_eq!(codes.code(&Value::Int(2019)), Some(0));
    }

    #[test]
    fn test_codes_independent_of_row_order() {
        let a = CategoryCodes::fit(&values(&["B", "A", "C"]));
        let b = CategoryCodes::fit(&values(&["C", "B", "A"]));
        assert_eq!(a, b);
        assert_eq!(a.mapping(), vec![(0, "A"), (1, "B"), (2, "C")]);
        assert_eq!(a.categories(), vec!["A", "B", "C"]);
    }
}

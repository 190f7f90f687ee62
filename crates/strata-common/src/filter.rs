//! Metadata filtering for vector search.
//!
//! Filters are evaluated against the scalar metadata map attached to each
//! vector record at ingest time.

use serde::{Deserialize, Serialize};

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetadataValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Int(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Str(s.to_string())
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        MetadataValue::Int(i)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    In,
    GreaterThan,
    LessThan,
    GreaterThanEquals,
    LessThanEquals,
}

/// Right-hand side of a filter. `In` takes the list form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    One(MetadataValue),
    Many(Vec<MetadataValue>),
}

/// A single-field metadata predicate applied during vector search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

impl MetadataFilter {
    pub fn new(field: &str, operator: FilterOperator, value: FilterValue) -> Self {
        Self { field: field.to_string(), operator, value }
    }

    /// Evaluate this filter against a record's metadata map. A missing
    /// field never matches.
    pub fn matches(&self, metadata: &std::collections::BTreeMap<String, MetadataValue>) -> bool {
        let Some(actual) = metadata.get(&self.field) else {
            return false;
        };
        match (&self.operator, &self.value) {
            (FilterOperator::Equals, FilterValue::One(v)) => actual == v,
            (FilterOperator::NotEquals, FilterValue::One(v)) => actual != v,
            (FilterOperator::In, FilterValue::Many(vs)) => vs.contains(actual),
            (FilterOperator::GreaterThan, FilterValue::One(v)) => cmp_num(actual, v, |a, b| a > b),
            (FilterOperator::LessThan, FilterValue::One(v)) => cmp_num(actual, v, |a, b| a < b),
            (FilterOperator::GreaterThanEquals, FilterValue::One(v)) => {
                cmp_num(actual, v, |a, b| a >= b)
            }
            (FilterOperator::LessThanEquals, FilterValue::One(v)) => {
                cmp_num(actual, v, |a, b| a <= b)
            }
            // Operator/value shape mismatch: nothing matches.
            _ => false,
        }
    }
}

fn cmp_num(a: &MetadataValue, b: &MetadataValue, op: impl Fn(f64, f64) -> bool) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

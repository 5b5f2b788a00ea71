//! Predicates over documents.

use super::{Document, ID_FIELD, timestamp_value};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    /// The store's current time, resolved when the filter is evaluated.
    Now,
}

/// A predicate over a single document.
///
/// Comparison semantics follow the usual document-store rules: a missing field
/// never satisfies `Lt`, and `Eq` against `null` matches a missing field.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Exists(String, bool),
    Lt(String, Operand),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// Matches every document.
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn id(id: &str) -> Self {
        Filter::Eq(ID_FIELD.to_string(), Value::from(id))
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn exists(field: &str) -> Self {
        Filter::Exists(field.to_string(), true)
    }

    pub fn absent(field: &str) -> Self {
        Filter::Exists(field.to_string(), false)
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Filter::Lt(field.to_string(), Operand::Value(value.into()))
    }

    /// The field holds a timestamp earlier than the store's clock.
    pub fn before_now(field: &str) -> Self {
        Filter::Lt(field.to_string(), Operand::Now)
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    /// Evaluate against `doc` with `now` as the store's time.
    pub fn matches(&self, doc: &Document, now: DateTime<Utc>) -> bool {
        match self {
            Filter::Eq(field, expected) => match doc.get(field) {
                Some(actual) => actual == expected,
                None => expected.is_null(),
            },
            Filter::Exists(field, wanted) => doc.contains_key(field) == *wanted,
            Filter::Lt(field, operand) => {
                let Some(actual) = doc.get(field) else {
                    return false;
                };
                let bound = match operand {
                    Operand::Value(v) => v.clone(),
                    Operand::Now => timestamp_value(now),
                };
                compare(actual, &bound) == Some(Ordering::Less)
            }
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc, now)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc, now)),
        }
    }

    /// The single `_id` this filter can match, if it pins one.
    ///
    /// Lets a backend read one document instead of scanning the collection.
    pub fn pinned_id(&self) -> Option<&str> {
        match self {
            Filter::Eq(field, Value::String(id)) if field == ID_FIELD => Some(id),
            Filter::And(filters) => filters.iter().find_map(Filter::pinned_id),
            Filter::Or(filters) if !filters.is_empty() => {
                let first = filters[0].pinned_id()?;
                filters[1..]
                    .iter()
                    .all(|f| f.pinned_id() == Some(first))
                    .then_some(first)
            }
            _ => None,
        }
    }
}

/// Order two scalar values of the same kind. Mixed kinds are incomparable.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

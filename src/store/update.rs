//! Field-level modifications applied to a matched document.

use super::{Document, ID_FIELD, timestamp_value};
use crate::error::{LeaseholdError, Result};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

/// A set of field assignments and removals, applied in one step.
///
/// Expiry fields are resolved against the store's clock at apply time, so the
/// deadline written is `store_now + lease` regardless of the caller's clock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    set: Vec<(String, Value)>,
    expiries: Vec<(String, Duration)>,
    unset: Vec<String>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set.push((field.to_string(), value.into()));
        self
    }

    /// Set `field` to the store's current time plus `lease`.
    pub fn set_expiry(mut self, field: &str, lease: Duration) -> Self {
        self.expiries.push((field.to_string(), lease));
        self
    }

    pub fn unset(mut self, field: &str) -> Self {
        self.unset.push(field.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.expiries.is_empty() && self.unset.is_empty()
    }

    /// Apply to `doc` in place. The `_id` field is immutable.
    pub fn apply(&self, collection: &str, doc: &mut Document, now: DateTime<Utc>) -> Result<()> {
        let touches_id = self.set.iter().any(|(f, _)| f == ID_FIELD)
            || self.expiries.iter().any(|(f, _)| f == ID_FIELD)
            || self.unset.iter().any(|f| f == ID_FIELD);
        if touches_id {
            return Err(LeaseholdError::Store(format!(
                "update on '{}' may not modify {}",
                collection, ID_FIELD
            )));
        }

        for (field, value) in &self.set {
            doc.insert(field.clone(), value.clone());
        }
        for (field, lease) in &self.expiries {
            let deadline = now.checked_add_signed(*lease).ok_or_else(|| {
                LeaseholdError::UserError(format!("lease for '{}' overflows the calendar", field))
            })?;
            doc.insert(field.clone(), timestamp_value(deadline));
        }
        for field in &self.unset {
            doc.remove(field);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("test document must be an object"),
        }
    }

    #[test]
    fn apply_sets_expires_and_unsets() {
        let now = Utc::now();
        let mut d = doc(json!({"_id": "t", "holder": "old", "leaseExpiresAt": 1}));
        Update::new()
            .set("holder", "new")
            .set_expiry("deadline", Duration::seconds(30))
            .unset("leaseExpiresAt")
            .apply("tasks", &mut d, now)
            .unwrap();

        assert_eq!(d["holder"], json!("new"));
        assert_eq!(
            d["deadline"],
            json!((now + Duration::seconds(30)).timestamp_micros())
        );
        assert!(!d.contains_key("leaseExpiresAt"));
    }

    #[test]
    fn unset_of_missing_field_is_noop() {
        let mut d = doc(json!({"_id": "t"}));
        Update::new()
            .unset("holder")
            .apply("tasks", &mut d, Utc::now())
            .unwrap();
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn id_is_immutable() {
        let mut d = doc(json!({"_id": "t"}));
        let err = Update::new()
            .set("_id", "other")
            .apply("tasks", &mut d, Utc::now())
            .unwrap_err();
        assert!(err.to_string().contains("_id"));
        assert_eq!(d["_id"], json!("t"));
    }

    #[test]
    fn empty_update_reports_empty() {
        assert!(Update::new().is_empty());
        assert!(!Update::new().unset("x").is_empty());
    }
}

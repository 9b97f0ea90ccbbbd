//! Flat catalog records keyed by header field name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// One row of a catalog table.
///
/// Fields are keyed by the cleaned header names of the source file. Empty
/// cells are never stored, so a missing field and an empty cell read the
/// same.
///
/// # Examples
///
/// ```
/// use catalog_cache_core::{Record, Value};
///
/// let record = Record::new()
///     .with("id", Value::Int(3001))
///     .with("name", Value::Text("Brick 2 x 4".into()));
/// assert_eq!(record.key_text("id").as_deref(), Some("3001"));
/// assert_eq!(record.text("name"), Some("Brick 2 x 4"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used mostly by tests and fixtures.
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns the field as text only when it was inferred as text.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn int(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    pub fn flag(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    /// Renders any field as lookup-key text regardless of its inferred type.
    pub fn key_text(&self, field: &str) -> Option<String> {
        self.get(field).map(|v| v.as_key().into_owned())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

//! The in-memory form of one dataset generation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::Record;
use crate::table::CATALOG_TABLES;

/// All catalog tables of one generation, keyed by table name.
///
/// Tables that were never loaded are simply absent; [`Dataset::table`]
/// returns an empty slice for them.
///
/// # Examples
///
/// ```
/// use catalog_cache_core::{Dataset, Record, Value};
///
/// let mut dataset = Dataset::new();
/// dataset.push_rows("items", vec![Record::new().with("id", Value::Int(1))]);
/// assert_eq!(dataset.table("items").len(), 1);
/// assert!(dataset.table("variants").is_empty());
/// assert_eq!(dataset.total_rows(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    tables: BTreeMap<String, Vec<Record>>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the rows of `name`, or an empty slice if the table is absent.
    pub fn table(&self, name: &str) -> &[Record] {
        self.tables.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replaces a whole table.
    pub fn set_table(&mut self, name: impl Into<String>, rows: Vec<Record>) {
        self.tables.insert(name.into(), rows);
    }

    /// Appends rows to a table, creating it if needed.
    pub fn push_rows(&mut self, name: &str, rows: Vec<Record>) {
        self.tables.entry(name.to_string()).or_default().extend(rows);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn row_counts(&self) -> BTreeMap<String, usize> {
        self.tables
            .iter()
            .map(|(name, rows)| (name.clone(), rows.len()))
            .collect()
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    /// `true` when no table holds a row.
    pub fn is_empty(&self) -> bool {
        self.total_rows() == 0
    }

    /// Number of catalog tables that hold at least one row.
    pub fn loaded_catalog_tables(&self) -> usize {
        CATALOG_TABLES
            .iter()
            .filter(|t| !self.table(t.name).is_empty())
            .count()
    }
}

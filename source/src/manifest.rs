//! Part-count manifest for split source tables.
//!
//! Large tables are published as sequential parts. The manifest maps a
//! table base name to its part count; a missing manifest or a missing entry
//! means the table is a single file.
//!
//! ```json
//! { "compositions": 4, "components": 2 }
//! ```
//!
//! # Examples
//!
//! ```
//! use catalog_cache_source::Manifest;
//!
//! let manifest = Manifest::from_json(r#"{ "compositions": 2 }"#).unwrap();
//! assert_eq!(manifest.parts("compositions"), 2);
//! assert_eq!(manifest.parts("items"), 1);
//! assert_eq!(
//!     manifest.part_files("compositions", "csv"),
//!     vec!["compositions_part_1.csv", "compositions_part_2.csv"],
//! );
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SourceError};

/// Conventional manifest file name next to the source files.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Largest part count accepted from a manifest.
const MAX_PARTS: u32 = 1_000;

/// Table base name → number of sequential parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    parts: BTreeMap<String, u32>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses manifest JSON and checks part counts.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::JsonError`] for malformed JSON and
    /// [`SourceError::InvalidManifest`] for a part count above the limit.
    pub fn from_json(text: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(text)?;
        if let Some((name, count)) = manifest.parts.iter().find(|(_, c)| **c > MAX_PARTS) {
            return Err(SourceError::InvalidManifest(format!(
                "table '{name}' declares {count} parts (limit {MAX_PARTS})"
            )));
        }
        Ok(manifest)
    }

    /// Loads a manifest from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn set_parts(&mut self, table: impl Into<String>, parts: u32) {
        self.parts.insert(table.into(), parts);
    }

    /// Part count for `table`, defaulting to 1. A listed count of 0 is
    /// treated as 1.
    pub fn parts(&self, table: &str) -> u32 {
        self.parts.get(table).copied().unwrap_or(1).max(1)
    }

    /// File names to fetch for `table`, in part order.
    pub fn part_files(&self, table: &str, extension: &str) -> Vec<String> {
        let count = self.parts(table);
        if count == 1 {
            return vec![format!("{table}.{extension}")];
        }
        (1..=count)
            .map(|n| format!("{table}_part_{n}.{extension}"))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_single_file() {
        let manifest = Manifest::new();
        assert_eq!(manifest.parts("items"), 1);
        assert_eq!(manifest.part_files("items", "csv"), vec!["items.csv"]);
    }

    #[test]
    fn test_listed_single_part_is_unsplit() {
        let manifest = Manifest::from_json(r#"{"items": 1}"#).unwrap();
        assert_eq!(manifest.part_files("items", "csv"), vec!["items.csv"]);
    }

    #[test]
    fn test_zero_parts_treated_as_one() {
        let manifest = Manifest::from_json(r#"{"items": 0}"#).unwrap();
        assert_eq!(manifest.parts("items"), 1);
    }

    #[test]
    fn test_split_table_files() {
        let manifest = Manifest::from_json(r#"{"compositions": 3}"#).unwrap();
        assert_eq!(
            manifest.part_files("compositions", "csv"),
            vec![
                "compositions_part_1.csv",
                "compositions_part_2.csv",
                "compositions_part_3.csv",
            ]
        );
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            Manifest::from_json("{not json"),
            Err(SourceError::JsonError(_))
        ));
        assert!(Manifest::from_json(r#"{"items": -1}"#).is_err());
    }

    #[test]
    fn test_rejects_absurd_part_count() {
        assert!(matches!(
            Manifest::from_json(r#"{"items": 100000}"#),
            Err(SourceError::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        std::fs::write(&path, r#"{"parts": 2}"#).unwrap();
        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.parts("parts"), 2);
    }
}

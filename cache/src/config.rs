//! Configuration for the caching engine.
//!
//! Loaded from YAML. Every field has a default, so a partial file (or no
//! file at all) is valid.
//!
//! # Example YAML
//!
//! ```yaml
//! cache_dir: /var/cache/catalog
//! source_dir: /srv/catalog/latest
//! table_prefix: catalog_
//! delimiter: ","
//! freshness_hours: 12
//! stale_marker_minutes: 30
//! failure_threshold: 3
//! cooldown_secs: 30
//! busy_timeout_ms: 5000
//! min_rows:
//!   items: 10000
//!   compositions: 500000
//! ```

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use catalog_cache_core::table::{COMPONENTS, COMPOSITIONS, CATALOG_TABLES, ITEMS, VARIANTS};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Database file name inside the cache directory.
pub const DATABASE_FILE: &str = "catalog.db";

/// Fallback blob file name inside the cache directory.
pub const FALLBACK_FILE: &str = "catalog-fallback.json.gz";

/// Top-level engine configuration.
///
/// # Examples
///
/// ```
/// use catalog_cache::CacheConfig;
///
/// let config: CacheConfig = serde_yaml::from_str("freshness_hours: 6").unwrap();
/// assert_eq!(config.freshness_ms(), 6 * 60 * 60 * 1000);
/// assert_eq!(config.failure_threshold, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the database and the fallback blob.
    pub cache_dir: PathBuf,
    /// Directory of source files, used by the CLI's directory fetcher.
    pub source_dir: Option<PathBuf>,
    /// Prefix of every catalog partition in the database.
    pub table_prefix: String,
    /// Extension of source files. Does not change how fields are split.
    pub file_extension: String,
    /// Field separator of source files. Must be ASCII.
    pub delimiter: char,
    /// Tables to load. Empty means the full catalog table set.
    pub tables: Vec<String>,
    /// Generations older than this are refreshed.
    pub freshness_hours: u64,
    /// Write markers older than this are considered abandoned.
    pub stale_marker_minutes: u64,
    /// Consecutive storage failures that disable the structured store.
    pub failure_threshold: u32,
    /// Wait after a storage failure before the next attempt.
    pub cooldown_secs: u64,
    /// How long a statement waits on a locked database.
    pub busy_timeout_ms: u64,
    /// Minimum row counts of load-bearing tables.
    pub min_rows: BTreeMap<String, usize>,
    /// Where session state is persisted. `None` keeps it in memory.
    pub session_file: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let min_rows = [
            (ITEMS.name, 10_000),
            (COMPONENTS.name, 40_000),
            (VARIANTS.name, 100),
            (COMPOSITIONS.name, 500_000),
        ]
        .into_iter()
        .map(|(name, min)| (name.to_string(), min))
        .collect();

        Self {
            cache_dir: PathBuf::from(".catalog-cache"),
            source_dir: None,
            table_prefix: "catalog_".to_string(),
            file_extension: "csv".to_string(),
            delimiter: ',',
            tables: Vec::new(),
            freshness_hours: 12,
            stale_marker_minutes: 30,
            failure_threshold: 3,
            cooldown_secs: 30,
            busy_timeout_ms: 5_000,
            min_rows,
            session_file: None,
        }
    }
}

impl CacheConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::CacheError::IoError) if the file cannot
    /// be read, or [`YamlError`](crate::CacheError::YamlError) if parsing
    /// fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Tables to load, defaulting to the catalog table set.
    pub fn table_names(&self) -> Vec<String> {
        if self.tables.is_empty() {
            CATALOG_TABLES.iter().map(|t| t.name.to_string()).collect()
        } else {
            self.tables.clone()
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.cache_dir.join(DATABASE_FILE)
    }

    pub fn fallback_path(&self) -> PathBuf {
        self.cache_dir.join(FALLBACK_FILE)
    }

    pub fn freshness_ms(&self) -> i64 {
        (self.freshness_hours as i64) * 60 * 60 * 1000
    }

    pub fn stale_marker_ms(&self) -> i64 {
        (self.stale_marker_minutes as i64) * 60 * 1000
    }

    pub fn cooldown_ms(&self) -> i64 {
        (self.cooldown_secs as i64) * 1000
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// The delimiter as a single byte.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDelimiter`](crate::CacheError::InvalidDelimiter)
    /// for a non-ASCII delimiter.
    pub fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(CacheError::InvalidDelimiter(self.delimiter))
        }
    }
}

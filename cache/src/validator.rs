//! Freshness and completeness checks for the structured cache.
//!
//! All checks are heuristics: when in doubt the cache is declared unusable
//! and the engine refetches. The sequence short-circuits on the first
//! failing step:
//!
//! 1. a metadata row exists;
//! 2. no live write marker (an abandoned one is cleared);
//! 3. the generation is younger than the freshness threshold;
//! 4. the layout version matches and no table write came up short;
//! 5. load-bearing tables hold at least their minimum row counts.

use std::collections::BTreeMap;
use std::fmt;

use catalog_cache_core::FORMAT_VERSION;
use catalog_cache_sqlite::StructuredStore;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

/// Result of validating the structured cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Usable,
    /// No metadata row: nothing cached, or a write never finished.
    NoMetadata,
    /// Another writer started replacing the generation recently.
    Busy { started_at_ms: i64 },
    Expired { age_ms: i64 },
    FormatMismatch { found: u32 },
    /// The generation was written with row-count mismatches.
    Incomplete,
    /// A load-bearing table is below its expected size.
    Truncated {
        table: String,
        rows: usize,
        expected: usize,
    },
}

impl Verdict {
    pub fn is_usable(&self) -> bool {
        matches!(self, Verdict::Usable)
    }

    /// The failure as an error, for logging.
    pub fn to_error(&self) -> Option<CacheError> {
        (!self.is_usable()).then(|| CacheError::ValidationFailure(self.to_string()))
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Usable => write!(f, "usable"),
            Verdict::NoMetadata => write!(f, "no generation metadata"),
            Verdict::Busy { started_at_ms } => {
                write!(f, "write in progress since {started_at_ms}")
            }
            Verdict::Expired { age_ms } => write!(f, "generation is {age_ms} ms old"),
            Verdict::FormatMismatch { found } => {
                write!(f, "format version {found}, expected {FORMAT_VERSION}")
            }
            Verdict::Incomplete => write!(f, "generation written incompletely"),
            Verdict::Truncated {
                table,
                rows,
                expected,
            } => write!(f, "table '{table}' has {rows} rows, expected at least {expected}"),
        }
    }
}

/// Thresholds used by [`CacheValidator`].
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    pub freshness_ms: i64,
    pub stale_marker_ms: i64,
    pub min_rows: BTreeMap<String, usize>,
}

impl From<&CacheConfig> for ValidationPolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            freshness_ms: config.freshness_ms(),
            stale_marker_ms: config.stale_marker_ms(),
            min_rows: config.min_rows.clone(),
        }
    }
}

/// Decides whether the structured cache may be served.
#[derive(Debug, Clone)]
pub struct CacheValidator {
    policy: ValidationPolicy,
}

impl CacheValidator {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Runs the validation sequence at time `now_ms`.
    ///
    /// # Errors
    ///
    /// Storage errors while inspecting the cache are returned as
    /// [`CacheError::StoreUnavailable`]; they are distinct from an unusable
    /// verdict.
    pub fn check(&self, store: &mut StructuredStore, now_ms: i64) -> Result<Verdict> {
        let Some(meta) = store.read_metadata()? else {
            return Ok(Verdict::NoMetadata);
        };

        if let Some(marker) = store.read_marker()? {
            if !marker.is_stale(now_ms, self.policy.stale_marker_ms) {
                return Ok(Verdict::Busy {
                    started_at_ms: marker.started_at_ms,
                });
            }
            info!(started_at_ms = marker.started_at_ms, "Clearing abandoned write marker");
            store.end_write()?;
        }

        let age_ms = meta.age_ms(now_ms);
        if age_ms >= self.policy.freshness_ms {
            return Ok(Verdict::Expired { age_ms });
        }

        if meta.format_version != FORMAT_VERSION {
            return Ok(Verdict::FormatMismatch {
                found: meta.format_version,
            });
        }
        if meta.incomplete {
            return Ok(Verdict::Incomplete);
        }

        for (table, expected) in &self.policy.min_rows {
            let rows = store.count_rows(table)?;
            if rows < *expected {
                return Ok(Verdict::Truncated {
                    table: table.clone(),
                    rows,
                    expected: *expected,
                });
            }
        }

        debug!(age_ms, "Structured cache is usable");
        Ok(Verdict::Usable)
    }

    /// Boolean form of [`check`](Self::check); inspection errors count as
    /// unusable.
    pub fn is_usable(&self, store: &mut StructuredStore, now_ms: i64) -> bool {
        match self.check(store, now_ms) {
            Ok(verdict) => {
                if let Some(err) = verdict.to_error() {
                    info!(error = %err, "Structured cache not usable");
                }
                verdict.is_usable()
            }
            Err(e) => {
                warn!(error = %e, "Could not validate structured cache");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_cache_core::{CacheMetadata, Dataset, Record, Value, WriteMarker};

    const HOUR: i64 = 60 * 60 * 1000;
    const MINUTE: i64 = 60 * 1000;
    const NOW: i64 = 1_700_000_000_000;

    fn policy(min_items: usize) -> ValidationPolicy {
        ValidationPolicy {
            freshness_ms: 12 * HOUR,
            stale_marker_ms: 30 * MINUTE,
            min_rows: [("items".to_string(), min_items)].into_iter().collect(),
        }
    }

    fn store_with_generation(written_at_ms: i64, items: i64) -> StructuredStore {
        let mut store = StructuredStore::open_in_memory("v_").unwrap();
        let mut dataset = Dataset::new();
        dataset.set_table(
            "items",
            (0..items).map(|i| Record::new().with("id", Value::Int(i))).collect(),
        );
        store
            .write_generation(&dataset, written_at_ms, written_at_ms, None, |_| {})
            .unwrap();
        store
    }

    #[test]
    fn test_usable_generation() {
        let mut store = store_with_generation(NOW - HOUR, 5);
        let v = CacheValidator::new(policy(5));
        assert_eq!(v.check(&mut store, NOW).unwrap(), Verdict::Usable);
        assert!(v.is_usable(&mut store, NOW));
    }

    #[test]
    fn test_missing_metadata() {
        let mut store = StructuredStore::open_in_memory("v_").unwrap();
        let v = CacheValidator::new(policy(0));
        assert_eq!(v.check(&mut store, NOW).unwrap(), Verdict::NoMetadata);
    }

    #[test]
    fn test_freshness_boundary() {
        let v = CacheValidator::new(policy(1));

        let mut just_expired = store_with_generation(NOW - 12 * HOUR - 1, 1);
        assert!(matches!(
            v.check(&mut just_expired, NOW).unwrap(),
            Verdict::Expired { .. }
        ));

        let mut just_fresh = store_with_generation(NOW - 12 * HOUR + 1, 1);
        assert_eq!(v.check(&mut just_fresh, NOW).unwrap(), Verdict::Usable);
    }

    #[test]
    fn test_young_marker_makes_cache_busy() {
        let mut store = store_with_generation(NOW - HOUR, 1);
        store.set_marker(&WriteMarker::started(NOW - 29 * MINUTE)).unwrap();
        let v = CacheValidator::new(policy(1));
        assert_eq!(
            v.check(&mut store, NOW).unwrap(),
            Verdict::Busy {
                started_at_ms: NOW - 29 * MINUTE
            }
        );
        assert!(store.read_marker().unwrap().is_some());
    }

    #[test]
    fn test_stale_marker_is_cleared_and_ignored() {
        let mut store = store_with_generation(NOW - HOUR, 1);
        store.set_marker(&WriteMarker::started(NOW - 31 * MINUTE)).unwrap();
        let v = CacheValidator::new(policy(1));
        assert_eq!(v.check(&mut store, NOW).unwrap(), Verdict::Usable);
        assert!(store.read_marker().unwrap().is_none());
    }

    #[test]
    fn test_truncated_table() {
        let mut store = store_with_generation(NOW - HOUR, 2);
        let v = CacheValidator::new(policy(3));
        assert_eq!(
            v.check(&mut store, NOW).unwrap(),
            Verdict::Truncated {
                table: "items".into(),
                rows: 2,
                expected: 3
            }
        );
    }

    #[test]
    fn test_incomplete_generation() {
        let mut store = store_with_generation(NOW - HOUR, 1);
        let mut meta = store.read_metadata().unwrap().unwrap();
        meta.incomplete = true;
        store.write_metadata(&meta).unwrap();
        let v = CacheValidator::new(policy(1));
        assert_eq!(v.check(&mut store, NOW).unwrap(), Verdict::Incomplete);
    }

    #[test]
    fn test_format_mismatch() {
        let mut store = StructuredStore::open_in_memory("v_").unwrap();
        let mut meta = CacheMetadata::new(NOW);
        meta.format_version = FORMAT_VERSION + 1;
        store.write_metadata(&meta).unwrap();
        let v = CacheValidator::new(policy(0));
        assert_eq!(
            v.check(&mut store, NOW).unwrap(),
            Verdict::FormatMismatch {
                found: FORMAT_VERSION + 1
            }
        );
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::NoMetadata.to_string(), "no generation metadata");
        assert!(Verdict::Usable.to_error().is_none());
        assert!(matches!(
            Verdict::Incomplete.to_error(),
            Some(CacheError::ValidationFailure(_))
        ));
    }
}

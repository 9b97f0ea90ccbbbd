//! Cache-control metadata, kept apart from catalog data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Version of the on-disk cache layout. Caches with another version are
/// treated as unusable and rebuilt.
pub const FORMAT_VERSION: u32 = 3;

/// The single record that closes a generation.
///
/// Written last during a refresh, so a reader that observes it may assume
/// every table write of that generation was at least attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Unix milliseconds at which the generation was written.
    pub written_at_ms: i64,
    pub format_version: u32,
    /// Set when any table write acknowledged fewer rows than submitted.
    #[serde(default)]
    pub incomplete: bool,
    /// SHA-256 of the source text the generation was parsed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_digest: Option<String>,
    /// Rows acknowledged per table.
    #[serde(default)]
    pub row_counts: BTreeMap<String, usize>,
}

impl CacheMetadata {
    pub fn new(written_at_ms: i64) -> Self {
        Self {
            written_at_ms,
            format_version: FORMAT_VERSION,
            incomplete: false,
            source_digest: None,
            row_counts: BTreeMap::new(),
        }
    }

    /// Age of the generation relative to `now_ms`. Never negative.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.written_at_ms).max(0)
    }
}

/// Transient marker present while a generation is being replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteMarker {
    pub write_in_progress: bool,
    pub started_at_ms: i64,
}

impl WriteMarker {
    pub fn started(now_ms: i64) -> Self {
        Self {
            write_in_progress: true,
            started_at_ms: now_ms,
        }
    }

    /// `true` once the marker is older than `threshold_ms`.
    pub fn is_stale(&self, now_ms: i64, threshold_ms: i64) -> bool {
        now_ms - self.started_at_ms > threshold_ms
    }
}

/// Picks the timestamp for a new generation so that `written_at_ms` only
/// ever moves forward.
pub fn next_generation_ts(now_ms: i64, previous: Option<i64>) -> i64 {
    match previous {
        Some(prev) if prev >= now_ms => prev + 1,
        _ => now_ms,
    }
}

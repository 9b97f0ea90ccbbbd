//! Error taxonomy of the caching engine.
//!
//! Most of these never reach a consumer: fetch and parse failures degrade
//! completeness, storage failures feed the circuit breaker and trigger the
//! fallback, validation failures trigger a refresh. They exist so every
//! absorbed failure is logged with a consistent shape.

use catalog_cache_core::StoreError;
use catalog_cache_source::SourceError;
use catalog_cache_sqlite::SqliteError;
use thiserror::Error;

/// Errors that can occur in the caching engine.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A source file (or every source file) could not be fetched.
    #[error("network fetch failed: {0}")]
    NetworkFetchFailure(String),

    /// Source rows were rejected by the parser.
    #[error("parse failed: {0}")]
    ParseFailure(String),

    /// The store could not be opened or a transaction failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The cached generation is not usable.
    #[error("cache validation failed: {0}")]
    ValidationFailure(String),

    /// A table write acknowledged fewer rows than were submitted.
    #[error("write incomplete for '{table}': {acknowledged} of {submitted} rows")]
    WriteIncomplete {
        table: String,
        submitted: usize,
        acknowledged: usize,
    },

    /// The store ran out of space.
    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The configured field delimiter is not a single ASCII character.
    #[error("invalid delimiter {0:?}: must be an ASCII character")]
    InvalidDelimiter(char),

    /// Neither a fetcher nor a source directory was configured.
    #[error("no source configured: set source_dir or supply a fetcher")]
    NoSourceConfigured,

    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error from a source building block.
    #[error("source error: {0}")]
    SourceError(#[from] SourceError),
}

impl CacheError {
    /// `true` for failures the circuit breaker counts.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            CacheError::StoreUnavailable(_) | CacheError::QuotaExceeded(_)
        )
    }
}

impl From<SqliteError> for CacheError {
    fn from(err: SqliteError) -> Self {
        if err.is_quota_exceeded() {
            CacheError::QuotaExceeded(err.to_string())
        } else {
            CacheError::StoreUnavailable(err.to_string())
        }
    }
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::QuotaExceeded(msg) => CacheError::QuotaExceeded(msg),
            StoreError::Unavailable(msg) | StoreError::Corrupt(msg) => {
                CacheError::StoreUnavailable(msg)
            }
        }
    }
}

/// Convenience alias for results with [`CacheError`].
pub type Result<T> = std::result::Result<T, CacheError>;

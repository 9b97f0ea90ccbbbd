//! Error types for source loading.
//!
//! Most loader failures are absorbed into a [`LoadReport`](crate::LoadReport)
//! rather than returned; these variants surface from the individual
//! building blocks (fetchers, manifest, parser).

use thiserror::Error;

/// Errors that can occur while fetching or parsing source files.
#[derive(Debug, Error)]
pub enum SourceError {
    /// A source file could not be retrieved.
    #[error("failed to fetch '{name}': {reason}")]
    Fetch { name: String, reason: String },

    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Manifest JSON could not be parsed.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Delimited text could not be tokenized.
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// The manifest lists a table with an unusable part count.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
}

/// Convenience alias for results with [`SourceError`].
pub type Result<T> = std::result::Result<T, SourceError>;

//! The storage contract shared by the structured store and the blob
//! fallback.
//!
//! The orchestrator talks to either backend through [`DatasetStore`], so a
//! host can substitute a different engine for either role without touching
//! the refresh logic.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::Dataset;

/// Which kind of backend served or stored a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreKind {
    /// Per-entity partitioned store.
    Structured,
    /// Single serialized blob.
    Blob,
}

/// Storage-level failure as seen by the orchestrator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be opened or a transaction failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend ran out of space.
    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Stored bytes could not be decoded.
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

/// Convenience alias for results with [`StoreError`].
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A dataset read back from a store, with its generation timestamp.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub dataset: Dataset,
    pub written_at_ms: i64,
    pub kind: StoreKind,
}

/// Whole-dataset persistence.
pub trait DatasetStore {
    fn kind(&self) -> StoreKind;

    /// Capability probe: succeeds when the backend can be used right now.
    fn probe(&mut self) -> StoreResult<()>;

    /// Timestamp of the stored generation, if any.
    fn written_at(&mut self) -> StoreResult<Option<i64>>;

    fn load(&mut self) -> StoreResult<Option<Snapshot>>;

    /// Replaces the stored generation with `dataset`.
    fn save(&mut self, dataset: &Dataset, written_at_ms: i64) -> StoreResult<()>;

    /// Removes the stored generation. Data outside the catalog is untouched.
    fn clear(&mut self) -> StoreResult<()>;
}

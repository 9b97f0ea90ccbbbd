//! Single-blob fallback store.
//!
//! Used when the structured store is unsupported or disabled. The whole
//! dataset is written as one gzip-compressed file:
//!
//! ```text
//! {"written_at_ms":1700000000000,"format_version":3}\n
//! {"tables":{"items":[...],...}}
//! ```
//!
//! The header line comes first so that [`BlobStore::timestamp`] can answer
//! without decoding the dataset. Writes go to a temporary file that is then
//! renamed over the blob, so a crash mid-write leaves the previous blob
//! intact.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use catalog_cache_core::{
    Dataset, DatasetStore, FORMAT_VERSION, Snapshot, StoreError, StoreKind, StoreResult,
};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct BlobHeader {
    written_at_ms: i64,
    format_version: u32,
}

/// Gzip-compressed JSON blob holding a whole dataset.
#[derive(Debug, Clone)]
pub struct BlobStore {
    path: PathBuf,
}

impl BlobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn open_reader(&self) -> std::io::Result<Option<BufReader<GzDecoder<File>>>> {
        match File::open(&self.path) {
            Ok(file) => Ok(Some(BufReader::new(GzDecoder::new(file)))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_header(reader: &mut impl BufRead) -> Option<BlobHeader> {
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;
        let header: BlobHeader = serde_json::from_str(line.trim_end()).ok()?;
        (header.format_version == FORMAT_VERSION).then_some(header)
    }

    /// Timestamp of the stored blob. Unreadable or foreign-format blobs
    /// report `None`.
    pub fn timestamp(&self) -> StoreResult<Option<i64>> {
        let Some(mut reader) = self.open_reader().map_err(io_error)? else {
            return Ok(None);
        };
        Ok(Self::read_header(&mut reader).map(|h| h.written_at_ms))
    }

    /// Loads the stored dataset. A corrupt blob is logged and treated as
    /// absent.
    pub fn load_snapshot(&self) -> StoreResult<Option<Snapshot>> {
        let Some(mut reader) = self.open_reader().map_err(io_error)? else {
            return Ok(None);
        };
        let Some(header) = Self::read_header(&mut reader) else {
            warn!(path = %self.path.display(), "Fallback blob header unreadable, ignoring blob");
            return Ok(None);
        };

        let mut body = String::new();
        if let Err(e) = reader.read_to_string(&mut body) {
            warn!(path = %self.path.display(), error = %e, "Fallback blob truncated, ignoring blob");
            return Ok(None);
        }
        match serde_json::from_str::<Dataset>(&body) {
            Ok(dataset) => {
                debug!(rows = dataset.total_rows(), "Fallback blob loaded");
                Ok(Some(Snapshot {
                    dataset,
                    written_at_ms: header.written_at_ms,
                    kind: StoreKind::Blob,
                }))
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Fallback blob corrupt, ignoring blob");
                Ok(None)
            }
        }
    }

    /// Writes `dataset` as the new blob.
    pub fn save_snapshot(&self, dataset: &Dataset, written_at_ms: i64) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let tmp = self.path.with_extension("tmp");
        let header = BlobHeader {
            written_at_ms,
            format_version: FORMAT_VERSION,
        };

        let write = || -> std::io::Result<()> {
            let file = File::create(&tmp)?;
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            serde_json::to_writer(&mut encoder, &header)?;
            encoder.write_all(b"\n")?;
            serde_json::to_writer(&mut encoder, dataset)?;
            encoder.finish()?.flush()?;
            Ok(())
        };

        if let Err(e) = write() {
            std::fs::remove_file(&tmp).ok();
            return Err(io_error(e));
        }
        std::fs::rename(&tmp, &self.path).map_err(io_error)?;
        info!(rows = dataset.total_rows(), path = %self.path.display(), "Fallback blob written");
        Ok(())
    }

    /// Deletes the blob if present.
    pub fn remove(&self) -> StoreResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Fallback blob removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }
}

fn io_error(e: std::io::Error) -> StoreError {
    if e.kind() == std::io::ErrorKind::StorageFull {
        StoreError::QuotaExceeded(e.to_string())
    } else {
        StoreError::Unavailable(e.to_string())
    }
}

impl DatasetStore for BlobStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Blob
    }

    /// Succeeds when the blob's directory exists or can be created.
    fn probe(&mut self) -> StoreResult<()> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                std::fs::create_dir_all(parent).map_err(io_error)
            }
            _ => Ok(()),
        }
    }

    fn written_at(&mut self) -> StoreResult<Option<i64>> {
        self.timestamp()
    }

    fn load(&mut self) -> StoreResult<Option<Snapshot>> {
        self.load_snapshot()
    }

    fn save(&mut self, dataset: &Dataset, written_at_ms: i64) -> StoreResult<()> {
        self.save_snapshot(dataset, written_at_ms)
    }

    fn clear(&mut self) -> StoreResult<()> {
        self.remove()
    }
}

//! Manifest-driven loading of every catalog table.
//!
//! [`SourceLoader`] resolves the part files of each requested table from the
//! manifest, fetches all parts concurrently, then parses them one part at a
//! time in table and part order. Completion order of the fetches never
//! affects the result.
//!
//! Failures degrade completeness instead of aborting: an unreachable part
//! contributes no rows and is listed in [`LoadReport::failed_parts`], a
//! rejected row is counted in [`LoadReport::skipped_rows`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use catalog_cache_source::{MemoryFetcher, SourceLoader};
//!
//! let fetcher = MemoryFetcher::new()
//!     .with_file("manifest.json", r#"{"parts": 2}"#)
//!     .with_file("parts_part_1.csv", "id,name\n1,Brick\n")
//!     .with_file("parts_part_2.csv", "id,name\n2,Plate\n");
//!
//! let outcome = SourceLoader::new(Arc::new(fetcher)).load(&["parts"]);
//! assert_eq!(outcome.dataset.table("parts").len(), 2);
//! assert!(outcome.report.is_complete());
//! ```

use std::sync::Arc;

use catalog_cache_core::Dataset;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::fetch::SourceFetcher;
use crate::manifest::{MANIFEST_FILE, Manifest};
use crate::parse::parse_delimited_with;

/// Progress of a load, reported once per processed part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartProgress {
    pub table: String,
    pub file: String,
    /// 1-based index of this part across all tables.
    pub completed: usize,
    pub total: usize,
}

/// What happened during a load.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Parts fetched and parsed.
    pub parts_loaded: usize,
    /// File names that could not be fetched or parsed.
    pub failed_parts: Vec<String>,
    /// Rows rejected by the parser.
    pub skipped_rows: usize,
    /// SHA-256 hex digest over every fetched part, in load order.
    pub source_digest: String,
}

impl LoadReport {
    /// `true` when every part loaded.
    pub fn is_complete(&self) -> bool {
        self.failed_parts.is_empty()
    }

    /// `true` when no part at all could be loaded.
    pub fn is_total_failure(&self) -> bool {
        self.parts_loaded == 0
    }
}

/// Loaded dataset plus the report describing how it was assembled.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub dataset: Dataset,
    pub report: LoadReport,
}

/// One file to fetch: which table it belongs to and its name.
struct PartJob {
    table: String,
    file: String,
}

/// Fetches and parses source tables.
pub struct SourceLoader {
    fetcher: Arc<dyn SourceFetcher>,
    extension: String,
    delimiter: u8,
}

impl SourceLoader {
    /// Creates a loader for comma-separated `.csv` source files.
    pub fn new(fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self {
            fetcher,
            extension: "csv".to_string(),
            delimiter: b',',
        }
    }

    /// Changes the file names fetched. Fields are still split on the
    /// configured delimiter; see [`with_delimiter`](Self::with_delimiter).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Field separator of the source files.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Fetches the manifest. A missing or unparseable manifest is logged and
    /// replaced by the empty manifest (every table unsplit).
    pub fn manifest(&self) -> Manifest {
        let text = match self.fetcher.fetch(MANIFEST_FILE) {
            Ok(text) => text,
            Err(e) => {
                debug!(error = %e, "No manifest, assuming unsplit tables");
                return Manifest::new();
            }
        };
        match Manifest::from_json(&text) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable manifest");
                Manifest::new()
            }
        }
    }

    /// Loads `tables` without progress reporting.
    pub fn load(&self, tables: &[&str]) -> LoadOutcome {
        self.load_with_progress(tables, |_| {})
    }

    /// Loads `tables`, calling `on_part` after each part is processed.
    pub fn load_with_progress(
        &self,
        tables: &[&str],
        mut on_part: impl FnMut(&PartProgress),
    ) -> LoadOutcome {
        let manifest = self.manifest();
        let jobs: Vec<PartJob> = tables
            .iter()
            .flat_map(|table| {
                manifest
                    .part_files(table, &self.extension)
                    .into_iter()
                    .map(move |file| PartJob {
                        table: table.to_string(),
                        file,
                    })
            })
            .collect();

        info!(tables = tables.len(), parts = jobs.len(), "Fetching source files");

        // Indexed collect keeps job order regardless of completion order.
        let fetched: Vec<_> = jobs
            .par_iter()
            .map(|job| self.fetcher.fetch(&job.file))
            .collect();

        let mut dataset = Dataset::new();
        let mut report = LoadReport::default();
        let mut hasher = Sha256::new();
        let total = jobs.len();

        for table in tables {
            dataset.set_table(*table, Vec::new());
        }

        for (i, (job, result)) in jobs.iter().zip(fetched).enumerate() {
            match result {
                Ok(text) => {
                    hasher.update(job.file.as_bytes());
                    hasher.update(text.as_bytes());
                    match parse_delimited_with(&text, self.delimiter) {
                        Ok(parsed) => {
                            debug!(
                                table = %job.table,
                                file = %job.file,
                                rows = parsed.records.len(),
                                "Parsed source part"
                            );
                            report.parts_loaded += 1;
                            report.skipped_rows += parsed.skipped_rows;
                            dataset.push_rows(&job.table, parsed.records);
                        }
                        Err(e) => {
                            warn!(file = %job.file, error = %e, "Source part unreadable, contributing no rows");
                            report.failed_parts.push(job.file.clone());
                        }
                    }
                }
                Err(e) => {
                    warn!(file = %job.file, error = %e, "Source part unavailable, contributing no rows");
                    report.failed_parts.push(job.file.clone());
                }
            }

            on_part(&PartProgress {
                table: job.table.clone(),
                file: job.file.clone(),
                completed: i + 1,
                total,
            });
        }

        report.source_digest = format!("{:x}", hasher.finalize());
        info!(
            rows = dataset.total_rows(),
            failed_parts = report.failed_parts.len(),
            skipped_rows = report.skipped_rows,
            "Source load finished"
        );

        LoadOutcome { dataset, report }
    }
}

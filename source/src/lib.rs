//! Fetching and parsing of the catalog's delimited source files.
//!
//! The catalog is published as one delimited text file per table, with
//! large tables split into sequential parts described by a [`Manifest`].
//! This crate turns those files into a [`Dataset`](catalog_cache_core::Dataset).
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use catalog_cache_core::table::CATALOG_TABLES;
//! use catalog_cache_source::{DirectoryFetcher, SourceLoader};
//!
//! let loader = SourceLoader::new(Arc::new(DirectoryFetcher::new("data/")));
//! let names: Vec<&str> = CATALOG_TABLES.iter().map(|t| t.name).collect();
//! let outcome = loader.load(&names);
//! println!(
//!     "{} rows, {} failed parts",
//!     outcome.dataset.total_rows(),
//!     outcome.report.failed_parts.len()
//! );
//! ```

mod error;
mod fetch;
mod loader;
mod manifest;
mod parse;

pub use error::{Result, SourceError};
pub use fetch::{DirectoryFetcher, MemoryFetcher, SourceFetcher};
pub use loader::{LoadOutcome, LoadReport, PartProgress, SourceLoader};
pub use manifest::{MANIFEST_FILE, Manifest};
pub use parse::{
    ParsedTable, clean_header, normalize_line_endings, parse_delimited, parse_delimited_with,
};

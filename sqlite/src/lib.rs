//! SQLite-backed structured store for catalog generations.
//!
//! This crate persists a [`Dataset`](catalog_cache_core::Dataset) as one
//! SQLite table per entity, keyed by each table's natural or composite key,
//! plus a metadata row that closes each generation and a marker that flags
//! an in-progress replacement.
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - **`schema`**: SQL generation with customizable table prefixes
//! - **`store`**: batched partition writes, reads, metadata, and marker
//!
//! # Quick start
//!
//! ```no_run
//! use std::time::Duration;
//! use catalog_cache_sqlite::StructuredStore;
//!
//! let store = StructuredStore::open("cache.db", "catalog_", Duration::from_secs(5)).unwrap();
//! match store.read_metadata().unwrap() {
//!     Some(meta) => println!("generation written at {}", meta.written_at_ms),
//!     None => println!("no cached generation"),
//! }
//! ```
//!
//! # Table prefix customization
//!
//! All partition names are prefixed with a configurable string. Tables
//! without the prefix (for example a consumer's own records in the same
//! database file) are never modified. Prefixes must contain only
//! alphanumeric characters and underscores.

mod error;
mod schema;
mod store;

pub use error::{Result, SqliteError};
pub use schema::{generate_control_sql, generate_drop_sql, generate_partition_sql};
pub use store::{GenerationReport, StructuredStore, TableWriteReport, batch_size_for};

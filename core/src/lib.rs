//! Record model, table catalog, and storage contracts for the catalog
//! dataset cache.
//!
//! This crate defines the types every other crate in the workspace shares:
//!
//! - [`Value`] and [`Record`]: flat rows with per-cell type inference.
//! - [`TableSpec`] and [`table::CATALOG_TABLES`]: the table set and how each
//!   table derives its row keys (single field or escaped composite key).
//! - [`Dataset`]: one generation of all tables held in memory.
//! - [`CacheMetadata`] and [`WriteMarker`]: cache-control records.
//! - [`DatasetStore`]: the contract both storage backends implement.
//! - [`Clock`]: injectable time source.
//!
//! # Example
//!
//! ```
//! use catalog_cache_core::*;
//!
//! let row = Record::new()
//!     .with("item_id", "10030-1".into())
//!     .with("version", Value::Int(1))
//!     .with("component_id", "3001".into())
//!     .with("variant_id", Value::Int(4))
//!     .with("is_spare", Value::Bool(false));
//! assert_eq!(table::COMPOSITIONS.key_for(&row), "10030-1|1|3001|4|false");
//! ```

mod clock;
mod dataset;
mod meta;
mod record;
mod store;
pub mod table;
mod value;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dataset::Dataset;
pub use meta::{CacheMetadata, FORMAT_VERSION, WriteMarker, next_generation_ts};
pub use record::Record;
pub use store::{DatasetStore, Snapshot, StoreError, StoreKind, StoreResult};
pub use table::{KeyStrategy, TableSpec};
pub use value::Value;

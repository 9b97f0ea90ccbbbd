//! Local caching and refresh engine for a multi-table reference catalog.
//!
//! The engine keeps a large, read-mostly catalog resident in memory and
//! persisted locally, refreshing it from a remote source only when the
//! local generation is missing, expired, truncated, or unreadable.
//!
//! # Architecture
//!
//! - **`validator`**: decides whether the structured cache may be served
//! - **`breaker`** / **`session`**: session-scoped circuit breaker over
//!   the structured store
//! - **`fallback`** / **`reconcile`**: gzip blob store used when the
//!   structured store is unavailable, and the newer-wins rule between them
//! - **`index`**: build-once primary and foreign-key lookups
//! - **`progress`**: progress and readiness notifications
//! - **`context`**: [`CatalogCache`], the orchestrator that owns all of the
//!   above
//!
//! Loading from the source lives in `catalog-cache-source`, and the
//! structured store in `catalog-cache-sqlite`.
//!
//! # Quick start
//!
//! ```no_run
//! use catalog_cache::{CacheConfig, CatalogCache};
//!
//! let config = CacheConfig::load("catalog-cache.yaml").unwrap();
//! let mut cache = CatalogCache::builder(config).build().unwrap();
//! let origin = cache.initialize();
//! println!("catalog ready from {origin}");
//!
//! for row in cache.compositions_for_revision("10030-1|1") {
//!     println!("{:?}", row.key_text("component_id"));
//! }
//! ```

mod breaker;
mod config;
mod context;
mod error;
mod fallback;
mod index;
mod progress;
mod reconcile;
mod session;
mod validator;

pub use breaker::CircuitBreaker;
pub use config::{CacheConfig, DATABASE_FILE, FALLBACK_FILE};
pub use context::{CacheInfo, CatalogCache, CatalogCacheBuilder, DataOrigin};
pub use error::{CacheError, Result};
pub use fallback::BlobStore;
pub use index::{CatalogIndex, IndexCell};
pub use progress::{Phase, ProgressEvent, ProgressHub, Subscription};
pub use reconcile::reconcile;
pub use session::{SessionState, SessionStore};
pub use validator::{CacheValidator, ValidationPolicy, Verdict};

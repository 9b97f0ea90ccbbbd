//! The caching engine as one owned context.
//!
//! [`CatalogCache`] ties the building blocks together: it asks the circuit
//! breaker whether structured storage may be used, validates what is
//! cached, refreshes from the source when needed, falls back to the blob
//! store when the structured store is unavailable, and finally builds the
//! in-memory index that consumers read from.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use catalog_cache::{CacheConfig, CatalogCache, DataOrigin};
//! use catalog_cache_source::MemoryFetcher;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = CacheConfig {
//!     cache_dir: dir.path().to_path_buf(),
//!     tables: vec!["components".into()],
//!     min_rows: Default::default(),
//!     ..Default::default()
//! };
//! let fetcher = MemoryFetcher::new().with_file("components.csv", "id,name\n3001,Brick 2 x 4\n");
//!
//! let mut cache = CatalogCache::builder(config).fetcher(Arc::new(fetcher)).build().unwrap();
//! assert_eq!(cache.initialize(), DataOrigin::FreshLoad);
//! assert!(cache.is_ready());
//! assert!(cache.component("3001").is_some());
//! ```

use std::fmt;
use std::sync::Arc;

use catalog_cache_core::{
    Clock, Dataset, DatasetStore, Record, StoreKind, SystemClock, next_generation_ts,
};
use catalog_cache_source::{DirectoryFetcher, SourceFetcher, SourceLoader};
use catalog_cache_sqlite::StructuredStore;
use tracing::{debug, error, info, warn};

use crate::breaker::CircuitBreaker;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::fallback::BlobStore;
use crate::index::{CatalogIndex, IndexCell};
use crate::progress::{Phase, ProgressEvent, ProgressHub, Subscription};
use crate::reconcile::reconcile;
use crate::session::SessionStore;
use crate::validator::{CacheValidator, ValidationPolicy};

/// Where the resident dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOrigin {
    /// A valid generation in the structured store.
    StructuredCache,
    /// A fresh fallback blob; the structured store was unavailable.
    FallbackCache,
    /// Fetched from the source during this run.
    FreshLoad,
    /// The source failed; an expired or incomplete cached generation is
    /// served instead.
    StaleCache,
    /// Nothing could be loaded.
    Empty,
}

impl fmt::Display for DataOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataOrigin::StructuredCache => "structured cache",
            DataOrigin::FallbackCache => "fallback cache",
            DataOrigin::FreshLoad => "fresh load",
            DataOrigin::StaleCache => "stale cache",
            DataOrigin::Empty => "empty",
        };
        f.write_str(name)
    }
}

/// Summary of the persisted cache, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInfo {
    /// A generation is persisted in the active store.
    pub exists: bool,
    pub age_ms: Option<i64>,
    /// The persisted generation would be served without a refresh.
    pub is_valid: bool,
    /// Which store answered.
    pub store: StoreKind,
    /// Origin of the resident dataset, once initialized.
    pub source: Option<DataOrigin>,
}

/// Builder for [`CatalogCache`].
pub struct CatalogCacheBuilder {
    config: CacheConfig,
    fetcher: Option<Arc<dyn SourceFetcher>>,
    clock: Option<Arc<dyn Clock>>,
    session: Option<SessionStore>,
}

impl CatalogCacheBuilder {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            fetcher: None,
            clock: None,
            session: None,
        }
    }

    /// Source transport. Defaults to a [`DirectoryFetcher`] over
    /// `config.source_dir`.
    pub fn fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Time source. Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Session state store. Defaults to `config.session_file`, or memory.
    pub fn session(mut self, session: SessionStore) -> Self {
        self.session = Some(session);
        self
    }

    /// Assembles the context. No storage is touched until
    /// [`CatalogCache::initialize`].
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NoSourceConfigured`] when neither a fetcher nor
    /// `source_dir` is set, or [`CacheError::InvalidDelimiter`] for a
    /// non-ASCII delimiter.
    pub fn build(self) -> Result<CatalogCache> {
        let config = self.config;
        let fetcher: Arc<dyn SourceFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => {
                let dir = config
                    .source_dir
                    .clone()
                    .ok_or(CacheError::NoSourceConfigured)?;
                Arc::new(DirectoryFetcher::new(dir))
            }
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let session = self.session.unwrap_or_else(|| match &config.session_file {
            Some(path) => SessionStore::File(path.clone()),
            None => SessionStore::Memory,
        });

        let breaker = CircuitBreaker::new(
            session,
            config.failure_threshold,
            config.cooldown_ms(),
            Arc::clone(&clock),
        );
        let loader = SourceLoader::new(fetcher)
            .with_extension(config.file_extension.clone())
            .with_delimiter(config.delimiter_byte()?);

        Ok(CatalogCache {
            validator: CacheValidator::new(ValidationPolicy::from(&config)),
            fallback: BlobStore::new(config.fallback_path()),
            config,
            clock,
            breaker,
            loader,
            structured: None,
            progress: ProgressHub::new(),
            index: IndexCell::new(),
            origin: None,
        })
    }
}

/// Owns every piece of cache state for one host process.
pub struct CatalogCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    breaker: CircuitBreaker,
    validator: CacheValidator,
    loader: SourceLoader,
    structured: Option<StructuredStore>,
    fallback: BlobStore,
    progress: ProgressHub,
    index: IndexCell,
    origin: Option<DataOrigin>,
}

impl CatalogCache {
    pub fn builder(config: CacheConfig) -> CatalogCacheBuilder {
        CatalogCacheBuilder::new(config)
    }

    /// Makes data resident, from cache or from the source.
    ///
    /// Never fails: when nothing can be loaded the context becomes ready
    /// with an empty dataset and the failure is logged.
    pub fn initialize(&mut self) -> DataOrigin {
        self.publish(Phase::Starting, 0, "initializing");
        let (dataset, origin) = self.resolve(false);
        self.install(dataset, origin);
        origin
    }

    /// Re-fetches from the source and replaces the stored generation.
    ///
    /// Returns `true` when fresh data was loaded. On failure the previous
    /// cached data (if any) is served.
    pub fn refresh(&mut self) -> bool {
        self.publish(Phase::Starting, 0, "refreshing");
        let (dataset, origin) = self.resolve(true);
        self.install(dataset, origin);
        origin == DataOrigin::FreshLoad
    }

    pub fn is_ready(&self) -> bool {
        self.index.is_built()
    }

    /// Origin of the resident dataset.
    pub fn origin(&self) -> Option<DataOrigin> {
        self.origin
    }

    pub fn index(&self) -> Option<&CatalogIndex> {
        self.index.get()
    }

    /// Rows of a table; empty before initialization.
    pub fn table(&self, name: &str) -> &[Record] {
        self.index.get().map(|i| i.table(name)).unwrap_or(&[])
    }

    pub fn component(&self, id: &str) -> Option<&Record> {
        self.index.get()?.component(id)
    }

    pub fn compositions_for_revision<'a>(
        &'a self,
        revision: &'a str,
    ) -> impl Iterator<Item = &'a Record> + 'a {
        self.index
            .get()
            .into_iter()
            .flat_map(move |i| i.compositions_for_revision(revision))
    }

    /// Registers an observer for progress and readiness events.
    pub fn subscribe(&self) -> Subscription {
        self.progress.subscribe()
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        self.progress.unsubscribe(id)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Describes the persisted generation of whichever store is active.
    pub fn cache_info(&mut self) -> CacheInfo {
        let now = self.clock.now_ms();
        let source = self.origin;

        if self.ensure_structured() {
            if let Some(store) = self.structured.as_mut() {
                let meta = store.read_metadata().unwrap_or_else(|e| {
                    warn!(error = %e, "Could not read cache metadata");
                    None
                });
                return CacheInfo {
                    exists: meta.is_some(),
                    age_ms: meta.map(|m| m.age_ms(now)),
                    is_valid: self.validator.is_usable(store, now),
                    store: StoreKind::Structured,
                    source,
                };
            }
        }

        let written_at = self.fallback.timestamp().unwrap_or_else(|e| {
            warn!(error = %e, "Could not read fallback timestamp");
            None
        });
        let age_ms = written_at.map(|ts| (now - ts).max(0));
        CacheInfo {
            exists: written_at.is_some(),
            age_ms,
            is_valid: age_ms.is_some_and(|age| age < self.config.freshness_ms()),
            store: StoreKind::Blob,
            source,
        }
    }

    /// Drops the catalog partitions and the fallback blob. Resident data
    /// and consumer tables are untouched.
    pub fn clear_cache(&mut self) -> Result<()> {
        if self.ensure_structured() {
            if let Some(store) = self.structured.as_mut() {
                store.clear_catalog()?;
            }
        }
        self.fallback.remove()?;
        info!("Cache cleared");
        Ok(())
    }

    /// Re-enables structured storage and drops the open connection, so the
    /// next operation reopens it from scratch.
    pub fn reset_storage(&mut self) {
        self.breaker.reset();
        if self.structured.take().is_some() {
            debug!("Structured store connection closed");
        }
    }

    fn resolve(&mut self, force_refresh: bool) -> (Dataset, DataOrigin) {
        let now = self.clock.now_ms();
        self.publish(Phase::Validating, 5, "checking cache");

        if self.ensure_structured() {
            self.reconcile_stores(now);
            if !force_refresh {
                if let Some(dataset) = self.load_valid_structured(now) {
                    return (dataset, DataOrigin::StructuredCache);
                }
            }
        } else if !force_refresh {
            if let Some(dataset) = self.load_fresh_fallback(now) {
                return (dataset, DataOrigin::FallbackCache);
            }
        }

        if let Some((dataset, digest)) = self.load_from_source() {
            self.persist(&dataset, digest, now);
            return (dataset, DataOrigin::FreshLoad);
        }

        if let Some(dataset) = self.load_stale() {
            warn!(rows = dataset.total_rows(), "Serving stale cached data");
            return (dataset, DataOrigin::StaleCache);
        }

        error!("No catalog data available from source or cache");
        (Dataset::new(), DataOrigin::Empty)
    }

    /// Opens the structured store if the breaker allows it. Returns `true`
    /// when a usable connection is held afterwards.
    ///
    /// The breaker is asked even when a connection is already open; a
    /// refusal closes it.
    fn ensure_structured(&mut self) -> bool {
        if !self.breaker.should_attempt() {
            if self.structured.take().is_some() {
                debug!("Structured store connection closed");
            }
            debug!(
                disabled = self.breaker.is_disabled_this_session(),
                "Structured storage not attempted"
            );
            return false;
        }
        if self.structured.is_some() {
            return true;
        }

        match self.open_structured() {
            Ok(store) => {
                debug!(path = %self.config.database_path().display(), "Structured store opened");
                self.structured = Some(store);
                true
            }
            Err(e) => {
                self.breaker.record_failure(e.to_string());
                false
            }
        }
    }

    /// Counts a failure of the open connection, closing it once the breaker
    /// disables the store for the session.
    fn record_structured_failure(&mut self, reason: String) {
        self.breaker.record_failure(reason);
        if self.breaker.is_disabled_this_session() && self.structured.take().is_some() {
            info!("Structured store closed for the rest of the session");
        }
    }

    fn open_structured(&self) -> Result<StructuredStore> {
        std::fs::create_dir_all(&self.config.cache_dir)?;
        let mut store = StructuredStore::open(
            self.config.database_path(),
            self.config.table_prefix.clone(),
            self.config.busy_timeout(),
        )?;
        store.probe()?;
        Ok(store)
    }

    /// Keeps only the newer of the structured generation and the fallback
    /// blob.
    fn reconcile_stores(&mut self, now: i64) {
        let fallback_ts = self.fallback.timestamp().unwrap_or_else(|e| {
            warn!(error = %e, "Could not read fallback timestamp");
            None
        });
        let Some(fallback_ts) = fallback_ts else {
            return;
        };
        let Some(store) = self.structured.as_mut() else {
            return;
        };
        let structured_ts = store.written_at().unwrap_or_else(|e| {
            warn!(error = %e, "Could not read structured timestamp");
            None
        });

        if reconcile(structured_ts, Some(fallback_ts)) != Some(StoreKind::Blob) {
            info!("Structured generation is current, discarding fallback blob");
            if let Err(e) = self.fallback.remove() {
                warn!(error = %e, "Could not remove fallback blob");
            }
            return;
        }

        if now - fallback_ts >= self.config.freshness_ms() {
            debug!("Fallback blob is newer but expired, not migrating");
            return;
        }
        let snapshot = match self.fallback.load_snapshot() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Could not read fallback blob");
                return;
            }
        };

        let started_at = self.clock.now_ms();
        match store.write_generation(
            &snapshot.dataset,
            started_at,
            snapshot.written_at_ms,
            None,
            |_| {},
        ) {
            Ok(_) => {
                info!(
                    rows = snapshot.dataset.total_rows(),
                    "Migrated fallback blob into structured store"
                );
                self.breaker.record_success();
                if let Err(e) = self.fallback.remove() {
                    warn!(error = %e, "Could not remove migrated fallback blob");
                }
            }
            Err(e) => {
                let err = CacheError::from(e);
                warn!(error = %err, "Fallback migration failed, keeping blob");
                self.record_structured_failure(err.to_string());
            }
        }
    }

    fn load_valid_structured(&mut self, now: i64) -> Option<Dataset> {
        let store = self.structured.as_mut()?;
        let verdict = match self.validator.check(store, now) {
            Ok(verdict) => verdict,
            Err(e) => {
                self.record_structured_failure(e.to_string());
                return None;
            }
        };
        if let Some(err) = verdict.to_error() {
            info!(error = %err, "Structured cache not usable, refreshing");
            return None;
        }

        self.publish(Phase::Loading, 50, "reading structured cache");
        let store = self.structured.as_ref()?;
        match store.read_dataset() {
            Ok(Some((dataset, meta))) => {
                info!(
                    rows = dataset.total_rows(),
                    written_at_ms = meta.written_at_ms,
                    "Loaded catalog from structured cache"
                );
                self.breaker.record_success();
                Some(dataset)
            }
            Ok(None) => None,
            Err(e) => {
                let err = CacheError::from(e);
                warn!(error = %err, "Reading structured cache failed, refreshing");
                self.record_structured_failure(err.to_string());
                None
            }
        }
    }

    fn load_fresh_fallback(&self, now: i64) -> Option<Dataset> {
        match self.fallback.load_snapshot() {
            Ok(Some(snapshot)) if now - snapshot.written_at_ms < self.config.freshness_ms() => {
                info!(
                    rows = snapshot.dataset.total_rows(),
                    "Loaded catalog from fallback blob"
                );
                Some(snapshot.dataset)
            }
            Ok(Some(_)) => {
                info!("Fallback blob expired, refreshing");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %CacheError::from(e), "Could not read fallback blob");
                None
            }
        }
    }

    /// Fetches every configured table. `None` when no part could be
    /// fetched at all.
    fn load_from_source(&self) -> Option<(Dataset, String)> {
        self.publish(Phase::Fetching, 10, "fetching source files");
        let tables = self.config.table_names();
        let tables: Vec<&str> = tables.iter().map(String::as_str).collect();

        let outcome = self.loader.load_with_progress(&tables, |part| {
            let percent = 10 + part.completed * 50 / part.total.max(1);
            self.publish(Phase::Fetching, percent as u8, part.file.clone());
        });
        let report = outcome.report;

        if report.is_total_failure() {
            let err = CacheError::NetworkFetchFailure("no source file could be fetched".into());
            error!(error = %err, "Source load failed");
            return None;
        }
        for file in &report.failed_parts {
            let err = CacheError::NetworkFetchFailure(file.clone());
            warn!(error = %err, "Loaded with missing part");
        }
        if report.skipped_rows > 0 {
            let err = CacheError::ParseFailure(format!("{} malformed rows", report.skipped_rows));
            warn!(error = %err, "Loaded with skipped rows");
        }
        Some((outcome.dataset, report.source_digest))
    }

    /// Persists a freshly loaded dataset through the structured store, or
    /// the fallback blob when that is unavailable.
    fn persist(&mut self, dataset: &Dataset, digest: String, now: i64) {
        let fallback_ts = self.fallback.timestamp().ok().flatten();

        if self.ensure_structured() {
            if let Some(written_at) = self.write_structured(dataset, digest, now, fallback_ts) {
                if let Err(e) = self.fallback.remove() {
                    warn!(error = %e, "Could not remove superseded fallback blob");
                }
                self.revalidate(written_at);
                return;
            }
            // A failed write drops the connection; a live one means another
            // writer holds the marker.
            if self.structured.is_some() {
                return;
            }
        }

        let written_at = next_generation_ts(now, fallback_ts);
        self.publish(Phase::Writing, 75, "writing fallback blob");
        if let Err(e) = self.fallback.save_snapshot(dataset, written_at) {
            error!(error = %CacheError::from(e), "Could not persist catalog, data is memory-only");
        }
    }

    /// Writes a generation to the structured store. Returns its timestamp,
    /// or `None` if nothing was written.
    fn write_structured(
        &mut self,
        dataset: &Dataset,
        digest: String,
        now: i64,
        fallback_ts: Option<i64>,
    ) -> Option<i64> {
        let store = self.structured.as_mut()?;
        let started_at = self.clock.now_ms();

        match store.read_marker() {
            Ok(Some(marker)) if !marker.is_stale(started_at, self.config.stale_marker_ms()) => {
                info!(
                    started_at_ms = marker.started_at_ms,
                    "Another writer is replacing the cache, keeping data in memory"
                );
                return None;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not read write marker"),
        }

        let previous = store.read_metadata().ok().flatten().map(|m| m.written_at_ms);
        let written_at = next_generation_ts(now, previous.max(fallback_ts));

        let progress = &self.progress;
        let total = dataset.table_names().count().max(1);
        let mut done = 0;
        let result = store.write_generation(dataset, started_at, written_at, Some(digest), |table| {
            done += 1;
            let percent = 60 + done * 30 / total;
            progress.publish(ProgressEvent::new(
                Phase::Writing,
                percent as u8,
                table.table.clone(),
            ));
        });

        match result {
            Ok(report) => {
                for table in report.tables.iter().filter(|t| !t.is_complete()) {
                    let err = CacheError::WriteIncomplete {
                        table: table.table.clone(),
                        submitted: table.submitted,
                        acknowledged: table.acknowledged,
                    };
                    warn!(error = %err, "Generation flagged incomplete");
                }
                self.breaker.record_success();
                Some(written_at)
            }
            Err(e) => {
                let err = CacheError::from(e);
                warn!(error = %err, "Structured write failed, falling back to blob store");
                self.breaker.record_failure(err.to_string());
                self.structured = None;
                None
            }
        }
    }

    fn revalidate(&mut self, now: i64) {
        let Some(store) = self.structured.as_mut() else {
            return;
        };
        match self.validator.check(store, now) {
            Ok(verdict) if verdict.is_usable() => debug!("Fresh generation validated"),
            Ok(verdict) => info!(verdict = %verdict, "Fresh generation will be refreshed next start"),
            Err(e) => warn!(error = %e, "Could not validate fresh generation"),
        }
    }

    /// Any cached generation, regardless of age or completeness.
    fn load_stale(&self) -> Option<Dataset> {
        if let Some(store) = self.structured.as_ref() {
            match store.read_dataset() {
                Ok(Some((dataset, _))) if !dataset.is_empty() => return Some(dataset),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Could not read stale structured cache"),
            }
        }
        match self.fallback.load_snapshot() {
            Ok(Some(snapshot)) if !snapshot.dataset.is_empty() => Some(snapshot.dataset),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Could not read stale fallback blob");
                None
            }
        }
    }

    /// Replaces the resident generation and signals readiness.
    fn install(&mut self, dataset: Dataset, origin: DataOrigin) {
        self.publish(Phase::Indexing, 95, "building index");
        self.index = IndexCell::new();
        let index = self.index.build_once(dataset);
        let rows = index.dataset().total_rows();
        self.origin = Some(origin);

        if origin == DataOrigin::Empty {
            self.publish(Phase::Failed, 100, "no catalog data available");
        }
        info!(origin = %origin, rows, "Catalog ready");
        self.publish(Phase::Ready, 100, origin.to_string());
    }

    fn publish(&self, phase: Phase, percent: u8, message: impl Into<String>) {
        self.progress
            .publish(ProgressEvent::new(phase, percent, message));
    }
}

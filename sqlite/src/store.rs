//! Partitioned persistence of catalog generations.
//!
//! [`StructuredStore`] keeps one SQLite table per entity plus the generation
//! metadata and write marker. A generation is replaced with the following
//! protocol, so a reader never mistakes a half-written generation for a
//! complete one:
//!
//! 1. In one transaction: set the write marker and delete the metadata row.
//! 2. For each table: clear the partition once, then insert in batches.
//! 3. Write the metadata row.
//! 4. Clear the marker.
//!
//! # Example
//!
//! ```
//! use catalog_cache_core::{Dataset, Record, Value};
//! use catalog_cache_sqlite::StructuredStore;
//!
//! let mut store = StructuredStore::open_in_memory("catalog_").unwrap();
//! let mut dataset = Dataset::new();
//! dataset.set_table("items", vec![Record::new().with("id", Value::Int(1))]);
//!
//! let report = store.write_generation(&dataset, 900, 1_000, None, |_| {}).unwrap();
//! assert!(report.is_complete());
//! assert_eq!(store.read_metadata().unwrap().unwrap().written_at_ms, 1_000);
//! assert_eq!(store.read_table("items").unwrap().len(), 1);
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use catalog_cache_core::table::{CATALOG_TABLES, key_strategy_for};
use catalog_cache_core::{
    CacheMetadata, Clock, Dataset, DatasetStore, KeyStrategy, Record, Snapshot, StoreKind,
    StoreResult, SystemClock, WriteMarker,
};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::error::{Result, SqliteError};
use crate::schema::{
    generate_control_sql, generate_drop_sql, generate_partition_sql, partition_name,
    validate_prefix,
};

/// Chooses the batch size for a table of `rows` rows.
///
/// Larger tables get smaller batches so that no single transaction grows
/// unbounded in duration or memory.
pub fn batch_size_for(rows: usize) -> usize {
    match rows {
        n if n > 250_000 => 1_000,
        n if n > 50_000 => 2_500,
        n if n > 5_000 => 5_000,
        _ => 10_000,
    }
}

/// Outcome of writing one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableWriteReport {
    pub table: String,
    pub submitted: usize,
    pub acknowledged: usize,
    /// Rows in the partition after the write. Fewer than `acknowledged`
    /// when rows shared a key.
    pub distinct_keys: usize,
    pub batches: usize,
    pub failed_batches: usize,
}

impl TableWriteReport {
    /// `true` when every submitted row was acknowledged.
    pub fn is_complete(&self) -> bool {
        self.acknowledged == self.submitted
    }
}

/// Outcome of writing a whole generation.
#[derive(Debug, Clone, Default)]
pub struct GenerationReport {
    pub tables: Vec<TableWriteReport>,
    pub metadata: Option<CacheMetadata>,
}

impl GenerationReport {
    pub fn is_complete(&self) -> bool {
        self.tables.iter().all(TableWriteReport::is_complete)
    }

    pub fn rows_written(&self) -> usize {
        self.tables.iter().map(|t| t.acknowledged).sum()
    }
}

/// SQLite store with one partition per entity type.
pub struct StructuredStore {
    conn: Connection,
    prefix: String,
}

impl StructuredStore {
    /// Wraps an existing connection and creates the control tables.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidPrefix`] if the prefix contains invalid
    /// characters, or [`SqliteError::DatabaseError`] if the control tables
    /// cannot be created.
    pub fn new(conn: Connection, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        let store = Self { conn, prefix };
        store.conn.execute_batch(&generate_control_sql(&store.prefix)?)?;
        Ok(store)
    }

    /// Opens (or creates) a database file.
    ///
    /// `busy_timeout` bounds how long any statement waits on a lock held by
    /// another connection before failing with a busy error.
    pub fn open(
        path: impl AsRef<Path>,
        prefix: impl Into<String>,
        busy_timeout: Duration,
    ) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::new(conn, prefix)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory(prefix: impl Into<String>) -> Result<Self> {
        Self::new(Connection::open_in_memory()?, prefix)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consumes the store and returns the underlying connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Checks whether a table with the exact name exists.
    fn table_exists(&self, full_name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [full_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// `true` when the metadata partition exists.
    pub fn has_metadata_partition(&self) -> Result<bool> {
        self.table_exists(&format!("{}meta", self.prefix))
    }

    /// `true` when the partition for `table` exists.
    pub fn has_partition(&self, table: &str) -> Result<bool> {
        self.table_exists(&partition_name(&self.prefix, table)?)
    }

    /// Counts rows in a partition; a missing partition counts as empty.
    pub fn count_rows(&self, table: &str) -> Result<usize> {
        if !self.has_partition(table)? {
            return Ok(0);
        }
        let partition = partition_name(&self.prefix, table)?;
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {partition}"), [], |row| {
                    row.get(0)
                })?;
        Ok(count as usize)
    }

    /// Replaces the contents of one partition.
    ///
    /// The partition is cleared once, then rows are inserted in batches of
    /// [`batch_size_for`] rows, one transaction per batch. A failed batch is
    /// logged and skipped; the returned report then acknowledges fewer rows
    /// than were submitted.
    ///
    /// # Errors
    ///
    /// Fails if the partition cannot be created or cleared, or if every
    /// batch failed.
    pub fn write_table(
        &mut self,
        table: &str,
        records: &[Record],
        key: KeyStrategy,
    ) -> Result<TableWriteReport> {
        let partition = partition_name(&self.prefix, table)?;
        self.conn
            .execute_batch(&generate_partition_sql(&self.prefix, table)?)?;
        self.conn.execute(&format!("DELETE FROM {partition}"), [])?;

        let batch_size = batch_size_for(records.len());
        let mut report = TableWriteReport {
            table: table.to_string(),
            submitted: records.len(),
            acknowledged: 0,
            distinct_keys: 0,
            batches: 0,
            failed_batches: 0,
        };
        let mut last_error = None;

        for chunk in records.chunks(batch_size) {
            report.batches += 1;
            match self.insert_batch(&partition, chunk, key) {
                Ok(n) => report.acknowledged += n,
                Err(e) => {
                    warn!(table, batch = report.batches, error = %e, "Batch write failed");
                    report.failed_batches += 1;
                    last_error = Some(e);
                }
            }
        }

        if report.batches > 0 && report.failed_batches == report.batches {
            let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
            return Err(SqliteError::WriteFailed {
                table: table.to_string(),
                reason,
            });
        }

        report.distinct_keys = self.count_rows(table)?;
        if report.distinct_keys < report.acknowledged {
            warn!(
                table,
                acknowledged = report.acknowledged,
                distinct_keys = report.distinct_keys,
                "Rows with duplicate keys were collapsed"
            );
        }

        if !report.is_complete() {
            warn!(
                table,
                submitted = report.submitted,
                acknowledged = report.acknowledged,
                "Write incomplete"
            );
        } else {
            debug!(table, rows = report.acknowledged, batches = report.batches, "Table written");
        }

        Ok(report)
    }

    fn insert_batch(&mut self, partition: &str, chunk: &[Record], key: KeyStrategy) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut acknowledged = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO {partition} (key, data) VALUES (?1, ?2)"
            ))?;
            for record in chunk {
                let data = serde_json::to_string(record)?;
                acknowledged += stmt.execute(params![key.key_for(record), data])?;
            }
        }
        tx.commit()?;
        Ok(acknowledged)
    }

    /// Reads every record of a partition. A missing partition reads empty.
    pub fn read_table(&self, table: &str) -> Result<Vec<Record>> {
        if !self.has_partition(table)? {
            return Ok(Vec::new());
        }
        let partition = partition_name(&self.prefix, table)?;
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT data FROM {partition} ORDER BY rowid"))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for data in rows {
            records.push(serde_json::from_str(&data?)?);
        }
        Ok(records)
    }

    pub fn write_metadata(&mut self, meta: &CacheMetadata) -> Result<()> {
        let data = serde_json::to_string(meta)?;
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {}meta (id, data) VALUES (1, ?1)",
                self.prefix
            ),
            [data],
        )?;
        Ok(())
    }

    /// Reads the metadata row, or `None` when there is none (or the
    /// metadata partition itself is missing).
    pub fn read_metadata(&self) -> Result<Option<CacheMetadata>> {
        if !self.has_metadata_partition()? {
            return Ok(None);
        }
        let data: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT data FROM {}meta WHERE id = 1", self.prefix),
                [],
                |row| row.get(0),
            )
            .optional()?;
        data.map(|d| serde_json::from_str(&d).map_err(SqliteError::from))
            .transpose()
    }

    /// Reads the write marker, if set.
    pub fn read_marker(&self) -> Result<Option<WriteMarker>> {
        if !self.table_exists(&format!("{}marker", self.prefix))? {
            return Ok(None);
        }
        let marker = self
            .conn
            .query_row(
                &format!(
                    "SELECT write_in_progress, started_at_ms FROM {}marker WHERE id = 1",
                    self.prefix
                ),
                [],
                |row| {
                    Ok(WriteMarker {
                        write_in_progress: row.get::<_, i64>(0)? != 0,
                        started_at_ms: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(marker.filter(|m| m.write_in_progress))
    }

    /// Sets the write marker without touching the metadata row.
    pub fn set_marker(&mut self, marker: &WriteMarker) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {}marker (id, write_in_progress, started_at_ms) VALUES (1, ?1, ?2)",
                self.prefix
            ),
            params![marker.write_in_progress as i64, marker.started_at_ms],
        )?;
        Ok(())
    }

    /// Sets the write marker and removes the current metadata in one
    /// transaction, invalidating the generation being replaced.
    pub fn begin_write(&mut self, started_at_ms: i64) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO {}marker (id, write_in_progress, started_at_ms) VALUES (1, 1, ?1)",
                self.prefix
            ),
            [started_at_ms],
        )?;
        tx.execute(&format!("DELETE FROM {}meta", self.prefix), [])?;
        tx.commit()?;
        Ok(())
    }

    /// Clears the write marker.
    pub fn end_write(&mut self) -> Result<()> {
        self.conn
            .execute(&format!("DELETE FROM {}marker", self.prefix), [])?;
        Ok(())
    }

    /// Replaces the stored generation with `dataset`.
    ///
    /// `started_at_ms` is recorded in the write marker and must be the
    /// current time, so other connections can tell a live write from an
    /// abandoned one. `written_at_ms` stamps the generation itself.
    ///
    /// Tables are written in dataset order; `on_table` is called after each.
    /// The metadata row is written last and is flagged `incomplete` when any
    /// table acknowledged fewer rows than submitted.
    ///
    /// # Errors
    ///
    /// Any error leaves the marker set and no metadata row, so the partial
    /// generation is never reported as usable.
    pub fn write_generation(
        &mut self,
        dataset: &Dataset,
        started_at_ms: i64,
        written_at_ms: i64,
        source_digest: Option<String>,
        mut on_table: impl FnMut(&TableWriteReport),
    ) -> Result<GenerationReport> {
        self.begin_write(started_at_ms)?;

        let mut report = GenerationReport::default();
        for name in dataset.table_names() {
            let table_report =
                self.write_table(name, dataset.table(name), key_strategy_for(name))?;
            on_table(&table_report);
            report.tables.push(table_report);
        }

        let mut meta = CacheMetadata::new(written_at_ms);
        meta.incomplete = !report.is_complete();
        meta.source_digest = source_digest;
        meta.row_counts = report
            .tables
            .iter()
            .map(|t| (t.table.clone(), t.acknowledged))
            .collect::<BTreeMap<_, _>>();

        self.write_metadata(&meta)?;
        self.end_write()?;

        info!(
            rows = report.rows_written(),
            tables = report.tables.len(),
            complete = report.is_complete(),
            "Generation written"
        );
        report.metadata = Some(meta);
        Ok(report)
    }

    /// Reads every table listed in the metadata row count map.
    pub fn read_dataset(&self) -> Result<Option<(Dataset, CacheMetadata)>> {
        let Some(meta) = self.read_metadata()? else {
            return Ok(None);
        };
        let mut dataset = Dataset::new();
        for table in meta.row_counts.keys() {
            dataset.set_table(table.clone(), self.read_table(table)?);
        }
        Ok(Some((dataset, meta)))
    }

    /// Drops every catalog partition plus metadata and marker.
    ///
    /// Tables recorded in the current metadata are dropped too. Tables
    /// outside the prefix are never touched.
    pub fn clear_catalog(&mut self) -> Result<()> {
        let mut tables: Vec<String> = CATALOG_TABLES.iter().map(|t| t.name.to_string()).collect();
        if let Ok(Some(meta)) = self.read_metadata() {
            tables.extend(meta.row_counts.into_keys());
        }
        tables.sort();
        tables.dedup();

        let sql = generate_drop_sql(&self.prefix, tables.iter().map(String::as_str))?;
        let tx = self.conn.transaction()?;
        tx.execute_batch(&sql)?;
        tx.execute_batch(&generate_control_sql(&self.prefix)?)?;
        tx.commit()?;
        info!(prefix = %self.prefix, "Catalog partitions cleared");
        Ok(())
    }
}

impl DatasetStore for StructuredStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Structured
    }

    /// Succeeds when the database answers and a write lock can be taken.
    fn probe(&mut self) -> StoreResult<()> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE; ROLLBACK;")
            .map_err(SqliteError::from)?;
        Ok(())
    }

    fn written_at(&mut self) -> StoreResult<Option<i64>> {
        Ok(self.read_metadata()?.map(|m| m.written_at_ms))
    }

    fn load(&mut self) -> StoreResult<Option<Snapshot>> {
        Ok(self.read_dataset()?.map(|(dataset, meta)| Snapshot {
            dataset,
            written_at_ms: meta.written_at_ms,
            kind: StoreKind::Structured,
        }))
    }

    fn save(&mut self, dataset: &Dataset, written_at_ms: i64) -> StoreResult<()> {
        self.write_generation(dataset, SystemClock.now_ms(), written_at_ms, None, |_| {})?;
        Ok(())
    }

    fn clear(&mut self) -> StoreResult<()> {
        self.clear_catalog()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_cache_core::Value;
    use catalog_cache_core::table::{COMPOSITIONS, ITEMS};

    fn store() -> StructuredStore {
        StructuredStore::open_in_memory("t_").unwrap()
    }

    fn items(n: i64) -> Vec<Record> {
        (0..n)
            .map(|i| {
                Record::new()
                    .with("id", Value::Int(i))
                    .with("name", Value::Text(format!("Item {i}")))
            })
            .collect()
    }

    #[test]
    fn test_batch_size_inverse_to_table_size() {
        assert_eq!(batch_size_for(100), 10_000);
        assert_eq!(batch_size_for(10_000), 5_000);
        assert_eq!(batch_size_for(100_000), 2_500);
        assert_eq!(batch_size_for(1_000_000), 1_000);
        assert!(batch_size_for(1_000_000) < batch_size_for(100));
    }

    #[test]
    fn test_new_rejects_bad_prefix() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(StructuredStore::new(conn, "bad prefix").is_err());
    }

    #[test]
    fn test_write_and_read_table() {
        let mut store = store();
        let rows = items(3);
        let report = store.write_table("items", &rows, ITEMS.key).unwrap();
        assert_eq!(report.submitted, 3);
        assert_eq!(report.acknowledged, 3);
        assert_eq!(report.distinct_keys, 3);
        assert_eq!(report.batches, 1);
        assert_eq!(store.read_table("items").unwrap(), rows);
        assert_eq!(store.count_rows("items").unwrap(), 3);
    }

    #[test]
    fn test_write_table_replaces_previous_contents() {
        let mut store = store();
        store.write_table("items", &items(5), ITEMS.key).unwrap();
        store.write_table("items", &items(2), ITEMS.key).unwrap();
        assert_eq!(store.count_rows("items").unwrap(), 2);
    }

    #[test]
    fn test_large_table_written_in_several_batches() {
        let mut store = store();
        let rows = items(12_000);
        let report = store.write_table("items", &rows, ITEMS.key).unwrap();
        assert_eq!(report.batches, 3);
        assert!(report.is_complete());
        assert_eq!(store.count_rows("items").unwrap(), 12_000);
    }

    #[test]
    fn test_empty_table_creates_partition() {
        let mut store = store();
        let report = store.write_table("variants", &[], ITEMS.key).unwrap();
        assert_eq!(report.batches, 0);
        assert!(store.has_partition("variants").unwrap());
        assert!(store.read_table("variants").unwrap().is_empty());
    }

    #[test]
    fn test_composite_keys_used_for_join_tables() {
        let mut store = store();
        let row = Record::new()
            .with("item_id", "10030-1".into())
            .with("version", Value::Int(1))
            .with("component_id", "3001".into())
            .with("variant_id", Value::Int(4))
            .with("is_spare", Value::Bool(false));
        store
            .write_table("compositions", std::slice::from_ref(&row), COMPOSITIONS.key)
            .unwrap();
        let key: String = store
            .connection()
            .query_row("SELECT key FROM t_compositions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(key, "10030-1|1|3001|4|false");
    }

    #[test]
    fn test_duplicate_keys_collapse_but_are_counted() {
        let mut store = store();
        let rows = vec![
            Record::new().with("id", Value::Int(1)).with("name", "first".into()),
            Record::new().with("id", Value::Int(1)).with("name", "second".into()),
            Record::new().with("name", "no id".into()),
            Record::new().with("name", "also no id".into()),
        ];
        let report = store.write_table("items", &rows, ITEMS.key).unwrap();
        assert_eq!(report.acknowledged, 4);
        assert!(report.is_complete());
        assert_eq!(report.distinct_keys, 2);
        assert_eq!(store.count_rows("items").unwrap(), 2);
    }

    #[test]
    fn test_missing_partition_reads_empty() {
        let store = store();
        assert!(store.read_table("items").unwrap().is_empty());
        assert_eq!(store.count_rows("items").unwrap(), 0);
    }

    #[test]
    fn test_metadata_roundtrip() {
        let mut store = store();
        assert!(store.read_metadata().unwrap().is_none());
        let meta = CacheMetadata::new(42);
        store.write_metadata(&meta).unwrap();
        assert_eq!(store.read_metadata().unwrap(), Some(meta));
    }

    #[test]
    fn test_begin_write_sets_marker_and_drops_metadata() {
        let mut store = store();
        store.write_metadata(&CacheMetadata::new(1)).unwrap();
        store.begin_write(500).unwrap();
        assert!(store.read_metadata().unwrap().is_none());
        let marker = store.read_marker().unwrap().unwrap();
        assert_eq!(marker.started_at_ms, 500);
        store.end_write().unwrap();
        assert!(store.read_marker().unwrap().is_none());
    }

    #[test]
    fn test_write_generation_writes_metadata_last() {
        let mut store = store();
        let mut dataset = Dataset::new();
        dataset.set_table("items", items(4));
        dataset.set_table("variants", Vec::new());

        let mut seen = Vec::new();
        let report = store
            .write_generation(&dataset, 5, 10, Some("abc".into()), |t| seen.push(t.table.clone()))
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(seen, vec!["items", "variants"]);
        let meta = store.read_metadata().unwrap().unwrap();
        assert_eq!(meta.written_at_ms, 10);
        assert!(!meta.incomplete);
        assert_eq!(meta.source_digest.as_deref(), Some("abc"));
        assert_eq!(meta.row_counts.get("items"), Some(&4));
        assert!(store.read_marker().unwrap().is_none());
    }

    #[test]
    fn test_read_dataset_returns_generation_tables() {
        let mut store = store();
        let mut dataset = Dataset::new();
        dataset.set_table("items", items(2));
        store.write_generation(&dataset, 7, 7, None, |_| {}).unwrap();
        let (loaded, meta) = store.read_dataset().unwrap().unwrap();
        assert_eq!(loaded, dataset);
        assert_eq!(meta.written_at_ms, 7);
    }

    #[test]
    fn test_clear_catalog_keeps_foreign_tables() {
        let mut store = store();
        store
            .connection()
            .execute_batch("CREATE TABLE owned_items (id TEXT); INSERT INTO owned_items VALUES ('x');")
            .unwrap();
        let mut dataset = Dataset::new();
        dataset.set_table("items", items(2));
        dataset.set_table("parts", items(1));
        store.write_generation(&dataset, 7, 7, None, |_| {}).unwrap();

        store.clear_catalog().unwrap();
        assert!(!store.has_partition("items").unwrap());
        assert!(!store.has_partition("parts").unwrap());
        assert!(store.read_metadata().unwrap().is_none());
        let owned: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM owned_items", [], |r| r.get(0))
            .unwrap();
        assert_eq!(owned, 1);
    }

    #[test]
    fn test_dataset_store_contract() {
        let mut store = store();
        assert_eq!(store.kind(), StoreKind::Structured);
        store.probe().unwrap();
        assert_eq!(store.written_at().unwrap(), None);
        assert!(DatasetStore::load(&mut store).unwrap().is_none());

        let mut dataset = Dataset::new();
        dataset.set_table("items", items(1));
        store.save(&dataset, 99).unwrap();
        assert_eq!(store.written_at().unwrap(), Some(99));
        let snapshot = DatasetStore::load(&mut store).unwrap().unwrap();
        assert_eq!(snapshot.dataset, dataset);
        assert_eq!(snapshot.kind, StoreKind::Structured);

        store.clear().unwrap();
        assert_eq!(store.written_at().unwrap(), None);
    }
}

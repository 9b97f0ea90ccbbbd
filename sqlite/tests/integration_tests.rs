//! Integration tests for the catalog-cache-sqlite crate.

use std::time::Duration;

use catalog_cache_core::table::{COMPOSITIONS, ITEMS, VARIANTS};
use catalog_cache_core::{Dataset, Record, Value};
use catalog_cache_sqlite::StructuredStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn sample_dataset() -> Dataset {
    let mut dataset = Dataset::new();
    dataset.set_table(
        ITEMS.name,
        vec![
            Record::new()
                .with("id", "10030-1".into())
                .with("name", "Star Destroyer".into())
                .with("year", Value::Int(2002)),
            Record::new()
                .with("id", "6020-1".into())
                .with("name", "Magic Shop".into())
                .with("year", Value::Int(1993)),
        ],
    );
    dataset.set_table(
        VARIANTS.name,
        vec![Record::new()
            .with("id", Value::Int(47))
            .with("name", "Trans-Clear".into())
            .with("is_trans", Value::Bool(true))],
    );
    dataset.set_table(
        COMPOSITIONS.name,
        vec![
            Record::new()
                .with("item_id", "10030-1".into())
                .with("version", Value::Int(1))
                .with("component_id", "3001".into())
                .with("variant_id", Value::Int(47))
                .with("quantity", Value::Int(12))
                .with("is_spare", Value::Bool(false)),
            Record::new()
                .with("item_id", "10030-1".into())
                .with("version", Value::Int(1))
                .with("component_id", "3001".into())
                .with("variant_id", Value::Int(47))
                .with("quantity", Value::Int(1))
                .with("is_spare", Value::Bool(true)),
        ],
    );
    dataset
}

fn sorted(mut rows: Vec<Record>) -> Vec<String> {
    let mut out: Vec<String> = rows
        .drain(..)
        .map(|r| serde_json::to_string(&r).unwrap())
        .collect();
    out.sort();
    out
}

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

#[test]
fn test_every_table_reads_back_as_written() {
    let mut store = StructuredStore::open_in_memory("catalog_").unwrap();
    let dataset = sample_dataset();
    store.write_generation(&dataset, 1_000, 1_000, None, |_| {}).unwrap();

    for name in dataset.table_names() {
        let read = store.read_table(name).unwrap();
        assert_eq!(sorted(read), sorted(dataset.table(name).to_vec()), "table {name}");
    }
}

#[test]
fn test_file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let dataset = sample_dataset();

    {
        let mut store = StructuredStore::open(&path, "catalog_", Duration::from_secs(1)).unwrap();
        store
            .write_generation(&dataset, 5_000, 5_000, Some("digest".into()), |_| {})
            .unwrap();
    }

    let store = StructuredStore::open(&path, "catalog_", Duration::from_secs(1)).unwrap();
    let (loaded, meta) = store.read_dataset().unwrap().unwrap();
    assert_eq!(meta.written_at_ms, 5_000);
    assert_eq!(meta.source_digest.as_deref(), Some("digest"));
    assert_eq!(loaded.total_rows(), dataset.total_rows());
}

// ---------------------------------------------------------------------------
// Isolation
// ---------------------------------------------------------------------------

#[test]
fn test_prefixes_isolate_generations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    let mut a = StructuredStore::open(&path, "a_", Duration::from_secs(1)).unwrap();
    a.write_generation(&sample_dataset(), 1, 1, None, |_| {}).unwrap();

    let mut b = StructuredStore::open(&path, "b_", Duration::from_secs(1)).unwrap();
    assert!(b.read_metadata().unwrap().is_none());
    b.clear_catalog().unwrap();

    assert_eq!(a.count_rows("items").unwrap(), 2);
}

#[test]
fn test_interrupted_generation_has_no_metadata() {
    let mut store = StructuredStore::open_in_memory("catalog_").unwrap();
    store.write_generation(&sample_dataset(), 1, 1, None, |_| {}).unwrap();

    // A refresh that dies after its first table leaves the marker and no metadata.
    store.begin_write(2).unwrap();
    store
        .write_table("items", &sample_dataset().table("items")[..1], ITEMS.key)
        .unwrap();

    assert!(store.read_metadata().unwrap().is_none());
    assert!(store.read_marker().unwrap().is_some());
    assert!(store.read_dataset().unwrap().is_none());
}

#[test]
fn test_marker_records_write_start_not_generation_time() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let written_at = 1_700_000_000_000;
    let started_at = written_at + 2 * 60 * 60 * 1000;

    let mut writer = StructuredStore::open(&path, "catalog_", Duration::from_secs(1)).unwrap();
    let observer = StructuredStore::open(&path, "catalog_", Duration::from_secs(1)).unwrap();

    let mut seen = Vec::new();
    writer
        .write_generation(&sample_dataset(), started_at, written_at, None, |_| {
            seen.push(observer.read_marker().unwrap());
        })
        .unwrap();

    assert_eq!(seen.len(), sample_dataset().table_names().count());
    for marker in seen {
        let marker = marker.expect("marker visible while the write runs");
        assert_eq!(marker.started_at_ms, started_at);
        assert!(!marker.is_stale(started_at, 30 * 60 * 1000));
    }
    assert!(observer.read_marker().unwrap().is_none());
    assert_eq!(observer.read_metadata().unwrap().unwrap().written_at_ms, written_at);
}

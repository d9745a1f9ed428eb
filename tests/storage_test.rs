//! Integration tests for Parquet persistence and the history cache

use fanda::registry::{MemoryRunRegistry, RunDescriptor};
use fanda::storage::{load_parquet, save_parquet, HistoryCache};
use fanda::table::{Record, TableBuilder};
use fanda::transform::{TableTransforms, DEFAULT_EPSILON};
use fanda::{FetchRequest, HistoryFetcher, HistoryTable};
use serde_json::{json, Value};

fn record(value: Value) -> Record {
    value.as_object().unwrap().clone()
}

/// Mixed column types with missing values and broadcast config.
fn sample_table() -> HistoryTable {
    let mut builder = TableBuilder::new();
    builder
        .push_series(
            "run-a",
            vec![
                record(json!({"_step": 0, "loss": 1.0, "done": false, "phase": "warmup"})),
                record(json!({"_step": 1, "loss": 0.5, "done": true})),
            ],
        )
        .push_series("run-b", vec![record(json!({"_step": 0, "reward": 3}))])
        .push_config("run-a", Some("a"), Some("ppo"), json!({"lr": 0.1}).as_object().unwrap())
        .push_config("run-b", Some("b"), None, json!({"lr": 0.2, "net": {"width": 64}}).as_object().unwrap());
    builder.build().unwrap()
}

fn seeded_registry() -> MemoryRunRegistry {
    let registry = MemoryRunRegistry::new();
    for (id, len) in [("a", 12), ("b", 7)] {
        registry.add_run(
            RunDescriptor::new("team", "proj", id).with_config(json!({"seed": len})),
            (0..len)
                .map(|s| record(json!({"_step": s, "loss": 1.0 / f64::from(s + 1)})))
                .collect(),
        );
    }
    registry
}

#[test]
fn test_parquet_round_trip_preserves_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.parquet");
    let table = sample_table();

    save_parquet(&table, &path).unwrap();
    let loaded = load_parquet(&path).unwrap();

    assert_eq!(loaded, table);
    assert_eq!(loaded.column_names(), table.column_names());
    assert_eq!(loaded.float_values("reward").unwrap(), vec![None, None, Some(3.0)]);
}

#[test]
fn test_parquet_round_trip_of_transformed_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("normalized.parquet");
    let table = sample_table()
        .normalize("loss", "run_id", DEFAULT_EPSILON)
        .unwrap();

    save_parquet(&table, &path).unwrap();
    assert_eq!(load_parquet(&path).unwrap(), table);
}

#[test]
fn test_empty_table_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.parquet");
    let empty = sample_table().empty_like();

    save_parquet(&empty, &path).unwrap();
    let loaded = load_parquet(&path).unwrap();
    assert!(loaded.is_empty());
    assert_eq!(loaded.column_names(), empty.column_names());
}

#[test]
fn test_load_missing_file_is_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_parquet(dir.path().join("absent.parquet")).unwrap_err();
    assert!(matches!(err, fanda::Error::StorageError(_)));
}

#[tokio::test]
async fn test_cache_serves_second_fetch_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let cache = HistoryCache::new(dir.path().join("cache"));
    let fetcher = HistoryFetcher::new(seeded_registry());
    let request = FetchRequest::new("team", "proj");

    let fresh = cache.fetch(&fetcher, &request).await.unwrap();
    let calls_after_first = fetcher.registry().history_calls();
    let cached = cache.fetch(&fetcher, &request).await.unwrap();

    assert_eq!(calls_after_first, 2);
    assert_eq!(fetcher.registry().history_calls(), calls_after_first);
    assert_eq!(cached, fresh);
    assert_eq!(cached, fetcher.fetch_with(&request).await.unwrap());
}

#[tokio::test]
async fn test_cache_distinguishes_requests() {
    let dir = tempfile::tempdir().unwrap();
    let cache = HistoryCache::new(dir.path());
    let fetcher = HistoryFetcher::new(seeded_registry());

    let full = cache
        .fetch(&fetcher, &FetchRequest::new("team", "proj"))
        .await
        .unwrap();
    let sampled = cache
        .fetch(&fetcher, &FetchRequest::new("team", "proj").samples(3))
        .await
        .unwrap();

    assert_eq!(full.num_rows(), 19);
    assert_eq!(sampled.num_rows(), 6);
}

#[tokio::test]
async fn test_corrupt_cache_entry_is_refetched() {
    let dir = tempfile::tempdir().unwrap();
    let cache = HistoryCache::new(dir.path());
    let fetcher = HistoryFetcher::new(seeded_registry());
    let request = FetchRequest::new("team", "proj");

    let path = cache.path_for(&request, fetcher.config().samples).unwrap();
    std::fs::write(&path, b"not parquet").unwrap();

    let table = cache.fetch(&fetcher, &request).await.unwrap();
    assert_eq!(table.num_rows(), 19);
    assert_eq!(load_parquet(&path).unwrap(), table);
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let dir = tempfile::tempdir().unwrap();
    let cache = HistoryCache::new(dir.path());
    let fetcher = HistoryFetcher::new(seeded_registry());
    let request = FetchRequest::new("team", "proj");
    let samples = fetcher.config().samples;

    assert!(!cache.invalidate(&request, samples).unwrap());
    cache.fetch(&fetcher, &request).await.unwrap();
    assert!(cache.invalidate(&request, samples).unwrap());

    cache.fetch(&fetcher, &request).await.unwrap();
    assert_eq!(fetcher.registry().history_calls(), 4);
}

#[tokio::test]
async fn test_failed_store_leaves_no_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let cache = HistoryCache::new(dir.path());
    let fetcher = HistoryFetcher::new(seeded_registry());
    let request = FetchRequest::new("team", "proj");

    // A non-empty directory at the entry path makes the final rename fail
    let path = cache.path_for(&request, fetcher.config().samples).unwrap();
    std::fs::create_dir_all(path.join("blocker")).unwrap();

    assert!(cache.fetch(&fetcher, &request).await.is_err());
    assert!(!path.with_extension("parquet.partial").exists());
    assert!(std::fs::read_dir(dir.path())
        .unwrap()
        .all(|entry| !entry.unwrap().file_name().to_string_lossy().ends_with(".partial")));
}

//! Integration tests for history persistence.
//!
//! These tests write real files through the public store API and read them
//! back into fresh stores, the way a restarted monitor does.

use herakles_software_monitor::{MetricsPoint, PersistOutcome, TimeSeriesStore};
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

fn point(t: f64, count: u64) -> MetricsPoint {
    MetricsPoint {
        timestamp: t,
        process_count: count,
        cpu_percent: 0.5,
        memory_bytes: count * 1024,
    }
}

#[test]
fn test_persist_then_load_restores_history() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("metrics.json");

    let store = TimeSeriesStore::new(10, Some(path.clone()), Duration::from_secs(10));
    store.add_point("name|Atera", "Atera", point(1.0, 2));
    store.add_point("name|Atera", "Atera", point(2.0, 3));
    store.add_point("c:\\apps|tool", "tool", point(2.0, 1));
    assert_eq!(store.persist(true), PersistOutcome::Written);

    let restored = TimeSeriesStore::new(10, Some(path), Duration::from_secs(10));
    restored.load();

    assert_eq!(restored.snapshot(), store.snapshot());
}

#[test]
fn test_load_truncates_to_newest_points() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("metrics.json");

    let store = TimeSeriesStore::new(10, Some(path.clone()), Duration::from_secs(10));
    for t in 1..=10 {
        store.add_point("name|Splashtop", "Splashtop", point(t as f64, 1));
    }
    store.persist(true);

    let smaller = TimeSeriesStore::new(4, Some(path), Duration::from_secs(10));
    smaller.load();

    let snap = smaller.snapshot();
    let stamps: Vec<f64> = snap["name|Splashtop"]
        .points
        .iter()
        .map(|p| p.timestamp)
        .collect();
    assert_eq!(stamps, vec![7.0, 8.0, 9.0, 10.0]);
}

#[test]
fn test_point_without_timestamp_loads_at_zero() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("metrics.json");
    fs::write(
        &path,
        r#"{"name|Atera": {"display_name": "Atera", "points": [{"process_count": 2, "cpu": 0.0, "mem": 100}]}}"#,
    )
    .expect("write fixture");

    let store = TimeSeriesStore::new(10, Some(path), Duration::from_secs(10));
    store.load();

    let snap = store.snapshot();
    let points = &snap["name|Atera"].points;
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].timestamp, 0.0);
    assert_eq!(points[0].process_count, 2);
    assert_eq!(points[0].memory_bytes, 100);
}

#[test]
fn test_corrupt_file_replaces_existing_state_with_empty_store() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("metrics.json");
    fs::write(&path, "{ this is not json").expect("write fixture");

    let store = TimeSeriesStore::new(10, Some(path), Duration::from_secs(10));
    store.add_point("name|Atera", "Atera", point(1.0, 1));
    store.load();

    assert!(store.snapshot().is_empty());
}

#[test]
fn test_persisted_file_is_json_keyed_by_group() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("metrics.json");

    let store = TimeSeriesStore::new(10, Some(path.clone()), Duration::from_secs(10));
    store.add_point("name|Atera", "Atera", point(3.0, 2));
    assert_eq!(store.persist(true), PersistOutcome::Written);

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
    let series = &raw["name|Atera"];
    assert_eq!(series["display_name"], "Atera");
    assert_eq!(series["points"][0]["t"], 3.0);
    assert_eq!(series["points"][0]["process_count"], 2);
    assert_eq!(series["points"][0]["mem"], 2048);

    let mut tmp = path.into_os_string();
    tmp.push(".tmp");
    assert!(!std::path::Path::new(&tmp).exists());
}

#[test]
fn test_snapshot_is_independent_of_store() {
    let store = TimeSeriesStore::new(10, None, Duration::from_secs(10));
    store.ensure_series("name|Atera", "Atera");

    let mut earlier = store.snapshot();
    store.add_point("name|Atera", "Atera", point(1.0, 1));
    store.add_point("name|Atera", "Atera", point(2.0, 1));
    assert!(earlier["name|Atera"].points.is_empty());

    if let Some(series) = earlier.get_mut("name|Atera") {
        series.display_name = "changed".to_string();
        series.points.push(point(99.0, 9));
    }
    earlier.clear();

    let current = store.snapshot();
    let series = &current["name|Atera"];
    assert_eq!(series.display_name, "Atera");
    assert_eq!(series.points.len(), 2);
    assert_eq!(series.points[1].timestamp, 2.0);
}

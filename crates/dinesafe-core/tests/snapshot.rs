mod common;

use std::fs;

use chrono::{NaiveDate, TimeDelta};
use dinesafe_core::{PipelineError, SnapshotSource, SnapshotStore, METADATA_FILE};
use dinesafe_parser::{NormalizeReport, DATASET_COLUMNS, SCHEMA_VERSION};

use common::{sample_dataset, start_time};

fn source_at(offset_secs: i64) -> SnapshotSource {
    SnapshotSource {
        source: "fake://dinesafe".to_string(),
        payload_hash: "abc123".to_string(),
        report: NormalizeReport {
            input_rows: 9,
            kept_rows: 7,
            ..NormalizeReport::default()
        },
        fetched_at: start_time() + TimeDelta::seconds(offset_secs),
    }
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SnapshotStore::new(dir.path().join("snapshots"));
    let dataset = sample_dataset();

    assert!(store.load_latest().expect("empty store").is_none());
    assert!(store.latest_metadata().expect("empty store").is_none());

    let saved = store.save(&dataset, source_at(0)).expect("save");
    assert_eq!(saved.row_count, 7);
    assert_eq!(saved.schema_version, SCHEMA_VERSION);
    assert_eq!(saved.fetched_at, start_time());
    assert_eq!(saved.data_file, "dinesafe_20240501T120000000000Z.parquet");
    assert_eq!(saved.columns.len(), DATASET_COLUMNS.len());
    assert_eq!(saved.unique_establishments, 4);
    let range = saved.date_range.expect("date range");
    assert_eq!(range.min, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
    assert_eq!(range.max, NaiveDate::from_ymd_opt(2024, 4, 2).unwrap());
    assert_eq!(saved.report.kept_rows, 7);

    let (loaded, metadata) = store.load_latest().expect("load").expect("present");
    assert_eq!(metadata, saved);
    assert_eq!(loaded, dataset);
    assert_eq!(store.latest_metadata().expect("metadata"), Some(saved));

    let leftovers: Vec<String> = fs::read_dir(store.dir())
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".partial") || name.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temporary files left behind: {leftovers:?}");
}

#[test]
fn repeated_saves_get_increasing_names() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SnapshotStore::new(dir.path());
    let dataset = sample_dataset();

    let first = store.save(&dataset, source_at(0)).expect("first save");
    // Same requested instant: the store must still move forward.
    let second = store.save(&dataset, source_at(0)).expect("second save");

    assert!(second.fetched_at > first.fetched_at);
    assert!(second.data_file > first.data_file);

    let files = store.list_snapshots().expect("list");
    let names: Vec<String> = files
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec![first.data_file.clone(), second.data_file.clone()]);

    let latest = store.latest_metadata().expect("metadata").expect("present");
    assert_eq!(latest.data_file, second.data_file);
}

#[test]
fn missing_data_file_is_corrupt() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SnapshotStore::new(dir.path());
    let saved = store.save(&sample_dataset(), source_at(0)).expect("save");

    fs::remove_file(dir.path().join(&saved.data_file)).expect("remove data file");

    let err = store.load_latest().expect_err("must be corrupt");
    assert!(matches!(err, PipelineError::SnapshotCorrupt { .. }), "got {err:?}");
}

#[test]
fn truncated_data_file_is_corrupt() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SnapshotStore::new(dir.path());
    let saved = store.save(&sample_dataset(), source_at(0)).expect("save");

    fs::write(dir.path().join(&saved.data_file), b"PAR1 not really").expect("clobber");

    assert!(matches!(
        store.load_latest(),
        Err(PipelineError::SnapshotCorrupt { .. })
    ));
}

#[test]
fn unparsable_metadata_is_corrupt() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SnapshotStore::new(dir.path());
    fs::write(dir.path().join(METADATA_FILE), "{ not json").expect("write");

    assert!(matches!(
        store.load_latest(),
        Err(PipelineError::SnapshotCorrupt { .. })
    ));
    // A later save still succeeds and repairs the pointer.
    store.save(&sample_dataset(), source_at(0)).expect("save over corrupt metadata");
    assert!(store.load_latest().expect("load").is_some());
}

#[test]
fn schema_version_mismatch_is_corrupt() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SnapshotStore::new(dir.path());
    store.save(&sample_dataset(), source_at(0)).expect("save");

    let path = dir.path().join(METADATA_FILE);
    let mut value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
    value["schema_version"] = serde_json::json!(SCHEMA_VERSION + 1);
    fs::write(&path, serde_json::to_string_pretty(&value).expect("json")).expect("write");

    assert!(matches!(
        store.load_latest(),
        Err(PipelineError::SnapshotCorrupt { .. })
    ));
}

#[test]
fn row_count_mismatch_is_corrupt() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SnapshotStore::new(dir.path());
    store.save(&sample_dataset(), source_at(0)).expect("save");

    let path = dir.path().join(METADATA_FILE);
    let mut value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
    value["row_count"] = serde_json::json!(99);
    fs::write(&path, serde_json::to_string(&value).expect("json")).expect("write");

    assert!(matches!(
        store.load_latest(),
        Err(PipelineError::SnapshotCorrupt { .. })
    ));
}

#[test]
fn listing_a_missing_directory_is_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SnapshotStore::new(dir.path().join("never-created"));
    assert!(store.list_snapshots().expect("list").is_empty());
}

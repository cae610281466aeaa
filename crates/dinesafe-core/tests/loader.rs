mod common;

use std::fs;
use std::time::Duration;

use dinesafe_core::{
    DatasetLoader, Freshness, ManualClock, Origin, PipelineError, SnapshotState, SnapshotStore,
    METADATA_FILE,
};

use common::{start_time, FakeFetcher, FetchMode};

const HOUR: Duration = Duration::from_secs(3600);

fn loader_in(
    dir: &std::path::Path,
    clock: &ManualClock,
) -> (DatasetLoader<FakeFetcher, ManualClock>, FakeFetcher) {
    let fetcher = FakeFetcher::new();
    let loader = DatasetLoader::with_clock(fetcher.clone(), SnapshotStore::new(dir), clock.clone());
    (loader, fetcher)
}

#[test]
fn fresh_memory_entry_is_served_without_fetching() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::new(start_time());
    let (mut loader, fetcher) = loader_in(dir.path(), &clock);

    let first = loader.get_dataset(HOUR).expect("first load");
    assert_eq!(first.origin, Origin::Network);
    assert_eq!(first.freshness, Freshness::Fresh);
    assert_eq!(first.dataset.height(), 7);
    assert_eq!(fetcher.calls(), 1);

    clock.advance(Duration::from_secs(60));
    let second = loader.get_dataset(HOUR).expect("second load");
    assert_eq!(second.origin, Origin::Memory);
    assert_eq!(second.freshness, Freshness::Fresh);
    assert_eq!(second.metadata, first.metadata);
    assert!(std::sync::Arc::ptr_eq(&first.dataset, &second.dataset));
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(loader.fetch_count(), 1);
}

#[test]
fn expired_cache_triggers_exactly_one_fetch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::new(start_time());
    let (mut loader, fetcher) = loader_in(dir.path(), &clock);

    let first = loader.get_dataset(HOUR).expect("first load");
    clock.advance(HOUR + Duration::from_secs(1));

    let second = loader.get_dataset(HOUR).expect("reload");
    assert_eq!(second.origin, Origin::Network);
    assert_eq!(second.freshness, Freshness::Fresh);
    assert!(second.metadata.fetched_at > first.metadata.fetched_at);
    assert_eq!(fetcher.calls(), 2);

    let third = loader.get_dataset(HOUR).expect("cached again");
    assert_eq!(third.origin, Origin::Memory);
    assert_eq!(fetcher.calls(), 2);
}

#[test]
fn fresh_snapshot_on_disk_is_reused_by_a_new_loader() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::new(start_time());

    let (mut producer, _) = loader_in(dir.path(), &clock);
    let produced = producer.get_dataset(HOUR).expect("produce");

    clock.advance(Duration::from_secs(600));
    let (mut consumer, fetcher) = loader_in(dir.path(), &clock);
    let loaded = consumer.get_dataset(HOUR).expect("load from disk");

    assert_eq!(loaded.origin, Origin::Disk);
    assert_eq!(loaded.freshness, Freshness::Fresh);
    assert_eq!(loaded.metadata, produced.metadata);
    assert_eq!(*loaded.dataset, *produced.dataset);
    assert_eq!(fetcher.calls(), 0);

    let again = consumer.get_dataset(HOUR).expect("memory");
    assert_eq!(again.origin, Origin::Memory);
}

#[test]
fn corrupt_snapshot_is_treated_as_absent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::new(start_time());

    let (mut producer, _) = loader_in(dir.path(), &clock);
    let produced = producer.get_dataset(HOUR).expect("produce");
    fs::remove_file(dir.path().join(&produced.metadata.data_file)).expect("remove data");

    let (mut consumer, fetcher) = loader_in(dir.path(), &clock);
    let loaded = consumer.get_dataset(HOUR).expect("refetch");
    assert_eq!(loaded.origin, Origin::Network);
    assert_eq!(loaded.dataset.height(), 7);
    assert_eq!(fetcher.calls(), 1);
}

#[test]
fn schema_mismatch_forces_a_refetch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::new(start_time());

    let (mut producer, _) = loader_in(dir.path(), &clock);
    producer.get_dataset(HOUR).expect("produce");

    let path = dir.path().join(METADATA_FILE);
    let mut value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
    value["schema_version"] = serde_json::json!(0);
    fs::write(&path, value.to_string()).expect("write");

    let (mut consumer, fetcher) = loader_in(dir.path(), &clock);
    let loaded = consumer.get_dataset(HOUR).expect("refetch");
    assert_eq!(loaded.origin, Origin::Network);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(loaded.metadata.schema_version, dinesafe_parser::SCHEMA_VERSION);
}

#[test]
fn network_failure_serves_stale_snapshot_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::new(start_time());

    let (mut producer, _) = loader_in(dir.path(), &clock);
    let produced = producer.get_dataset(HOUR).expect("produce");

    clock.advance(HOUR * 5);
    let (mut consumer, fetcher) = loader_in(dir.path(), &clock);
    fetcher.set_mode(FetchMode::NetworkDown);

    let loaded = consumer.get_dataset(HOUR).expect("degraded");
    assert_eq!(loaded.origin, Origin::Disk);
    assert_eq!(loaded.freshness, Freshness::Stale);
    assert_eq!(loaded.metadata.fetched_at, produced.metadata.fetched_at);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(
        consumer.snapshot_state(HOUR).expect("state"),
        SnapshotState::Stale
    );

    // Recovery: the next attempt fetches and caches again.
    fetcher.set_mode(FetchMode::Succeed);
    let recovered = consumer.get_dataset(HOUR).expect("recovered");
    assert_eq!(recovered.origin, Origin::Network);
    assert_eq!(recovered.freshness, Freshness::Fresh);
    assert_eq!(fetcher.calls(), 2);
}

#[test]
fn network_failure_serves_stale_memory_entry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::new(start_time());
    let (mut loader, fetcher) = loader_in(dir.path(), &clock);

    loader.get_dataset(HOUR).expect("first load");
    clock.advance(HOUR * 2);
    fetcher.set_mode(FetchMode::NetworkDown);

    let loaded = loader.get_dataset(HOUR).expect("degraded");
    assert_eq!(loaded.origin, Origin::Memory);
    assert_eq!(loaded.freshness, Freshness::Stale);
    assert_eq!(fetcher.calls(), 2);
}

#[test]
fn nothing_available_is_snapshot_absent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::new(start_time());
    let (mut loader, fetcher) = loader_in(dir.path(), &clock);
    fetcher.set_mode(FetchMode::NetworkDown);

    assert_eq!(
        loader.snapshot_state(HOUR).expect("state"),
        SnapshotState::Absent
    );
    let err = loader.get_dataset(HOUR).expect_err("no data");
    assert!(matches!(err, PipelineError::SnapshotAbsent { .. }), "got {err:?}");
    assert!(loader.latest_metadata().expect("metadata").is_none());
}

#[test]
fn format_errors_propagate_even_with_stale_data() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::new(start_time());
    let (mut loader, fetcher) = loader_in(dir.path(), &clock);

    loader.get_dataset(HOUR).expect("first load");
    clock.advance(HOUR * 2);
    fetcher.set_mode(FetchMode::Garbage);

    let err = loader.get_dataset(HOUR).expect_err("format error");
    assert!(matches!(err, PipelineError::UpstreamFormat(_)), "got {err:?}");
}

#[test]
fn refresh_and_invalidate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::new(start_time());
    let (mut loader, fetcher) = loader_in(dir.path(), &clock);

    let first = loader.get_dataset(HOUR).expect("first load");
    let refreshed = loader.refresh().expect("refresh");
    assert_eq!(refreshed.origin, Origin::Network);
    assert!(refreshed.metadata.fetched_at > first.metadata.fetched_at);
    assert_eq!(refreshed.metadata.payload_hash, first.metadata.payload_hash);
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(loader.store().list_snapshots().expect("list").len(), 2);

    loader.invalidate();
    let reloaded = loader.get_dataset(HOUR).expect("from disk");
    assert_eq!(reloaded.origin, Origin::Disk);
    assert_eq!(reloaded.metadata, refreshed.metadata);
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(
        loader.snapshot_state(HOUR).expect("state"),
        SnapshotState::Fresh
    );
}

#[test]
fn dataset_loaded_from_disk_expires_with_its_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::new(start_time());

    let (mut producer, _) = loader_in(dir.path(), &clock);
    let produced = producer.get_dataset(HOUR).expect("produce");

    clock.advance(Duration::from_secs(59 * 60));
    let (mut consumer, fetcher) = loader_in(dir.path(), &clock);
    let from_disk = consumer.get_dataset(HOUR).expect("load from disk");
    assert_eq!(from_disk.origin, Origin::Disk);
    assert_eq!(fetcher.calls(), 0);

    // Past an hour since the fetch, though only 58 minutes since the load.
    clock.advance(Duration::from_secs(58 * 60));
    let reloaded = consumer.get_dataset(HOUR).expect("refetch");
    assert_eq!(reloaded.origin, Origin::Network);
    assert_eq!(reloaded.freshness, Freshness::Fresh);
    assert!(reloaded.metadata.fetched_at > produced.metadata.fetched_at);
    assert_eq!(fetcher.calls(), 1);
}

#[test]
fn snapshot_state_ignores_unusable_snapshots() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::new(start_time());

    let (mut producer, _) = loader_in(dir.path(), &clock);
    let produced = producer.get_dataset(HOUR).expect("produce");

    let (observer, _) = loader_in(dir.path(), &clock);
    assert_eq!(
        observer.snapshot_state(HOUR).expect("state"),
        SnapshotState::Fresh
    );

    fs::remove_file(dir.path().join(&produced.metadata.data_file)).expect("remove data");
    assert_eq!(
        observer.snapshot_state(HOUR).expect("state"),
        SnapshotState::Absent
    );

    fs::write(dir.path().join(METADATA_FILE), "{ truncated").expect("clobber metadata");
    assert_eq!(
        observer.snapshot_state(HOUR).expect("state"),
        SnapshotState::Absent
    );
}

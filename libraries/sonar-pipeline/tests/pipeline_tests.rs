//! End-to-end pipeline tests
//!
//! Runs real scans over temporary directory trees with a text-fixture
//! extractor and the in-memory store.

use async_trait::async_trait;
use sonar_core::{
    AlbumAggregate, ArtistAggregate, StageKind, Store, StoreError, StoreResult, TrackRecord,
};
use sonar_pipeline::stages::DiscoveryStage;
use sonar_pipeline::{
    run_scan, ChannelSink, MemoryStore, PipelineConfig, PipelineError, PipelineScheduler,
    RunState, StageEvent,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

mod test_helpers;
use test_helpers::{build_library, init_tracing, write_tagged, TagFileExtractor};

const RUN_TIMEOUT: Duration = Duration::from_secs(30);

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.extraction.max_workers = 4;
    config
}

async fn scheduler(config: PipelineConfig, store: Arc<dyn Store>) -> PipelineScheduler {
    PipelineScheduler::builder(config, Arc::new(TagFileExtractor), store)
        .start()
        .await
        .expect("scheduler should start")
}

/// Store whose every call fails to connect
struct UnreachableStore;

#[async_trait]
impl Store for UnreachableStore {
    async fn create_artists(&self, _: &[ArtistAggregate]) -> StoreResult<usize> {
        Err(StoreError::Unreachable("connection refused".into()))
    }

    async fn create_albums(&self, _: &[AlbumAggregate]) -> StoreResult<usize> {
        Err(StoreError::Unreachable("connection refused".into()))
    }

    async fn create_tracks(&self, _: &[TrackRecord]) -> StoreResult<usize> {
        Err(StoreError::Unreachable("connection refused".into()))
    }
}

// =============================================================================
// Full Runs
// =============================================================================

#[tokio::test]
async fn test_two_artists_two_albums_three_tracks() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    build_library(temp.path(), &["Alpha", "Beta"], 2, 3);

    let store = Arc::new(MemoryStore::new());
    let report = tokio::time::timeout(
        RUN_TIMEOUT,
        run_scan(config(), Arc::new(TagFileExtractor), store.clone(), temp.path()),
    )
    .await
    .expect("run timed out")
    .expect("run should start");

    assert_eq!(report.state, RunState::Completed, "{}", report.summary_text());
    let counts = &report.counts;
    assert_eq!(counts.files_discovered, 12);
    assert_eq!(counts.files_processed, 12);
    assert_eq!(counts.files_failed, 0);
    assert_eq!(counts.artists_grouped, 2);
    assert_eq!(counts.albums_grouped, 4);
    assert_eq!(counts.tracks_grouped, 12);
    assert!(counts.artists_inserted <= 2);
    assert!(counts.albums_inserted <= 4);
    assert!(counts.tracks_inserted <= 12);
    assert!(report.failures.is_empty());

    assert_eq!(store.artist_count(), 2);
    assert_eq!(store.album_count(), 4);
    assert_eq!(store.track_count(), 12);
    let album_keys: Vec<_> = store.albums().into_iter().map(|a| a.key.to_string()).collect();
    assert_eq!(
        album_keys,
        vec![
            "alpha / alpha vol 1",
            "alpha / alpha vol 2",
            "beta / beta vol 1",
            "beta / beta vol 2"
        ]
    );
}

#[tokio::test]
async fn test_empty_directory_completes_with_zero_counts() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let (sink, mut events) = ChannelSink::channel();

    let scheduler = PipelineScheduler::builder(config(), Arc::new(TagFileExtractor), Arc::new(MemoryStore::new()))
        .events(Arc::new(sink))
        .start()
        .await
        .unwrap();

    let handle = scheduler.submit_scan(temp.path()).await.unwrap();
    let report = tokio::time::timeout(RUN_TIMEOUT, handle.wait()).await.unwrap();
    scheduler.shutdown().await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.counts, Default::default());

    // Only the discovery task ran
    let mut stages = HashSet::new();
    while let Ok(event) = events.try_recv() {
        stages.insert(event.stage());
    }
    assert_eq!(stages, HashSet::from([StageKind::Discovery]));
}

#[tokio::test]
async fn test_corrupt_file_does_not_fail_batch() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    build_library(temp.path(), &["Alpha"], 1, 4);
    std::fs::write(temp.path().join("Alpha/Alpha Vol 1/broken.mp3"), "CORRUPT").unwrap();
    std::fs::write(temp.path().join("Alpha/Alpha Vol 1/empty.mp3"), "").unwrap();

    let store = Arc::new(MemoryStore::new());
    let report = run_scan(config(), Arc::new(TagFileExtractor), store.clone(), temp.path())
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.counts.files_discovered, 6);
    assert_eq!(report.counts.files_processed, 4);
    assert_eq!(report.counts.files_failed, 1);
    assert_eq!(report.counts.files_skipped, 1);
    assert_eq!(store.track_count(), 4);
}

#[tokio::test]
async fn test_untagged_files_group_by_directory() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    write_tagged(&temp.path().join("Low/Secret Name/01 Starfire.flac"), &[("genre", "Slowcore")]);
    write_tagged(&temp.path().join("Low/Secret Name/02 Weight of Water.flac"), &[("track", "2")]);
    write_tagged(&temp.path().join("loose.ogg"), &[("title", "Loose")]);

    let store = Arc::new(MemoryStore::new());
    let report = run_scan(config(), Arc::new(TagFileExtractor), store.clone(), temp.path())
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.counts.tracks_grouped, 3);

    let albums: Vec<_> = store.albums().into_iter().map(|a| a.title).collect();
    assert!(albums.contains(&"Secret Name".to_string()));
    let artists: Vec<_> = store.artists().into_iter().map(|a| a.name).collect();
    assert!(artists.contains(&"Low".to_string()));

    let track = store
        .track(&std::fs::canonicalize(temp.path()).unwrap().join("Low/Secret Name/01 Starfire.flac"))
        .expect("track stored under its absolute path");
    assert_eq!(track.metadata.title.as_deref(), Some("01 Starfire"));
    assert_eq!(track.artist_key, "low");
}

#[tokio::test]
async fn test_small_batches_pipeline_independently() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    build_library(temp.path(), &["Alpha", "Beta"], 2, 3);

    let mut config = config();
    config.discovery.batch_size = 5;
    let store = Arc::new(MemoryStore::new());
    let report = run_scan(config, Arc::new(TagFileExtractor), store.clone(), temp.path())
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.counts.batches_discovered, 3);
    assert_eq!(report.counts.files_discovered, 12);
    assert_eq!(report.counts.tracks_inserted, 12);
    // Aggregates repeat across batches; the store's upsert collapses them
    assert!(report.counts.artists_grouped >= 2);
    assert_eq!(store.artist_count(), 2);
    assert_eq!(store.album_count(), 4);
}

#[tokio::test]
async fn test_rescan_is_idempotent() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    build_library(temp.path(), &["Alpha", "Beta"], 1, 2);

    let store = Arc::new(MemoryStore::new());
    let scheduler = scheduler(config(), store.clone()).await;

    let first = scheduler.submit_scan(temp.path()).await.unwrap().wait().await;
    let second = scheduler.submit_scan(temp.path()).await.unwrap().wait().await;
    scheduler.shutdown().await;

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.counts, second.counts);
    assert_eq!(store.track_count(), 4);
    assert_eq!(store.artist_count(), 2);
}

#[tokio::test]
async fn test_concurrent_runs_are_tracked_separately() {
    init_tracing();
    let first_root = TempDir::new().unwrap();
    let second_root = TempDir::new().unwrap();
    build_library(first_root.path(), &["Alpha"], 1, 2);
    build_library(second_root.path(), &["Beta"], 2, 2);

    let store = Arc::new(MemoryStore::new());
    let scheduler = scheduler(config(), store.clone()).await;

    let first = scheduler.submit_scan(first_root.path()).await.unwrap();
    let second = scheduler.submit_maintenance_scan(second_root.path()).await.unwrap();
    let (first, second) = tokio::join!(first.wait(), second.wait());
    scheduler.shutdown().await;

    assert_eq!(first.counts.files_discovered, 2);
    assert_eq!(second.counts.files_discovered, 4);
    assert_eq!(first.state, RunState::Completed);
    assert_eq!(second.state, RunState::Completed);
    assert_eq!(store.track_count(), 6);
    assert_eq!(scheduler.active_runs(), 0);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_missing_root_is_rejected_before_queueing() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let scheduler = scheduler(config(), Arc::new(MemoryStore::new())).await;

    let result = scheduler.submit_scan(temp.path().join("nope")).await;
    assert!(matches!(result, Err(PipelineError::Precondition(_))));
    assert_eq!(scheduler.active_runs(), 0);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_store_fails_run() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    build_library(temp.path(), &["Alpha"], 1, 3);

    let report = run_scan(config(), Arc::new(TagFileExtractor), Arc::new(UnreachableStore), temp.path())
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.counts.files_processed, 3);
    assert_eq!(report.counts.tracks_inserted, 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, StageKind::Insertion);
    assert!(report.failures[0].batch_id.is_some());
}

#[tokio::test]
async fn test_failed_event_is_emitted_for_batch_failure() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    build_library(temp.path(), &["Alpha"], 1, 1);
    let (sink, mut events) = ChannelSink::channel();

    let scheduler = PipelineScheduler::builder(config(), Arc::new(TagFileExtractor), Arc::new(UnreachableStore))
        .events(Arc::new(sink))
        .start()
        .await
        .unwrap();
    let report = scheduler.submit_scan(temp.path()).await.unwrap().wait().await;
    scheduler.shutdown().await;

    let mut failed = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let StageEvent::Failed { stage, run_id, .. } = event {
            failed.push((stage, run_id));
        }
    }
    assert_eq!(failed, vec![(StageKind::Insertion, report.run_id)]);
}

#[tokio::test]
async fn test_shutdown_rejects_new_runs() {
    let temp = TempDir::new().unwrap();
    let scheduler = scheduler(config(), Arc::new(MemoryStore::new())).await;
    scheduler.shutdown().await;

    let result = scheduler.submit_scan(temp.path()).await;
    assert!(matches!(result, Err(PipelineError::Queue(_))));
}

#[tokio::test]
async fn test_invalid_config_is_rejected_at_start() {
    let mut config = config();
    config.queues.extraction.size = 0;

    let result = PipelineScheduler::builder(config, Arc::new(TagFileExtractor), Arc::new(MemoryStore::new()))
        .start()
        .await;
    assert!(matches!(result, Err(PipelineError::Config(_))));
}

// =============================================================================
// Discovery Invariants
// =============================================================================

#[tokio::test]
async fn test_discovered_count_equals_sum_of_batches() {
    let temp = TempDir::new().unwrap();
    let paths = build_library(temp.path(), &["A", "B", "C"], 3, 4);
    std::fs::write(temp.path().join("cover.jpg"), "jpeg").unwrap();

    for batch_size in [1, 5, 7, 36, 1_000] {
        let (mut rx, walk) = DiscoveryStage::default()
            .discover_with_batch_size(temp.path(), batch_size)
            .unwrap();

        let mut seen = HashSet::new();
        let mut total = 0;
        while let Some(batch) = rx.recv().await {
            assert!(batch.len() <= batch_size);
            total += batch.len();
            for file in batch {
                assert!(seen.insert(file.path), "file emitted twice");
            }
        }
        let report = walk.await.unwrap().unwrap();

        assert_eq!(report.files_found, total);
        assert_eq!(total, paths.len());
        assert_eq!(report.batches_emitted, paths.len().div_ceil(batch_size));
    }
}

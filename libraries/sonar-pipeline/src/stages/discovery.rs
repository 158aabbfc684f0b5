//! Directory discovery
//!
//! Walks a root directory and streams audio paths in fixed-size batches.
//! Each top-level subdirectory gets its own blocking walker so one huge or
//! slow directory cannot hold up the rest of the library.

use crate::config::DiscoveryConfig;
use crate::{PipelineError, Result};
use sonar_core::DiscoveredFile;
use sonar_metadata::is_audio_file;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use walkdir::WalkDir;

/// Batches buffered between the walkers and the consumer
const BATCH_CHANNEL_CAPACITY: usize = 4;

/// Paths buffered between the walkers and the batcher
const PATH_CHANNEL_CAPACITY: usize = 1_024;

/// Summary of one discovery pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryReport {
    /// Audio files emitted, equal to the sum of all batch lengths
    pub files_found: usize,

    pub batches_emitted: usize,

    /// Subdirectories abandoned after their timeout
    pub dirs_skipped: usize,

    /// Entries that could not be read (permissions, vanished files)
    pub unreadable_entries: usize,

    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct WalkOutcome {
    unreadable: usize,
}

/// Directory walker
#[derive(Debug, Clone, Default)]
pub struct DiscoveryStage {
    config: DiscoveryConfig,
}

impl DiscoveryStage {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Resolve a scan root to an absolute directory path
    ///
    /// Fails with `Precondition` when the root is missing or not a directory.
    pub fn check_root(root: &Path) -> Result<PathBuf> {
        let metadata = std::fs::metadata(root).map_err(|e| {
            PipelineError::Precondition(format!("Root {} is not accessible: {}", root.display(), e))
        })?;
        if !metadata.is_dir() {
            return Err(PipelineError::Precondition(format!(
                "Root {} is not a directory",
                root.display()
            )));
        }
        std::fs::canonicalize(root).map_err(|e| {
            PipelineError::Precondition(format!("Cannot resolve root {}: {}", root.display(), e))
        })
    }

    /// Walk `root` using the configured batch size
    pub fn discover(
        &self,
        root: &Path,
    ) -> Result<(mpsc::Receiver<Vec<DiscoveredFile>>, JoinHandle<Result<DiscoveryReport>>)> {
        self.discover_with_batch_size(root, self.config.batch_size)
    }

    /// Walk `root`, emitting batches of `batch_size` paths as they fill
    ///
    /// The receiver yields batches while the walk is still running. The
    /// handle resolves once every walker has finished and the last (partial)
    /// batch has been sent.
    pub fn discover_with_batch_size(
        &self,
        root: &Path,
        batch_size: usize,
    ) -> Result<(mpsc::Receiver<Vec<DiscoveredFile>>, JoinHandle<Result<DiscoveryReport>>)> {
        if batch_size == 0 {
            return Err(PipelineError::Config("batch_size must be at least 1".into()));
        }
        let root = Self::check_root(root)?;

        let (batch_tx, batch_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
        let config = self.config.clone();
        let handle = tokio::spawn(async move { walk_root(root, config, batch_size, batch_tx).await });

        Ok((batch_rx, handle))
    }
}

async fn walk_root(
    root: PathBuf,
    config: DiscoveryConfig,
    batch_size: usize,
    batch_tx: mpsc::Sender<Vec<DiscoveredFile>>,
) -> Result<DiscoveryReport> {
    let start = Instant::now();

    let listing_root = root.clone();
    let (subdirs, root_files) = tokio::task::spawn_blocking(move || list_top_level(&listing_root))
        .await
        .map_err(|e| PipelineError::batch(sonar_core::StageKind::Discovery, e.to_string()))??;

    let (path_tx, path_rx) = mpsc::channel::<PathBuf>(PATH_CHANNEL_CAPACITY);
    let batcher = tokio::spawn(batch_paths(path_rx, batch_tx, batch_size));

    // Files directly under the root are handled here
    for path in root_files {
        if path_tx.send(path).await.is_err() {
            break;
        }
    }

    let workers = config.max_workers.min(subdirs.len() + 1).max(1);
    tracing::info!(
        root = %root.display(),
        subdirs = subdirs.len(),
        workers,
        "Walking library"
    );

    let permits = Arc::new(Semaphore::new(workers));
    let mut walkers = Vec::with_capacity(subdirs.len());
    for dir in subdirs {
        let permits = permits.clone();
        let path_tx = path_tx.clone();
        let timeout = config.subdir_timeout();
        walkers.push(tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return (WalkOutcome::default(), false);
            };
            walk_with_timeout(dir, path_tx, timeout).await
        }));
    }
    drop(path_tx);

    let mut dirs_skipped = 0;
    let mut unreadable_entries = 0;
    for walker in walkers {
        match walker.await {
            Ok((outcome, timed_out)) => {
                unreadable_entries += outcome.unreadable;
                if timed_out {
                    dirs_skipped += 1;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Directory walker panicked");
                dirs_skipped += 1;
            }
        }
    }

    let (files_found, batches_emitted) = batcher
        .await
        .map_err(|e| PipelineError::batch(sonar_core::StageKind::Discovery, e.to_string()))?;

    let report = DiscoveryReport {
        files_found,
        batches_emitted,
        dirs_skipped,
        unreadable_entries,
        elapsed: start.elapsed(),
    };
    tracing::info!(
        root = %root.display(),
        files = report.files_found,
        batches = report.batches_emitted,
        dirs_skipped = report.dirs_skipped,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Discovery complete"
    );
    Ok(report)
}

/// Split the root listing into subdirectories and audio files
fn list_top_level(root: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let entries = std::fs::read_dir(root).map_err(|e| {
        PipelineError::Precondition(format!("Cannot read root {}: {}", root.display(), e))
    })?;

    let mut subdirs = Vec::new();
    let mut files = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        match entry.file_type() {
            Ok(kind) if kind.is_dir() => subdirs.push(path),
            Ok(kind) if kind.is_file() && is_audio_file(&path) => files.push(path),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
            }
        }
    }

    subdirs.sort();
    files.sort();
    Ok((subdirs, files))
}

/// Walk one subdirectory on a blocking thread, cancelling it on timeout
///
/// Paths sent before the timeout stay counted.
async fn walk_with_timeout(
    dir: PathBuf,
    path_tx: mpsc::Sender<PathBuf>,
    timeout: Duration,
) -> (WalkOutcome, bool) {
    let cancel = Arc::new(AtomicBool::new(false));
    let walk = {
        let cancel = cancel.clone();
        let dir = dir.clone();
        tokio::task::spawn_blocking(move || walk_subdir(&dir, &path_tx, &cancel))
    };

    match tokio::time::timeout(timeout, walk).await {
        Ok(Ok(outcome)) => (outcome, false),
        Ok(Err(e)) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Directory walker failed");
            (WalkOutcome::default(), true)
        }
        Err(_) => {
            cancel.store(true, Ordering::Relaxed);
            tracing::warn!(
                dir = %dir.display(),
                timeout_secs = timeout.as_secs(),
                "Directory walk timed out, skipping the rest of it"
            );
            (WalkOutcome::default(), true)
        }
    }
}

fn walk_subdir(dir: &Path, path_tx: &mpsc::Sender<PathBuf>, cancel: &AtomicBool) -> WalkOutcome {
    let mut outcome = WalkOutcome::default();

    for entry in WalkDir::new(dir).follow_links(false) {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(
                    path = ?e.path(),
                    error = %e,
                    "Skipping unreadable path"
                );
                outcome.unreadable += 1;
                continue;
            }
        };

        if entry.file_type().is_file() && is_audio_file(entry.path()) {
            // Receiver gone: the consumer stopped listening
            if path_tx.blocking_send(entry.into_path()).is_err() {
                break;
            }
        }
    }

    outcome
}

/// Group incoming paths into batches; returns (files, batches)
async fn batch_paths(
    mut path_rx: mpsc::Receiver<PathBuf>,
    batch_tx: mpsc::Sender<Vec<DiscoveredFile>>,
    batch_size: usize,
) -> (usize, usize) {
    let mut files_found = 0;
    let mut batches_emitted = 0;
    let capacity = batch_size.min(PATH_CHANNEL_CAPACITY);
    let mut batch = Vec::with_capacity(capacity);

    while let Some(path) = path_rx.recv().await {
        batch.push(DiscoveredFile::new(path));
        if batch.len() == batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(capacity));
            let len = full.len();
            if batch_tx.send(full).await.is_err() {
                return (files_found, batches_emitted);
            }
            files_found += len;
            batches_emitted += 1;
        }
    }

    if !batch.is_empty() {
        let len = batch.len();
        if batch_tx.send(batch).await.is_ok() {
            files_found += len;
            batches_emitted += 1;
        }
    }

    (files_found, batches_emitted)
}

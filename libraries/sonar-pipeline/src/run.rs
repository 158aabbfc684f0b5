//! Per-run bookkeeping
//!
//! A run's state is derived from its outstanding tasks: the run sits in the
//! earliest stage that still has queued or running work. Follow-up tasks are
//! registered before the task that produced them is finished, so the count
//! never drops to zero while work remains.

use crate::stages::{ExtractionReport, GroupingReport, InsertionReport};
use serde::Serialize;
use sonar_core::{BatchId, RunId, StageKind};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Lifecycle of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Discovering,
    Extracting,
    Grouping,
    Inserting,
    Completed,
    Failed,
}

impl RunState {
    pub fn for_stage(stage: StageKind) -> Self {
        match stage {
            StageKind::Discovery => RunState::Discovering,
            StageKind::Extraction => RunState::Extracting,
            StageKind::Grouping => RunState::Grouping,
            StageKind::Insertion => RunState::Inserting,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Discovering => "discovering",
            RunState::Extracting => "extracting",
            RunState::Grouping => "grouping",
            RunState::Inserting => "inserting",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage totals for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub files_discovered: usize,
    pub batches_discovered: usize,
    pub dirs_skipped: usize,

    pub files_processed: usize,
    pub files_failed: usize,
    pub files_skipped: usize,

    pub artists_grouped: usize,
    pub albums_grouped: usize,
    pub tracks_grouped: usize,

    pub artists_inserted: usize,
    pub albums_inserted: usize,
    pub tracks_inserted: usize,
    pub records_failed: usize,
    pub calls_failed: usize,
}

/// A batch that failed as a whole
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub stage: StageKind,

    /// Absent when the whole run was aborted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<BatchId>,

    pub message: String,
}

/// Final (or in-progress) view of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub root: PathBuf,
    pub state: RunState,
    pub counts: RunCounts,
    pub failures: Vec<StageFailure>,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Human-readable summary
    pub fn summary_text(&self) -> String {
        let c = &self.counts;
        let mut text = format!(
            "Run {} {} in {:.1}s\n\
             Discovered: {} files in {} batches\n\
             Extracted:  {} processed, {} failed, {} skipped\n\
             Grouped:    {} artists, {} albums, {} tracks\n\
             Inserted:   {} artists, {} albums, {} tracks",
            self.run_id,
            self.state,
            self.elapsed_ms as f64 / 1000.0,
            c.files_discovered,
            c.batches_discovered,
            c.files_processed,
            c.files_failed,
            c.files_skipped,
            c.artists_grouped,
            c.albums_grouped,
            c.tracks_grouped,
            c.artists_inserted,
            c.albums_inserted,
            c.tracks_inserted,
        );
        if c.records_failed > 0 {
            text.push_str(&format!(
                "\nRejected:   {} records in {} store calls",
                c.records_failed, c.calls_failed
            ));
        }
        if c.dirs_skipped > 0 {
            text.push_str(&format!("\nSkipped:    {} directories", c.dirs_skipped));
        }
        for failure in &self.failures {
            match &failure.batch_id {
                Some(batch_id) => text.push_str(&format!(
                    "\nFailed {} batch {}: {}",
                    failure.stage, batch_id, failure.message
                )),
                None => text.push_str(&format!("\nAborted during {}: {}", failure.stage, failure.message)),
            }
        }
        text
    }
}

#[derive(Debug)]
struct Progress {
    outstanding: [usize; 4],
    counts: RunCounts,
    failures: Vec<StageFailure>,
    state: RunState,
    finished_at: Option<Instant>,
}

/// Tracks outstanding work and totals for one run
#[derive(Debug)]
pub(crate) struct RunTracker {
    run_id: RunId,
    root: PathBuf,
    started: Instant,
    progress: Mutex<Progress>,
    state_tx: watch::Sender<RunState>,
}

impl RunTracker {
    pub(crate) fn new(run_id: RunId, root: PathBuf) -> Self {
        let (state_tx, _) = watch::channel(RunState::Discovering);
        Self {
            run_id,
            root,
            started: Instant::now(),
            progress: Mutex::new(Progress {
                outstanding: [0; 4],
                counts: RunCounts::default(),
                failures: Vec::new(),
                state: RunState::Discovering,
                finished_at: None,
            }),
            state_tx,
        }
    }

    pub(crate) fn run_id(&self) -> &RunId {
        &self.run_id
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn state(&self) -> RunState {
        self.progress().state
    }

    /// Register a task before it is published
    pub(crate) fn task_queued(&self, stage: StageKind) {
        self.progress().outstanding[stage_index(stage)] += 1;
    }

    /// Retire a task once it has been handled (successfully or not)
    pub(crate) fn task_done(&self, stage: StageKind) {
        let mut progress = self.progress();
        let slot = &mut progress.outstanding[stage_index(stage)];
        *slot = slot.saturating_sub(1);
        self.advance(&mut progress);
    }

    pub(crate) fn record_failure(
        &self,
        stage: StageKind,
        batch_id: Option<BatchId>,
        message: String,
    ) {
        self.progress().failures.push(StageFailure {
            stage,
            batch_id,
            message,
        });
    }

    /// Force a non-terminal run into `Failed`
    pub(crate) fn abort(&self, message: &str) {
        let mut progress = self.progress();
        if progress.state.is_terminal() {
            return;
        }
        let stage = StageKind::ALL
            .into_iter()
            .find(|stage| RunState::for_stage(*stage) == progress.state)
            .unwrap_or(StageKind::Discovery);
        progress.failures.push(StageFailure {
            stage,
            batch_id: None,
            message: message.to_string(),
        });

        tracing::warn!(run_id = %self.run_id, from = %progress.state, "Run aborted");
        progress.state = RunState::Failed;
        progress.finished_at = Some(Instant::now());
        self.state_tx.send_replace(RunState::Failed);
    }

    pub(crate) fn add_discovered(&self, files: usize) {
        let mut progress = self.progress();
        progress.counts.files_discovered += files;
        progress.counts.batches_discovered += 1;
    }

    pub(crate) fn add_dirs_skipped(&self, dirs: usize) {
        self.progress().counts.dirs_skipped += dirs;
    }

    pub(crate) fn add_extraction(&self, report: &ExtractionReport) {
        let mut progress = self.progress();
        let counts = &mut progress.counts;
        counts.files_processed += report.processed;
        counts.files_failed += report.failed;
        counts.files_skipped += report.skipped;
    }

    pub(crate) fn add_grouping(&self, report: &GroupingReport) {
        let mut progress = self.progress();
        let counts = &mut progress.counts;
        counts.artists_grouped += report.artists;
        counts.albums_grouped += report.albums;
        counts.tracks_grouped += report.tracks;
    }

    pub(crate) fn add_insertion(&self, report: &InsertionReport) {
        let mut progress = self.progress();
        let counts = &mut progress.counts;
        counts.artists_inserted += report.artists.inserted;
        counts.albums_inserted += report.albums.inserted;
        counts.tracks_inserted += report.tracks.inserted;
        counts.records_failed += report.failed_total();
        counts.calls_failed +=
            report.artists.failed_calls + report.albums.failed_calls + report.tracks.failed_calls;
    }

    fn advance(&self, progress: &mut Progress) {
        if progress.state.is_terminal() {
            return;
        }

        let next = StageKind::ALL
            .iter()
            .find(|stage| progress.outstanding[stage_index(**stage)] > 0)
            .map_or_else(
                || {
                    if progress.failures.is_empty() {
                        RunState::Completed
                    } else {
                        RunState::Failed
                    }
                },
                |stage| RunState::for_stage(*stage),
            );

        // States only move forward
        if next <= progress.state {
            return;
        }

        tracing::info!(run_id = %self.run_id, from = %progress.state, to = %next, "Run state changed");
        progress.state = next;
        if next.is_terminal() {
            progress.finished_at = Some(Instant::now());
        }
        self.state_tx.send_replace(next);
    }

    pub(crate) fn report(&self) -> RunReport {
        let progress = self.progress();
        let elapsed = progress
            .finished_at
            .map_or_else(|| self.started.elapsed(), |end| end - self.started);
        RunReport {
            run_id: self.run_id.clone(),
            root: self.root.clone(),
            state: progress.state,
            counts: progress.counts.clone(),
            failures: progress.failures.clone(),
            elapsed_ms: duration_ms(elapsed),
        }
    }
}

fn stage_index(stage: StageKind) -> usize {
    match stage {
        StageKind::Discovery => 0,
        StageKind::Extraction => 1,
        StageKind::Grouping => 2,
        StageKind::Insertion => 3,
    }
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Handle to a submitted run
#[derive(Debug, Clone)]
pub struct RunHandle {
    tracker: Arc<RunTracker>,
    state_rx: watch::Receiver<RunState>,
}

impl RunHandle {
    pub(crate) fn new(tracker: Arc<RunTracker>) -> Self {
        let state_rx = tracker.subscribe();
        Self { tracker, state_rx }
    }

    pub fn run_id(&self) -> &RunId {
        self.tracker.run_id()
    }

    pub fn state(&self) -> RunState {
        self.tracker.state()
    }

    /// Snapshot of the run so far
    pub fn report(&self) -> RunReport {
        self.tracker.report()
    }

    /// Wait for the run to complete or fail
    pub async fn wait(mut self) -> RunReport {
        // The sender lives in the tracker we hold, so this only ends on a terminal state
        let _ = self.state_rx.wait_for(|state| state.is_terminal()).await;
        self.tracker.report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> RunTracker {
        RunTracker::new(RunId::new("run"), PathBuf::from("/music"))
    }

    #[test]
    fn state_follows_earliest_outstanding_stage() {
        let tracker = tracker();
        tracker.task_queued(StageKind::Discovery);
        assert_eq!(tracker.state(), RunState::Discovering);

        tracker.task_queued(StageKind::Extraction);
        tracker.task_queued(StageKind::Extraction);
        tracker.task_done(StageKind::Discovery);
        assert_eq!(tracker.state(), RunState::Extracting);

        tracker.task_queued(StageKind::Grouping);
        tracker.task_done(StageKind::Extraction);
        assert_eq!(tracker.state(), RunState::Extracting);

        tracker.task_done(StageKind::Extraction);
        assert_eq!(tracker.state(), RunState::Grouping);

        tracker.task_queued(StageKind::Insertion);
        tracker.task_done(StageKind::Grouping);
        assert_eq!(tracker.state(), RunState::Inserting);

        tracker.task_done(StageKind::Insertion);
        assert_eq!(tracker.state(), RunState::Completed);
    }

    #[test]
    fn empty_run_completes_after_discovery() {
        let tracker = tracker();
        tracker.task_queued(StageKind::Discovery);
        tracker.task_done(StageKind::Discovery);

        let report = tracker.report();
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.counts, RunCounts::default());
    }

    #[test]
    fn batch_failure_ends_run_failed() {
        let tracker = tracker();
        tracker.task_queued(StageKind::Discovery);
        tracker.task_queued(StageKind::Extraction);
        tracker.task_queued(StageKind::Extraction);
        tracker.task_done(StageKind::Discovery);

        tracker.record_failure(
            StageKind::Extraction,
            Some(BatchId::new("b1")),
            "timed out".into(),
        );
        tracker.task_done(StageKind::Extraction);
        // The other batch keeps going
        assert_eq!(tracker.state(), RunState::Extracting);

        tracker.task_done(StageKind::Extraction);
        let report = tracker.report();
        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.failures.len(), 1);
        assert!(report.summary_text().contains("timed out"));
    }

    #[test]
    fn terminal_state_is_final() {
        let tracker = tracker();
        tracker.task_queued(StageKind::Discovery);
        tracker.task_done(StageKind::Discovery);
        tracker.task_queued(StageKind::Extraction);
        tracker.task_done(StageKind::Extraction);
        assert_eq!(tracker.state(), RunState::Completed);
    }

    #[test]
    fn abort_fails_a_running_run() {
        let tracker = tracker();
        tracker.task_queued(StageKind::Discovery);
        tracker.task_queued(StageKind::Extraction);
        tracker.task_done(StageKind::Discovery);

        tracker.abort("shutting down");

        let report = tracker.report();
        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.failures[0].stage, StageKind::Extraction);
        assert_eq!(report.failures[0].batch_id, None);

        // Work still in flight cannot revive it
        tracker.task_done(StageKind::Extraction);
        assert_eq!(tracker.state(), RunState::Failed);
    }

    #[tokio::test]
    async fn handle_wait_resolves_on_completion() {
        let tracker = Arc::new(tracker());
        tracker.task_queued(StageKind::Discovery);
        let handle = RunHandle::new(tracker.clone());

        let waiter = tokio::spawn(handle.wait());
        tracker.task_done(StageKind::Discovery);

        let report = waiter.await.unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert!(report.is_success());
    }
}

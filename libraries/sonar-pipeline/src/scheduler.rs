//! Pipeline scheduler
//!
//! Owns one worker pool per stage queue. Workers pull tasks from the broker,
//! run the stage, publish the follow-up task and ack. The scheduler keeps no
//! business data beyond per-run bookkeeping.

use crate::config::PipelineConfig;
use crate::events::{EventSink, StageEvent, StageStats, TracingSink};
use crate::queue::{Delivery, MemoryBroker, TaskQueue};
use crate::run::{RunHandle, RunReport, RunTracker};
use crate::stages::{DiscoveryStage, ExtractionStage, GroupingStage, InsertionStage};
use crate::{PipelineError, Result};
use sonar_core::{
    BatchId, DiscoveredFile, ExtractedMetadata, InsertionBatch, MetadataExtractor, PipelineTask,
    RunId, StageKind, Store, TaskClass, TaskPayload,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::task::JoinHandle;

/// Builder for [`PipelineScheduler`]
pub struct SchedulerBuilder {
    config: PipelineConfig,
    extractor: Arc<dyn MetadataExtractor>,
    store: Arc<dyn Store>,
    broker: Option<Arc<dyn TaskQueue>>,
    events: Option<Arc<dyn EventSink>>,
}

impl SchedulerBuilder {
    /// Use a specific broker (default: a fresh [`MemoryBroker`])
    pub fn broker(mut self, broker: Arc<dyn TaskQueue>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Send stage events to `sink` (default: [`TracingSink`])
    pub fn events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Validate the configuration, declare the queues and start every worker pool
    pub async fn start(self) -> Result<PipelineScheduler> {
        self.config.validate()?;

        let broker = self
            .broker
            .unwrap_or_else(|| Arc::new(MemoryBroker::new()) as Arc<dyn TaskQueue>);
        for stage in StageKind::ALL {
            let pool = self.config.queues.for_stage(stage);
            broker.declare(&pool.queue_name, pool.prefetch).await?;
        }

        let inner = Arc::new(SchedulerInner {
            discovery: DiscoveryStage::new(self.config.discovery.clone()),
            extraction: ExtractionStage::new(self.extractor, self.config.extraction.clone()),
            grouping: GroupingStage::new(),
            insertion: InsertionStage::new(self.store, self.config.insertion.clone()),
            events: self.events.unwrap_or_else(|| Arc::new(TracingSink)),
            runs: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            broker,
            config: self.config,
        });

        let mut workers = Vec::new();
        for stage in StageKind::ALL {
            let pool = inner.config.queues.for_stage(stage);
            for worker in 0..pool.size {
                workers.push(tokio::spawn(worker_loop(inner.clone(), stage, worker)));
            }
            tracing::debug!(%stage, queue = %pool.queue_name, workers = pool.size, "Worker pool started");
        }
        tracing::info!(workers = workers.len(), "Pipeline scheduler started");

        Ok(PipelineScheduler {
            inner,
            workers: Mutex::new(workers),
        })
    }
}

/// Routes tasks between the stage queues and tracks runs
pub struct PipelineScheduler {
    inner: Arc<SchedulerInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PipelineScheduler {
    pub fn builder(
        config: PipelineConfig,
        extractor: Arc<dyn MetadataExtractor>,
        store: Arc<dyn Store>,
    ) -> SchedulerBuilder {
        SchedulerBuilder {
            config,
            extractor,
            store,
            broker: None,
            events: None,
        }
    }

    /// Start a scan run for `root`
    ///
    /// The root is validated before anything is queued.
    pub async fn submit_scan(&self, root: impl AsRef<Path>) -> Result<RunHandle> {
        self.submit(root.as_ref(), TaskClass::Scan).await
    }

    /// Start a low-priority rescan; queued scan work is always served first
    pub async fn submit_maintenance_scan(&self, root: impl AsRef<Path>) -> Result<RunHandle> {
        self.submit(root.as_ref(), TaskClass::Maintenance).await
    }

    async fn submit(&self, root: &Path, class: TaskClass) -> Result<RunHandle> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(PipelineError::Queue("scheduler is shut down".into()));
        }
        let root = DiscoveryStage::check_root(root)?;

        let run_id = RunId::generate();
        let tracker = Arc::new(RunTracker::new(run_id.clone(), root.clone()));
        let handle = RunHandle::new(tracker.clone());
        self.inner.runs().insert(run_id.clone(), tracker.clone());

        let task = PipelineTask::new(
            run_id.clone(),
            BatchId::generate(),
            class,
            TaskPayload::Discover {
                root: root.clone(),
                batch_size: self.inner.config.discovery.batch_size,
            },
        );
        if let Err(e) = self.inner.dispatch(&tracker, task).await {
            self.inner.runs().remove(&run_id);
            return Err(e);
        }

        tracing::info!(%run_id, root = %root.display(), ?class, "Scan submitted");
        Ok(handle)
    }

    /// Runs that have not reached a terminal state
    pub fn active_runs(&self) -> usize {
        self.inner.runs().len()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Stop the worker pools
    ///
    /// Runs still in flight end `Failed`.
    pub async fn shutdown(&self) {
        self.inner.close();

        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "Worker ended abnormally");
            }
        }
        tracing::info!("Pipeline scheduler stopped");
    }
}

impl Drop for PipelineScheduler {
    fn drop(&mut self) {
        self.inner.close();
    }
}

struct SchedulerInner {
    config: PipelineConfig,
    broker: Arc<dyn TaskQueue>,
    discovery: DiscoveryStage,
    extraction: ExtractionStage,
    grouping: GroupingStage,
    insertion: InsertionStage,
    events: Arc<dyn EventSink>,
    runs: Mutex<HashMap<RunId, Arc<RunTracker>>>,
    closed: AtomicBool,
}

impl SchedulerInner {
    fn runs(&self) -> MutexGuard<'_, HashMap<RunId, Arc<RunTracker>>> {
        self.runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.broker.close();
        let runs: Vec<_> = self.runs().drain().map(|(_, tracker)| tracker).collect();
        for tracker in runs {
            tracker.abort("scheduler shut down before the run finished");
        }
    }

    /// Register and publish a task on its stage queue
    async fn dispatch(&self, tracker: &RunTracker, task: PipelineTask) -> Result<()> {
        let stage = task.stage();
        let pool = self.config.queues.for_stage(stage);
        let priority = pool.priority_for(task.class);

        tracker.task_queued(stage);
        if let Err(e) = self.broker.publish(&pool.queue_name, task, priority).await {
            tracker.task_done(stage);
            return Err(e);
        }
        Ok(())
    }

    async fn handle(&self, delivery: Delivery) {
        let task = delivery.task().clone();
        let stage = task.stage();

        let tracker = self.runs().get(&task.run_id).cloned();
        let Some(tracker) = tracker else {
            tracing::warn!(run_id = %task.run_id, task_id = %task.task_id, %stage, "Task for unknown run, dropping");
            delivery.ack();
            return;
        };

        self.events.emit(StageEvent::Started {
            run_id: task.run_id.clone(),
            batch_id: task.batch_id.clone(),
            stage,
            items: task.payload.item_count(),
        });

        let result = match &task.payload {
            TaskPayload::Discover { root, batch_size } => {
                self.discover(&tracker, &task, root, *batch_size).await
            }
            TaskPayload::Extract { files } => self.extract(&tracker, &task, files).await,
            TaskPayload::Group { records } => self.group(&tracker, &task, records).await,
            TaskPayload::Insert { batch } => self.insert(&tracker, batch).await,
        };

        match result {
            Ok(stats) => self.events.emit(StageEvent::Finished {
                run_id: task.run_id.clone(),
                batch_id: task.batch_id.clone(),
                stage,
                stats,
            }),
            Err(e) => {
                tracing::error!(
                    run_id = %task.run_id,
                    batch_id = %task.batch_id,
                    %stage,
                    error = %e,
                    "Batch failed"
                );
                tracker.record_failure(stage, Some(task.batch_id.clone()), e.to_string());
                self.events.emit(StageEvent::Failed {
                    run_id: task.run_id.clone(),
                    batch_id: task.batch_id.clone(),
                    stage,
                    error: e.to_string(),
                });
            }
        }

        delivery.ack();
        tracker.task_done(stage);
        if tracker.state().is_terminal() {
            self.runs().remove(&task.run_id);
        }
    }

    async fn discover(
        &self,
        tracker: &RunTracker,
        task: &PipelineTask,
        root: &Path,
        batch_size: usize,
    ) -> Result<StageStats> {
        let start = Instant::now();
        let (mut batches, walk) = self.discovery.discover_with_batch_size(root, batch_size)?;

        let mut emitted = 0;
        while let Some(files) = batches.recv().await {
            tracker.add_discovered(files.len());
            emitted += 1;
            self.dispatch(tracker, task.spawn_batch(TaskPayload::Extract { files }))
                .await?;
        }

        let report = walk
            .await
            .map_err(|e| PipelineError::batch(StageKind::Discovery, e.to_string()))??;
        tracker.add_dirs_skipped(report.dirs_skipped);

        Ok(StageStats::new(report.files_found, emitted, start.elapsed())
            .with_failures(report.unreadable_entries, report.dirs_skipped))
    }

    async fn extract(
        &self,
        tracker: &RunTracker,
        task: &PipelineTask,
        files: &[DiscoveredFile],
    ) -> Result<StageStats> {
        let report = self.extraction.extract(files).await?;
        tracker.add_extraction(&report);

        let stats = StageStats::new(files.len(), report.records.len(), report.elapsed)
            .with_failures(report.failed, report.skipped);
        self.dispatch(
            tracker,
            task.follow_up(TaskPayload::Group {
                records: report.records,
            }),
        )
        .await?;
        Ok(stats)
    }

    async fn group(
        &self,
        tracker: &RunTracker,
        task: &PipelineTask,
        records: &[ExtractedMetadata],
    ) -> Result<StageStats> {
        let start = Instant::now();
        let report = self.grouping.group(records);
        tracker.add_grouping(&report);

        let stats = StageStats::new(records.len(), report.tracks, start.elapsed());
        self.dispatch(
            tracker,
            task.follow_up(TaskPayload::Insert {
                batch: report.batch,
            }),
        )
        .await?;
        Ok(stats)
    }

    async fn insert(&self, tracker: &RunTracker, batch: &InsertionBatch) -> Result<StageStats> {
        let report = self.insertion.insert(batch).await?;
        tracker.add_insertion(&report);

        let attempted = report.artists.attempted + report.albums.attempted + report.tracks.attempted;
        Ok(
            StageStats::new(attempted, report.inserted_total(), report.elapsed)
                .with_failures(report.failed_total(), 0),
        )
    }
}

async fn worker_loop(inner: Arc<SchedulerInner>, stage: StageKind, worker: usize) {
    let queue = inner.config.queues.for_stage(stage).queue_name.clone();
    tracing::trace!(%stage, worker, "Worker waiting for tasks");

    while let Some(delivery) = inner.broker.receive(&queue).await {
        inner.handle(delivery).await;
    }

    tracing::trace!(%stage, worker, "Worker stopped");
}

/// Run one scan to completion on a private scheduler
pub async fn run_scan(
    config: PipelineConfig,
    extractor: Arc<dyn MetadataExtractor>,
    store: Arc<dyn Store>,
    root: impl AsRef<Path>,
) -> Result<RunReport> {
    let scheduler = PipelineScheduler::builder(config, extractor, store)
        .start()
        .await?;

    let result = match scheduler.submit_scan(root).await {
        Ok(handle) => Ok(handle.wait().await),
        Err(e) => Err(e),
    };
    scheduler.shutdown().await;
    result
}

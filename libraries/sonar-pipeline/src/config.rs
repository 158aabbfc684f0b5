//! Pipeline configuration
//!
//! Every field has a default so a partial TOML section (or none at all)
//! deserializes into a working configuration.

use crate::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use sonar_core::{StageKind, TaskClass};
use std::time::Duration;

/// Message priority given to maintenance tasks on every queue
pub const MAINTENANCE_PRIORITY: u8 = 0;

/// Hard cap on blocking workers per stage
pub const MAX_STAGE_WORKERS: usize = 32;

/// Top-level pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub discovery: DiscoveryConfig,
    pub extraction: ExtractionConfig,
    pub insertion: InsertionConfig,
    pub queues: QueuesConfig,
}

impl PipelineConfig {
    /// Reject configurations that would stall or panic a stage
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("discovery.batch_size", self.discovery.batch_size),
            ("discovery.max_workers", self.discovery.max_workers),
            ("extraction.max_workers", self.extraction.max_workers),
            ("insertion.artist_batch_size", self.insertion.artist_batch_size),
            ("insertion.album_batch_size", self.insertion.album_batch_size),
            ("insertion.track_batch_size", self.insertion.track_batch_size),
            (
                "insertion.max_concurrent_calls",
                self.insertion.max_concurrent_calls,
            ),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(PipelineError::Config(format!("{} must be at least 1", name)));
            }
        }

        if self.discovery.subdir_timeout_secs == 0
            || self.extraction.file_timeout_secs == 0
            || self.extraction.batch_timeout_secs == 0
        {
            return Err(PipelineError::Config("timeouts must be non-zero".into()));
        }

        let mut names = Vec::with_capacity(StageKind::ALL.len());
        for stage in StageKind::ALL {
            let pool = self.queues.for_stage(stage);
            if pool.size == 0 || pool.prefetch == 0 {
                return Err(PipelineError::Config(format!(
                    "{} pool needs at least one worker and a prefetch of at least 1",
                    stage
                )));
            }
            if pool.priority <= MAINTENANCE_PRIORITY {
                return Err(PipelineError::Config(format!(
                    "{} queue priority must be above {}",
                    stage, MAINTENANCE_PRIORITY
                )));
            }
            if pool.queue_name.trim().is_empty() {
                return Err(PipelineError::Config(format!("{} queue needs a name", stage)));
            }
            if names.contains(&pool.queue_name) {
                return Err(PipelineError::Config(format!(
                    "queue name '{}' is used by more than one stage",
                    pool.queue_name
                )));
            }
            names.push(pool.queue_name.clone());
        }

        Ok(())
    }
}

/// Directory walking settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Paths per emitted batch
    pub batch_size: usize,

    /// Upper bound on concurrent subdirectory walkers
    pub max_workers: usize,

    /// Budget for walking one top-level subdirectory
    pub subdir_timeout_secs: u64,
}

impl DiscoveryConfig {
    pub fn subdir_timeout(&self) -> Duration {
        Duration::from_secs(self.subdir_timeout_secs)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            max_workers: MAX_STAGE_WORKERS,
            subdir_timeout_secs: 3_600,
        }
    }
}

/// Tag extraction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Concurrent per-file extraction jobs
    pub max_workers: usize,

    /// Budget for a single file
    pub file_timeout_secs: u64,

    /// Budget for a whole batch
    pub batch_timeout_secs: u64,
}

impl ExtractionConfig {
    pub fn file_timeout(&self) -> Duration {
        Duration::from_secs(self.file_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get().clamp(1, MAX_STAGE_WORKERS),
            file_timeout_secs: 300,
            batch_timeout_secs: 3_600,
        }
    }
}

/// Store write settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsertionConfig {
    pub artist_batch_size: usize,
    pub album_batch_size: usize,
    pub track_batch_size: usize,

    /// Sub-batches of one entity type in flight at once
    pub max_concurrent_calls: usize,
}

impl InsertionConfig {
    /// Sub-batch size for an entity type
    pub fn batch_size_for(&self, kind: sonar_core::EntityKind) -> usize {
        match kind {
            sonar_core::EntityKind::Artist => self.artist_batch_size,
            sonar_core::EntityKind::Album => self.album_batch_size,
            sonar_core::EntityKind::Track => self.track_batch_size,
        }
    }
}

impl Default for InsertionConfig {
    fn default() -> Self {
        Self {
            artist_batch_size: 500,
            album_batch_size: 300,
            track_batch_size: 1_000,
            max_concurrent_calls: 8,
        }
    }
}

/// Worker pool attached to one stage queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Number of consumers
    pub size: usize,

    pub queue_name: String,

    /// Message priority for scan tasks on this queue
    pub priority: u8,

    /// Maximum un-acked deliveries on the queue
    pub prefetch: usize,
}

impl WorkerPoolConfig {
    pub fn new(queue_name: impl Into<String>, size: usize, prefetch: usize) -> Self {
        Self {
            size,
            queue_name: queue_name.into(),
            priority: 9,
            prefetch,
        }
    }

    /// Message priority for a task of the given class
    pub fn priority_for(&self, class: TaskClass) -> u8 {
        match class {
            TaskClass::Scan => self.priority,
            TaskClass::Maintenance => MAINTENANCE_PRIORITY,
        }
    }
}

/// One worker pool per stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueuesConfig {
    pub discovery: WorkerPoolConfig,
    pub extraction: WorkerPoolConfig,
    pub grouping: WorkerPoolConfig,
    pub insertion: WorkerPoolConfig,
}

impl QueuesConfig {
    pub fn for_stage(&self, stage: StageKind) -> &WorkerPoolConfig {
        match stage {
            StageKind::Discovery => &self.discovery,
            StageKind::Extraction => &self.extraction,
            StageKind::Grouping => &self.grouping,
            StageKind::Insertion => &self.insertion,
        }
    }
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            discovery: WorkerPoolConfig::new("sonar.discovery", 4, 8),
            extraction: WorkerPoolConfig::new("sonar.extraction", 2, 2),
            grouping: WorkerPoolConfig::new("sonar.grouping", 1, 1),
            insertion: WorkerPoolConfig::new("sonar.insertion", 4, 8),
        }
    }
}

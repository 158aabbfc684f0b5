/// Task envelope carried on the stage queues
use crate::types::aggregate::InsertionBatch;
use crate::types::ids::{BatchId, RunId, TaskId};
use crate::types::metadata::{DiscoveredFile, ExtractedMetadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Pipeline stages, in flow order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Discovery,
    Extraction,
    Grouping,
    Insertion,
}

impl StageKind {
    /// All stages in flow order
    pub const ALL: [StageKind; 4] = [
        StageKind::Discovery,
        StageKind::Extraction,
        StageKind::Grouping,
        StageKind::Insertion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Discovery => "discovery",
            StageKind::Extraction => "extraction",
            StageKind::Grouping => "grouping",
            StageKind::Insertion => "insertion",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling class of a task
///
/// Scan work is published above maintenance work in every queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskClass {
    #[default]
    Scan,
    Maintenance,
}

/// Stage-specific task payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Walk a root directory
    Discover { root: PathBuf, batch_size: usize },

    /// Extract metadata from a batch of files
    Extract { files: Vec<DiscoveredFile> },

    /// Group extracted records into aggregates
    Group { records: Vec<ExtractedMetadata> },

    /// Persist a grouped batch
    Insert { batch: InsertionBatch },
}

impl TaskPayload {
    /// Stage that handles this payload
    pub fn stage(&self) -> StageKind {
        match self {
            TaskPayload::Discover { .. } => StageKind::Discovery,
            TaskPayload::Extract { .. } => StageKind::Extraction,
            TaskPayload::Group { .. } => StageKind::Grouping,
            TaskPayload::Insert { .. } => StageKind::Insertion,
        }
    }

    /// Number of items carried, for logging
    pub fn item_count(&self) -> usize {
        match self {
            TaskPayload::Discover { .. } => 1,
            TaskPayload::Extract { files } => files.len(),
            TaskPayload::Group { records } => records.len(),
            TaskPayload::Insert { batch } => {
                batch.artists.len() + batch.albums.len() + batch.tracks.len()
            }
        }
    }
}

/// Envelope for one unit of queued work
///
/// A task belongs to exactly one run. Follow-up tasks keep the run and batch
/// identifiers so a batch can be traced from discovery to insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTask {
    pub task_id: TaskId,
    pub run_id: RunId,
    pub batch_id: BatchId,
    pub class: TaskClass,
    pub payload: TaskPayload,
    pub created_at: DateTime<Utc>,
}

impl PipelineTask {
    /// Create a task for a run
    pub fn new(run_id: RunId, batch_id: BatchId, class: TaskClass, payload: TaskPayload) -> Self {
        Self {
            task_id: TaskId::generate(),
            run_id,
            batch_id,
            class,
            payload,
            created_at: Utc::now(),
        }
    }

    /// Create the next stage's task for the same run and batch
    pub fn follow_up(&self, payload: TaskPayload) -> Self {
        Self::new(self.run_id.clone(), self.batch_id.clone(), self.class, payload)
    }

    /// Create a task for a new batch within the same run
    pub fn spawn_batch(&self, payload: TaskPayload) -> Self {
        Self::new(self.run_id.clone(), BatchId::generate(), self.class, payload)
    }

    pub fn stage(&self) -> StageKind {
        self.payload.stage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follow_up_keeps_run_and_batch() {
        let task = PipelineTask::new(
            RunId::generate(),
            BatchId::generate(),
            TaskClass::Scan,
            TaskPayload::Extract { files: Vec::new() },
        );
        let next = task.follow_up(TaskPayload::Group {
            records: Vec::new(),
        });

        assert_eq!(next.run_id, task.run_id);
        assert_eq!(next.batch_id, task.batch_id);
        assert_ne!(next.task_id, task.task_id);
        assert_eq!(next.stage(), StageKind::Grouping);
    }

    #[test]
    fn spawned_batches_get_new_batch_ids() {
        let task = PipelineTask::new(
            RunId::generate(),
            BatchId::generate(),
            TaskClass::Maintenance,
            TaskPayload::Discover {
                root: PathBuf::from("/music"),
                batch_size: 100,
            },
        );
        let child = task.spawn_batch(TaskPayload::Extract { files: Vec::new() });

        assert_eq!(child.run_id, task.run_id);
        assert_ne!(child.batch_id, task.batch_id);
        assert_eq!(child.class, TaskClass::Maintenance);
    }

    #[test]
    fn payload_round_trips_through_json() {
        let task = PipelineTask::new(
            RunId::new("run"),
            BatchId::new("batch"),
            TaskClass::Scan,
            TaskPayload::Extract {
                files: vec![DiscoveredFile::new(PathBuf::from("/m/a.mp3"))],
            },
        );
        let json = serde_json::to_string(&task).unwrap();
        let back: PipelineTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }
}

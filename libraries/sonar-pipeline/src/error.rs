//! Error types for the pipeline

use sonar_core::StageKind;
use thiserror::Error;

/// Stage-level and run-level pipeline errors.
///
/// Item-level failures (one bad file, one rejected sub-batch) never surface
/// here; stages count them in their reports instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid input detected before any work was queued
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// A whole batch could not be processed
    #[error("{stage} batch failed: {message}")]
    Batch { stage: StageKind, message: String },

    /// The broker refused or lost a task
    #[error("Queue error: {0}")]
    Queue(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn batch(stage: StageKind, message: impl Into<String>) -> Self {
        Self::Batch {
            stage,
            message: message.into(),
        }
    }
}

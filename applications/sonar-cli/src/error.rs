/// CLI error types
use sonar_core::StoreError;
use sonar_pipeline::PipelineError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to render report: {0}")]
    Render(#[from] serde_json::Error),
}

//! Sonar Pipeline
//!
//! Staged ingestion of a music library: discovery, extraction, grouping and
//! insertion, connected by priority queues.
//!
//! # Architecture
//!
//! - `stages`: the four stage components, each returning a report
//! - `queue`: the [`TaskQueue`] broker abstraction and [`MemoryBroker`]
//! - `scheduler`: worker pools that move tasks between stage queues
//! - `run`: per-run state machine and [`RunReport`]
//! - `events`: [`StageEvent`]s for progress reporting
//! - `memory_store`: an upserting in-memory [`sonar_core::Store`]
//!
//! # Example
//!
//! ```rust,no_run
//! use sonar_metadata::LoftyExtractor;
//! use sonar_pipeline::{run_scan, MemoryStore, PipelineConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> sonar_pipeline::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let report = run_scan(
//!     PipelineConfig::default(),
//!     Arc::new(LoftyExtractor::new()),
//!     store.clone(),
//!     "/srv/music",
//! )
//! .await?;
//!
//! println!("{}", report.summary_text());
//! # Ok(())
//! # }
//! ```

mod error;

pub mod config;
pub mod events;
pub mod memory_store;
pub mod normalize;
pub mod queue;
pub mod run;
pub mod scheduler;
pub mod stages;

pub use config::{
    DiscoveryConfig, ExtractionConfig, InsertionConfig, PipelineConfig, QueuesConfig,
    WorkerPoolConfig,
};
pub use error::PipelineError;
pub use events::{ChannelSink, EventSink, StageEvent, StageStats, TracingSink};
pub use memory_store::MemoryStore;
pub use queue::{Delivery, MemoryBroker, TaskQueue};
pub use run::{RunCounts, RunHandle, RunReport, RunState, StageFailure};
pub use scheduler::{run_scan, PipelineScheduler, SchedulerBuilder};

pub type Result<T> = std::result::Result<T, PipelineError>;

//! Sonar Core
//!
//! Domain types, collaborator traits and shared errors for the Sonar
//! ingestion pipeline.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Domain Types**: `DiscoveredFile`, `ExtractedMetadata`, the grouping
//!   aggregates, `InsertionBatch` and the `PipelineTask` envelope
//! - **Core Traits**: `MetadataExtractor` (tag parsing) and `Store`
//!   (batch persistence)
//! - **Error Handling**: `ExtractError` for per-file failures and `StoreError`
//!   for store calls
//!
//! # Example
//!
//! ```rust
//! use sonar_core::types::{DiscoveredFile, RunId};
//! use std::path::PathBuf;
//!
//! let run = RunId::generate();
//! let file = DiscoveredFile::new(PathBuf::from("/music/Artist/Album/01.flac"));
//! assert_eq!(file.extension, "flac");
//! assert!(!run.as_str().is_empty());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{ExtractError, StoreError, StoreResult};
pub use traits::{MetadataExtractor, Store};

pub use types::{
    // Aggregates and batches
    AlbumAggregate, AlbumKey, ArtistAggregate, EntityKind, InsertionBatch, TrackRecord,
    // Metadata
    AudioFeatures, DiscoveredFile, Extraction, ExternalIds, ExtractedMetadata, SkipReason,
    // Tasks
    BatchId, PipelineTask, RunId, StageKind, TaskClass, TaskId, TaskPayload,
};

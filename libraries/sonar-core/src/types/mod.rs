mod aggregate;
mod ids;
mod metadata;
mod task;

pub use aggregate::{
    AlbumAggregate, AlbumKey, ArtistAggregate, EntityKind, InsertionBatch, TrackRecord,
};
pub use ids::{BatchId, RunId, TaskId};
pub use metadata::{
    AudioFeatures, DiscoveredFile, Extraction, ExternalIds, ExtractedMetadata, SkipReason,
};
pub use task::{PipelineTask, StageKind, TaskClass, TaskPayload};

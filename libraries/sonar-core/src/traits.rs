/// Collaborator traits the pipeline is written against
use crate::error::{ExtractError, StoreResult};
use crate::types::{AlbumAggregate, ArtistAggregate, Extraction, TrackRecord};
use async_trait::async_trait;
use std::path::Path;

/// Metadata extractor trait
///
/// Implementers read one audio file and return its metadata. Extraction is a
/// pure function of the path: no shared state, safe to call from many threads
/// at once.
pub trait MetadataExtractor: Send + Sync {
    /// Extract metadata from the file at `path`
    ///
    /// A file without tags is not an error: implementers return
    /// `Extraction::Extracted` with whatever the container exposes and let the
    /// pipeline fill in fallbacks. `Extraction::Skipped` is for files that are
    /// expected to yield nothing (empty files, unsupported containers).
    ///
    /// # Errors
    /// Returns an error if the file is corrupt or cannot be read
    fn extract(&self, path: &Path) -> Result<Extraction, ExtractError>;
}

/// Store trait
///
/// Batch-create endpoints for each entity type. Implementations must have
/// upsert semantics: calling them again with overlapping data updates rather
/// than duplicates. Each method returns the number of records the store
/// created or updated.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create or update a batch of artists
    async fn create_artists(&self, artists: &[ArtistAggregate]) -> StoreResult<usize>;

    /// Create or update a batch of albums
    ///
    /// Albums reference artists by normalized key; the store resolves keys
    /// to its own identifiers.
    async fn create_albums(&self, albums: &[AlbumAggregate]) -> StoreResult<usize>;

    /// Create or update a batch of tracks
    async fn create_tracks(&self, tracks: &[TrackRecord]) -> StoreResult<usize>;
}

//! Store insertion
//!
//! Writes a grouped batch to the store in the order artists, albums, tracks
//! so every reference resolves. Each entity list is split into sub-batches
//! that run concurrently; a failed sub-batch is logged and excluded while the
//! rest proceed.

use crate::config::InsertionConfig;
use crate::events::per_second;
use crate::{PipelineError, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use sonar_core::{
    AlbumAggregate, ArtistAggregate, EntityKind, InsertionBatch, StageKind, Store, StoreResult,
    TrackRecord,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome for one entity type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    /// Records handed to the stage
    pub attempted: usize,

    /// Records the store reported as created or updated
    pub inserted: usize,

    /// Records in sub-batches the store rejected
    pub failed: usize,

    pub calls: usize,
    pub failed_calls: usize,
}

/// Result of inserting one batch
#[derive(Debug, Clone, Default)]
pub struct InsertionReport {
    pub artists: EntityCounts,
    pub albums: EntityCounts,
    pub tracks: EntityCounts,
    pub elapsed: Duration,
}

impl InsertionReport {
    pub fn counts(&self, kind: EntityKind) -> &EntityCounts {
        match kind {
            EntityKind::Artist => &self.artists,
            EntityKind::Album => &self.albums,
            EntityKind::Track => &self.tracks,
        }
    }

    fn counts_mut(&mut self, kind: EntityKind) -> &mut EntityCounts {
        match kind {
            EntityKind::Artist => &mut self.artists,
            EntityKind::Album => &mut self.albums,
            EntityKind::Track => &mut self.tracks,
        }
    }

    pub fn inserted_total(&self) -> usize {
        self.artists.inserted + self.albums.inserted + self.tracks.inserted
    }

    pub fn failed_total(&self) -> usize {
        self.artists.failed + self.albums.failed + self.tracks.failed
    }

    pub fn records_per_sec(&self) -> f64 {
        let attempted = self.artists.attempted + self.albums.attempted + self.tracks.attempted;
        per_second(attempted, self.elapsed)
    }
}

#[derive(Clone, Copy)]
enum SubBatch<'a> {
    Artists(&'a [ArtistAggregate]),
    Albums(&'a [AlbumAggregate]),
    Tracks(&'a [TrackRecord]),
}

impl SubBatch<'_> {
    fn len(&self) -> usize {
        match self {
            SubBatch::Artists(records) => records.len(),
            SubBatch::Albums(records) => records.len(),
            SubBatch::Tracks(records) => records.len(),
        }
    }

    async fn send(self, store: &dyn Store) -> StoreResult<usize> {
        match self {
            SubBatch::Artists(records) => store.create_artists(records).await,
            SubBatch::Albums(records) => store.create_albums(records).await,
            SubBatch::Tracks(records) => store.create_tracks(records).await,
        }
    }
}

fn split(batch: &InsertionBatch, kind: EntityKind, size: usize) -> Vec<SubBatch<'_>> {
    let size = size.max(1);
    match kind {
        EntityKind::Artist => batch.artists.chunks(size).map(SubBatch::Artists).collect(),
        EntityKind::Album => batch.albums.chunks(size).map(SubBatch::Albums).collect(),
        EntityKind::Track => batch.tracks.chunks(size).map(SubBatch::Tracks).collect(),
    }
}

/// Insertion stage
pub struct InsertionStage {
    store: Arc<dyn Store>,
    config: InsertionConfig,
}

impl InsertionStage {
    pub fn new(store: Arc<dyn Store>, config: InsertionConfig) -> Self {
        Self { store, config }
    }

    /// Insert a batch, entity type by entity type
    ///
    /// Fails only when every call for an entity type hit a connectivity
    /// error; rejected sub-batches are counted instead.
    pub async fn insert(&self, batch: &InsertionBatch) -> Result<InsertionReport> {
        let start = Instant::now();
        let mut report = InsertionReport::default();

        for kind in EntityKind::ORDER {
            *report.counts_mut(kind) = self.insert_kind(batch, kind).await?;
        }

        report.elapsed = start.elapsed();
        tracing::debug!(
            artists = report.artists.inserted,
            albums = report.albums.inserted,
            tracks = report.tracks.inserted,
            failed = report.failed_total(),
            records_per_sec = format_args!("{:.1}", report.records_per_sec()),
            "Inserted batch"
        );
        Ok(report)
    }

    async fn insert_kind(&self, batch: &InsertionBatch, kind: EntityKind) -> Result<EntityCounts> {
        let sub_batches = split(batch, kind, self.config.batch_size_for(kind));
        let mut counts = EntityCounts {
            attempted: batch.len_of(kind),
            calls: sub_batches.len(),
            ..EntityCounts::default()
        };
        if sub_batches.is_empty() {
            return Ok(counts);
        }

        let store = self.store.as_ref();
        let results: Vec<_> = stream::iter(sub_batches)
            .map(|sub| async move { (sub.len(), sub.send(store).await) })
            .buffer_unordered(self.config.max_concurrent_calls.max(1))
            .boxed()
            .collect()
            .await;

        let mut unreachable = 0;
        for (records, result) in results {
            match result {
                Ok(inserted) => counts.inserted += inserted,
                Err(e) => {
                    counts.failed += records;
                    counts.failed_calls += 1;
                    if e.is_connectivity() {
                        unreachable += 1;
                    }
                    tracing::warn!(
                        entity = %kind,
                        records,
                        status = ?e.status(),
                        error = %e,
                        "Sub-batch rejected"
                    );
                }
            }
        }

        if unreachable == counts.calls {
            return Err(PipelineError::batch(
                StageKind::Insertion,
                format!("store unreachable while inserting {}", kind),
            ));
        }

        Ok(counts)
    }
}

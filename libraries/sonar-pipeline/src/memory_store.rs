//! In-memory store
//!
//! Upserts by the same keys a real store dedups on: artist key, album key
//! and track path. Used by `--dry-run` and by tests.

use async_trait::async_trait;
use sonar_core::{
    AlbumAggregate, AlbumKey, ArtistAggregate, Store, StoreError, StoreResult, TrackRecord,
};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    artists: BTreeMap<String, ArtistAggregate>,
    albums: BTreeMap<AlbumKey, AlbumAggregate>,
    tracks: BTreeMap<PathBuf, TrackRecord>,
}

/// Upserting store held in memory
///
/// Like a relational store it rejects albums whose artist is unknown and
/// tracks whose artist or album is unknown, so insertion order matters.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn artist_count(&self) -> usize {
        self.tables().artists.len()
    }

    pub fn album_count(&self) -> usize {
        self.tables().albums.len()
    }

    pub fn track_count(&self) -> usize {
        self.tables().tracks.len()
    }

    /// Snapshot of stored artists, sorted by key
    pub fn artists(&self) -> Vec<ArtistAggregate> {
        self.tables().artists.values().cloned().collect()
    }

    /// Snapshot of stored albums, sorted by key
    pub fn albums(&self) -> Vec<AlbumAggregate> {
        self.tables().albums.values().cloned().collect()
    }

    pub fn track(&self, path: &std::path::Path) -> Option<TrackRecord> {
        self.tables().tracks.get(path).cloned()
    }
}

fn unknown_reference(what: &str, key: &str) -> StoreError {
    StoreError::Server {
        status: 422,
        message: format!("unknown {} '{}'", what, key),
    }
}

/// Count distinct keys in a call, as a store returning one row per upsert would
fn distinct<K: std::hash::Hash + Eq>(keys: impl Iterator<Item = K>) -> usize {
    keys.collect::<HashSet<_>>().len()
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_artists(&self, artists: &[ArtistAggregate]) -> StoreResult<usize> {
        let mut tables = self.tables();
        for artist in artists {
            tables
                .artists
                .entry(artist.key.clone())
                .and_modify(|existing| {
                    existing.track_count = existing.track_count.saturating_add(artist.track_count);
                    if existing.musicbrainz_artist_id.is_none() {
                        existing
                            .musicbrainz_artist_id
                            .clone_from(&artist.musicbrainz_artist_id);
                    }
                })
                .or_insert_with(|| artist.clone());
        }
        Ok(distinct(artists.iter().map(|a| &a.key)))
    }

    async fn create_albums(&self, albums: &[AlbumAggregate]) -> StoreResult<usize> {
        let mut tables = self.tables();
        if let Some(orphan) = albums
            .iter()
            .find(|album| !tables.artists.contains_key(&album.key.artist))
        {
            return Err(unknown_reference("artist", &orphan.key.artist));
        }

        for album in albums {
            tables
                .albums
                .entry(album.key.clone())
                .and_modify(|existing| {
                    existing.track_count = existing.track_count.saturating_add(album.track_count);
                })
                .or_insert_with(|| album.clone());
        }
        Ok(distinct(albums.iter().map(|a| &a.key)))
    }

    async fn create_tracks(&self, tracks: &[TrackRecord]) -> StoreResult<usize> {
        let mut tables = self.tables();
        for track in tracks {
            if !tables.artists.contains_key(&track.artist_key) {
                return Err(unknown_reference("artist", &track.artist_key));
            }
            if !tables.albums.contains_key(&track.album_key) {
                return Err(unknown_reference("album", &track.album_key.to_string()));
            }
        }

        for track in tracks {
            tables
                .tracks
                .insert(track.metadata.path.clone(), track.clone());
        }
        Ok(distinct(tracks.iter().map(|t| &t.metadata.path)))
    }
}

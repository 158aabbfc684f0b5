//! Artist and album grouping
//!
//! Collapses extracted records into deduplicated aggregates. Grouping is
//! pure and deterministic: the same records always produce the same batch.

use crate::normalize::{is_unknown, normalize_key, resolve_name, UNKNOWN_ALBUM, UNKNOWN_ARTIST};
use sonar_core::{
    AlbumAggregate, AlbumKey, ArtistAggregate, ExtractedMetadata, InsertionBatch, TrackRecord,
};
use std::collections::HashMap;

/// Grouped output of one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupingReport {
    pub batch: InsertionBatch,
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
}

/// Grouping stage (stateless)
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupingStage;

impl GroupingStage {
    pub fn new() -> Self {
        Self
    }

    /// Group records into artist, album and track lists sorted by key
    pub fn group(&self, records: &[ExtractedMetadata]) -> GroupingReport {
        let mut artists: HashMap<String, ArtistAggregate> = HashMap::new();
        let mut albums: HashMap<AlbumKey, AlbumAggregate> = HashMap::new();
        let mut tracks = Vec::with_capacity(records.len());

        for meta in records {
            let artist_name = resolve_name(
                meta.artist.as_deref(),
                meta.grandparent_dir_name(),
                UNKNOWN_ARTIST,
            );
            let album_title =
                resolve_name(meta.album.as_deref(), meta.parent_dir_name(), UNKNOWN_ALBUM);
            let artist_key = normalize_key(&artist_name);

            upsert_artist(
                &mut artists,
                &artist_key,
                &artist_name,
                meta.external_ids.musicbrainz_artist_id.as_deref(),
            );

            // Album artist is display-only; the album stays keyed by the track artist
            let album_artist = meta
                .album_artist
                .as_deref()
                .map(str::trim)
                .filter(|name| !is_unknown(name))
                .map(str::to_string);

            let album_key = AlbumKey::new(normalize_key(&album_title), artist_key.clone());
            let album = albums
                .entry(album_key.clone())
                .or_insert_with(|| AlbumAggregate {
                    key: album_key.clone(),
                    title: album_title.clone(),
                    artist_name: artist_name.clone(),
                    album_artist: None,
                    track_count: 0,
                    year: None,
                    genre: None,
                    musicbrainz_release_id: None,
                });
            album.track_count += 1;
            if album.album_artist.is_none() {
                album.album_artist = album_artist;
            }
            if album.year.is_none() {
                album.year = meta.year;
            }
            if album.genre.is_none() {
                album.genre = meta.genre.clone();
            }
            if album.musicbrainz_release_id.is_none() {
                album.musicbrainz_release_id = meta.external_ids.musicbrainz_release_id.clone();
            }

            let mut metadata = meta.clone();
            if metadata.title.is_none() {
                metadata.title = Some(
                    meta.file_stem()
                        .map_or_else(|| meta.path.display().to_string(), str::to_string),
                );
            }
            tracks.push(TrackRecord {
                artist_key,
                album_key,
                metadata,
            });
        }

        let mut artists: Vec<_> = artists.into_values().collect();
        artists.sort_by(|a, b| a.key.cmp(&b.key));
        let mut albums: Vec<_> = albums.into_values().collect();
        albums.sort_by(|a, b| a.key.cmp(&b.key));
        tracks.sort_by(|a, b| a.metadata.path.cmp(&b.metadata.path));

        tracing::debug!(
            records = records.len(),
            artists = artists.len(),
            albums = albums.len(),
            "Grouped batch"
        );

        GroupingReport {
            artists: artists.len(),
            albums: albums.len(),
            tracks: tracks.len(),
            batch: InsertionBatch {
                artists,
                albums,
                tracks,
            },
        }
    }
}

fn upsert_artist(
    artists: &mut HashMap<String, ArtistAggregate>,
    key: &str,
    name: &str,
    musicbrainz_id: Option<&str>,
) {
    let artist = artists
        .entry(key.to_string())
        .or_insert_with(|| ArtistAggregate {
            key: key.to_string(),
            name: name.to_string(),
            track_count: 0,
            musicbrainz_artist_id: None,
        });
    artist.track_count += 1;
    if artist.musicbrainz_artist_id.is_none() {
        artist.musicbrainz_artist_id = musicbrainz_id.map(str::to_string);
    }
}

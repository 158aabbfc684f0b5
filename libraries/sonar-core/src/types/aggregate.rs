/// Grouping output: deduplicated aggregates and insertion batches
use crate::types::metadata::ExtractedMetadata;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity types persisted by the insertion stage, in insertion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Artist,
    Album,
    Track,
}

impl EntityKind {
    /// Insertion order: artists before albums before tracks
    pub const ORDER: [EntityKind; 3] = [EntityKind::Artist, EntityKind::Album, EntityKind::Track];

    /// Plural name, used for store endpoints and log fields
    pub fn plural(self) -> &'static str {
        match self {
            EntityKind::Artist => "artists",
            EntityKind::Album => "albums",
            EntityKind::Track => "tracks",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

/// Album identity before the store assigns an ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlbumKey {
    /// Normalized album title
    pub title: String,

    /// Normalized key of the album's artist
    pub artist: String,
}

impl AlbumKey {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
        }
    }
}

impl fmt::Display for AlbumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.artist, self.title)
    }
}

/// One artist, deduplicated by normalized name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistAggregate {
    /// Normalized name (dedup key)
    pub key: String,

    /// Display name as first seen
    pub name: String,

    /// Number of tracks by this artist
    pub track_count: u32,

    /// First-seen MusicBrainz artist ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub musicbrainz_artist_id: Option<String>,
}

/// One album, deduplicated by (normalized title, normalized track artist)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumAggregate {
    pub key: AlbumKey,

    /// Display title as first seen
    pub title: String,

    /// Display name of the track artist as first seen
    pub artist_name: String,

    /// First-seen album artist tag, kept for display only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_artist: Option<String>,

    pub track_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,

    /// First-seen MusicBrainz release ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub musicbrainz_release_id: Option<String>,
}

/// A track with back-references to its artist and album keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// Normalized key of the track artist
    pub artist_key: String,

    /// Key of the album the track belongs to
    pub album_key: AlbumKey,

    #[serde(flatten)]
    pub metadata: ExtractedMetadata,
}

/// Everything one grouping invocation hands to insertion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsertionBatch {
    pub artists: Vec<ArtistAggregate>,
    pub albums: Vec<AlbumAggregate>,
    pub tracks: Vec<TrackRecord>,
}

impl InsertionBatch {
    /// True when there is nothing to insert
    pub fn is_empty(&self) -> bool {
        self.artists.is_empty() && self.albums.is_empty() && self.tracks.is_empty()
    }

    /// Number of records of one entity type
    pub fn len_of(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Artist => self.artists.len(),
            EntityKind::Album => self.albums.len(),
            EntityKind::Track => self.tracks.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_order_is_artists_albums_tracks() {
        let names: Vec<_> = EntityKind::ORDER.iter().map(|k| k.plural()).collect();
        assert_eq!(names, vec!["artists", "albums", "tracks"]);
    }

    #[test]
    fn empty_batch() {
        let batch = InsertionBatch::default();
        assert!(batch.is_empty());
        assert_eq!(batch.len_of(EntityKind::Track), 0);
    }

    #[test]
    fn track_record_flattens_metadata() {
        let record = TrackRecord {
            artist_key: "radiohead".to_string(),
            album_key: AlbumKey::new("ok computer", "radiohead"),
            metadata: ExtractedMetadata {
                title: Some("Airbag".to_string()),
                ..ExtractedMetadata::new("/music/Radiohead/OK Computer/01 Airbag.flac")
            },
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["title"], "Airbag");
        assert_eq!(json["artist_key"], "radiohead");
        assert_eq!(json["album_key"]["title"], "ok computer");
    }
}

/// Discovered files and extracted per-track metadata
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// An audio file found during discovery
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscoveredFile {
    /// Absolute path to the file
    pub path: PathBuf,

    /// Lower-cased file extension (without the dot)
    pub extension: String,
}

impl DiscoveredFile {
    /// Create a discovered file, inferring the extension from the path
    pub fn new(path: PathBuf) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();
        Self { path, extension }
    }
}

/// Identifiers linking a track to external catalogues
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub musicbrainz_recording_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub musicbrainz_artist_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub musicbrainz_release_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acoustid_id: Option<String>,

    /// Chromaprint fingerprint, if one was computed or stored in tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl ExternalIds {
    /// True when no identifier is present
    pub fn is_empty(&self) -> bool {
        self.musicbrainz_recording_id.is_none()
            && self.musicbrainz_artist_id.is_none()
            && self.musicbrainz_release_id.is_none()
            && self.acoustid_id.is_none()
            && self.fingerprint.is_none()
    }
}

/// Optional audio features (tempo, key, mood scores)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    /// Tempo in beats per minute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo_bpm: Option<f32>,

    /// Musical key, e.g. "Am" or "C#"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Mood label -> score in [0, 1]
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub moods: BTreeMap<String, f32>,
}

impl AudioFeatures {
    /// True when no feature is present
    pub fn is_empty(&self) -> bool {
        self.tempo_bpm.is_none() && self.key.is_none() && self.moods.is_empty()
    }
}

/// Metadata extracted from one audio file
///
/// Only `path` is mandatory. Absent fields are `None` and are left out of
/// the serialized form entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    /// File the metadata was read from
    pub path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,

    /// Album artist (may differ from track artist on compilations)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_artist: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disc_number: Option<u32>,

    /// Duration in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Bitrate in kbps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,

    /// Sample rate in Hz
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,

    /// Container type, lower-case ("mp3", "flac", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,

    #[serde(default, skip_serializing_if = "ExternalIds::is_empty")]
    pub external_ids: ExternalIds,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<AudioFeatures>,
}

impl ExtractedMetadata {
    /// Create an empty record for a path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            title: None,
            artist: None,
            album: None,
            album_artist: None,
            genre: None,
            year: None,
            track_number: None,
            disc_number: None,
            duration_ms: None,
            bitrate: None,
            sample_rate: None,
            channels: None,
            file_type: None,
            external_ids: ExternalIds::default(),
            features: None,
        }
    }

    /// Name of the directory containing the file (album fallback)
    pub fn parent_dir_name(&self) -> Option<&str> {
        dir_name_at(&self.path, 1)
    }

    /// Name of the directory two levels up (artist fallback)
    pub fn grandparent_dir_name(&self) -> Option<&str> {
        dir_name_at(&self.path, 2)
    }

    /// File name without extension (title fallback)
    pub fn file_stem(&self) -> Option<&str> {
        self.path.file_stem().and_then(|s| s.to_str())
    }
}

fn dir_name_at(path: &Path, levels_up: usize) -> Option<&str> {
    let mut current = path;
    for _ in 0..levels_up {
        current = current.parent()?;
    }
    current
        .file_name()
        .and_then(|s| s.to_str())
        .filter(|s| !s.trim().is_empty())
}

/// Why an extractor produced no record for a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Zero-length file
    EmptyFile,

    /// Extension allowed but the container holds no audio stream
    NoAudio,
}

/// Outcome of extracting one file
///
/// A missing tag is an expected outcome, not an error, so it lives here
/// rather than in `ExtractError`.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Metadata read (possibly sparse)
    Extracted(ExtractedMetadata),

    /// Nothing to extract
    Skipped(SkipReason),
}

/// Metadata extractor implementation using lofty
use lofty::{Accessor, AudioFile, ItemKey, Probe, Tag, TaggedFileExt};
use sonar_core::{
    AudioFeatures, ExtractError, Extraction, ExternalIds, ExtractedMetadata, MetadataExtractor,
    SkipReason,
};
use std::path::Path;

const TEMPO_KEYS: &[&str] = &["TBPM", "BPM", "tmpo"];
const MUSICAL_KEY_KEYS: &[&str] = &["TKEY", "INITIALKEY", "KEY"];
const MOOD_LABEL_KEYS: &[&str] = &["TMOO", "MOOD"];
const MOOD_SCORE_PREFIX: &str = "MOOD_";
const ACOUSTID_KEYS: &[&str] = &["ACOUSTID_ID", "Acoustid Id"];
const FINGERPRINT_KEYS: &[&str] = &["ACOUSTID_FINGERPRINT", "Acoustid Fingerprint"];

/// Metadata extractor using the lofty library
#[derive(Debug, Clone)]
pub struct LoftyExtractor {
    /// Whether to read tempo/key/mood tags
    read_features: bool,
}

impl LoftyExtractor {
    /// Create a new extractor
    pub fn new() -> Self {
        Self {
            read_features: true,
        }
    }

    /// Set whether optional audio-feature tags are read (default: true)
    pub fn read_features(mut self, read: bool) -> Self {
        self.read_features = read;
        self
    }

    fn apply_tag(&self, meta: &mut ExtractedMetadata, tag: &Tag) {
        meta.title = clean(tag.title().as_deref());
        meta.artist = clean(tag.artist().as_deref());
        meta.album = clean(tag.album().as_deref());
        meta.album_artist = clean(tag.get_string(&ItemKey::AlbumArtist));
        meta.genre = clean(tag.genre().as_deref());
        meta.year = tag.year().and_then(|y| i32::try_from(y).ok());
        meta.track_number = tag.track();
        meta.disc_number = tag.disk();

        meta.external_ids = ExternalIds {
            musicbrainz_recording_id: clean(tag.get_string(&ItemKey::MusicBrainzRecordingId)),
            musicbrainz_artist_id: clean(tag.get_string(&ItemKey::MusicBrainzArtistId)),
            musicbrainz_release_id: clean(tag.get_string(&ItemKey::MusicBrainzReleaseId)),
            acoustid_id: find_text(tag, ACOUSTID_KEYS),
            fingerprint: find_text(tag, FINGERPRINT_KEYS),
        };

        if self.read_features {
            let features = read_features(tag);
            if !features.is_empty() {
                meta.features = Some(features);
            }
        }
    }
}

impl Default for LoftyExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataExtractor for LoftyExtractor {
    fn extract(&self, path: &Path) -> Result<Extraction, ExtractError> {
        let fs_meta = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExtractError::FileNotFound(path.to_path_buf())
            } else {
                ExtractError::Io(e)
            }
        })?;

        if fs_meta.len() == 0 {
            return Ok(Extraction::Skipped(SkipReason::EmptyFile));
        }

        let tagged_file = Probe::open(path)
            .map_err(|e| ExtractError::parse(path, format!("Failed to open file: {}", e)))?
            .read()
            .map_err(|e| ExtractError::parse(path, format!("Failed to read file: {}", e)))?;

        let mut meta = ExtractedMetadata::new(path);

        let properties = tagged_file.properties();
        let duration = properties.duration();
        if !duration.is_zero() {
            meta.duration_ms = Some(duration.as_millis() as u64);
        }
        meta.bitrate = properties.audio_bitrate().filter(|b| *b > 0);
        meta.sample_rate = properties.sample_rate();
        meta.channels = properties.channels();
        meta.file_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        // Prefer the format's native tag (ID3v2 for MP3, Vorbis comments for FLAC/OGG)
        let tag = tagged_file.primary_tag().or(tagged_file.first_tag());

        match tag {
            Some(tag) => self.apply_tag(&mut meta, tag),
            None if duration.is_zero() => {
                return Ok(Extraction::Skipped(SkipReason::NoAudio));
            }
            None => {
                tracing::debug!("No tags in {}, keeping audio properties only", path.display());
            }
        }

        Ok(Extraction::Extracted(meta))
    }
}

/// Trim a tag value and drop it if nothing is left
fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Find a text item by any of its format-specific key names
fn find_text(tag: &Tag, names: &[&str]) -> Option<String> {
    let tag_type = tag.tag_type();
    let text = tag
        .items()
        .find(|item| {
            item.key()
                .map_key(tag_type, true)
                .is_some_and(|key| names.iter().any(|name| key.eq_ignore_ascii_case(name)))
        })
        .and_then(|item| item.value().text());
    clean(text)
}

fn read_features(tag: &Tag) -> AudioFeatures {
    let mut features = AudioFeatures {
        tempo_bpm: find_text(tag, TEMPO_KEYS).and_then(|bpm| bpm.parse::<f32>().ok()),
        key: find_text(tag, MUSICAL_KEY_KEYS),
        ..AudioFeatures::default()
    };

    if let Some(label) = find_text(tag, MOOD_LABEL_KEYS) {
        features.moods.insert(label.to_lowercase(), 1.0);
    }

    // Analyzer-written scores such as MOOD_HAPPY=0.82
    let tag_type = tag.tag_type();
    for item in tag.items() {
        let Some(mood) = item
            .key()
            .map_key(tag_type, true)
            .and_then(|key| strip_prefix_ignore_case(key, MOOD_SCORE_PREFIX))
        else {
            continue;
        };
        let score = item
            .value()
            .text()
            .and_then(|text| text.trim().parse::<f32>().ok())
            .filter(|score| (0.0..=1.0).contains(score));
        if let Some(score) = score {
            features.moods.insert(mood.to_lowercase(), score);
        }
    }

    features
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    value.get(prefix.len()..).filter(|rest| !rest.is_empty())
}

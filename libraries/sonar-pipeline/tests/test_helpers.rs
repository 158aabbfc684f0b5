#![allow(dead_code)]

use sonar_core::{ExtractError, Extraction, ExtractedMetadata, MetadataExtractor, SkipReason};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Extractor for plain-text fixtures holding `key=value` tag lines
///
/// An empty file is skipped and a file starting with `CORRUPT` fails to
/// parse, mirroring what the lofty extractor does for real containers.
pub struct TagFileExtractor;

impl MetadataExtractor for TagFileExtractor {
    fn extract(&self, path: &Path) -> Result<Extraction, ExtractError> {
        let text = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExtractError::FileNotFound(path.to_path_buf())
            } else {
                ExtractError::Io(e)
            }
        })?;

        if text.is_empty() {
            return Ok(Extraction::Skipped(SkipReason::EmptyFile));
        }
        if text.starts_with("CORRUPT") {
            return Err(ExtractError::parse(path, "no valid frames"));
        }

        let mut meta = ExtractedMetadata::new(path);
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = Some(value.to_string());
            match key {
                "title" => meta.title = value,
                "artist" => meta.artist = value,
                "album" => meta.album = value,
                "album_artist" => meta.album_artist = value,
                "genre" => meta.genre = value,
                "year" => meta.year = value.and_then(|v| v.parse().ok()),
                "track" => meta.track_number = value.and_then(|v| v.parse().ok()),
                _ => {}
            }
        }
        meta.file_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        Ok(Extraction::Extracted(meta))
    }
}

/// Write a fixture file, creating parent directories
pub fn write_tagged(path: &Path, tags: &[(&str, &str)]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let body: String = tags
        .iter()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect();
    fs::write(path, body).unwrap();
}

/// Build `root/<artist>/<artist> Vol <n>/<track>.mp3` and return every path
pub fn build_library(
    root: &Path,
    artists: &[&str],
    albums_per_artist: usize,
    tracks_per_album: usize,
) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for artist in artists {
        for album_no in 1..=albums_per_artist {
            let album = format!("{} Vol {}", artist, album_no);
            for track_no in 1..=tracks_per_album {
                let title = format!("Track {}", track_no);
                let path = root
                    .join(artist)
                    .join(&album)
                    .join(format!("{:02} {}.mp3", track_no, title));
                let track = track_no.to_string();
                write_tagged(
                    &path,
                    &[
                        ("title", &title),
                        ("artist", artist),
                        ("album", &album),
                        ("track", &track),
                        ("year", "2004"),
                    ],
                );
                paths.push(path);
            }
        }
    }
    paths
}

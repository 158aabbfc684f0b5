//! Name normalization and path-based fallbacks
//!
//! Extraction fills the mandatory subset (title, artist, album) from the file
//! path when tags are missing; grouping derives dedup keys from the result.

use sonar_core::ExtractedMetadata;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Placeholder values taggers write instead of leaving a field empty
const PLACEHOLDERS: &[&str] = &["unknown", "unknown artist", "unknown album", "<unknown>", "[unknown]"];

/// Dedup key for an artist or album name
///
/// Trims, lower-cases (Unicode aware) and collapses inner whitespace runs, so
/// `"  The  Beatles "` and `"the beatles"` share a key.
pub fn normalize_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether a name carries no usable information
pub fn is_unknown(name: &str) -> bool {
    let key = normalize_key(name);
    key.is_empty() || PLACEHOLDERS.contains(&key.as_str())
}

/// Pick the first usable name, else the literal fallback
pub fn resolve_name(tagged: Option<&str>, inferred: Option<&str>, fallback: &str) -> String {
    tagged
        .into_iter()
        .chain(inferred)
        .map(str::trim)
        .find(|name| !is_unknown(name))
        .map_or_else(|| fallback.to_string(), str::to_string)
}

/// Apply the mandatory-field fallbacks to an extracted record
///
/// Blank strings become absent; title falls back to the file stem, artist to
/// the grandparent directory and album to the parent directory.
pub fn fill_fallbacks(mut meta: ExtractedMetadata) -> ExtractedMetadata {
    for field in [
        &mut meta.title,
        &mut meta.artist,
        &mut meta.album,
        &mut meta.album_artist,
        &mut meta.genre,
    ] {
        *field = field
            .take()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
    }

    if meta.title.is_none() {
        meta.title = meta.file_stem().map(str::to_string);
    }
    if meta.artist.as_deref().map_or(true, is_unknown) {
        meta.artist = meta
            .grandparent_dir_name()
            .filter(|name| !is_unknown(name))
            .map(str::to_string);
    }
    if meta.album.as_deref().map_or(true, is_unknown) {
        meta.album = meta
            .parent_dir_name()
            .filter(|name| !is_unknown(name))
            .map(str::to_string);
    }
    if meta.album_artist.as_deref().is_some_and(is_unknown) {
        meta.album_artist = None;
    }

    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_ignore_case_and_spacing() {
        assert_eq!(normalize_key("  The  Beatles "), "the beatles");
        assert_eq!(normalize_key("THE\tBEATLES"), "the beatles");
        assert_eq!(normalize_key("Sigur Rós"), "sigur rós");
        assert_eq!(normalize_key("ÉDITH PIAF"), "édith piaf");
    }

    #[test]
    fn placeholders_are_unknown() {
        assert!(is_unknown(""));
        assert!(is_unknown("   "));
        assert!(is_unknown("Unknown"));
        assert!(is_unknown("UNKNOWN ARTIST"));
        assert!(!is_unknown("Unknown Mortal Orchestra"));
    }

    #[test]
    fn resolve_prefers_tag_then_path_then_literal() {
        assert_eq!(resolve_name(Some("Low"), Some("dir"), UNKNOWN_ARTIST), "Low");
        assert_eq!(resolve_name(Some(" unknown "), Some("dir"), UNKNOWN_ARTIST), "dir");
        assert_eq!(resolve_name(None, None, UNKNOWN_ARTIST), UNKNOWN_ARTIST);
    }

    #[test]
    fn fallbacks_use_path_segments() {
        let meta = fill_fallbacks(ExtractedMetadata::new("/music/Stereolab/Dots and Loops/03 Brakhage.flac"));

        assert_eq!(meta.title.as_deref(), Some("03 Brakhage"));
        assert_eq!(meta.artist.as_deref(), Some("Stereolab"));
        assert_eq!(meta.album.as_deref(), Some("Dots and Loops"));
    }

    #[test]
    fn tagged_values_are_trimmed_and_kept() {
        let meta = fill_fallbacks(ExtractedMetadata {
            title: Some(" Brakhage ".into()),
            artist: Some("Stereolab".into()),
            album: Some("   ".into()),
            genre: Some("".into()),
            ..ExtractedMetadata::new("/music/x/Dots/03.flac")
        });

        assert_eq!(meta.title.as_deref(), Some("Brakhage"));
        assert_eq!(meta.artist.as_deref(), Some("Stereolab"));
        assert_eq!(meta.album.as_deref(), Some("Dots"));
        assert_eq!(meta.genre, None);
    }
}

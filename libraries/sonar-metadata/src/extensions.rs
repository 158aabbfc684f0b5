/// Supported audio file extensions
use std::path::Path;

/// Extensions (lower-case, no dot) accepted by discovery
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "oga", "opus", "wav", "aac", "m4a", "aiff", "aif", "wma", "ape", "wv",
];

/// Check if a file is a supported audio file
pub fn is_audio_file(path: &Path) -> bool {
    audio_extension(path).is_some()
}

/// Get the audio file extension from a path
pub fn audio_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .filter(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("test.mp3")));
        assert!(is_audio_file(Path::new("test.MP3")));
        assert!(is_audio_file(Path::new("test.flac")));
        assert!(is_audio_file(Path::new("dir/test.Opus")));
        assert!(!is_audio_file(Path::new("test.txt")));
        assert!(!is_audio_file(Path::new("cover.jpg")));
        assert!(!is_audio_file(Path::new("test")));
    }

    #[test]
    fn test_audio_extension() {
        assert_eq!(
            audio_extension(Path::new("test.M4A")),
            Some("m4a".to_string())
        );
        assert_eq!(audio_extension(Path::new("test.cue")), None);
    }
}

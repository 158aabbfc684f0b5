/// Error types shared by the pipeline collaborators
use std::path::PathBuf;
use thiserror::Error;

/// Failure to extract metadata from a single file.
///
/// Always an item-level error: the pipeline excludes the file and moves on.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// File vanished between discovery and extraction
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Corrupt file or malformed tag
    #[error("Tag parsing error in {path}: {message}")]
    Parse {
        /// File being parsed
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// I/O error while reading the file
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    /// Create a parse error for a file
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Errors returned by a `Store` batch call.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store answered with a non-success status
    #[error("Store error ({status}): {message}")]
    Server {
        /// HTTP (or HTTP-like) status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Store could not be reached at all (connection refused or never established)
    #[error("Store unreachable: {0}")]
    Unreachable(String),

    /// Store accepted the connection but did not answer in time
    #[error("Store request timed out: {0}")]
    Timeout(String),

    /// Store response could not be decoded
    #[error("Failed to parse store response: {0}")]
    Parse(String),

    /// Store rejected the request before sending (bad config, auth)
    #[error("Invalid store request: {0}")]
    InvalidRequest(String),
}

impl StoreError {
    /// Whether the error means the store is down rather than one call failing
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }

    /// Status code carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Result type for store calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_is_connectivity() {
        assert!(StoreError::Unreachable("connection refused".into()).is_connectivity());
        assert!(!StoreError::Timeout("operation timed out".into()).is_connectivity());
        assert!(!StoreError::Server {
            status: 500,
            message: "boom".into()
        }
        .is_connectivity());
    }

    #[test]
    fn status_only_for_server_errors() {
        let err = StoreError::Server {
            status: 503,
            message: String::new(),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(StoreError::Parse("bad json".into()).status(), None);
    }

    #[test]
    fn parse_error_message_mentions_path() {
        let err = ExtractError::parse("/music/broken.mp3", "bad frame header");
        assert!(err.to_string().contains("/music/broken.mp3"));
    }
}

//! Sonar Metadata
//!
//! Tag and audio-property extraction for the Sonar pipeline, built on
//! `lofty`.
//!
//! This crate provides:
//! - `LoftyExtractor`, the default `MetadataExtractor`
//! - The supported extension allow-list used by discovery
//!
//! # Example
//!
//! ```rust,no_run
//! use sonar_core::{Extraction, MetadataExtractor};
//! use sonar_metadata::LoftyExtractor;
//! use std::path::Path;
//!
//! let extractor = LoftyExtractor::new();
//! match extractor.extract(Path::new("/music/song.flac")) {
//!     Ok(Extraction::Extracted(meta)) => println!("{:?}", meta.title),
//!     Ok(Extraction::Skipped(reason)) => println!("skipped: {:?}", reason),
//!     Err(e) => eprintln!("failed: {}", e),
//! }
//! ```

mod extensions;
mod extractor;

pub use extensions::{audio_extension, is_audio_file, SUPPORTED_EXTENSIONS};
pub use extractor::LoftyExtractor;

//! Sonar command-line front end
//!
//! The binary lives in `main.rs`; configuration loading and the scan driver
//! are kept here so they can be exercised from tests.

pub mod config;
pub mod error;
pub mod scan;

pub use config::{CliConfig, StoreSettings};
pub use error::{CliError, Result};

//! Sonar Store Client
//!
//! HTTP implementation of the `Store` trait against a library store's
//! batch-create API.
//!
//! # Features
//!
//! - **Batch create**: `POST /api/{artists,albums,tracks}/batch` with upsert
//!   semantics on the server side
//! - **Connection reuse**: pooled keep-alive connections, concurrent calls
//!   bounded by `max_connections`
//! - **Error classification**: connection failures are reported as
//!   `StoreError::Unreachable` so callers can tell "store down" from
//!   "one call rejected"
//!
//! # Example
//!
//! ```ignore
//! use sonar_core::Store;
//! use sonar_store_client::{StoreClient, StoreConfig};
//!
//! let client = StoreClient::new(StoreConfig::new("https://library.example.com"))?;
//! client.ping().await?;
//! let created = client.create_artists(&artists).await?;
//! ```

mod client;
mod types;

pub use client::StoreClient;
pub use types::StoreConfig;

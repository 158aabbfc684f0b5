//! Configuration types for the store client.

use std::time::Duration;

/// Connection settings for a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL, e.g. `https://library.example.com`
    pub url: String,

    /// Bearer token sent with every call
    pub token: Option<String>,

    /// Maximum concurrent calls (and idle pooled connections)
    pub max_connections: usize,

    /// How long idle pooled connections are kept open
    pub keep_alive: Duration,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl StoreConfig {
    /// Create a config with default pool settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            max_connections: 16,
            keep_alive: Duration::from_secs(90),
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Attach a bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the connection limit.
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }
}

//! HTTP store client.

use crate::types::StoreConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use sonar_core::{
    AlbumAggregate, ArtistAggregate, EntityKind, Store, StoreError, StoreResult, TrackRecord,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Client for a library store's batch-create API.
///
/// Cloning is cheap: clones share the connection pool and the concurrency
/// limit.
#[derive(Clone)]
pub struct StoreClient {
    http: Client,
    base_url: String,
    token: Option<String>,
    permits: Arc<Semaphore>,
}

impl StoreClient {
    /// Create a new client with the given configuration.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        // Validate URL
        if config.url.is_empty() {
            return Err(StoreError::InvalidRequest("URL cannot be empty".into()));
        }

        let base_url = config.url.trim_end_matches('/').to_string();
        let parsed = url::Url::parse(&base_url)
            .map_err(|e| StoreError::InvalidRequest(format!("Invalid store URL: {}", e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(StoreError::InvalidRequest(
                "URL must start with http:// or https://".into(),
            ));
        }

        if config.max_connections == 0 {
            return Err(StoreError::InvalidRequest(
                "max_connections must be at least 1".into(),
            ));
        }

        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.max_connections)
            .pool_idle_timeout(config.keep_alive)
            .tcp_keepalive(config.keep_alive)
            .user_agent(format!("Sonar/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            token: config.token,
            permits: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Get the normalized base URL.
    pub fn url(&self) -> &str {
        &self.base_url
    }

    /// Check that the store is reachable.
    pub async fn ping(&self) -> StoreResult<()> {
        let url = format!("{}/api/health", self.base_url);
        debug!(url = %url, "Checking store health");

        let response = self
            .authorized(self.http.get(&url))
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(StoreError::Server {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// POST one batch and count the records the store returns.
    async fn post_batch<T: Serialize + Sync>(
        &self,
        kind: EntityKind,
        records: &[T],
    ) -> StoreResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| StoreError::Unreachable("store client closed".into()))?;

        let url = format!("{}/api/{}/batch", self.base_url, kind.plural());
        debug!(url = %url, records = records.len(), "Posting batch");

        let response = self
            .authorized(self.http.post(&url))
            .json(records)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();

        if status.is_success() {
            let body = response.text().await.map_err(classify)?;
            let created: Vec<serde_json::Value> = serde_json::from_str(&body)?;
            debug!(
                entity = %kind,
                sent = records.len(),
                created = created.len(),
                "Batch accepted"
            );
            Ok(created.len())
        } else {
            let message = response.text().await.unwrap_or_default();
            warn!(entity = %kind, status = status.as_u16(), "Batch rejected by store");
            Err(StoreError::Server {
                status: status.as_u16(),
                message,
            })
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl Store for StoreClient {
    async fn create_artists(&self, artists: &[ArtistAggregate]) -> StoreResult<usize> {
        self.post_batch(EntityKind::Artist, artists).await
    }

    async fn create_albums(&self, albums: &[AlbumAggregate]) -> StoreResult<usize> {
        self.post_batch(EntityKind::Album, albums).await
    }

    async fn create_tracks(&self, tracks: &[TrackRecord]) -> StoreResult<usize> {
        self.post_batch(EntityKind::Track, tracks).await
    }
}

/// Map transport errors, separating "store is down" from other failures.
///
/// Only a failed connect means the store is down; a slow answer fails the
/// one call.
fn classify(err: reqwest::Error) -> StoreError {
    if err.is_connect() {
        StoreError::Unreachable(err.to_string())
    } else if err.is_timeout() {
        StoreError::Timeout(err.to_string())
    } else if err.is_decode() || err.is_body() {
        StoreError::Parse(err.to_string())
    } else {
        StoreError::InvalidRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_url_rejected() {
        let result = StoreClient::new(StoreConfig::new(""));
        assert!(matches!(result, Err(StoreError::InvalidRequest(msg)) if msg.contains("empty")));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = StoreClient::new(StoreConfig::new("http://localhost:8080/")).unwrap();
        assert_eq!(client.url(), "http://localhost:8080");
    }

    #[test]
    fn zero_connections_rejected() {
        let config = StoreConfig::new("http://localhost:8080").with_max_connections(0);
        assert!(StoreClient::new(config).is_err());
    }

    #[tokio::test]
    async fn empty_batch_makes_no_call() {
        // Port 9 (discard) is never contacted for an empty batch
        let client = StoreClient::new(StoreConfig::new("http://127.0.0.1:9")).unwrap();
        assert_eq!(client.create_tracks(&[]).await.unwrap(), 0);
    }
}

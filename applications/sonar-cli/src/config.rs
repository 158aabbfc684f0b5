/// CLI configuration
use crate::error::{CliError, Result};
use serde::{Deserialize, Serialize};
use sonar_pipeline::PipelineConfig;
use sonar_store_client::StoreConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "sonar.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CliConfig {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl CliConfig {
    /// Load configuration from a TOML file and the environment
    ///
    /// Environment variables use the `SONAR_` prefix and `__` between
    /// sections, e.g. `SONAR_STORE__URL` or
    /// `SONAR_PIPELINE__DISCOVERY__BATCH_SIZE`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(CliError::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                settings = settings.add_source(config::File::from(path));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    settings = settings.add_source(config::File::from(default_path));
                }
            }
        }

        settings = settings.add_source(
            config::Environment::with_prefix("SONAR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = settings
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| CliError::Config(e.to_string()))
    }

    /// Validate configuration; a dry run does not need a store
    pub fn validate(&self, dry_run: bool) -> Result<()> {
        self.pipeline.validate()?;

        if !dry_run && self.store.url.trim().is_empty() {
            return Err(CliError::Config(
                "Store URL is required (set SONAR_STORE__URL or pass --store-url)".to_string(),
            ));
        }
        if self.store.max_connections == 0 {
            return Err(CliError::Config(
                "store.max_connections must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Client settings for the configured store
    pub fn store_config(&self) -> StoreConfig {
        let mut config = StoreConfig::new(self.store.url.trim())
            .with_max_connections(self.store.max_connections);
        if let Some(token) = &self.store.token {
            config = config.with_token(token.clone());
        }
        config.keep_alive = Duration::from_secs(self.store.keep_alive_secs);
        config.request_timeout = Duration::from_secs(self.store.request_timeout_secs);
        config
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: None,
            max_connections: default_max_connections(),
            keep_alive_secs: default_keep_alive_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// Default values
fn default_max_connections() -> usize {
    16
}

fn default_keep_alive_secs() -> u64 {
    90
}

fn default_request_timeout_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_need_a_store_url() {
        let config = CliConfig::default();
        assert!(matches!(config.validate(false), Err(CliError::Config(_))));
        assert!(config.validate(true).is_ok());
    }

    #[test]
    fn store_config_carries_pool_settings() {
        let mut config = CliConfig::default();
        config.store.url = " http://localhost:7700 ".to_string();
        config.store.token = Some("secret".to_string());
        config.store.max_connections = 4;
        config.store.keep_alive_secs = 5;

        let store = config.store_config();
        assert_eq!(store.url, "http://localhost:7700");
        assert_eq!(store.token.as_deref(), Some("secret"));
        assert_eq!(store.max_connections, 4);
        assert_eq!(store.keep_alive, Duration::from_secs(5));
        assert_eq!(store.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn invalid_pipeline_section_is_rejected() {
        let mut config = CliConfig::default();
        config.pipeline.discovery.batch_size = 0;
        assert!(matches!(config.validate(true), Err(CliError::Pipeline(_))));
    }
}

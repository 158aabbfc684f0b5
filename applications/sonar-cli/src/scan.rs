//! Scan driver shared by the `scan` subcommand and tests

use crate::config::CliConfig;
use crate::error::Result;
use sonar_core::Store;
use sonar_metadata::LoftyExtractor;
use sonar_pipeline::{run_scan, MemoryStore, RunReport};
use sonar_store_client::StoreClient;
use std::path::Path;
use std::sync::Arc;

/// Build the store, run one scan to completion and return its report
///
/// A dry run keeps records in memory; otherwise the configured store must
/// answer its health check before any work is scheduled.
pub async fn execute(config: &CliConfig, root: &Path, dry_run: bool) -> Result<RunReport> {
    let store: Arc<dyn Store> = if dry_run {
        tracing::info!("Dry run, records are kept in memory");
        Arc::new(MemoryStore::new())
    } else {
        let client = StoreClient::new(config.store_config())?;
        client.ping().await?;
        tracing::info!(url = client.url(), "Store reachable");
        Arc::new(client)
    };

    let report = run_scan(
        config.pipeline.clone(),
        Arc::new(LoftyExtractor::new()),
        store,
        root,
    )
    .await?;

    Ok(report)
}

/// Render a report as text or pretty JSON
pub fn render(report: &RunReport, json: bool) -> Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(report)?)
    } else {
        Ok(report.summary_text())
    }
}

//! Metadata extraction
//!
//! Runs the extractor over a batch on blocking threads, bounded by the
//! configured worker count. Per-file problems are counted, never raised.

use crate::config::ExtractionConfig;
use crate::events::per_second;
use crate::normalize::fill_fallbacks;
use crate::{PipelineError, Result};
use futures::stream::{self, StreamExt};
use sonar_core::{DiscoveredFile, Extraction, ExtractedMetadata, MetadataExtractor, StageKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of extracting one batch
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    /// Normalized records, one per processed file
    pub records: Vec<ExtractedMetadata>,

    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

impl ExtractionReport {
    pub fn files_per_sec(&self) -> f64 {
        per_second(self.processed + self.failed + self.skipped, self.elapsed)
    }
}

enum FileOutcome {
    Extracted(ExtractedMetadata),
    Skipped,
    Failed,
}

/// Extraction stage
pub struct ExtractionStage {
    extractor: Arc<dyn MetadataExtractor>,
    config: ExtractionConfig,
}

impl ExtractionStage {
    pub fn new(extractor: Arc<dyn MetadataExtractor>, config: ExtractionConfig) -> Self {
        Self { extractor, config }
    }

    /// Extract metadata for every file in the batch
    ///
    /// Only a batch timeout is an error; failed, skipped and timed-out files
    /// are counted in the report.
    pub async fn extract(&self, files: &[DiscoveredFile]) -> Result<ExtractionReport> {
        let start = Instant::now();
        let workers = self.config.max_workers.max(1);
        let file_timeout = self.config.file_timeout();

        let work = stream::iter(files.iter().map(|file| file.path.clone()))
            .map(|path| {
                let extractor = self.extractor.clone();
                async move { extract_one(extractor, path, file_timeout).await }
            })
            .buffer_unordered(workers)
            .boxed()
            .fold(ExtractionReport::default(), |mut report, outcome| async move {
                match outcome {
                    FileOutcome::Extracted(meta) => {
                        report.processed += 1;
                        report.records.push(fill_fallbacks(meta));
                    }
                    FileOutcome::Skipped => report.skipped += 1,
                    FileOutcome::Failed => report.failed += 1,
                }
                report
            });

        let mut report = tokio::time::timeout(self.config.batch_timeout(), work)
            .await
            .map_err(|_| {
                PipelineError::batch(
                    StageKind::Extraction,
                    format!(
                        "batch of {} files timed out after {}s",
                        files.len(),
                        self.config.batch_timeout_secs
                    ),
                )
            })?;

        report.elapsed = start.elapsed();
        tracing::debug!(
            files = files.len(),
            processed = report.processed,
            failed = report.failed,
            skipped = report.skipped,
            files_per_sec = format_args!("{:.1}", report.files_per_sec()),
            "Extracted batch"
        );
        Ok(report)
    }
}

async fn extract_one(
    extractor: Arc<dyn MetadataExtractor>,
    path: PathBuf,
    timeout: Duration,
) -> FileOutcome {
    let job = {
        let path = path.clone();
        tokio::task::spawn_blocking(move || extractor.extract(&path))
    };

    match tokio::time::timeout(timeout, job).await {
        Ok(Ok(Ok(Extraction::Extracted(meta)))) => FileOutcome::Extracted(meta),
        Ok(Ok(Ok(Extraction::Skipped(reason)))) => {
            tracing::debug!(path = %path.display(), ?reason, "Skipped file");
            FileOutcome::Skipped
        }
        Ok(Ok(Err(e))) => {
            tracing::debug!(path = %path.display(), error = %e, "Failed to extract metadata");
            FileOutcome::Failed
        }
        Ok(Err(e)) => {
            tracing::debug!(path = %path.display(), error = %e, "Extraction job panicked");
            FileOutcome::Failed
        }
        Err(_) => {
            tracing::debug!(
                path = %path.display(),
                timeout_secs = timeout.as_secs(),
                "Extraction timed out"
            );
            FileOutcome::Failed
        }
    }
}

//! Stage lifecycle events
//!
//! Workers report every task through an [`EventSink`]. The default sink logs
//! structured `tracing` events; [`ChannelSink`] forwards them to a consumer
//! such as a progress display or a test.

use serde::Serialize;
use sonar_core::{BatchId, RunId, StageKind};
use std::time::Duration;
use tokio::sync::mpsc;

/// Per-task statistics attached to a finished event
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageStats {
    /// Items handed to the stage
    pub items_in: usize,

    /// Items produced for the next stage
    pub items_out: usize,

    pub failed: usize,
    pub skipped: usize,
    pub elapsed_ms: u64,

    /// Input items per second
    pub throughput: f64,
}

impl StageStats {
    pub fn new(items_in: usize, items_out: usize, elapsed: Duration) -> Self {
        Self {
            items_in,
            items_out,
            elapsed_ms: elapsed.as_millis() as u64,
            throughput: per_second(items_in, elapsed),
            ..Self::default()
        }
    }

    pub fn with_failures(mut self, failed: usize, skipped: usize) -> Self {
        self.failed = failed;
        self.skipped = skipped;
        self
    }
}

/// Items per second, zero for an instantaneous task
pub(crate) fn per_second(items: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        items as f64 / secs
    } else {
        0.0
    }
}

/// Lifecycle event for one task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StageEvent {
    Started {
        run_id: RunId,
        batch_id: BatchId,
        stage: StageKind,
        items: usize,
    },
    Finished {
        run_id: RunId,
        batch_id: BatchId,
        stage: StageKind,
        stats: StageStats,
    },
    Failed {
        run_id: RunId,
        batch_id: BatchId,
        stage: StageKind,
        error: String,
    },
}

impl StageEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            StageEvent::Started { run_id, .. }
            | StageEvent::Finished { run_id, .. }
            | StageEvent::Failed { run_id, .. } => run_id,
        }
    }

    pub fn stage(&self) -> StageKind {
        match self {
            StageEvent::Started { stage, .. }
            | StageEvent::Finished { stage, .. }
            | StageEvent::Failed { stage, .. } => *stage,
        }
    }
}

/// Receiver of stage events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StageEvent);
}

/// Logs events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: StageEvent) {
        match event {
            StageEvent::Started {
                run_id,
                batch_id,
                stage,
                items,
            } => {
                tracing::debug!(%run_id, %batch_id, %stage, items, "Stage task started");
            }
            StageEvent::Finished {
                run_id,
                batch_id,
                stage,
                stats,
            } => {
                tracing::info!(
                    %run_id,
                    %batch_id,
                    %stage,
                    items_in = stats.items_in,
                    items_out = stats.items_out,
                    failed = stats.failed,
                    skipped = stats.skipped,
                    elapsed_ms = stats.elapsed_ms,
                    throughput = format_args!("{:.1}/s", stats.throughput),
                    "Stage task finished"
                );
            }
            StageEvent::Failed {
                run_id,
                batch_id,
                stage,
                error,
            } => {
                tracing::error!(%run_id, %batch_id, %stage, %error, "Stage task failed");
            }
        }
    }
}

/// Forwards events on an unbounded channel
///
/// Events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StageEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<StageEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StageEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: StageEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> StageEvent {
        StageEvent::Started {
            run_id: RunId::new("run"),
            batch_id: BatchId::new("batch"),
            stage: StageKind::Extraction,
            items: 3,
        }
    }

    #[test]
    fn throughput_is_zero_for_zero_elapsed() {
        assert_eq!(per_second(10, Duration::ZERO), 0.0);
        assert!((per_second(10, Duration::from_secs(2)) - 5.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn channel_sink_forwards_events() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.emit(started());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.stage(), StageKind::Extraction);
        assert_eq!(event.run_id().as_str(), "run");
    }

    #[test]
    fn channel_sink_ignores_closed_receiver() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);
        sink.emit(started());
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(started()).unwrap();
        assert_eq!(json["event"], "started");
        assert_eq!(json["stage"], "extraction");
    }
}

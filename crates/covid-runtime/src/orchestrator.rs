//! Async refresh orchestrator.
//!
//! Runs the pipeline on a tokio blocking thread once per interval and sends
//! each result through an `mpsc` channel as a [`RefreshUpdate`]. Tables are
//! shared behind `Arc` and never mutated after publication.

use std::time::Duration;

use chrono::{DateTime, Utc};
use covid_data::analysis::PipelineOutput;
use tokio::sync::mpsc;
use tokio::time;

use crate::data_manager::{DataManager, PipelineSource};

// ── Public types ──────────────────────────────────────────────────────────────

/// One refresh result forwarded to the consumer.
#[derive(Debug, Clone)]
pub struct RefreshUpdate {
    /// Latest available output; stale when the refresh itself failed.
    pub output: PipelineOutput,
    /// Number of refreshes attempted so far, starting at 1.
    pub refresh_count: u64,
    /// `true` when `output` comes from an earlier run.
    pub stale: bool,
    /// Error of the failed refresh, if any.
    pub last_error: Option<String>,
    pub refreshed_at: DateTime<Utc>,
}

// ── RefreshOrchestrator ───────────────────────────────────────────────────────

/// Background refresh coordinator.
///
/// Call [`RefreshOrchestrator::start`] to spawn the loop and receive the
/// channel end for [`RefreshUpdate`]s.
#[derive(Debug)]
pub struct RefreshOrchestrator {
    /// How often to rebuild the table.
    update_interval: Duration,
    source: PipelineSource,
}

impl RefreshOrchestrator {
    pub fn new(update_interval_secs: u64, source: PipelineSource) -> Self {
        Self {
            update_interval: Duration::from_secs(update_interval_secs),
            source,
        }
    }

    /// Start the refresh loop.
    ///
    /// Returns the receiver for updates and a [`RefreshHandle`] that aborts
    /// the loop. The loop also ends once the receiver is dropped.
    pub fn start(self) -> (mpsc::Receiver<RefreshUpdate>, RefreshHandle) {
        let (tx, rx) = mpsc::channel(4);

        let handle = tokio::spawn(async move {
            self.refresh_loop(tx).await;
        });

        (rx, RefreshHandle { handle })
    }

    // ── Private implementation ────────────────────────────────────────────

    /// Refresh immediately, then on every `update_interval` tick.
    async fn refresh_loop(self, tx: mpsc::Sender<RefreshUpdate>) {
        let mut data_manager = Some(DataManager::new(
            self.update_interval.as_secs(),
            self.source,
        ));
        let mut interval = time::interval(self.update_interval);
        let mut refresh_count = 0u64;

        loop {
            interval.tick().await;

            if tx.is_closed() {
                tracing::debug!("refresh channel closed; exiting loop");
                break;
            }

            let Some(manager) = data_manager.take() else {
                break;
            };
            refresh_count += 1;

            // The pipeline does blocking file and network I/O.
            let joined = tokio::task::spawn_blocking(move || {
                let mut manager = manager;
                let output = manager.get_data(true).cloned();
                let last_error = manager.last_error().map(str::to_string);
                (manager, output, last_error)
            })
            .await;

            let (manager, output, last_error) = match joined {
                Ok(parts) => parts,
                Err(e) => {
                    tracing::error!(error = %e, "refresh task failed; stopping");
                    break;
                }
            };
            data_manager = Some(manager);

            let Some(output) = output else {
                tracing::warn!(
                    error = last_error.as_deref().unwrap_or("unknown"),
                    "no pipeline output available; skipping send"
                );
                continue;
            };

            let update = RefreshUpdate {
                output,
                refresh_count,
                stale: last_error.is_some(),
                last_error,
                refreshed_at: Utc::now(),
            };

            if let Err(e) = tx.send(update).await {
                tracing::warn!(error = %e, "failed to send refresh update; receiver dropped");
                break;
            }
        }
    }
}

// ── RefreshHandle ─────────────────────────────────────────────────────────────

/// Handle to the background refresh task.
pub struct RefreshHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl RefreshHandle {
    /// Immediately abort the refresh loop.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! # Outbox Replayer
//!
//! Drains the local outbox to the backend once it is reachable again.
//!
//! ## Replay Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Outbox Replayer Flow                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  pending_payments ⟕ outbox_replay                               │   │
//! │  │                                                                 │   │
//! │  │  seq | record_id | payload | attempts | replayed_at            │   │
//! │  │  ────┼───────────┼─────────┼──────────┼─────────────           │   │
//! │  │  1   │ 3f2a...   │ {...}   │ 0        │ NULL                   │   │
//! │  │  2   │ 91bc...   │ {...}   │ 2        │ NULL                   │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               ▼                                         │
//! │  1. Poll: list_replayable(batch_size, max_attempts), seq order         │
//! │  2. Send: backend.submit(record), idempotency key = record id          │
//! │  3. Ok  → mark_replayed(record_id, remote_id)                          │
//! │     Err → record_failure(record_id, error)                             │
//! │           transport failure ends the pass early                        │
//! │  4. A pass with failures backs off exponentially before the next       │
//! │                                                                         │
//! │  Entries at max_attempts are skipped and logged; nothing is deleted.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use clinic_db::Database;

use crate::backend::PaymentBackend;
use crate::config::OutboxSettings;
use crate::error::{SyncError, SyncResult};

/// Counts from one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub attempted: usize,
    pub replayed: usize,
    pub failed: usize,
    /// Entries left alone because they used up their attempts.
    pub skipped: usize,
}

impl ReplaySummary {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

// =============================================================================
// Outbox Replayer
// =============================================================================

/// Background worker that replays the local outbox.
pub struct OutboxReplayer {
    db: Database,
    backend: Arc<dyn PaymentBackend>,
    settings: OutboxSettings,
    trigger_rx: mpsc::Receiver<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the replayer.
#[derive(Clone)]
pub struct OutboxReplayerHandle {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl OutboxReplayerHandle {
    /// Requests a pass now instead of at the next tick. Coalesces with a
    /// request that is already queued.
    pub fn trigger(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Shutdown channel closed".into()))
    }
}

impl OutboxReplayer {
    /// Creates a new replayer and returns a handle.
    pub fn new(
        db: Database,
        backend: Arc<dyn PaymentBackend>,
        settings: OutboxSettings,
    ) -> (Self, OutboxReplayerHandle) {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let replayer = OutboxReplayer {
            db,
            backend,
            settings,
            trigger_rx,
            shutdown_rx,
        };

        (replayer, OutboxReplayerHandle { trigger_tx, shutdown_tx })
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(self.settings.initial_backoff_ms),
            max_interval: Duration::from_secs(self.settings.max_backoff_secs),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Runs the replay loop until shutdown.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Outbox replayer starting");

        let poll_interval = Duration::from_secs(self.settings.poll_interval_secs);
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut backoff = self.create_backoff();

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                Some(()) = self.trigger_rx.recv() => {
                    debug!("Replay pass requested");
                }
                _ = self.shutdown_rx.recv() => {
                    info!("Outbox replayer shutting down");
                    break;
                }
            }

            let clean = match self.run_once().await {
                Ok(summary) => summary.is_clean(),
                Err(e) => {
                    error!(error = %e, "Outbox replay pass failed");
                    false
                }
            };

            if clean {
                backoff.reset();
                continue;
            }

            if let Some(delay) = backoff.next_backoff() {
                debug!(?delay, "Backing off before next replay pass");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.shutdown_rx.recv() => {
                        info!("Shutdown during backoff");
                        break;
                    }
                }
            }
        }

        info!("Outbox replayer stopped");
    }

    /// Runs one replay pass over the oldest replayable entries.
    pub async fn run_once(&self) -> SyncResult<ReplaySummary> {
        let outbox = self.db.outbox();
        let mut summary = ReplaySummary {
            skipped: outbox.count_exhausted(self.settings.max_attempts).await? as usize,
            ..ReplaySummary::default()
        };

        if summary.skipped > 0 {
            warn!(
                count = summary.skipped,
                max_attempts = self.settings.max_attempts,
                "Skipping outbox entries that exceeded max replay attempts"
            );
        }

        let entries = outbox
            .list_replayable(self.settings.batch_size, self.settings.max_attempts)
            .await?;

        if entries.is_empty() {
            debug!("No outbox entries to replay");
            return Ok(summary);
        }

        info!(count = entries.len(), "Replaying outbox batch");

        for entry in entries {
            summary.attempted += 1;
            let record = &entry.record;

            match self.backend.submit(record).await {
                Ok(ack) => {
                    outbox.mark_replayed(&record.id, ack.remote_id.as_deref()).await?;
                    summary.replayed += 1;
                    info!(
                        seq = entry.seq,
                        record_id = %record.id,
                        target = %record.target,
                        "Outbox payment replayed"
                    );
                }
                Err(e) => {
                    outbox.record_failure(&record.id, &e.to_string()).await?;
                    summary.failed += 1;

                    if e.is_retryable() {
                        debug!(seq = entry.seq, "Backend unreachable, ending replay pass");
                        break;
                    }
                }
            }
        }

        info!(
            replayed = summary.replayed,
            failed = summary.failed,
            "Outbox replay pass complete"
        );
        Ok(summary)
    }
}

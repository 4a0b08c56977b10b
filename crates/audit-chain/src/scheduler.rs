//! BlockScheduler: drives block production in the background.
//!
//! One worker task waits on two tickers and a shutdown signal:
//!
//! - every `block_interval`, seal a block if anything is pending;
//! - every `threshold_poll_interval`, seal a block if at least
//!   `entries_per_block` entries are pending.
//!
//! Both triggers go through [`Ledger::try_build_block`], which serializes
//! cycles, so a tick landing during a cycle cannot produce a second block
//! for the same entries. On shutdown the worker seals whatever is pending.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use audit_chain_store::LedgerStore;

use crate::error::LedgerError;
use crate::ledger::Ledger;

/// Why a cycle was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Interval,
    Threshold,
    Shutdown,
}

/// Periodic block producer for a ledger.
pub struct BlockScheduler<S: LedgerStore> {
    ledger: Arc<Ledger<S>>,
}

/// Handle to a running scheduler.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the worker after it seals a final block, and wait for it.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        let _ = self.shutdown.send(true);
        self.task.await
    }

    /// Whether the worker has exited (shut down or halted).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<S: LedgerStore + 'static> BlockScheduler<S> {
    pub fn new(ledger: Arc<Ledger<S>>) -> Self {
        Self { ledger }
    }

    /// Starts the scheduler background task.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        SchedulerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let config = self.ledger.config();
        let now = Instant::now();
        let mut block_ticker = interval_at(now + config.block_interval, config.block_interval);
        let mut threshold_ticker = interval_at(
            now + config.threshold_poll_interval,
            config.threshold_poll_interval,
        );
        block_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        threshold_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            block_interval = ?config.block_interval,
            threshold_poll_interval = ?config.threshold_poll_interval,
            entries_per_block = config.entries_per_block,
            "block scheduler started"
        );

        loop {
            let proceed = tokio::select! {
                _ = block_ticker.tick() => {
                    if self.ledger.pending_count().await > 0 {
                        self.cycle(Trigger::Interval).await
                    } else {
                        true
                    }
                }
                _ = threshold_ticker.tick() => {
                    if self.ledger.pending_count().await >= config.entries_per_block {
                        self.cycle(Trigger::Threshold).await
                    } else {
                        true
                    }
                }
                _ = shutdown.changed() => break,
            };
            if !proceed {
                info!("block scheduler stopped: production halted");
                return;
            }
        }

        if self.ledger.pending_count().await > 0 {
            self.cycle(Trigger::Shutdown).await;
        }
        info!("block scheduler stopped");
    }

    /// Run one cycle. Returns false once production is halted.
    async fn cycle(&self, trigger: Trigger) -> bool {
        match self.ledger.try_build_block().await {
            Ok(Some(summary)) => {
                debug!(?trigger, height = summary.height, "scheduled block sealed");
                true
            }
            Ok(None) => true,
            Err(LedgerError::Halted) => false,
            Err(err) => {
                if self.ledger.is_halted() {
                    error!(?trigger, error = %err, "scheduled block cycle failed, production halted");
                    false
                } else {
                    warn!(?trigger, error = %err, "scheduled block cycle failed, will retry");
                    true
                }
            }
        }
    }
}

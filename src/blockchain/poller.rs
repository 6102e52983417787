use log::{debug, info};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::blockchain::source::BlockSource;
use crate::config::PollerConfig;
use crate::error::Result;
use crate::logging::{ErrorLogger, LogContext};
use crate::models::Block;

/// What one poll cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The node reports the same height as the last queued block
    Unchanged(u64),
    /// The block at this height was fetched and queued for the indexer
    Queued(u64),
    /// Cancellation fired while waiting for room in the block queue
    Cancelled,
    /// The indexer side of the block queue is gone
    Closed,
}

/// Periodically fetches the chain head and hands new blocks to the indexer.
///
/// The block queue is bounded; a full queue makes the poller wait, which
/// throttles ingestion to the indexer's pace.
pub struct BlockPoller<S> {
    source: S,
    config: PollerConfig,
    sender: mpsc::Sender<Block>,
    last_seen: Option<u64>,
}

impl<S: BlockSource> BlockPoller<S> {
    pub fn new(source: S, config: PollerConfig, sender: mpsc::Sender<Block>) -> Self {
        Self {
            source,
            config,
            sender,
            last_seen: None,
        }
    }

    /// Height of the last block handed to the indexer
    pub fn last_seen(&self) -> Option<u64> {
        self.last_seen
    }

    /// Run one cycle: read the head height and, if it moved, queue its block.
    ///
    /// The height is only remembered once its block has been queued, so a
    /// failed block fetch is retried on the next cycle.
    pub async fn poll_once(&mut self, cancel: &CancellationToken) -> Result<PollOutcome> {
        let height = self.source.current_height().await?;
        if self.last_seen == Some(height) {
            return Ok(PollOutcome::Unchanged(height));
        }

        let block = self.source.block_at(height, true).await?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(PollOutcome::Cancelled),
            sent = self.sender.send(block) => match sent {
                Ok(()) => {
                    self.last_seen = Some(height);
                    Ok(PollOutcome::Queued(height))
                }
                Err(_) => Ok(PollOutcome::Closed),
            },
        }
    }

    /// Poll immediately and then on every interval tick until cancelled or
    /// until the indexer goes away. Fetch failures are logged and the cycle
    /// is skipped.
    pub async fn run(mut self, cancel: CancellationToken) {
        let context = LogContext::new("poller", "run")
            .with_metadata("poll_interval_seconds", json!(self.config.poll_interval_seconds));
        context.info("Starting block poller");

        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.poll_once(&cancel) => outcome,
            };

            match outcome {
                Ok(PollOutcome::Queued(height)) => {
                    debug!("Queued block {} for indexing", height);
                }
                Ok(PollOutcome::Unchanged(height)) => {
                    debug!("Chain head unchanged at {}", height);
                }
                Ok(PollOutcome::Cancelled) => break,
                Ok(PollOutcome::Closed) => {
                    info!("Block queue closed, stopping poller");
                    break;
                }
                Err(e) => {
                    let context = LogContext::new("poller", "poll_once")
                        .with_metadata("last_seen", json!(self.last_seen));
                    ErrorLogger::log_error(&e, Some(context));
                }
            }
        }

        info!("Block poller stopped");
    }
}

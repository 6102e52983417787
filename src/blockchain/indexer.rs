use log::{debug, info};
use serde_json::json;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::IndexerError;
use crate::logging::{ErrorLogger, LogContext, MetricsLogger};
use crate::models::{Block, BlockTransactions, Transaction, TransactionRecord};
use crate::state::IndexState;

/// Result of offering one block to the indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// The block advanced progress and its transactions were applied
    Applied {
        height: u64,
        indexed: usize,
        skipped: usize,
    },
    /// The block was not above the tracked progress and changed nothing
    Stale { height: u64 },
}

/// Single consumer of the block queue.
///
/// Blocks are applied one at a time so per-address updates stay ordered.
pub struct BlockIndexer {
    state: IndexState,
}

impl BlockIndexer {
    pub fn new(state: IndexState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &IndexState {
        &self.state
    }

    /// Apply one block: advance progress, then record and publish each
    /// transaction against its sender and recipient.
    ///
    /// A transaction that cannot be serialized or stored is logged and
    /// skipped; the rest of the block still applies.
    pub async fn process_block(&self, block: &Block) -> IndexOutcome {
        let height = block.number;
        if !self.state.progress().advance(height) {
            debug!("Skipping stale block {}", height);
            return IndexOutcome::Stale { height };
        }

        let started = Instant::now();
        let (indexed, skipped) = match &block.transactions {
            BlockTransactions::Hydrated(txs) => {
                let mut indexed = 0;
                let mut skipped = 0;
                for tx in txs {
                    if self.index_transaction(height, tx).await {
                        indexed += 1;
                    } else {
                        skipped += 1;
                    }
                }
                (indexed, skipped)
            }
            BlockTransactions::Hashes(hashes) => {
                debug!(
                    "Block {} carries {} transaction hashes only, nothing to index",
                    height,
                    hashes.len()
                );
                (0, 0)
            }
        };

        MetricsLogger::log_block_indexed(
            height,
            indexed,
            skipped,
            started.elapsed().as_millis() as u64,
        );

        IndexOutcome::Applied {
            height,
            indexed,
            skipped,
        }
    }

    async fn index_transaction(&self, height: u64, tx: &Transaction) -> bool {
        let record = match TransactionRecord::encode(tx) {
            Ok(record) => record,
            Err(e) => {
                let context = LogContext::new("indexer", "encode")
                    .with_block_number(height)
                    .with_transaction_hash(tx.hash());
                ErrorLogger::log_error(&IndexerError::Encode(e), Some(context));
                return false;
            }
        };

        let mut touched = Vec::with_capacity(2);
        touched.push(tx.from());
        if let Some(to) = tx.to().filter(|to| !to.is_empty()) {
            touched.push(to);
        }

        let mut recorded = false;
        for address in &touched {
            // append first so the count never runs ahead of the history
            match self.state.store().append(address, record.clone()) {
                Ok(()) => {
                    self.state.counter().increment(address);
                    recorded = true;
                }
                Err(e) => {
                    let context = LogContext::new("indexer", "append")
                        .with_block_number(height)
                        .with_transaction_hash(tx.hash())
                        .with_address(address);
                    ErrorLogger::log_error(&e.into(), Some(context));
                }
            }
        }

        for address in &touched {
            let delivered = self.state.registry().notify(address, &record).await;
            if delivered > 0 {
                LogContext::new("indexer", "notify")
                    .with_address(address)
                    .with_transaction_hash(tx.hash())
                    .with_metadata("subscribers", json!(delivered))
                    .trace("Published transaction");
            }
        }

        recorded
    }

    /// Drain the block queue until it closes or cancellation fires
    pub async fn run(self, mut blocks: mpsc::Receiver<Block>, cancel: CancellationToken) {
        LogContext::new("indexer", "run").info("Starting block indexer");

        loop {
            let block = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                block = blocks.recv() => match block {
                    Some(block) => block,
                    None => break,
                },
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.process_block(&block) => {
                    if let IndexOutcome::Stale { height } = outcome {
                        debug!("Block {} already applied", height);
                    }
                }
            }
        }

        info!(
            "Block indexer stopped at block {:?}",
            self.state.current_block()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LegacyTransaction;

    fn transfer(hash: &str, from: &str, to: Option<&str>) -> Transaction {
        Transaction::Legacy(LegacyTransaction {
            hash: hash.to_string(),
            from: from.to_string(),
            to: to.map(str::to_string),
            value: "0x1".to_string(),
            ..Default::default()
        })
    }

    fn block(number: u64, txs: Vec<Transaction>) -> Block {
        Block {
            number,
            hash: None,
            transactions: BlockTransactions::Hydrated(txs),
        }
    }

    #[tokio::test]
    async fn test_counts_follow_senders_and_recipients() {
        let indexer = BlockIndexer::new(IndexState::default());
        let outcome = indexer
            .process_block(&block(
                10,
                vec![
                    transfer("0x1", "0xa", Some("0xb")),
                    transfer("0x2", "0xb", Some("0xc")),
                ],
            ))
            .await;

        assert_eq!(
            outcome,
            IndexOutcome::Applied {
                height: 10,
                indexed: 2,
                skipped: 0
            }
        );
        let state = indexer.state();
        assert_eq!(state.count("0xa"), 1);
        assert_eq!(state.count("0xb"), 2);
        assert_eq!(state.count("0xc"), 1);
        for address in ["0xa", "0xb", "0xc"] {
            assert_eq!(state.records(address).len() as u64, state.count(address));
        }
        assert_eq!(state.current_block(), Some(10));
    }

    #[tokio::test]
    async fn test_duplicate_block_is_noop() {
        let indexer = BlockIndexer::new(IndexState::default());
        let block = block(10, vec![transfer("0x1", "0xa", Some("0xb"))]);

        indexer.process_block(&block).await;
        let second = indexer.process_block(&block).await;

        assert_eq!(second, IndexOutcome::Stale { height: 10 });
        assert_eq!(indexer.state().count("0xa"), 1);
        assert_eq!(indexer.state().records("0xb").len(), 1);
    }

    #[tokio::test]
    async fn test_contract_creation_only_touches_sender() {
        let indexer = BlockIndexer::new(IndexState::default());
        indexer
            .process_block(&block(3, vec![transfer("0x1", "0xdeployer", None)]))
            .await;

        let state = indexer.state();
        assert_eq!(state.count("0xdeployer"), 1);
        assert_eq!(state.store().keys(), vec!["0xdeployer".to_string()]);
    }

    #[tokio::test]
    async fn test_hash_only_block_advances_progress() {
        let indexer = BlockIndexer::new(IndexState::default());
        let outcome = indexer
            .process_block(&Block {
                number: 4,
                hash: None,
                transactions: BlockTransactions::Hashes(vec!["0x1".to_string()]),
            })
            .await;

        assert_eq!(
            outcome,
            IndexOutcome::Applied {
                height: 4,
                indexed: 0,
                skipped: 0
            }
        );
        assert!(indexer.state().addresses().is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_records() {
        let indexer = BlockIndexer::new(IndexState::default());
        let sub = indexer.state().subscribe("0xb");

        indexer
            .process_block(&block(1, vec![transfer("0x1", "0xa", Some("0xb"))]))
            .await;

        let record = sub.try_recv().expect("published record");
        assert_eq!(record.decode().unwrap().hash(), "0x1");
        assert_eq!(indexer.state().records("0xb"), vec![record]);
    }

    #[tokio::test]
    async fn test_run_applies_queued_blocks_in_order() {
        let state = IndexState::default();
        let indexer = BlockIndexer::new(state.clone());
        let (sender, receiver) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        sender.send(block(5, vec![transfer("0x1", "0xa", None)])).await.unwrap();
        sender.send(block(4, vec![transfer("0x2", "0xa", None)])).await.unwrap();
        sender.send(block(6, vec![transfer("0x3", "0xa", None)])).await.unwrap();
        drop(sender);

        indexer.run(receiver, cancel).await;

        assert_eq!(state.current_block(), Some(6));
        assert_eq!(state.count("0xa"), 2, "block 4 arrived late and must be skipped");
    }
}

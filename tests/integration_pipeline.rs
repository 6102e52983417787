use async_trait::async_trait;
use eth_address_indexer::blockchain::{BlockIndexer, BlockPoller, BlockSource, PollOutcome};
use eth_address_indexer::config::{PollerConfig, SubscriptionConfig};
use eth_address_indexer::error::{IndexerError, Result, RpcError};
use eth_address_indexer::models::{
    Block, BlockTransactions, LegacyTransaction, Transaction, TransactionRecord,
};
use eth_address_indexer::pubsub::DeliveryPolicy;
use eth_address_indexer::state::IndexState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// In-process chain: the head can be moved by the test, blocks are prebuilt
#[derive(Default)]
struct FakeChain {
    head: AtomicU64,
    blocks: Mutex<HashMap<u64, Block>>,
    height_failures: AtomicU64,
}

impl FakeChain {
    fn push_block(&self, number: u64, transfers: &[(&str, &str, Option<&str>)]) {
        let txs = transfers
            .iter()
            .map(|(hash, from, to)| {
                Transaction::Legacy(LegacyTransaction {
                    hash: hash.to_string(),
                    from: from.to_string(),
                    to: to.map(str::to_string),
                    value: "0x1".to_string(),
                    block_number: Some(format!("0x{:x}", number)),
                    ..Default::default()
                })
            })
            .collect();

        self.blocks.lock().unwrap().insert(
            number,
            Block {
                number,
                hash: None,
                transactions: BlockTransactions::Hydrated(txs),
            },
        );
        self.head.store(number, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlockSource for FakeChain {
    async fn current_height(&self) -> Result<u64> {
        if self.height_failures.load(Ordering::SeqCst) > 0 {
            self.height_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(IndexerError::Rpc(RpcError::InvalidResponse(
                "node unavailable".to_string(),
            )));
        }
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn block_at(&self, height: u64, _hydrated: bool) -> Result<Block> {
        self.blocks
            .lock()
            .unwrap()
            .get(&height)
            .cloned()
            .ok_or(IndexerError::Rpc(RpcError::BlockNotFound {
                block_number: height,
            }))
    }
}

fn poller_config() -> PollerConfig {
    PollerConfig {
        poll_interval_seconds: 1,
        block_queue_capacity: 1,
    }
}

async fn wait_for_block(state: &IndexState, height: u64) {
    timeout(Duration::from_secs(5), async {
        while state.current_block() != Some(height) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("block applied in time");
}

#[tokio::test]
async fn test_poller_feeds_indexer() {
    let chain = Arc::new(FakeChain::default());
    chain.push_block(10, &[("0x01", "0xa", Some("0xb")), ("0x02", "0xb", Some("0xc"))]);

    let state = IndexState::default();
    let (sender, receiver) = mpsc::channel(1);
    let cancel = CancellationToken::new();

    let indexer = tokio::spawn(BlockIndexer::new(state.clone()).run(receiver, cancel.clone()));
    let mut poller = BlockPoller::new(Arc::clone(&chain), poller_config(), sender);

    assert_eq!(poller.poll_once(&cancel).await.unwrap(), PollOutcome::Queued(10));
    wait_for_block(&state, 10).await;

    assert_eq!(state.count("0xa"), 1);
    assert_eq!(state.count("0xb"), 2);
    assert_eq!(state.count("0xc"), 1);
    for address in ["0xa", "0xb", "0xc"] {
        assert_eq!(state.records(address).len() as u64, state.count(address));
    }

    // head unchanged: nothing new is queued
    assert_eq!(poller.poll_once(&cancel).await.unwrap(), PollOutcome::Unchanged(10));

    chain.push_block(11, &[("0x03", "0xc", None)]);
    assert_eq!(poller.poll_once(&cancel).await.unwrap(), PollOutcome::Queued(11));
    wait_for_block(&state, 11).await;
    assert_eq!(state.count("0xc"), 2);

    cancel.cancel();
    indexer.await.unwrap();
}

#[tokio::test]
async fn test_duplicate_block_delivery_is_noop() {
    let chain = FakeChain::default();
    chain.push_block(10, &[("0x01", "0xa", Some("0xb"))]);
    let block = chain.block_at(10, true).await.unwrap();

    let state = IndexState::default();
    let indexer = BlockIndexer::new(state.clone());

    indexer.process_block(&block).await;
    let before: Vec<TransactionRecord> = state.records("0xa");

    indexer.process_block(&block).await;

    assert_eq!(state.records("0xa"), before);
    assert_eq!(state.count("0xa"), 1);
    assert_eq!(state.count("0xb"), 1);
}

#[tokio::test]
async fn test_run_recovers_from_fetch_failures() {
    let chain = Arc::new(FakeChain::default());
    chain.push_block(3, &[("0x01", "0xa", Some("0xb"))]);
    chain.height_failures.store(1, Ordering::SeqCst);

    let state = IndexState::default();
    let (sender, receiver) = mpsc::channel(1);
    let cancel = CancellationToken::new();

    let indexer = tokio::spawn(BlockIndexer::new(state.clone()).run(receiver, cancel.clone()));
    let poller = tokio::spawn(
        BlockPoller::new(Arc::clone(&chain), poller_config(), sender).run(cancel.clone()),
    );

    // first cycle fails, the next tick succeeds
    wait_for_block(&state, 3).await;
    assert_eq!(state.count("0xa"), 1);

    cancel.cancel();
    timeout(Duration::from_secs(2), async {
        poller.await.unwrap();
        indexer.await.unwrap();
    })
    .await
    .expect("pipeline stops on cancel");
}

#[tokio::test]
async fn test_slow_subscriber_with_drop_oldest_does_not_stall_indexing() {
    let state = IndexState::new(SubscriptionConfig {
        queue_capacity: 1,
        delivery_policy: DeliveryPolicy::DropOldest,
    });
    let indexer = BlockIndexer::new(state.clone());
    let stalled = state.subscribe("0xa");

    for height in 1..=5u64 {
        let block = Block {
            number: height,
            hash: None,
            transactions: BlockTransactions::Hydrated(vec![Transaction::Legacy(
                LegacyTransaction {
                    hash: format!("0x{:02x}", height),
                    from: "0xa".to_string(),
                    to: Some("0xb".to_string()),
                    ..Default::default()
                },
            )]),
        };
        timeout(Duration::from_secs(1), indexer.process_block(&block))
            .await
            .expect("indexing must not wait for the subscriber");
    }

    assert_eq!(state.count("0xa"), 5);
    let latest = stalled.try_recv().expect("latest payload kept");
    assert_eq!(latest.decode().unwrap().hash(), "0x05");
    assert_eq!(stalled.try_recv(), None);
}

use log::warn;
use serde::Serialize;
use std::sync::Arc;

use crate::config::SubscriptionConfig;
use crate::models::{Transaction, TransactionRecord};
use crate::pubsub::{Subscription, SubscriptionRegistry};
use crate::storage::{AddressCounter, ProgressTracker, TransactionStore};

/// Address with its running transaction count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressSummary {
    pub address: String,
    pub count: u64,
}

/// Shared ledger state: written by the indexer, read by the gateway.
///
/// Each structure carries its own lock; there is no lock spanning several of
/// them.
#[derive(Debug, Clone)]
pub struct IndexState {
    progress: Arc<ProgressTracker>,
    counter: Arc<AddressCounter>,
    store: Arc<TransactionStore>,
    registry: SubscriptionRegistry,
}

impl IndexState {
    pub fn new(subscriptions: SubscriptionConfig) -> Self {
        Self {
            progress: Arc::new(ProgressTracker::new()),
            counter: Arc::new(AddressCounter::new()),
            store: Arc::new(TransactionStore::new()),
            registry: SubscriptionRegistry::new(subscriptions),
        }
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn counter(&self) -> &AddressCounter {
        &self.counter
    }

    pub fn store(&self) -> &TransactionStore {
        &self.store
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Highest block applied so far, `None` before the first one
    pub fn current_block(&self) -> Option<u64> {
        self.progress.current()
    }

    pub fn subscribe(&self, address: &str) -> Subscription {
        self.registry.subscribe(address)
    }

    pub fn records(&self, address: &str) -> Vec<TransactionRecord> {
        self.store.get(address)
    }

    /// Decoded history of `address`; records that no longer parse are skipped
    pub fn transactions(&self, address: &str) -> Vec<Transaction> {
        self.store
            .get(address)
            .iter()
            .filter_map(|record| match record.decode() {
                Ok(tx) => Some(tx),
                Err(e) => {
                    warn!("Skipping unreadable record for {}: {}", address, e);
                    None
                }
            })
            .collect()
    }

    pub fn count(&self, address: &str) -> u64 {
        self.counter.get(address)
    }

    /// Every known address, busiest first; ties keep address order
    pub fn addresses(&self) -> Vec<AddressSummary> {
        let mut summaries: Vec<AddressSummary> = self
            .store
            .keys()
            .into_iter()
            .map(|address| {
                let count = self.counter.get(&address);
                AddressSummary { address, count }
            })
            .collect();

        summaries.sort_by(|a, b| b.count.cmp(&a.count));
        summaries
    }
}

impl Default for IndexState {
    fn default() -> Self {
        Self::new(SubscriptionConfig::default())
    }
}

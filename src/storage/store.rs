use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::error::StoreError;
use crate::models::TransactionRecord;

/// Append-only transaction history per address.
///
/// Entries are created on first append and live for the whole process.
/// Keys are kept ordered so listings are deterministic.
#[derive(Debug, Default)]
pub struct TransactionStore {
    entries: RwLock<BTreeMap<String, Vec<TransactionRecord>>>,
}

impl TransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `record` to the history of `address`
    pub fn append(&self, address: &str, record: TransactionRecord) -> Result<(), StoreError> {
        if record.is_empty() {
            return Err(StoreError::EmptyRecord {
                address: address.to_string(),
            });
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.entry(address.to_string()).or_default().push(record);
        Ok(())
    }

    /// Full history of `address` in append order, empty if unknown
    pub fn get(&self, address: &str) -> Vec<TransactionRecord> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(address).cloned().unwrap_or_default()
    }

    pub fn len(&self, address: &str) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(address).map_or(0, Vec::len)
    }

    /// Every known address, sorted
    pub fn keys(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.keys().cloned().collect()
    }
}

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Number of indexed transactions each address took part in
#[derive(Debug, Default)]
pub struct AddressCounter {
    counts: RwLock<HashMap<String, u64>>,
}

impl AddressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one to `address`, starting from zero. Returns the new count.
    pub fn increment(&self, address: &str) -> u64 {
        let mut counts = self.counts.write().unwrap_or_else(PoisonError::into_inner);
        let count = counts.entry(address.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Count for `address`, zero if it was never seen
    pub fn get(&self, address: &str) -> u64 {
        let counts = self.counts.read().unwrap_or_else(PoisonError::into_inner);
        counts.get(address).copied().unwrap_or(0)
    }
}

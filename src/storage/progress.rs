use std::sync::{Mutex, PoisonError};

/// Highest block height the indexer has fully applied.
///
/// Starts empty, which orders below every real height. Only moves forward.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    height: Mutex<Option<u64>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `height` if it is strictly greater than the tracked height.
    /// Returns whether the marker moved.
    pub fn advance(&self, height: u64) -> bool {
        let mut current = self.height.lock().unwrap_or_else(PoisonError::into_inner);
        match *current {
            Some(tracked) if tracked >= height => false,
            _ => {
                *current = Some(height);
                true
            }
        }
    }

    /// Tracked height, `None` until the first block is applied
    pub fn current(&self) -> Option<u64> {
        *self.height.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

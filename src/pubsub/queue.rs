use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use crate::error::DeliveryError;
use crate::models::TransactionRecord;

/// What `push` does when a subscription queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Wait until the subscriber makes room
    #[default]
    Block,
    /// Evict the oldest pending payload
    DropOldest,
    /// Fail with `DeliveryError::Full` and keep the queue as is
    Reject,
}

impl std::str::FromStr for DeliveryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block" => Ok(DeliveryPolicy::Block),
            "drop_oldest" => Ok(DeliveryPolicy::DropOldest),
            "reject" => Ok(DeliveryPolicy::Reject),
            other => Err(format!("unknown delivery policy: {}", other)),
        }
    }
}

/// Result of a successful push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pushed {
    Queued,
    /// The payload was queued after evicting the oldest pending one
    ReplacedOldest,
}

#[derive(Debug)]
struct QueueState {
    items: VecDeque<TransactionRecord>,
    capacity: usize,
    closed: bool,
}

/// Bounded FIFO of payloads waiting for one subscriber.
///
/// Closing is terminal: pending payloads can still be drained, pushes fail
/// with `DeliveryError::Closed`, and every waiter is woken.
#[derive(Debug)]
pub struct DeliveryQueue {
    state: Mutex<QueueState>,
    readable: Notify,
    writable: Notify,
}

impl DeliveryQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                capacity,
                closed: false,
            }),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn push(
        &self,
        record: TransactionRecord,
        policy: DeliveryPolicy,
    ) -> Result<Pushed, DeliveryError> {
        loop {
            let writable = self.writable.notified();
            tokio::pin!(writable);
            writable.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(DeliveryError::Closed);
                }

                if state.items.len() < state.capacity {
                    state.items.push_back(record);
                    drop(state);
                    self.readable.notify_one();
                    return Ok(Pushed::Queued);
                }

                match policy {
                    DeliveryPolicy::Block => {}
                    DeliveryPolicy::DropOldest => {
                        state.items.pop_front();
                        state.items.push_back(record);
                        drop(state);
                        self.readable.notify_one();
                        return Ok(Pushed::ReplacedOldest);
                    }
                    DeliveryPolicy::Reject => return Err(DeliveryError::Full),
                }
            }

            writable.await;
        }
    }

    /// Wait for the next payload. `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<TransactionRecord> {
        loop {
            let readable = self.readable.notified();
            tokio::pin!(readable);
            readable.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(record) = state.items.pop_front() {
                    drop(state);
                    self.writable.notify_one();
                    return Some(record);
                }
                if state.closed {
                    return None;
                }
            }

            readable.await;
        }
    }

    pub fn try_recv(&self) -> Option<TransactionRecord> {
        let record = self.lock().items.pop_front();
        if record.is_some() {
            self.writable.notify_one();
        }
        record
    }

    /// Close the queue. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        let newly_closed = {
            let mut state = self.lock();
            !std::mem::replace(&mut state.closed, true)
        };
        if newly_closed {
            self.readable.notify_waiters();
            self.writable.notify_waiters();
        }
        newly_closed
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

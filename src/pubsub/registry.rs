use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use uuid::Uuid;

use crate::config::SubscriptionConfig;
use crate::error::DeliveryError;
use crate::logging::MetricsLogger;
use crate::models::TransactionRecord;
use crate::pubsub::queue::{DeliveryPolicy, DeliveryQueue, Pushed};

type Topics = HashMap<String, HashMap<Uuid, Arc<DeliveryQueue>>>;

#[derive(Debug)]
struct RegistryInner {
    topics: Mutex<Topics>,
    config: SubscriptionConfig,
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, Topics> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove one subscription and close its queue. Only the call that
    /// actually removed the entry closes the queue.
    fn remove(&self, topic: &str, id: Uuid) -> bool {
        let removed = {
            let mut topics = self.lock();
            let Some(subscriptions) = topics.get_mut(topic) else {
                return false;
            };
            let removed = subscriptions.remove(&id);
            if subscriptions.is_empty() {
                topics.remove(topic);
            }
            removed
        };

        match removed {
            Some(queue) => {
                queue.close();
                MetricsLogger::log_subscription("unsubscribe", topic, &id);
                true
            }
            None => false,
        }
    }
}

/// Address-keyed publish/subscribe hub for newly indexed transactions
#[derive(Debug, Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new(config: SubscriptionConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                topics: Mutex::new(HashMap::new()),
                config,
            }),
        }
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.inner.config.delivery_policy
    }

    /// Register a new subscription for `topic`
    pub fn subscribe(&self, topic: &str) -> Subscription {
        let id = Uuid::now_v7();
        let queue = Arc::new(DeliveryQueue::new(self.inner.config.queue_capacity));

        self.inner
            .lock()
            .entry(topic.to_string())
            .or_default()
            .insert(id, Arc::clone(&queue));

        MetricsLogger::log_subscription("subscribe", topic, &id);

        Subscription {
            id,
            topic: topic.to_string(),
            queue,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Hand `payload` to every live subscription of `topic`.
    ///
    /// The registry lock only covers taking a snapshot of the topic's queues;
    /// delivery itself follows the configured policy, so with
    /// `DeliveryPolicy::Block` this waits for the slowest subscriber.
    /// Returns the number of subscriptions the payload was queued for.
    pub async fn notify(&self, topic: &str, payload: &TransactionRecord) -> usize {
        let targets: Vec<(Uuid, Arc<DeliveryQueue>)> = {
            let topics = self.inner.lock();
            match topics.get(topic) {
                Some(subscriptions) => subscriptions
                    .iter()
                    .map(|(id, queue)| (*id, Arc::clone(queue)))
                    .collect(),
                None => return 0,
            }
        };

        let policy = self.policy();
        let mut delivered = 0;

        for (id, queue) in targets {
            match queue.push(payload.clone(), policy).await {
                Ok(Pushed::Queued) => delivered += 1,
                Ok(Pushed::ReplacedOldest) => {
                    debug!("Subscription {} on {} lagging, dropped oldest payload", id, topic);
                    delivered += 1;
                }
                Err(DeliveryError::Full) => {
                    warn!("Subscription {} on {} is full, payload dropped", id, topic);
                }
                Err(DeliveryError::Closed) => {
                    debug!("Subscription {} on {} closed during delivery", id, topic);
                }
            }
        }

        delivered
    }

    /// Remove `subscription` from its topic and close its queue.
    /// Returns `false` if it was already removed.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.inner.remove(&subscription.topic, subscription.id)
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.lock().get(topic).map_or(0, HashMap::len)
    }

    pub fn topic_count(&self) -> usize {
        self.inner.lock().len()
    }
}

/// A live subscription to one address.
///
/// Dropping it unsubscribes, so a stream that owns it cleans up when the
/// client goes away.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    topic: String,
    queue: Arc<DeliveryQueue>,
    registry: Weak<RegistryInner>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next payload for this topic; `None` after unsubscribe once drained
    pub async fn recv(&self) -> Option<TransactionRecord> {
        self.queue.recv().await
    }

    pub fn try_recv(&self) -> Option<TransactionRecord> {
        self.queue.try_recv()
    }

    pub fn is_active(&self) -> bool {
        !self.queue.is_closed()
    }

    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(&self.topic, self.id),
            None => self.queue.close(),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn registry(capacity: usize, policy: DeliveryPolicy) -> SubscriptionRegistry {
        SubscriptionRegistry::new(SubscriptionConfig {
            queue_capacity: capacity,
            delivery_policy: policy,
        })
    }

    fn payload(text: &str) -> TransactionRecord {
        TransactionRecord::from(format!(r#"{{"hash":"{}"}}"#, text))
    }

    #[tokio::test]
    async fn test_subscribe_registers_under_topic() {
        let registry = registry(1, DeliveryPolicy::Block);
        let first = registry.subscribe("0xa");
        let second = registry.subscribe("0xa");

        assert_ne!(first.id(), second.id());
        assert_eq!(first.topic(), "0xa");
        assert_eq!(registry.subscriber_count("0xa"), 2);
        assert_eq!(registry.topic_count(), 1);
    }

    #[tokio::test]
    async fn test_notify_without_subscribers_is_noop() {
        let registry = registry(1, DeliveryPolicy::Block);
        assert_eq!(registry.notify("0xnobody", &payload("0x1")).await, 0);
    }

    #[tokio::test]
    async fn test_publish_order_and_topic_isolation() {
        let registry = registry(8, DeliveryPolicy::Block);
        let sub_a = registry.subscribe("0xa");
        let sub_b = registry.subscribe("0xb");

        for n in 0..5 {
            registry.notify("0xa", &payload(&format!("a{}", n))).await;
        }
        registry.notify("0xb", &payload("b0")).await;

        assert!(registry.unsubscribe(&sub_a));
        let mut received = Vec::new();
        while let Some(record) = sub_a.recv().await {
            received.push(record);
        }
        let expected: Vec<_> = (0..5).map(|n| payload(&format!("a{}", n))).collect();
        assert_eq!(received, expected);

        assert_eq!(sub_b.try_recv(), Some(payload("b0")));
        assert_eq!(sub_b.try_recv(), None);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let registry = registry(1, DeliveryPolicy::Block);
        let sub = registry.subscribe("0xa");

        assert!(registry.unsubscribe(&sub));
        assert!(!registry.unsubscribe(&sub));
        assert!(!sub.unsubscribe());
        assert!(!sub.is_active());
        assert_eq!(registry.subscriber_count("0xa"), 0);
        assert_eq!(registry.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_after_unsubscribe_is_not_observed_and_does_not_block() {
        let registry = registry(1, DeliveryPolicy::Block);
        let sub = registry.subscribe("0xa");

        registry.notify("0xa", &payload("first")).await;
        assert_eq!(sub.recv().await, Some(payload("first")));
        assert!(sub.unsubscribe());

        let delivered = timeout(Duration::from_secs(1), registry.notify("0xa", &payload("second")))
            .await
            .expect("notify must not block after unsubscribe");
        assert_eq!(delivered, 0);
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_dropping_subscription_unblocks_publisher() {
        let registry = registry(1, DeliveryPolicy::Block);
        let sub = registry.subscribe("0xa");
        registry.notify("0xa", &payload("fills")).await;

        let publisher = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.notify("0xa", &payload("waits")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!publisher.is_finished());

        drop(sub);
        let delivered = timeout(Duration::from_secs(1), publisher)
            .await
            .expect("publisher unblocked")
            .expect("task joined");
        assert_eq!(delivered, 0);
        assert_eq!(registry.subscriber_count("0xa"), 0);
    }

    #[tokio::test]
    async fn test_reject_policy_drops_for_full_subscriber_only() {
        let registry = registry(1, DeliveryPolicy::Reject);
        let slow = registry.subscribe("0xa");
        let fast = registry.subscribe("0xa");

        assert_eq!(registry.notify("0xa", &payload("1")).await, 2);
        assert_eq!(fast.try_recv(), Some(payload("1")));

        assert_eq!(registry.notify("0xa", &payload("2")).await, 1);
        assert_eq!(fast.try_recv(), Some(payload("2")));
        assert_eq!(slow.try_recv(), Some(payload("1")));
        assert_eq!(slow.try_recv(), None);
    }

    #[tokio::test]
    async fn test_drop_oldest_policy_keeps_latest() {
        let registry = registry(1, DeliveryPolicy::DropOldest);
        let sub = registry.subscribe("0xa");

        registry.notify("0xa", &payload("1")).await;
        registry.notify("0xa", &payload("2")).await;

        assert_eq!(sub.try_recv(), Some(payload("2")));
    }

    #[tokio::test]
    async fn test_subscription_outliving_registry_closes_itself() {
        let registry = registry(1, DeliveryPolicy::Block);
        let sub = registry.subscribe("0xa");
        drop(registry);

        assert!(sub.unsubscribe());
        assert_eq!(sub.recv().await, None);
    }
}

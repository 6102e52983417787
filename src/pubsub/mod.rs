pub mod queue;
pub mod registry;

pub use queue::{DeliveryPolicy, DeliveryQueue, Pushed};
pub use registry::{Subscription, SubscriptionRegistry};

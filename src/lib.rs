pub mod api;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod pubsub;
pub mod state;
pub mod storage;

pub use blockchain::{BlockIndexer, BlockPoller, BlockSource, RpcClient};
pub use config::{
    ApiConfig, AppConfig, LogFormat, LoggingConfig, PollerConfig, RpcConfig, SubscriptionConfig,
};
pub use error::{IndexerError, Result};
pub use logging::{ErrorLogger, LogContext, MetricsLogger, PerformanceMonitor};
pub use pubsub::{DeliveryPolicy, Subscription, SubscriptionRegistry};
pub use state::{AddressSummary, IndexState};

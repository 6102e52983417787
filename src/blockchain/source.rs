use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::models::Block;

/// Where the poller gets chain data from.
///
/// `RpcClient` is the production implementation; tests drive the pipeline
/// with in-process fakes.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Latest block height known to the node
    async fn current_height(&self) -> Result<u64>;

    /// Block at `height`, with full transaction objects when `hydrated`
    /// and hashes only otherwise
    async fn block_at(&self, height: u64, hydrated: bool) -> Result<Block>;
}

#[async_trait]
impl<S> BlockSource for Arc<S>
where
    S: BlockSource + ?Sized,
{
    async fn current_height(&self) -> Result<u64> {
        (**self).current_height().await
    }

    async fn block_at(&self, height: u64, hydrated: bool) -> Result<Block> {
        (**self).block_at(height, hydrated).await
    }
}

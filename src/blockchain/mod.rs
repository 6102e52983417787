pub mod indexer;
pub mod poller;
pub mod rpc_client;
pub mod source;

pub use indexer::{BlockIndexer, IndexOutcome};
pub use poller::{BlockPoller, PollOutcome};
pub use rpc_client::{parse_block, parse_hex_to_u64, RpcClient};
pub use source::BlockSource;

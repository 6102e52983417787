pub mod http;
pub mod stream;

pub use http::{
    create_router, get_addresses, get_current_block, get_transactions, AddressEntry,
    AddressesResponse, ApiServer, AppState, CurrentBlockResponse, TransactionLinks,
    TransactionsResponse, NO_BLOCK,
};
pub use stream::{subscribe, subscription_events};

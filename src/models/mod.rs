pub mod envelope;
pub mod transaction;

pub use envelope::{decode_transactions, EnvelopeKind};
pub use transaction::{
    AccessListEntry, AccessListTransaction, BlobTransaction, Block, BlockTransactions,
    DynamicFeeTransaction, LegacyTransaction, Transaction, TransactionRecord,
    TypedLegacyTransaction,
};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::models::envelope::EnvelopeKind;

/// One entry of an EIP-2930 access list
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessListEntry {
    pub address: String,
    pub storage_keys: Vec<String>,
}

/// Pre-envelope transaction, returned without a `type` field
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyTransaction {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub nonce: String,
    pub gas_price: String,
    pub gas: String,
    pub value: String,
    pub input: String,
    pub v: String,
    pub r: String,
    pub s: String,
    pub block_hash: Option<String>,
    pub block_number: Option<String>,
    pub transaction_index: Option<String>,
}

/// Legacy transaction wrapped in a typed envelope (`type` 0x0)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TypedLegacyTransaction {
    #[serde(rename = "type")]
    pub tx_type: String,
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub nonce: String,
    pub gas_price: String,
    pub gas: String,
    pub value: String,
    pub input: String,
    pub v: String,
    pub r: String,
    pub s: String,
    pub block_hash: Option<String>,
    pub block_number: Option<String>,
    pub transaction_index: Option<String>,
}

/// Access-list transaction (`type` 0x1)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessListTransaction {
    #[serde(rename = "type")]
    pub tx_type: String,
    pub chain_id: String,
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub nonce: String,
    pub gas_price: String,
    pub gas: String,
    pub value: String,
    pub input: String,
    pub access_list: Vec<AccessListEntry>,
    pub v: String,
    pub r: String,
    pub s: String,
    pub block_hash: Option<String>,
    pub block_number: Option<String>,
    pub transaction_index: Option<String>,
}

/// Dynamic-fee transaction (`type` 0x2)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct DynamicFeeTransaction {
    #[serde(rename = "type")]
    pub tx_type: String,
    pub chain_id: String,
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub nonce: String,
    pub max_priority_fee_per_gas: String,
    pub max_fee_per_gas: String,
    pub gas: String,
    pub value: String,
    pub input: String,
    pub v: String,
    pub r: String,
    pub s: String,
    pub block_hash: Option<String>,
    pub block_number: Option<String>,
    pub transaction_index: Option<String>,
}

/// Blob-carrying transaction (`type` 0x5)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct BlobTransaction {
    #[serde(rename = "type")]
    pub tx_type: String,
    pub chain_id: String,
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub nonce: String,
    pub max_priority_fee_per_gas: String,
    pub max_fee_per_gas: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fee_per_blob_gas: Option<String>,
    pub gas: String,
    pub value: String,
    pub input: String,
    pub blob_versioned_hashes: Vec<String>,
    pub v: String,
    pub r: String,
    pub s: String,
    pub block_hash: Option<String>,
    pub block_number: Option<String>,
    pub transaction_index: Option<String>,
}

/// A decoded transaction in one of the five envelope shapes the node returns.
///
/// Serializes as the bare variant object, so the stored record keeps the
/// node's field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Transaction {
    Legacy(LegacyTransaction),
    TypedLegacy(TypedLegacyTransaction),
    AccessList(AccessListTransaction),
    DynamicFee(DynamicFeeTransaction),
    Blob(BlobTransaction),
}

macro_rules! common_field {
    ($self:ident, $field:ident) => {
        match $self {
            Transaction::Legacy(tx) => &tx.$field,
            Transaction::TypedLegacy(tx) => &tx.$field,
            Transaction::AccessList(tx) => &tx.$field,
            Transaction::DynamicFee(tx) => &tx.$field,
            Transaction::Blob(tx) => &tx.$field,
        }
    };
}

impl Transaction {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Transaction::Legacy(_) => EnvelopeKind::Legacy,
            Transaction::TypedLegacy(_) => EnvelopeKind::TypedLegacy,
            Transaction::AccessList(_) => EnvelopeKind::AccessList,
            Transaction::DynamicFee(_) => EnvelopeKind::DynamicFee,
            Transaction::Blob(_) => EnvelopeKind::Blob,
        }
    }

    pub fn hash(&self) -> &str {
        common_field!(self, hash)
    }

    /// Sender address
    pub fn from(&self) -> &str {
        common_field!(self, from)
    }

    /// Recipient address, absent for contract creation
    pub fn to(&self) -> Option<&str> {
        common_field!(self, to).as_deref()
    }

    pub fn value(&self) -> &str {
        common_field!(self, value)
    }

    pub fn gas(&self) -> &str {
        common_field!(self, gas)
    }

    pub fn block_number(&self) -> Option<&str> {
        common_field!(self, block_number).as_deref()
    }
}

impl<'de> Deserialize<'de> for Transaction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let kind = EnvelopeKind::of(&value).map_err(serde::de::Error::custom)?;
        kind.decode_entry(&value).map_err(serde::de::Error::custom)
    }
}

/// The transaction list of a block, as returned by the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockTransactions {
    /// Non-hydrated response: only transaction hashes
    Hashes(Vec<String>),
    /// Full transaction objects
    Hydrated(Vec<Transaction>),
}

impl BlockTransactions {
    pub fn len(&self) -> usize {
        match self {
            BlockTransactions::Hashes(hashes) => hashes.len(),
            BlockTransactions::Hydrated(txs) => txs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Envelope shape of the list, decided by its first entry
    pub fn kind(&self) -> Option<EnvelopeKind> {
        match self {
            BlockTransactions::Hashes(_) => None,
            BlockTransactions::Hydrated(txs) => txs.first().map(Transaction::kind),
        }
    }
}

/// A block height paired with its decoded transactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    pub hash: Option<String>,
    pub transactions: BlockTransactions,
}

/// Serialized form of a transaction as kept in the store and sent to subscribers.
///
/// Cloning is cheap; the same record is shared by the sender's and the
/// recipient's history and by every live subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord(Arc<str>);

impl TransactionRecord {
    pub fn encode(tx: &Transaction) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(tx)?;
        Ok(Self(Arc::from(json)))
    }

    pub fn decode(&self) -> Result<Transaction, serde_json::Error> {
        serde_json::from_str(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for TransactionRecord {
    fn from(json: String) -> Self {
        Self(Arc::from(json))
    }
}

impl From<&str> for TransactionRecord {
    fn from(json: &str) -> Self {
        Self(Arc::from(json))
    }
}

impl fmt::Display for TransactionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//! Classification and decoding of the transaction envelopes found in a block.
//!
//! The node returns several historical transaction formats side by side. The
//! optional `type` field of the first entry decides the shape used for the
//! whole list: absent means the pre-envelope legacy format, otherwise the tag
//! must be one of the known envelope markers.
//!
//! Only the first entry is inspected. A block mixing envelope types decodes
//! every entry with the first entry's shape; fields the shape does not know are
//! dropped and fields it expects default to empty.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::error::DecodeError;
use crate::models::transaction::{
    AccessListTransaction, BlobTransaction, BlockTransactions, DynamicFeeTransaction,
    LegacyTransaction, Transaction, TypedLegacyTransaction,
};

pub const TYPE_TYPED_LEGACY: &str = "0x0";
pub const TYPE_ACCESS_LIST: &str = "0x1";
pub const TYPE_DYNAMIC_FEE: &str = "0x2";
pub const TYPE_BLOB: &str = "0x5";

/// The envelope shapes a transaction can arrive in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    Legacy,
    TypedLegacy,
    AccessList,
    DynamicFee,
    Blob,
}

impl EnvelopeKind {
    /// Map a `type` discriminator to its envelope. `None` is the legacy shape.
    pub fn from_tag(tag: Option<&str>) -> Result<Self, DecodeError> {
        match tag {
            None => Ok(EnvelopeKind::Legacy),
            Some(TYPE_TYPED_LEGACY) => Ok(EnvelopeKind::TypedLegacy),
            Some(TYPE_ACCESS_LIST) => Ok(EnvelopeKind::AccessList),
            Some(TYPE_DYNAMIC_FEE) => Ok(EnvelopeKind::DynamicFee),
            Some(TYPE_BLOB) => Ok(EnvelopeKind::Blob),
            Some(other) => Err(DecodeError::UnknownEnvelope(other.to_string())),
        }
    }

    /// Classify a raw transaction object by its `type` field
    pub fn of(entry: &Value) -> Result<Self, DecodeError> {
        match entry.get("type") {
            None | Some(Value::Null) => Ok(EnvelopeKind::Legacy),
            Some(Value::String(tag)) => Self::from_tag(Some(tag.as_str())),
            Some(other) => Err(DecodeError::UnknownEnvelope(other.to_string())),
        }
    }

    pub fn tag(&self) -> Option<&'static str> {
        match self {
            EnvelopeKind::Legacy => None,
            EnvelopeKind::TypedLegacy => Some(TYPE_TYPED_LEGACY),
            EnvelopeKind::AccessList => Some(TYPE_ACCESS_LIST),
            EnvelopeKind::DynamicFee => Some(TYPE_DYNAMIC_FEE),
            EnvelopeKind::Blob => Some(TYPE_BLOB),
        }
    }

    /// Decode one raw entry with this envelope's shape
    pub fn decode_entry(&self, entry: &Value) -> Result<Transaction, serde_json::Error> {
        let tx = match self {
            EnvelopeKind::Legacy => Transaction::Legacy(LegacyTransaction::deserialize(entry)?),
            EnvelopeKind::TypedLegacy => {
                Transaction::TypedLegacy(TypedLegacyTransaction::deserialize(entry)?)
            }
            EnvelopeKind::AccessList => {
                Transaction::AccessList(AccessListTransaction::deserialize(entry)?)
            }
            EnvelopeKind::DynamicFee => {
                Transaction::DynamicFee(DynamicFeeTransaction::deserialize(entry)?)
            }
            EnvelopeKind::Blob => Transaction::Blob(BlobTransaction::deserialize(entry)?),
        };
        Ok(tx)
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeKind::Legacy => write!(f, "legacy"),
            EnvelopeKind::TypedLegacy => write!(f, "typed-legacy(0x0)"),
            EnvelopeKind::AccessList => write!(f, "access-list(0x1)"),
            EnvelopeKind::DynamicFee => write!(f, "dynamic-fee(0x2)"),
            EnvelopeKind::Blob => write!(f, "blob(0x5)"),
        }
    }
}

/// Decode the `transactions` member of an `eth_getBlockByNumber` result
pub fn decode_transactions(raw: &Value) -> Result<BlockTransactions, DecodeError> {
    let entries = raw.as_array().ok_or(DecodeError::NotAnArray)?;

    let Some(first) = entries.first() else {
        return Ok(BlockTransactions::Hydrated(Vec::new()));
    };

    if first.is_string() {
        let hashes = entries
            .iter()
            .map(|entry| entry.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or(DecodeError::MixedEntries)?;
        return Ok(BlockTransactions::Hashes(hashes));
    }

    let kind = EnvelopeKind::of(first)?;
    let mut transactions = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        if !entry.is_object() {
            return Err(DecodeError::MixedEntries);
        }
        let tx = kind
            .decode_entry(entry)
            .map_err(|source| DecodeError::Malformed { index, source })?;

        if tx.hash().is_empty() {
            return Err(DecodeError::MissingField { index, field: "hash" });
        }
        if tx.from().is_empty() {
            return Err(DecodeError::MissingField { index, field: "from" });
        }
        transactions.push(tx);
    }

    Ok(BlockTransactions::Hydrated(transactions))
}

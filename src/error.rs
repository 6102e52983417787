use thiserror::Error;

/// Main error type for the address indexer
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Server error: {0}")]
    Server(String),
}

/// Errors raised while talking to the node
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RPC method error: code={code}, message={message}")]
    Method { code: i64, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Block not found: {block_number}")]
    BlockNotFound { block_number: u64 },

    #[error("Mismatched response id: expected={expected}, got={got}")]
    MismatchedResponse { expected: u64, got: u64 },
}

/// Errors raised while classifying and decoding transaction envelopes
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Transaction list is not an array")]
    NotAnArray,

    #[error("Unknown transaction envelope type: {0}")]
    UnknownEnvelope(String),

    #[error("Transaction list mixes hashes and transaction objects")]
    MixedEntries,

    #[error("Malformed transaction at index {index}: {source}")]
    Malformed {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Transaction at index {index} has an empty {field}")]
    MissingField { index: usize, field: &'static str },

    #[error("Invalid hex quantity: {0}")]
    InvalidQuantity(String),
}

/// Errors raised by the per-address transaction store
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("Refusing to append an empty record for {address}")]
    EmptyRecord { address: String },
}

/// Errors raised when handing a payload to a subscription queue
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Subscription queue closed")]
    Closed,

    #[error("Subscription queue full")]
    Full,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Configuration parsing failed: {0}")]
    Parsing(String),

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, IndexerError>;

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// The process cannot continue
    Critical,
    /// A whole poll cycle or block was lost
    High,
    /// A single item was dropped
    Medium,
    /// Expected under normal operation
    Low,
}

impl IndexerError {
    /// Get the severity level of an error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            IndexerError::Config(_) => ErrorSeverity::Critical,
            IndexerError::Server(_) => ErrorSeverity::Critical,

            IndexerError::Rpc(RpcError::Http(_)) => ErrorSeverity::High,
            IndexerError::Rpc(RpcError::MismatchedResponse { .. }) => ErrorSeverity::High,
            IndexerError::Decode(DecodeError::UnknownEnvelope(_)) => ErrorSeverity::High,
            IndexerError::Decode(DecodeError::NotAnArray) => ErrorSeverity::High,

            IndexerError::Rpc(RpcError::BlockNotFound { .. }) => ErrorSeverity::Low,
            IndexerError::Delivery(DeliveryError::Closed) => ErrorSeverity::Low,

            _ => ErrorSeverity::Medium,
        }
    }
}

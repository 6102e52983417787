use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::blockchain::source::BlockSource;
use crate::config::RpcConfig;
use crate::error::{DecodeError, Result, RpcError};
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{decode_transactions, Block};

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Raw block object as returned by `eth_getBlockByNumber`
#[derive(Debug, Deserialize)]
struct RawBlock {
    number: String,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    transactions: Value,
}

/// JSON-RPC client for an Ethereum node
#[derive(Debug)]
pub struct RpcClient {
    client: Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(config: &RpcConfig) -> std::result::Result<Self, RpcError> {
        LogContext::new("rpc_client", "initialization")
            .with_metadata("endpoint", json!(config.endpoint))
            .with_metadata("timeout_seconds", json!(config.timeout_seconds))
            .info("Initializing RPC client");

        let client = Client::builder()
            .timeout(config.timeout())
            .pool_max_idle_per_host(4)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn make_request(&self, method: &str, params: Vec<Value>) -> std::result::Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };

        LogContext::new("rpc_client", "make_request")
            .with_metadata("method", json!(method))
            .with_metadata("request_id", json!(id))
            .trace(&format!("Sending RPC request: {}", method));

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body = response.bytes().await?;
        let rpc_response: JsonRpcResponse = serde_json::from_slice(&body)?;

        if rpc_response.id != id {
            return Err(RpcError::MismatchedResponse {
                expected: id,
                got: rpc_response.id,
            });
        }

        if let Some(error) = rpc_response.error {
            return Err(RpcError::Method {
                code: error.code,
                message: error.message,
            });
        }

        // `null` is a legitimate result (unknown block), so a missing field is
        // treated the same way
        Ok(rpc_response.result.unwrap_or(Value::Null))
    }

    async fn timed_request(&self, method: &str, params: Vec<Value>) -> std::result::Result<Value, RpcError> {
        let monitor = PerformanceMonitor::new(method);
        let result = self.make_request(method, params).await;
        let duration = monitor.finish_with_result(&result);
        MetricsLogger::log_rpc_call(method, duration, result.is_ok());
        result
    }

    pub async fn get_latest_block_number(&self) -> Result<u64> {
        let result = self.timed_request("eth_blockNumber", vec![]).await?;

        let hex_string = result.as_str().ok_or_else(|| {
            RpcError::InvalidResponse(format!("block number is not a string: {}", result))
        })?;

        Ok(parse_hex_to_u64(hex_string)?)
    }

    pub async fn get_block(&self, block_number: u64, hydrated: bool) -> Result<Block> {
        let params = vec![json!(format!("0x{:x}", block_number)), json!(hydrated)];
        let result = self.timed_request("eth_getBlockByNumber", params).await?;

        if result.is_null() {
            return Err(RpcError::BlockNotFound { block_number }.into());
        }

        let block = parse_block(result)?;

        LogContext::new("rpc_client", "get_block")
            .with_block_number(block.number)
            .with_metadata("transaction_count", json!(block.transactions.len()))
            .debug(&format!(
                "Retrieved block {} with {} transactions",
                block.number,
                block.transactions.len()
            ));

        Ok(block)
    }
}

#[async_trait]
impl BlockSource for RpcClient {
    async fn current_height(&self) -> Result<u64> {
        self.get_latest_block_number().await
    }

    async fn block_at(&self, height: u64, hydrated: bool) -> Result<Block> {
        self.get_block(height, hydrated).await
    }
}

/// Decode an `eth_getBlockByNumber` result into a `Block`
pub fn parse_block(value: Value) -> Result<Block> {
    let raw: RawBlock = serde_json::from_value(value).map_err(RpcError::Json)?;
    let number = parse_hex_to_u64(&raw.number)?;

    let transactions = if raw.transactions.is_null() {
        decode_transactions(&Value::Array(Vec::new()))?
    } else {
        decode_transactions(&raw.transactions)?
    };

    Ok(Block {
        number,
        hash: raw.hash,
        transactions,
    })
}

/// Parse a `0x`-prefixed hex quantity
pub fn parse_hex_to_u64(hex_str: &str) -> std::result::Result<u64, DecodeError> {
    let digits = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    if digits.is_empty() {
        return Err(DecodeError::InvalidQuantity(hex_str.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| DecodeError::InvalidQuantity(hex_str.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexerError;
    use crate::models::BlockTransactions;

    #[test]
    fn test_rpc_client_creation() {
        let config = RpcConfig {
            endpoint: "http://localhost:8545".to_string(),
            timeout_seconds: 5,
        };
        let client = RpcClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8545");
    }

    #[test]
    fn test_json_rpc_request_serialization() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "eth_getBlockByNumber",
            params: vec![json!("0xa"), json!(true)],
            id: 7,
        };

        let serialized = serde_json::to_string(&request).unwrap();
        let expected =
            r#"{"jsonrpc":"2.0","method":"eth_getBlockByNumber","params":["0xa",true],"id":7}"#;
        assert_eq!(serialized, expected);
    }

    #[test]
    fn test_json_rpc_response_deserialization_error() {
        let response_json =
            r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"},"id":1}"#;
        let response: JsonRpcResponse = serde_json::from_str(response_json).unwrap();

        assert_eq!(response.id, 1);
        assert!(response.result.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.code, -32601);
        assert_eq!(error.message, "Method not found");
    }

    #[test]
    fn test_parse_hex_to_u64() {
        assert_eq!(parse_hex_to_u64("0x1234").unwrap(), 0x1234u64);
        assert_eq!(parse_hex_to_u64("1234").unwrap(), 0x1234u64);
        assert_eq!(parse_hex_to_u64("0x0").unwrap(), 0u64);
        assert!(parse_hex_to_u64("0x").is_err());
        assert!(parse_hex_to_u64("invalid").is_err());
    }

    #[test]
    fn test_parse_block_with_hashes() {
        let block = parse_block(json!({
            "number": "0x10",
            "hash": "0xb10c",
            "transactions": ["0x01", "0x02"]
        }))
        .unwrap();

        assert_eq!(block.number, 16);
        assert_eq!(block.hash.as_deref(), Some("0xb10c"));
        assert_eq!(
            block.transactions,
            BlockTransactions::Hashes(vec!["0x01".to_string(), "0x02".to_string()])
        );
    }

    #[test]
    fn test_parse_block_without_transactions() {
        let block = parse_block(json!({ "number": "0x1" })).unwrap();
        assert!(block.transactions.is_empty());
    }

    #[test]
    fn test_parse_block_rejects_bad_number() {
        let result = parse_block(json!({ "number": "ten", "transactions": [] }));
        assert!(matches!(
            result,
            Err(IndexerError::Decode(DecodeError::InvalidQuantity(_)))
        ));
    }

    #[test]
    fn test_parse_block_rejects_unknown_envelope() {
        let result = parse_block(json!({
            "number": "0x1",
            "transactions": [{ "type": "0x7e", "hash": "0x1", "from": "0xa" }]
        }));
        assert!(matches!(
            result,
            Err(IndexerError::Decode(DecodeError::UnknownEnvelope(_)))
        ));
    }
}

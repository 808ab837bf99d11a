// src/rpc.rs
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::blocks::BlockSource;
use crate::models::RawLog;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error: HTTP {0}")]
    Status(StatusCode),

    #[error("JSON-RPC error: code={code}, message={message}")]
    JsonRpc { code: i64, message: String },

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("{0} returned no result")]
    MissingResult(String),

    #[error("Invalid hex quantity: {0}")]
    InvalidQuantity(String),
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Log {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

impl From<&Log> for RawLog {
    fn from(log: &Log) -> Self {
        RawLog::new(&log.address, &log.topics, &log.data)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    #[serde(default)]
    pub input: String,
    pub gas_price: Option<String>,
    pub block_number: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub status: Option<String>,
    pub gas_used: String,
    pub effective_gas_price: Option<String>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

impl TransactionReceipt {
    /// Receipt status `0x0` marks a reverted transaction.
    pub fn failed(&self) -> bool {
        matches!(self.status.as_deref(), Some(s) if parse_quantity(s).map(|v| v == 0).unwrap_or(false))
    }

    pub fn raw_logs(&self) -> Vec<RawLog> {
        self.logs.iter().map(RawLog::from).collect()
    }
}

#[derive(Debug, Deserialize)]
struct Block {
    timestamp: String,
}

/// Parse a `0x`-prefixed JSON-RPC quantity.
pub fn parse_quantity(hex: &str) -> Result<u128, RpcError> {
    u128::from_str_radix(hex.trim_start_matches("0x"), 16)
        .map_err(|_| RpcError::InvalidQuantity(hex.to_string()))
}

/// Like `parse_quantity`, but rejects values that do not fit the target type.
pub fn parse_quantity_as<T: TryFrom<u128>>(hex: &str) -> Result<T, RpcError> {
    T::try_from(parse_quantity(hex)?).map_err(|_| RpcError::InvalidQuantity(hex.to_string()))
}

/// Minimal JSON-RPC client for the node behind `ALCHEMY_URL`.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    url: String,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>, RpcError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        debug!("📡 Sending {} → {}", method, self.url);

        let resp = self.client.post(&self.url).json(&payload).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(RpcError::Status(resp.status()));
        }
        let text = resp.text().await?;

        let parsed: RpcResponse<T> = serde_json::from_str(&text)?;
        if let Some(err) = parsed.error {
            return Err(RpcError::JsonRpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(parsed.result)
    }

    async fn call_required<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        self.call(method, params)
            .await?
            .ok_or_else(|| RpcError::MissingResult(method.to_string()))
    }

    /// Get the latest block number
    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let hex: String = self.call_required("eth_blockNumber", json!([])).await?;
        parse_quantity_as(&hex)
    }

    pub async fn block_timestamp(&self, number: u64) -> Result<i64, RpcError> {
        let block: Block = self
            .call_required("eth_getBlockByNumber", json!([format!("0x{:x}", number), false]))
            .await?;
        parse_quantity_as(&block.timestamp)
    }

    /// `None` when the node does not know the hash.
    pub async fn transaction(&self, hash: &str) -> Result<Option<RpcTransaction>, RpcError> {
        self.call("eth_getTransactionByHash", json!([hash])).await
    }

    pub async fn transaction_receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>, RpcError> {
        self.call("eth_getTransactionReceipt", json!([hash])).await
    }
}

#[async_trait]
impl BlockSource for RpcClient {
    async fn latest_block_number(&self) -> Result<u64, RpcError> {
        self.block_number().await
    }

    async fn block_timestamp(&self, number: u64) -> Result<i64, RpcError> {
        RpcClient::block_timestamp(self, number).await
    }
}

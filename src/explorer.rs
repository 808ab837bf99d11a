// src/explorer.rs
// Etherscan v2 (Arbiscan) API client. Every request is followed by a fixed
// pause to stay inside the free-tier quota of five calls per second.

use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::blocks::{Direction, TimestampIndex};
use crate::models::{normalize_hex, TxRecord};
use crate::price::{PriceError, PriceFeed};

pub const BASE_URL_V2: &str = "https://api.etherscan.io/v2/api";
pub const ARBITRUM_CHAIN_ID: u64 = 42161;
pub const MAX_PAGE_SIZE: usize = 10_000;

const REQUEST_PAUSE: Duration = Duration::from_millis(250);
const BENIGN_MESSAGES: [&str; 3] = ["No transactions found", "No records found", "OK"];

#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("Unusable {what}: {value}")]
    UnusableValue { what: &'static str, value: String },

    #[error("Invalid transaction row {hash}: {reason}")]
    InvalidRow { hash: String, reason: String },
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

/// One `account/txlist` row; every field arrives as a string.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerTx {
    pub hash: String,
    #[serde(default)]
    pub time_stamp: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub gas_used: String,
    #[serde(default)]
    pub gas_price: String,
    #[serde(default)]
    pub is_error: String,
    #[serde(default, rename = "txreceipt_status")]
    pub receipt_status: String,
}

impl TryFrom<ExplorerTx> for TxRecord {
    type Error = ExplorerError;

    fn try_from(raw: ExplorerTx) -> Result<Self, Self::Error> {
        let invalid = |reason: String| ExplorerError::InvalidRow {
            hash: raw.hash.clone(),
            reason,
        };

        let from = Address::from_str(raw.from.trim())
            .map_err(|e| invalid(format!("from {:?}: {}", raw.from, e)))?;
        // empty `to` is a contract creation
        let to = match raw.to.trim() {
            "" => None,
            s => Some(Address::from_str(s).map_err(|e| invalid(format!("to {:?}: {}", s, e)))?),
        };
        let timestamp = raw
            .time_stamp
            .parse::<i64>()
            .map_err(|e| invalid(format!("timeStamp {:?}: {}", raw.time_stamp, e)))?;

        Ok(TxRecord {
            hash: normalize_hex(&raw.hash),
            from,
            to,
            input: normalize_hex(&raw.input),
            gas_used: raw.gas_used.parse().unwrap_or(0),
            gas_price: raw.gas_price.parse().unwrap_or(0),
            timestamp,
            failed: raw.is_error == "1" || raw.receipt_status == "0",
        })
    }
}

/// One `txlist` page. `fetched` counts raw rows, including any that failed to
/// parse, and is what pagination compares against the page size.
#[derive(Debug, Clone, Default)]
pub struct TxPage {
    pub records: Vec<TxRecord>,
    pub fetched: usize,
}

impl TxPage {
    /// Errors come back as a string `result`, which reads as an empty page.
    fn from_result(result: Value) -> Result<Self, ExplorerError> {
        let rows: Vec<ExplorerTx> = match result {
            Value::Array(_) => serde_json::from_value(result)?,
            _ => return Ok(Self::default()),
        };

        let fetched = rows.len();
        let mut records = Vec::with_capacity(fetched);
        for row in rows {
            match TxRecord::try_from(row) {
                Ok(tx) => records.push(tx),
                Err(e) => warn!("Skipping explorer row: {}", e),
            }
        }
        Ok(Self { records, fetched })
    }
}

#[derive(Debug, Clone)]
pub struct ExplorerClient {
    client: Client,
    api_key: String,
    base_url: String,
    chain_id: u64,
}

impl ExplorerClient {
    pub fn new(api_key: &str) -> Result<Self, ExplorerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: BASE_URL_V2.to_string(),
            chain_id: ARBITRUM_CHAIN_ID,
        })
    }

    pub fn http(&self) -> &Client {
        &self.client
    }

    async fn request(&self, params: &[(&str, String)]) -> Result<ApiResponse, ExplorerError> {
        let mut query: Vec<(&str, String)> = params.to_vec();
        query.push(("apikey", self.api_key.clone()));
        query.push(("chainid", self.chain_id.to_string()));

        debug!("📡 Explorer {:?}", params);

        let result = async {
            let resp = self
                .client
                .get(&self.base_url)
                .query(&query)
                .send()
                .await?
                .error_for_status()?;
            let text = resp.text().await?;
            Ok::<_, ExplorerError>(serde_json::from_str::<ApiResponse>(&text)?)
        }
        .await;

        // free tier: 5 calls/s
        sleep(REQUEST_PAUSE).await;

        let data = result?;
        if data.status == "0" && !BENIGN_MESSAGES.contains(&data.message.as_str()) {
            let detail: String = data.result.to_string().chars().take(100).collect();
            warn!("Explorer API: {} - {}", data.message, detail);
        }
        Ok(data)
    }

    async fn txlist(
        &self,
        address: Address,
        start_block: u64,
        end_block: u64,
        page: u32,
        offset: usize,
    ) -> Result<TxPage, ExplorerError> {
        let data = self
            .request(&[
                ("module", "account".to_string()),
                ("action", "txlist".to_string()),
                ("address", address.to_string()),
                ("startblock", start_block.to_string()),
                ("endblock", end_block.to_string()),
                ("page", page.to_string()),
                ("offset", offset.to_string()),
                ("sort", "asc".to_string()),
            ])
            .await?;

        TxPage::from_result(data.result)
    }

    /// Normal transactions sent from or to `address`, ascending.
    pub async fn transactions(
        &self,
        address: Address,
        start_block: u64,
        end_block: u64,
        page: u32,
        offset: usize,
    ) -> Result<TxPage, ExplorerError> {
        self.txlist(address, start_block, end_block, page, offset).await
    }

    /// Transactions from any caller into `contract`.
    ///
    /// `records` may be shorter than `fetched` because rows sent by the
    /// contract itself are dropped.
    pub async fn transactions_to_contract(
        &self,
        contract: Address,
        start_block: u64,
        end_block: u64,
        page: u32,
        offset: usize,
    ) -> Result<TxPage, ExplorerError> {
        let mut page = self.txlist(contract, start_block, end_block, page, offset).await?;
        page.records.retain(|tx| tx.to == Some(contract));
        Ok(page)
    }

    pub async fn block_by_timestamp(&self, timestamp: i64, closest: Direction) -> Result<u64, ExplorerError> {
        let data = self
            .request(&[
                ("module", "block".to_string()),
                ("action", "getblocknobytime".to_string()),
                ("timestamp", timestamp.to_string()),
                ("closest", closest.as_str().to_string()),
            ])
            .await?;

        let parsed = match &data.result {
            Value::String(s) => s.parse::<u64>().ok(),
            Value::Number(n) => n.as_u64(),
            _ => None,
        };
        match parsed {
            Some(block) if block > 0 => Ok(block),
            _ => Err(ExplorerError::UnusableValue {
                what: "block number",
                value: data.result.to_string(),
            }),
        }
    }

    /// Current ETH/USD spot price.
    pub async fn eth_price(&self) -> Result<Decimal, ExplorerError> {
        let data = self
            .request(&[
                ("module", "stats".to_string()),
                ("action", "ethprice".to_string()),
            ])
            .await?;

        let raw = data.result.get("ethusd").cloned().unwrap_or(Value::Null);
        let price = match &raw {
            Value::String(s) => Decimal::from_str(s).ok(),
            Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
            _ => None,
        };
        match price {
            Some(p) if p > Decimal::ZERO => Ok(p),
            _ => Err(ExplorerError::UnusableValue {
                what: "ETH price",
                value: raw.to_string(),
            }),
        }
    }
}

#[async_trait]
impl TimestampIndex for ExplorerClient {
    async fn block_at(&self, timestamp: i64, direction: Direction) -> Result<u64, ExplorerError> {
        self.block_by_timestamp(timestamp, direction).await
    }
}

#[async_trait]
impl PriceFeed for ExplorerClient {
    fn name(&self) -> &'static str {
        "explorer"
    }

    async fn eth_usd(&self) -> Result<Decimal, PriceError> {
        Ok(self.eth_price().await?)
    }
}

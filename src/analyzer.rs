// src/analyzer.rs
use alloy::primitives::Address;
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{info, warn};

use crate::aggregator;
use crate::blocks::{BlockLocator, Direction};
use crate::classifier::Classifier;
use crate::config::{Config, RunMode};
use crate::explorer::{ExplorerClient, ExplorerError, TxPage, MAX_PAGE_SIZE};
use crate::models::{normalize_hex, ClassifiedTransaction, TxRecord};
use crate::price::{CoinGeckoClient, PriceCache, PriceFeed};
use crate::rpc::{parse_quantity, parse_quantity_as, RpcClient, RpcError, TransactionReceipt};

/// Paged transaction listings by block range.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn wallet_page(&self, wallet: Address, start_block: u64, end_block: u64, page: u32)
        -> Result<TxPage, ExplorerError>;
    async fn contract_page(&self, contract: Address, start_block: u64, end_block: u64, page: u32)
        -> Result<TxPage, ExplorerError>;
}

#[async_trait]
impl TransactionSource for ExplorerClient {
    async fn wallet_page(&self, wallet: Address, start_block: u64, end_block: u64, page: u32)
        -> Result<TxPage, ExplorerError> {
        self.transactions(wallet, start_block, end_block, page, MAX_PAGE_SIZE).await
    }

    async fn contract_page(&self, contract: Address, start_block: u64, end_block: u64, page: u32)
        -> Result<TxPage, ExplorerError> {
        self.transactions_to_contract(contract, start_block, end_block, page, MAX_PAGE_SIZE)
            .await
    }
}

/// Receipt lookup by transaction hash.
#[async_trait]
pub trait ReceiptSource: Send + Sync {
    async fn receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>, RpcError>;
}

#[async_trait]
impl ReceiptSource for RpcClient {
    async fn receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>, RpcError> {
        self.transaction_receipt(hash).await
    }
}

/// Every transaction into `contract` within the block range, with the
/// excluded sender already removed. Pages until one comes back short.
pub async fn collect_transactions(
    source: &dyn TransactionSource,
    mode: &RunMode,
    contract: Address,
    start_block: u64,
    end_block: u64,
) -> Result<Vec<TxRecord>> {
    match mode {
        RunMode::AllWallets { .. } => info!("Fetching ALL transactions to contract {}...", contract),
        RunMode::SingleWallet(wallet) => info!("Fetching transactions for wallet {}...", wallet),
    }

    let mut all = Vec::new();
    let mut page = 1;
    loop {
        let batch = match mode {
            RunMode::AllWallets { .. } => source.contract_page(contract, start_block, end_block, page).await?,
            RunMode::SingleWallet(wallet) => source.wallet_page(*wallet, start_block, end_block, page).await?,
        };

        all.extend(batch.records);
        if batch.fetched < MAX_PAGE_SIZE {
            break;
        }
        page += 1;
    }

    let total = all.len();
    let to_contract: Vec<TxRecord> = all.into_iter().filter(|tx| tx.to == Some(contract)).collect();
    let before_exclusion = to_contract.len();
    let txs = aggregator::exclude_wallet(to_contract, mode.excluded());
    if let Some(excluded) = mode.excluded() {
        info!("  Excluded {} transactions from {}", before_exclusion - txs.len(), excluded);
    }

    info!("  Found {} total transactions", total);
    info!("  {} transactions to futures contract", txs.len());
    if let RunMode::AllWallets { .. } = mode {
        let unique: HashSet<Address> = txs.iter().map(|tx| tx.from).collect();
        info!("  {} unique wallets", unique.len());
    }

    Ok(txs)
}

/// Fetch the receipt and classify one transaction. `None` means excluded;
/// a receipt that cannot be fetched is an error.
pub async fn classify_with_receipt(
    receipts: &dyn ReceiptSource,
    classifier: &Classifier,
    wallet: Option<Address>,
    prices: &mut PriceCache,
    feeds: &[&dyn PriceFeed],
    tx: &TxRecord,
) -> Result<Option<ClassifiedTransaction>> {
    if tx.to != Some(classifier.contract()) || tx.failed {
        return Ok(None);
    }

    let receipt = receipts
        .receipt(&tx.hash)
        .await
        .wrap_err_with(|| format!("fetching receipt for {}", tx.hash))?
        .ok_or_else(|| eyre!("receipt for {} not found", tx.hash))?;

    if receipt.failed() {
        return Ok(None);
    }

    let logs = receipt.raw_logs();
    let price = prices.get_or_fetch(feeds).await;
    Ok(classifier.classify(tx, &logs, wallet, |_| price))
}

/// Classify `txs` in order, logging one progress line each.
pub async fn classify_all(
    receipts: &dyn ReceiptSource,
    classifier: &Classifier,
    wallet: Option<Address>,
    prices: &mut PriceCache,
    feeds: &[&dyn PriceFeed],
    txs: &[TxRecord],
) -> Result<Vec<ClassifiedTransaction>> {
    info!("Analyzing transactions...");

    let mut results = Vec::with_capacity(txs.len());
    let count = txs.len();
    for (i, tx) in txs.iter().enumerate() {
        let short = tx.hash.get(..18).unwrap_or(&tx.hash);
        match classify_with_receipt(receipts, classifier, wallet, prices, feeds, tx).await? {
            Some(analysis) => {
                info!(
                    "  [{}/{}] {}... ✓ {}: {} | ${} fees",
                    i + 1,
                    count,
                    short,
                    analysis.method,
                    analysis.action_summary(),
                    analysis.fee_amount.round_dp(2)
                );
                results.push(analysis);
            }
            None => info!("  [{}/{}] {}... ✗ skipped (failed or non-relevant)", i + 1, count, short),
        }
    }

    Ok(results)
}

/// One analysis session: upstream clients, the classifier and the run's price snapshot.
pub struct Analyzer {
    explorer: ExplorerClient,
    rpc: RpcClient,
    coingecko: CoinGeckoClient,
    classifier: Classifier,
    prices: PriceCache,
    mode: RunMode,
}

impl Analyzer {
    pub fn new(cfg: &Config) -> Result<Self> {
        let explorer = ExplorerClient::new(&cfg.arbiscan_api_key)?;
        let rpc = RpcClient::new(&cfg.rpc_http_url)?;
        let coingecko = CoinGeckoClient::new(explorer.http().clone());

        Ok(Self {
            explorer,
            rpc,
            coingecko,
            classifier: Classifier::new(cfg.futures_contract, cfg.token_decimals),
            prices: PriceCache::new(),
            mode: cfg.mode.clone(),
        })
    }

    /// Classify every relevant transaction between `cfg.start` and `cfg.end`.
    pub async fn analyze_range(&mut self, cfg: &Config) -> Result<Vec<ClassifiedTransaction>> {
        let start_ts = cfg.start.timestamp();
        let end_ts = cfg.end.timestamp();
        info!("Fetching block numbers for date range...");
        info!("  Start: {} (timestamp: {})", cfg.start.to_rfc3339(), start_ts);
        info!("  End: {} (timestamp: {})", cfg.end.to_rfc3339(), end_ts);

        let locator = BlockLocator::new(&self.explorer, &self.rpc);
        let start_block = locator
            .locate(start_ts, Direction::After)
            .await
            .wrap_err("locating start block")?;
        let end_block = locator
            .locate(end_ts, Direction::Before)
            .await
            .wrap_err("locating end block")?;
        info!("  Block range: {} - {}", start_block, end_block);

        let contract = self.classifier.contract();
        let txs = collect_transactions(&self.explorer, &self.mode, contract, start_block, end_block).await?;

        let feeds: [&dyn PriceFeed; 2] = [&self.explorer, &self.coingecko];
        let results = classify_all(
            &self.rpc,
            &self.classifier,
            self.mode.wallet(),
            &mut self.prices,
            &feeds,
            &txs,
        )
        .await?;

        if let Some(price) = self.prices.cached() {
            info!("Fiat values use ETH price ${}", price);
        }
        Ok(results)
    }

    /// Classify one transaction fetched straight from the node.
    pub async fn analyze_single(&mut self, hash: &str) -> Result<Vec<ClassifiedTransaction>> {
        let hash = normalize_hex(hash);
        info!("Analyzing single transaction: {}", hash);

        let rpc_tx = self
            .rpc
            .transaction(&hash)
            .await?
            .ok_or_else(|| eyre!("Transaction {} not found", hash))?;
        let receipt = self
            .rpc
            .transaction_receipt(&hash)
            .await?
            .ok_or_else(|| eyre!("Receipt for {} not found", hash))?;

        let block_number: u64 = match rpc_tx.block_number.as_deref() {
            Some(b) => parse_quantity_as(b)?,
            None => return Err(eyre!("Transaction {} is still pending", hash)),
        };
        let timestamp = self.rpc.block_timestamp(block_number).await?;

        let gas_used: u64 = parse_quantity_as(&receipt.gas_used)?;
        let gas_price = match rpc_tx.gas_price.as_deref().or(receipt.effective_gas_price.as_deref()) {
            Some(p) => parse_quantity(p)?,
            None => 0,
        };

        let tx = TxRecord {
            hash: hash.clone(),
            from: Address::from_str(&rpc_tx.from).wrap_err("transaction sender")?,
            to: rpc_tx.to.as_deref().map(Address::from_str).transpose().wrap_err("transaction recipient")?,
            input: normalize_hex(&rpc_tx.input),
            gas_used,
            gas_price,
            timestamp,
            failed: receipt.failed(),
        };

        info!("  From: {}", tx.from);
        if let Some(to) = tx.to {
            info!("  To: {}", to);
        }
        info!("  Gas Used: {}", gas_used);

        let logs = receipt.raw_logs();
        let feeds: [&dyn PriceFeed; 2] = [&self.explorer, &self.coingecko];
        let price: Decimal = self.prices.get_or_fetch(&feeds).await;
        match self.classifier.classify(&tx, &logs, None, |_| price) {
            Some(analysis) => Ok(vec![analysis]),
            None => {
                warn!("Transaction could not be analyzed (may be failed or non-relevant)");
                Ok(Vec::new())
            }
        }
    }
}

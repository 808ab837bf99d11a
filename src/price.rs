// src/price.rs
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::explorer::ExplorerError;

pub const COINGECKO_SIMPLE_PRICE: &str = "https://api.coingecko.com/api/v3/simple/price";

/// Used when every feed fails.
pub const DEFAULT_ETH_PRICE_USD: Decimal = Decimal::from_parts(3300, 0, 0, false, 0);

#[derive(Error, Debug)]
pub enum PriceError {
    #[error(transparent)]
    Explorer(#[from] ExplorerError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unusable price: {0}")]
    Unusable(String),
}

#[async_trait]
pub trait PriceFeed: Send + Sync {
    fn name(&self) -> &'static str;
    async fn eth_usd(&self) -> Result<Decimal, PriceError>;
}

pub struct CoinGeckoClient {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct UsdQuote {
    usd: Option<f64>,
}

impl CoinGeckoClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            url: COINGECKO_SIMPLE_PRICE.to_string(),
        }
    }
}

#[async_trait]
impl PriceFeed for CoinGeckoClient {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    async fn eth_usd(&self) -> Result<Decimal, PriceError> {
        let quotes: HashMap<String, UsdQuote> = self
            .client
            .get(&self.url)
            .query(&[("ids", "ethereum"), ("vs_currencies", "usd")])
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let usd = quotes.get("ethereum").and_then(|q| q.usd);
        match usd.and_then(Decimal::from_f64) {
            Some(p) if p > Decimal::ZERO => Ok(p),
            _ => Err(PriceError::Unusable(format!("{:?}", usd))),
        }
    }
}

/// One fiat price per run, fetched on first use.
///
/// Every transaction in a run is valued at this single snapshot, not at
/// the price when it was mined.
#[derive(Debug, Default)]
pub struct PriceCache {
    cached: Option<Decimal>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(&self) -> Option<Decimal> {
        self.cached
    }

    /// Return the snapshot, asking `feeds` in order on first use.
    pub async fn get_or_fetch(&mut self, feeds: &[&dyn PriceFeed]) -> Decimal {
        if let Some(price) = self.cached {
            return price;
        }

        let mut price = None;
        for feed in feeds {
            match feed.eth_usd().await {
                Ok(p) => {
                    info!("ETH price from {}: ${}", feed.name(), p);
                    price = Some(p);
                    break;
                }
                Err(e) => warn!("ETH price from {} failed: {}", feed.name(), e),
            }
        }

        let price = price.unwrap_or_else(|| {
            warn!("Could not fetch ETH price, using default ${}", DEFAULT_ETH_PRICE_USD);
            DEFAULT_ETH_PRICE_USD
        });
        self.cached = Some(price);
        price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFeed {
        price: Option<Decimal>,
        calls: AtomicUsize,
    }

    impl StubFeed {
        fn new(price: Option<Decimal>) -> Self {
            Self { price, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl PriceFeed for StubFeed {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn eth_usd(&self) -> Result<Decimal, PriceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.price.ok_or_else(|| PriceError::Unusable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn first_healthy_feed_wins_and_is_cached() {
        let down = StubFeed::new(None);
        let up = StubFeed::new(Some(Decimal::new(315012, 2)));
        let mut cache = PriceCache::new();

        let first = cache.get_or_fetch(&[&down, &up]).await;
        let second = cache.get_or_fetch(&[&down, &up]).await;

        assert_eq!(first, Decimal::new(315012, 2));
        assert_eq!(second, first);
        assert_eq!(down.calls.load(Ordering::SeqCst), 1);
        assert_eq!(up.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_feeds_down_uses_default() {
        let down = StubFeed::new(None);
        let mut cache = PriceCache::new();
        assert_eq!(cache.get_or_fetch(&[&down]).await, Decimal::new(3300, 0));
        assert_eq!(cache.cached(), Some(DEFAULT_ETH_PRICE_USD));
    }
}

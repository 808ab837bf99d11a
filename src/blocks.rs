// src/blocks.rs
use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::explorer::ExplorerError;
use crate::rpc::RpcError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Before,
    After,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Before => "before",
            Direction::After => "after",
        }
    }
}

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("no block found {direction} timestamp {timestamp}")]
    NotFound { timestamp: i64, direction: &'static str },

    #[error("block lookup failed (explorer: {explorer}; rpc: {rpc})")]
    Unavailable { explorer: ExplorerError, rpc: RpcError },
}

/// Per-block timestamps, as exposed by a JSON-RPC node.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn latest_block_number(&self) -> Result<u64, RpcError>;
    async fn block_timestamp(&self, number: u64) -> Result<i64, RpcError>;
}

/// A service that maps timestamps to blocks directly.
#[async_trait]
pub trait TimestampIndex: Send + Sync {
    async fn block_at(&self, timestamp: i64, direction: Direction) -> Result<u64, ExplorerError>;
}

/// Binary search over `[1, latest]` for the block nearest `timestamp`.
///
/// `Before` yields the last block at or before the timestamp, `After` the
/// first block at or after it. Returns 0 only when the chain has no blocks.
pub async fn search_block<S>(source: &S, timestamp: i64, direction: Direction) -> Result<u64, RpcError>
where
    S: BlockSource + ?Sized,
{
    let latest = source.latest_block_number().await?;

    let mut low: u64 = 1;
    let mut high = latest;
    let mut result = match direction {
        Direction::After => low,
        Direction::Before => high,
    };

    while low <= high {
        let mid = low + (high - low) / 2;
        let mid_ts = source.block_timestamp(mid).await?;

        if mid_ts == timestamp {
            return Ok(mid);
        } else if mid_ts < timestamp {
            if direction == Direction::After {
                result = mid;
            }
            low = mid + 1;
        } else {
            if direction == Direction::Before {
                result = mid;
            }
            high = mid - 1;
        }
    }

    if result == 0 {
        return Ok(0);
    }

    // the bracket leaves us one block on the wrong side of the target
    let result_ts = source.block_timestamp(result).await?;
    match direction {
        Direction::Before if result_ts > timestamp && result > 1 => result -= 1,
        Direction::After if result_ts < timestamp && result < latest => result += 1,
        _ => {}
    }

    Ok(result)
}

/// Resolves timestamps to blocks: explorer index first, node search as fallback.
pub struct BlockLocator<'a> {
    index: &'a dyn TimestampIndex,
    chain: &'a dyn BlockSource,
}

impl<'a> BlockLocator<'a> {
    pub fn new(index: &'a dyn TimestampIndex, chain: &'a dyn BlockSource) -> Self {
        Self { index, chain }
    }

    pub async fn locate(&self, timestamp: i64, direction: Direction) -> Result<u64, LocateError> {
        let explorer_err = match self.index.block_at(timestamp, direction).await {
            Ok(block) => return Ok(block),
            Err(e) => e,
        };

        warn!(
            "Explorer block lookup failed ({}), searching node for block {} {}",
            explorer_err,
            direction.as_str(),
            timestamp
        );

        match search_block(self.chain, timestamp, direction).await {
            Ok(0) => Err(LocateError::NotFound {
                timestamp,
                direction: direction.as_str(),
            }),
            Ok(block) => {
                info!("Node search: block {} {} {}", block, direction.as_str(), timestamp);
                Ok(block)
            }
            Err(rpc) => Err(LocateError::Unavailable {
                explorer: explorer_err,
                rpc,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Block `n` has timestamp `stamps[n]`; index 0 is genesis.
    struct FakeChain {
        stamps: Vec<i64>,
        reads: AtomicUsize,
    }

    impl FakeChain {
        fn new(stamps: Vec<i64>) -> Self {
            Self { stamps, reads: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl BlockSource for FakeChain {
        async fn latest_block_number(&self) -> Result<u64, RpcError> {
            Ok(self.stamps.len() as u64 - 1)
        }

        async fn block_timestamp(&self, number: u64) -> Result<i64, RpcError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.stamps
                .get(number as usize)
                .copied()
                .ok_or_else(|| RpcError::MissingResult(format!("block {}", number)))
        }
    }

    struct DownChain;

    #[async_trait]
    impl BlockSource for DownChain {
        async fn latest_block_number(&self) -> Result<u64, RpcError> {
            Err(RpcError::MissingResult("eth_blockNumber".to_string()))
        }

        async fn block_timestamp(&self, _: u64) -> Result<i64, RpcError> {
            Err(RpcError::MissingResult("eth_getBlockByNumber".to_string()))
        }
    }

    struct FixedIndex(Option<u64>);

    #[async_trait]
    impl TimestampIndex for FixedIndex {
        async fn block_at(&self, _: i64, _: Direction) -> Result<u64, ExplorerError> {
            self.0.ok_or(ExplorerError::UnusableValue {
                what: "block number",
                value: "0".to_string(),
            })
        }
    }

    // irregular spacing: 0, 10, 20, 30, 32, 50, 70, 71, 90
    fn chain() -> FakeChain {
        FakeChain::new(vec![0, 10, 20, 30, 32, 50, 70, 71, 90])
    }

    #[tokio::test]
    async fn exact_match_returns_that_block() {
        assert_eq!(search_block(&chain(), 50, Direction::Before).await.unwrap(), 5);
        assert_eq!(search_block(&chain(), 50, Direction::After).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn between_blocks_respects_direction() {
        assert_eq!(search_block(&chain(), 40, Direction::Before).await.unwrap(), 4);
        assert_eq!(search_block(&chain(), 40, Direction::After).await.unwrap(), 5);
        assert_eq!(search_block(&chain(), 25, Direction::Before).await.unwrap(), 2);
        assert_eq!(search_block(&chain(), 25, Direction::After).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn targets_outside_the_chain_clamp_to_ends() {
        assert_eq!(search_block(&chain(), 5, Direction::Before).await.unwrap(), 1);
        assert_eq!(search_block(&chain(), 5, Direction::After).await.unwrap(), 1);
        assert_eq!(search_block(&chain(), 1_000, Direction::Before).await.unwrap(), 8);
        assert_eq!(search_block(&chain(), 1_000, Direction::After).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn search_is_logarithmic() {
        let stamps: Vec<i64> = (0..100_000).map(|n| n * 2).collect();
        let chain = FakeChain::new(stamps);
        assert_eq!(search_block(&chain, 77_777, Direction::Before).await.unwrap(), 38_888);
        assert!(chain.reads.load(Ordering::SeqCst) <= 20);
    }

    #[tokio::test]
    async fn locator_prefers_the_explorer() {
        let index = FixedIndex(Some(42));
        let chain = chain();
        let locator = BlockLocator::new(&index, &chain);
        assert_eq!(locator.locate(25, Direction::Before).await.unwrap(), 42);
        assert_eq!(chain.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn locator_falls_back_to_node_search() {
        let index = FixedIndex(None);
        let chain = chain();
        let locator = BlockLocator::new(&index, &chain);
        assert_eq!(locator.locate(25, Direction::After).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn locator_reports_when_both_strategies_fail() {
        let index = FixedIndex(None);
        let locator = BlockLocator::new(&index, &DownChain);
        let err = locator.locate(25, Direction::Before).await.unwrap_err();
        assert!(matches!(err, LocateError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn empty_chain_is_not_found_rather_than_block_zero() {
        let index = FixedIndex(None);
        let genesis_only = FakeChain::new(vec![0]);
        let locator = BlockLocator::new(&index, &genesis_only);
        let err = locator.locate(25, Direction::Before).await.unwrap_err();
        assert!(matches!(err, LocateError::NotFound { .. }));
    }
}

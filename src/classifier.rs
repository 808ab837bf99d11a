// src/classifier.rs
use alloy::primitives::{Address, U256};
use chrono::DateTime;
use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{units_to_decimal, ClassifiedTransaction, MethodCategory, RawLog, TxRecord};
use crate::parser::{self, DecodedEvent};

const NATIVE_DECIMALS: u32 = 18;

/// Turns a transaction plus its receipt logs into a `ClassifiedTransaction`.
///
/// Pure: receipts and the fiat price are supplied by the caller.
#[derive(Debug, Clone)]
pub struct Classifier {
    contract: Address,
    token_decimals: u32,
}

#[derive(Debug, Default)]
struct LogTally {
    into_contract: Decimal,
    out_of_contract: Decimal,
    orders_created: u32,
    orders_closed: u32,
    buy_orders: u32,
    sell_orders: u32,
}

impl Classifier {
    pub fn new(contract: Address, token_decimals: u32) -> Self {
        Self { contract, token_decimals }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Returns `None` when the transaction did not call the contract or failed on chain.
    pub fn classify<F>(
        &self,
        tx: &TxRecord,
        logs: &[RawLog],
        wallet_override: Option<Address>,
        price_lookup: F,
    ) -> Option<ClassifiedTransaction>
    where
        F: FnOnce(i64) -> Decimal,
    {
        if tx.to != Some(self.contract) {
            debug!("{} not sent to contract, skipping", tx.hash);
            return None;
        }
        if tx.failed {
            debug!("{} failed on chain, skipping", tx.hash);
            return None;
        }

        let timestamp = DateTime::from_timestamp(tx.timestamp, 0)?;
        let wallet = wallet_override.unwrap_or(tx.from);
        let method = tx
            .selector()
            .map(MethodCategory::from_selector)
            .unwrap_or(MethodCategory::Unknown);

        let tally = self.tally_logs(logs, wallet);

        let (fee_amount, deposit_amount, withdrawal_amount) = match method {
            MethodCategory::AddMargin => (Decimal::ZERO, tally.into_contract, Decimal::ZERO),
            MethodCategory::RemoveMargin => (Decimal::ZERO, Decimal::ZERO, tally.out_of_contract),
            MethodCategory::Multicall => (tally.into_contract, Decimal::ZERO, Decimal::ZERO),
            // unmatched inbound transfers count as fees rather than being dropped
            _ => (tally.into_contract, Decimal::ZERO, Decimal::ZERO),
        };

        let gas_wei = U256::from(tx.gas_used) * U256::from(tx.gas_price);
        let gas_cost_native = units_to_decimal(gas_wei, NATIVE_DECIMALS);
        let fiat_price = price_lookup(tx.timestamp);
        let gas_cost_fiat = gas_cost_native * fiat_price;

        Some(ClassifiedTransaction {
            timestamp,
            hash: tx.hash.clone(),
            wallet,
            method,
            fee_amount,
            deposit_amount,
            withdrawal_amount,
            gas_cost_native,
            gas_cost_fiat,
            fiat_price,
            orders_created: tally.orders_created,
            orders_closed: tally.orders_closed,
            buy_orders: tally.buy_orders,
            sell_orders: tally.sell_orders,
        })
    }

    fn tally_logs(&self, logs: &[RawLog], wallet: Address) -> LogTally {
        let mut tally = LogTally::default();

        for log in logs {
            match parser::decode(log) {
                DecodedEvent::Transfer(transfer) => {
                    let amount = units_to_decimal(transfer.amount, self.token_decimals);
                    if transfer.from == wallet && transfer.to == self.contract {
                        tally.into_contract += amount;
                    } else if transfer.from == self.contract && transfer.to == wallet {
                        tally.out_of_contract += amount;
                    }
                }
                DecodedEvent::OrderCreated(order) => {
                    tally.orders_created += 1;
                    if order.is_buy {
                        tally.buy_orders += 1;
                    } else {
                        tally.sell_orders += 1;
                    }
                }
                DecodedEvent::OrderClosed(_) => tally.orders_closed += 1,
                DecodedEvent::PositionCreated(_) | DecodedEvent::Unrecognized => {}
            }
        }

        tally
    }
}

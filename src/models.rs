// src/models.rs
use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// A receipt log in canonical form: lowercase hex, always `0x`-prefixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

impl RawLog {
    pub fn new(address: &str, topics: &[String], data: &str) -> Self {
        Self {
            address: normalize_hex(address),
            topics: topics.iter().map(|t| normalize_hex(t)).collect(),
            data: normalize_hex(data),
        }
    }
}

/// Lowercase and force a `0x` prefix.
pub fn normalize_hex(s: &str) -> String {
    let s = s.trim();
    let body = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    format!("0x{}", body.to_ascii_lowercase())
}

/// A transaction sent to the futures contract, normalized at the API boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub hash: String,
    pub from: Address,
    pub to: Option<Address>, // None for contract creation
    pub input: String,
    pub gas_used: u64,
    pub gas_price: u128,
    pub timestamp: i64,
    pub failed: bool, // isError == "1" or receipt status 0
}

impl TxRecord {
    /// First four bytes of the call data as `0x`-prefixed lowercase hex.
    pub fn selector(&self) -> Option<&str> {
        self.input.get(..10)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MethodCategory {
    Multicall,
    CreateOrder,
    CloseOrder,
    AddMargin,
    RemoveMargin,
    Unknown,
}

impl MethodCategory {
    pub const MULTICALL: &'static str = "0xac9650d8"; // multicall(bytes[])
    pub const CREATE_ORDER: &'static str = "0x6828a054"; // createOrder(uint256,uint256,string,int8)
    pub const CLOSE_ORDER: &'static str = "0x3bed6b95"; // closeOrder(bytes32)
    pub const ADD_MARGIN: &'static str = "0xa43be948"; // addMargin(uint256)
    pub const REMOVE_MARGIN: &'static str = "0xf11f854f"; // removeMargin(uint256)

    pub fn from_selector(selector: &str) -> Self {
        match selector.to_ascii_lowercase().as_str() {
            Self::MULTICALL => Self::Multicall,
            Self::CREATE_ORDER => Self::CreateOrder,
            Self::CLOSE_ORDER => Self::CloseOrder,
            Self::ADD_MARGIN => Self::AddMargin,
            Self::REMOVE_MARGIN => Self::RemoveMargin,
            _ => Self::Unknown,
        }
    }

    /// Contract function name, as rendered in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Multicall => "multicall",
            Self::CreateOrder => "createOrder",
            Self::CloseOrder => "closeOrder",
            Self::AddMargin => "addMargin",
            Self::RemoveMargin => "removeMargin",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MethodCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Economic view of one successful transaction to the futures contract.
///
/// At most one of `fee_amount`, `deposit_amount` and `withdrawal_amount`
/// is non-zero. `fiat_price` is the run-wide snapshot, not the price at
/// the transaction's block.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedTransaction {
    pub timestamp: DateTime<Utc>,
    pub hash: String,
    pub wallet: Address,
    pub method: MethodCategory,
    pub fee_amount: Decimal,
    pub deposit_amount: Decimal,
    pub withdrawal_amount: Decimal,
    pub gas_cost_native: Decimal,
    pub gas_cost_fiat: Decimal,
    pub fiat_price: Decimal,
    pub orders_created: u32,
    pub orders_closed: u32,
    pub buy_orders: u32,
    pub sell_orders: u32,
}

impl ClassifiedTransaction {
    /// Short human description of what the transaction did.
    pub fn action_summary(&self) -> String {
        match self.method {
            MethodCategory::Multicall => {
                if self.orders_created > 0 && self.orders_closed > 0 {
                    format!(
                        "{} created ({}B/{}S), {} closed",
                        self.orders_created, self.buy_orders, self.sell_orders, self.orders_closed
                    )
                } else if self.orders_created > 0 {
                    format!(
                        "{} orders ({} buy, {} sell)",
                        self.orders_created, self.buy_orders, self.sell_orders
                    )
                } else if self.orders_closed > 0 {
                    format!("{} orders closed", self.orders_closed)
                } else {
                    "other".to_string()
                }
            }
            MethodCategory::CreateOrder => {
                if self.buy_orders > 0 { "buy" } else { "sell" }.to_string()
            }
            MethodCategory::AddMargin => format!("+${:.2} deposit", self.deposit_amount.round_dp(2)),
            MethodCategory::RemoveMargin => {
                format!("-${:.2} withdrawal", self.withdrawal_amount.round_dp(2))
            }
            _ => String::new(),
        }
    }
}

const MAX_DECIMAL_SCALE: u32 = 28;

/// Convert an integer amount in smallest units into a decimal value.
///
/// Amounts beyond `Decimal`'s 96-bit mantissa lose low-order digits; values
/// that still do not fit saturate at `Decimal::MAX`.
pub fn units_to_decimal(value: U256, decimals: u32) -> Decimal {
    let ten = U256::from(10u8);
    let mut value = value;
    let mut scale = decimals;

    while scale > MAX_DECIMAL_SCALE {
        value /= ten;
        scale -= 1;
    }

    loop {
        let fitted = u128::try_from(value)
            .ok()
            .and_then(|raw| i128::try_from(raw).ok())
            .and_then(|raw| Decimal::try_from_i128_with_scale(raw, scale).ok());
        if let Some(amount) = fitted {
            return amount;
        }
        if scale == 0 {
            return Decimal::MAX;
        }
        value /= ten;
        scale -= 1;
    }
}

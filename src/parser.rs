// src/parser.rs
use alloy::primitives::{Address, U256};
use crate::models::RawLog;

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// keccak256("OrderCreated(bytes32,address,string,uint256,uint256,bool)")
pub const ORDER_CREATED_TOPIC: &str =
    "0x1f52a6f4a2d2a66b497ba87509c3bf307f623f437d154026f26716ed2d496d3b";

/// keccak256("OrderClosed(bytes32,address)")
pub const ORDER_CLOSED_TOPIC: &str =
    "0xba23b3f42d60d00e8a99f8faa964276a8b5eb6b1088f9f2d1ea3482c95654fe6";

/// PositionCreated(bytes32 indexed positionId, address indexed seller, address indexed buyer, ...)
pub const POSITION_CREATED_TOPIC: &str =
    "0x4258e60eecf21b127496b52cfc5b7b5299721db725ba5620a55e2a7c84d43294";

const WORD: usize = 32;

/// A decoded ERC20 Transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub amount: U256, // smallest token units
}

/// Identity fields are `None` when the log carried the signature but not the indexed topics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderCreatedEvent {
    pub order_id: Option<String>,
    pub participant: Option<Address>,
    pub price_per_day: U256,
    pub delivery_at: U256,
    pub is_buy: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderClosedEvent {
    pub order_id: Option<String>,
    pub participant: Option<Address>,
}

/// Only the indexed fields are decoded; nothing downstream aggregates positions yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionCreatedEvent {
    pub position_id: String,
    pub seller: Option<Address>,
    pub buyer: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    Transfer(TransferEvent),
    OrderCreated(OrderCreatedEvent),
    OrderClosed(OrderClosedEvent),
    PositionCreated(PositionCreatedEvent),
    Unrecognized,
}

/// Decode a receipt log against the known futures-contract events.
///
/// Total: unknown signatures and malformed payloads end up as `Unrecognized`
/// or as zeroed fields, never as an error. Order events are recognized by
/// signature alone; missing topics only leave their fields empty.
pub fn decode(log: &RawLog) -> DecodedEvent {
    let Some(topic0) = log.topics.first() else {
        return DecodedEvent::Unrecognized;
    };

    let decoded = match topic0.as_str() {
        TRANSFER_TOPIC => decode_transfer(log).map(DecodedEvent::Transfer),
        ORDER_CREATED_TOPIC => Some(DecodedEvent::OrderCreated(
            decode_order_created(log).unwrap_or_default(),
        )),
        ORDER_CLOSED_TOPIC => Some(DecodedEvent::OrderClosed(
            decode_order_closed(log).unwrap_or_default(),
        )),
        POSITION_CREATED_TOPIC => decode_position_created(log).map(DecodedEvent::PositionCreated),
        _ => None,
    };

    decoded.unwrap_or(DecodedEvent::Unrecognized)
}

fn topic_to_address(topic: &str) -> Option<Address> {
    // indexed addresses are left-padded to 32 bytes; the address is the last 20
    let bytes = hex::decode(topic.trim_start_matches("0x")).ok()?;
    if bytes.len() < 20 {
        return None;
    }
    Some(Address::from_slice(&bytes[bytes.len() - 20..]))
}

/// Big-endian integer over the whole payload; anything unparseable is zero.
fn data_to_u256(data: &str) -> U256 {
    let body = data.trim_start_matches("0x");
    let decoded = if body.len() % 2 == 1 {
        hex::decode(format!("0{}", body))
    } else {
        hex::decode(body)
    };
    let Ok(bytes) = decoded else {
        return U256::ZERO;
    };
    let significant = match bytes.iter().position(|b| *b != 0) {
        Some(first) => &bytes[first..],
        None => return U256::ZERO,
    };
    U256::try_from_be_slice(significant).unwrap_or(U256::ZERO)
}

fn word(bytes: &[u8], index: usize) -> U256 {
    bytes
        .get(index * WORD..(index + 1) * WORD)
        .and_then(U256::try_from_be_slice)
        .unwrap_or(U256::ZERO)
}

/// Decode a single log into `TransferEvent`
pub fn decode_transfer(log: &RawLog) -> Option<TransferEvent> {
    if log.topics.len() < 3 {
        return None;
    }

    let from = topic_to_address(&log.topics[1])?;
    let to = topic_to_address(&log.topics[2])?;
    let amount = data_to_u256(&log.data);

    Some(TransferEvent { from, to, amount })
}

/// Non-indexed tail: `(string destURL, uint256 pricePerDay, uint256 deliveryAt, bool isBuy)`.
/// Slot 0 is the string offset; the three scalars follow in fixed slots.
pub fn decode_order_created(log: &RawLog) -> Option<OrderCreatedEvent> {
    if log.topics.len() < 3 {
        return None;
    }

    let mut event = OrderCreatedEvent {
        order_id: Some(log.topics[1].clone()),
        participant: topic_to_address(&log.topics[2]),
        price_per_day: U256::ZERO,
        delivery_at: U256::ZERO,
        is_buy: false,
    };

    if let Ok(bytes) = hex::decode(log.data.trim_start_matches("0x")) {
        if bytes.len() >= 4 * WORD {
            event.price_per_day = word(&bytes, 1);
            event.delivery_at = word(&bytes, 2);
            event.is_buy = word(&bytes, 3) == U256::from(1u8);
        }
    }

    Some(event)
}

pub fn decode_order_closed(log: &RawLog) -> Option<OrderClosedEvent> {
    if log.topics.len() < 2 {
        return None;
    }

    Some(OrderClosedEvent {
        order_id: Some(log.topics[1].clone()),
        participant: log.topics.get(2).and_then(|t| topic_to_address(t)),
    })
}

pub fn decode_position_created(log: &RawLog) -> Option<PositionCreatedEvent> {
    if log.topics.len() < 2 {
        return None;
    }

    Some(PositionCreatedEvent {
        position_id: log.topics[1].clone(),
        seller: log.topics.get(2).and_then(|t| topic_to_address(t)),
        buyer: log.topics.get(3).and_then(|t| topic_to_address(t)),
    })
}

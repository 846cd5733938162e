//! Core types shared across the book, matcher, and feed path.
//!
//! Prices are fixed-point integers with 4 decimal places to avoid
//! floating-point drift; timestamps are nanoseconds.

use serde::{Deserialize, Serialize};

/// External order identifier. Zero is reserved as the invalid id.
pub type OrderId = u64;

/// Fixed-point price: actual = `price as f64 / PRICE_SCALE as f64`.
pub type Price = i64;

/// Order quantity in shares/lots.
pub type Quantity = u64;

/// Nanosecond timestamp.
pub type Timestamp = u64;

/// Compact per-symbol identifier assigned by the feed layer.
pub type SymbolId = u32;

/// Fixed-point scale: 4 decimal places (150.0000 -> 1_500_000).
pub const PRICE_SCALE: i64 = 10_000;

/// Sentinel for "no price" (empty side, unset field).
pub const INVALID_PRICE: Price = i64::MAX;

/// Reserved invalid order id.
pub const INVALID_ORDER_ID: OrderId = 0;

/// Order side (buy = bid, sell = ask)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Buy = 0,
    /// Sell side (asks)
    Sell = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Returns true for the buy side
    #[inline]
    pub const fn is_buy(self) -> bool {
        matches!(self, Side::Buy)
    }
}

/// Order type determines matching behavior
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderType {
    /// Limit order - rests in book if not fully matched (default)
    #[default]
    Limit = 0,
    /// Market order - crosses the book at any price, never rests
    Market = 1,
    /// Immediate-Or-Cancel - cancel any unfilled portion immediately
    Ioc = 2,
    /// Fill-Or-Kill - all-or-nothing execution
    Fok = 3,
}

/// Lifecycle state of an order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderStatus {
    #[default]
    New = 0,
    PartiallyFilled = 1,
    Filled = 2,
    Cancelled = 3,
    Rejected = 4,
}

/// Convert a float price to fixed-point, rounding to the nearest tick.
#[inline]
pub fn to_price(value: f64) -> Price {
    (value * PRICE_SCALE as f64 + 0.5) as Price
}

/// Convert a fixed-point price back to a float (display/diagnostics only).
#[inline]
pub fn from_price(price: Price) -> f64 {
    price as f64 / PRICE_SCALE as f64
}

/// Is `a` a better price than `b` on the given side?
/// Higher is better for bids, lower for asks.
#[inline]
pub const fn is_better_price(a: Price, b: Price, side: Side) -> bool {
    match side {
        Side::Buy => a > b,
        Side::Sell => a < b,
    }
}

/// Do a bid price and an ask price cross (can they match)?
#[inline]
pub const fn prices_cross(bid: Price, ask: Price) -> bool {
    bid >= ask
}

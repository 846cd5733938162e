//! Event and result types emitted by the book, matcher, and feed path.
//!
//! Everything here is plain `Copy` data so events can flow through ring
//! buffers and callbacks without allocation.

use serde::{Deserialize, Serialize};

use crate::types::{OrderId, OrderStatus, Price, Quantity, Side, SymbolId, Timestamp};

/// A trade produced by the matching engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Monotonic per-engine trade id
    pub trade_id: u64,
    pub buyer_order_id: OrderId,
    pub seller_order_id: OrderId,
    /// Execution price (the passive order's price)
    pub price: Price,
    pub quantity: Quantity,
    pub timestamp: Timestamp,
    /// Side of the incoming (aggressive) order
    pub aggressor_side: Side,
}

/// Result of `MatchEngine::submit_order`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub filled_quantity: Quantity,
    /// Volume-weighted average fill price (fixed-point, truncated), 0 if unfilled
    pub avg_fill_price: Price,
    pub trade_count: u32,
}

impl ExecutionResult {
    /// A rejection with zero fills.
    #[inline]
    pub const fn rejected(order_id: OrderId) -> Self {
        Self {
            order_id,
            status: OrderStatus::Rejected,
            filled_quantity: 0,
            avg_fill_price: 0,
            trade_count: 0,
        }
    }

    #[inline]
    pub const fn is_accepted(&self) -> bool {
        !matches!(self.status, OrderStatus::Rejected)
    }

    #[inline]
    pub const fn is_filled(&self) -> bool {
        matches!(self.status, OrderStatus::Filled)
    }
}

/// Level aggregate change. `quantity == 0` means the level was removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookUpdate {
    pub price: Price,
    pub quantity: Quantity,
    pub side: Side,
    pub timestamp: Timestamp,
}

/// One price level as reported by depth queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Price,
    pub quantity: Quantity,
    pub order_count: usize,
}

/// Best bid and offer snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Bbo {
    pub bid_price: Option<Price>,
    pub bid_quantity: Quantity,
    pub ask_price: Option<Price>,
    pub ask_quantity: Quantity,
}

impl Bbo {
    #[inline]
    pub const fn has_both(&self) -> bool {
        self.bid_price.is_some() && self.ask_price.is_some()
    }

    /// `ask - bid`, if both sides exist.
    #[inline]
    pub fn spread(&self) -> Option<Price> {
        Some(self.ask_price? - self.bid_price?)
    }

    /// `(bid + ask) / 2`, if both sides exist.
    #[inline]
    pub fn mid_price(&self) -> Option<Price> {
        Some((self.bid_price? + self.ask_price?) / 2)
    }
}

/// Action carried by an L2/L3 update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum L2Action {
    Add = 0,
    Modify = 1,
    Delete = 2,
    Execute = 3,
}

/// Normalized per-level update flowing through the feed ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2Event {
    pub symbol_id: SymbolId,
    pub price: Price,
    pub quantity: Quantity,
    pub side: Side,
    pub action: L2Action,
    pub timestamp: Timestamp,
    /// Monotonic feed sequence number
    pub sequence: u64,
}

impl Default for L2Event {
    fn default() -> Self {
        Self {
            symbol_id: 0,
            price: 0,
            quantity: 0,
            side: Side::Buy,
            action: L2Action::Add,
            timestamp: 0,
            sequence: 0,
        }
    }
}

/// Per-order update (L3 view).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct L3Event {
    pub symbol_id: SymbolId,
    pub order_id: OrderId,
    pub price: Price,
    pub quantity: Quantity,
    pub side: Side,
    pub action: L2Action,
    pub timestamp: Timestamp,
}

/// Anonymous trade print reported off the feed (hidden executions,
/// execute-with-price, L2 executes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeTick {
    /// Exchange match number (0 when synthesized from L2)
    pub match_id: u64,
    pub symbol_id: SymbolId,
    pub price: Price,
    pub quantity: Quantity,
    pub side: Side,
    pub timestamp: Timestamp,
}

/// Trade callback. Runs on the thread that performed the mutation and
/// must not re-enter the book.
pub type TradeCallback = Box<dyn FnMut(&Trade) + Send>;

/// Book-update callback; same threading contract as [`TradeCallback`].
pub type BookUpdateCallback = Box<dyn FnMut(&BookUpdate) + Send>;

/// L2 update callback on the feed path.
pub type L2Callback = Box<dyn FnMut(&L2Event) + Send>;

/// L3 update callback on the feed path.
pub type L3Callback = Box<dyn FnMut(&L3Event) + Send>;

/// Trade tick callback on the feed path.
pub type TradeTickCallback = Box<dyn FnMut(&TradeTick) + Send>;

/// Sequence gap callback: `(expected, received)`.
pub type GapCallback = Box<dyn FnMut(u64, u64) + Send>;

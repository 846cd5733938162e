//! Matching engine - crosses aggressive orders against the book.
//!
//! The engine walks the opposite side best-price-first, FIFO within a
//! level, trading at the passive order's price (price improvement goes
//! to the resting order). Residual quantity is disposed of according to
//! the order type: Limit rests, Market/IOC cancel, FOK pre-checks the
//! available liquidity and either fills completely or touches nothing.

use std::collections::VecDeque;

use tracing::debug;

use crate::arena::NIL;
use crate::events::{ExecutionResult, Trade, TradeCallback};
use crate::order_book::{OrderBook, DEFAULT_POOL_SIZE};
use crate::types::{
    prices_cross, OrderId, OrderStatus, OrderType, Price, Quantity, Side, Timestamp,
    INVALID_ORDER_ID,
};

/// Matching engine policy switches.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Skip passive orders carrying the same nonzero participant id
    pub self_trade_prevention: bool,
    /// Accept `OrderType::Market`
    pub allow_market_orders: bool,
    /// Accept `OrderType::Ioc`
    pub allow_ioc_orders: bool,
    /// Accept `OrderType::Fok`
    pub allow_fok_orders: bool,
    /// Validation cap on order size
    pub max_order_quantity: Quantity,
    /// Capacity of the book's order pool
    pub pool_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            self_trade_prevention: true,
            allow_market_orders: true,
            allow_ioc_orders: true,
            allow_fok_orders: true,
            max_order_quantity: 1_000_000,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

/// Matching engine for a single symbol.
///
/// Single-threaded: the engine, its book, and its arena are owned by
/// one thread end-to-end.
pub struct MatchEngine {
    book: OrderBook,
    config: EngineConfig,

    /// Trades since the last `get_trades` drain
    trade_queue: VecDeque<Trade>,
    trade_callback: Option<TradeCallback>,

    // Statistics
    total_trades: u64,
    total_volume: u64,
    total_orders_submitted: u64,
    total_orders_cancelled: u64,
    next_trade_id: u64,
}

impl MatchEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            book: OrderBook::with_pool_size(config.pool_size),
            config,
            trade_queue: VecDeque::new(),
            trade_callback: None,
            total_trades: 0,
            total_volume: 0,
            total_orders_submitted: 0,
            total_orders_cancelled: 0,
            next_trade_id: 1,
        }
    }

    /// Submit an order for matching - the main entry point.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_order(
        &mut self,
        id: OrderId,
        price: Price,
        quantity: Quantity,
        side: Side,
        kind: OrderType,
        timestamp: Timestamp,
        participant: u64,
    ) -> ExecutionResult {
        self.total_orders_submitted += 1;

        if !self.validate_order(id, price, quantity, kind) {
            debug!(id, ?side, ?kind, quantity, "order rejected by validation");
            return ExecutionResult::rejected(id);
        }

        // A market order must cross any resting depth
        let limit = match (kind, side) {
            (OrderType::Market, Side::Buy) => Price::MAX,
            (OrderType::Market, Side::Sell) => Price::MIN,
            _ => price,
        };

        // FOK: verify the full quantity is matchable before touching
        // any state; otherwise kill with zero fills
        if kind == OrderType::Fok && self.available_liquidity(side, limit, participant) < quantity {
            return ExecutionResult {
                order_id: id,
                status: OrderStatus::Cancelled,
                filled_quantity: 0,
                avg_fill_price: 0,
                trade_count: 0,
            };
        }

        let (filled, cost, trade_count) =
            self.match_against_book(id, limit, quantity, side, timestamp, participant);
        let remaining = quantity - filled;

        let avg_fill_price = if filled > 0 {
            (cost / filled as i128) as Price
        } else {
            0
        };

        let mut result = ExecutionResult {
            order_id: id,
            status: OrderStatus::Filled,
            filled_quantity: filled,
            avg_fill_price,
            trade_count,
        };

        if remaining > 0 {
            match kind {
                OrderType::Limit => {
                    if self
                        .book
                        .insert_order(id, price, quantity, filled, side, kind, timestamp, participant)
                        .is_some()
                    {
                        result.status = if filled > 0 {
                            OrderStatus::PartiallyFilled
                        } else {
                            OrderStatus::New
                        };
                    } else {
                        // Pool exhausted: fills stand, the residual is dropped
                        result.status = if filled > 0 {
                            OrderStatus::PartiallyFilled
                        } else {
                            OrderStatus::Rejected
                        };
                    }
                }
                OrderType::Market | OrderType::Ioc => {
                    result.status = if filled > 0 {
                        OrderStatus::PartiallyFilled
                    } else {
                        OrderStatus::Cancelled
                    };
                }
                OrderType::Fok => {
                    // The pre-check guarantees a full fill
                    debug_assert!(false, "FOK residual after liquidity pre-check");
                    result.status = OrderStatus::Cancelled;
                }
            }
        }

        result
    }

    /// Submit a market order (convenience wrapper).
    pub fn submit_market_order(
        &mut self,
        id: OrderId,
        quantity: Quantity,
        side: Side,
        timestamp: Timestamp,
        participant: u64,
    ) -> ExecutionResult {
        self.submit_order(id, 0, quantity, side, OrderType::Market, timestamp, participant)
    }

    /// Cancel a resting order.
    pub fn cancel_order(&mut self, id: OrderId) -> bool {
        let cancelled = self.book.cancel_order(id);
        if cancelled {
            self.total_orders_cancelled += 1;
        }
        cancelled
    }

    /// Modify an order: cancel, then resubmit through matching with the
    /// original side/kind/timestamp. A price change that now crosses
    /// executes immediately.
    pub fn modify_order(
        &mut self,
        id: OrderId,
        new_price: Price,
        new_quantity: Quantity,
    ) -> ExecutionResult {
        let Some(node) = self.book.get_order(id) else {
            return ExecutionResult::rejected(id);
        };
        let side = node.side;
        let kind = node.kind;
        let timestamp = node.timestamp;
        let participant = node.participant;

        self.cancel_order(id);
        self.submit_order(id, new_price, new_quantity, side, kind, timestamp, participant)
    }

    /// Access the underlying order book.
    #[inline]
    pub fn get_order_book(&self) -> &OrderBook {
        &self.book
    }

    /// Mutable access to the underlying order book.
    #[inline]
    pub fn get_order_book_mut(&mut self) -> &mut OrderBook {
        &mut self.book
    }

    /// Trades generated since the last call; drains the queue.
    pub fn get_trades(&mut self) -> Vec<Trade> {
        self.trade_queue.drain(..).collect()
    }

    /// All queued trades without draining.
    #[inline]
    pub fn peek_trades(&self) -> &VecDeque<Trade> {
        &self.trade_queue
    }

    /// Called once per trade, on the submitting thread.
    pub fn set_trade_callback(&mut self, callback: TradeCallback) {
        self.trade_callback = Some(callback);
    }

    // Statistics
    #[inline]
    pub fn total_trades(&self) -> u64 {
        self.total_trades
    }

    #[inline]
    pub fn total_volume(&self) -> u64 {
        self.total_volume
    }

    #[inline]
    pub fn total_orders_submitted(&self) -> u64 {
        self.total_orders_submitted
    }

    #[inline]
    pub fn total_orders_cancelled(&self) -> u64 {
        self.total_orders_cancelled
    }

    /// Reset the engine: empty book, empty trade queue, zeroed counters.
    pub fn reset(&mut self) {
        self.book.clear();
        self.trade_queue.clear();
        self.total_trades = 0;
        self.total_volume = 0;
        self.total_orders_submitted = 0;
        self.total_orders_cancelled = 0;
        self.next_trade_id = 1;
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn validate_order(&self, id: OrderId, price: Price, quantity: Quantity, kind: OrderType) -> bool {
        if id == INVALID_ORDER_ID {
            return false;
        }
        if self.book.contains_order(id) {
            return false;
        }
        if quantity == 0 || quantity > self.config.max_order_quantity {
            return false;
        }
        if kind == OrderType::Limit && price <= 0 {
            return false;
        }
        match kind {
            OrderType::Market => self.config.allow_market_orders,
            OrderType::Ioc => self.config.allow_ioc_orders,
            OrderType::Fok => self.config.allow_fok_orders,
            OrderType::Limit => true,
        }
    }

    /// Does the aggressor's limit reach the opposite side's `best`?
    /// The aggressor's limit plays the bid for a buy and the ask for a
    /// sell.
    #[inline]
    fn crosses(limit: Price, best: Price, side: Side) -> bool {
        match side {
            Side::Buy => prices_cross(limit, best),
            Side::Sell => prices_cross(best, limit),
        }
    }

    /// Liquidity matchable by an order at `limit`, honoring self-trade
    /// prevention. Used by the FOK pre-check.
    fn available_liquidity(&self, side: Side, limit: Price, participant: u64) -> Quantity {
        let opposite = side.opposite();
        let exclude_self = self.config.self_trade_prevention && participant != 0;
        let mut available: Quantity = 0;

        let mut level = self.book.best_level(opposite);
        while let Some((level_price, head)) = level {
            if !Self::crosses(limit, level_price, side) {
                break;
            }

            if exclude_self {
                let mut cursor = head;
                while cursor != NIL {
                    let node = self.book.node(cursor);
                    if node.participant != participant {
                        available += node.remaining();
                    }
                    cursor = node.next;
                }
            } else {
                available += self.book.level_total(opposite, level_price);
            }

            level = self.book.level_after(opposite, level_price);
        }

        available
    }

    /// Walk the opposite side and fill. Returns `(filled, cost, trades)`
    /// where cost accumulates `price * qty` for the VWAP.
    fn match_against_book(
        &mut self,
        aggressor_id: OrderId,
        limit: Price,
        quantity: Quantity,
        side: Side,
        timestamp: Timestamp,
        participant: u64,
    ) -> (Quantity, i128, u32) {
        let opposite = side.opposite();
        let stp = self.config.self_trade_prevention;
        let mut remaining = quantity;
        let mut cost: i128 = 0;
        let mut trade_count: u32 = 0;

        let mut level = self.book.best_level(opposite);
        while remaining > 0 {
            let Some((level_price, head)) = level else {
                break;
            };
            if !Self::crosses(limit, level_price, side) {
                break;
            }

            // FIFO walk within the level; self orders are skipped and
            // left resting
            let mut cursor = head;
            let mut skipped_self = false;
            while cursor != NIL && remaining > 0 {
                let node = self.book.node(cursor);
                let next = node.next;

                if stp && participant != 0 && node.participant == participant {
                    skipped_self = true;
                    cursor = next;
                    continue;
                }

                let passive_id = node.id;
                let match_qty = remaining.min(node.remaining());

                let removed = self.book.apply_fill(cursor, match_qty, timestamp);
                remaining -= match_qty;
                cost += level_price as i128 * match_qty as i128;
                trade_count += 1;
                self.record_trade(aggressor_id, passive_id, level_price, match_qty, timestamp, side);

                // A surviving passive means the aggressor is exhausted
                cursor = if removed { next } else { cursor };
            }

            if remaining == 0 {
                break;
            }
            level = if skipped_self {
                // The level still holds our own orders; matchable depth
                // continues at strictly worse prices
                self.book.level_after(opposite, level_price)
            } else {
                self.book.best_level(opposite)
            };
        }

        (quantity - remaining, cost, trade_count)
    }

    fn record_trade(
        &mut self,
        aggressor_id: OrderId,
        passive_id: OrderId,
        price: Price,
        quantity: Quantity,
        timestamp: Timestamp,
        aggressor_side: Side,
    ) {
        let (buyer_order_id, seller_order_id) = match aggressor_side {
            Side::Buy => (aggressor_id, passive_id),
            Side::Sell => (passive_id, aggressor_id),
        };

        let trade = Trade {
            trade_id: self.next_trade_id,
            buyer_order_id,
            seller_order_id,
            price,
            quantity,
            timestamp,
            aggressor_side,
        };
        self.next_trade_id += 1;
        self.total_trades += 1;
        self.total_volume += quantity;

        self.trade_queue.push_back(trade);
        self.book.notify_trade(&trade);
        if let Some(callback) = &mut self.trade_callback {
            callback(&trade);
        }
    }
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

//! Order book - the central limit order book for a single symbol.
//!
//! Two sorted sides (bids walked descending, asks ascending) of
//! price-keyed FIFO levels over a fixed arena, plus an id index for
//! O(1) cancel. Best prices are cached on insert and recomputed from
//! the side map when the best level disappears.
//!
//! The book is single-threaded by design: one thread owns a book (and
//! its arena) end-to-end. It is never crossed at rest; crossing is
//! resolved at submit time by the matching engine.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound::{Excluded, Unbounded};

use rustc_hash::FxHashMap;

use crate::arena::{Arena, OrderNode, SlotIndex};
use crate::events::{Bbo, BookUpdate, BookUpdateCallback, DepthLevel, Trade, TradeCallback};
use crate::price_level::PriceLevel;
use crate::types::{
    from_price, is_better_price, prices_cross, OrderId, OrderStatus, OrderType, Price, Quantity,
    Side, Timestamp,
};

/// Default order pool capacity
pub const DEFAULT_POOL_SIZE: u32 = 100_000;

/// Order book for a single symbol with price-time priority.
pub struct OrderBook {
    /// Memory pool for order nodes, exclusively owned by this book
    arena: Arena,

    /// Bid levels; best = highest key
    bids: BTreeMap<Price, PriceLevel>,

    /// Ask levels; best = lowest key
    asks: BTreeMap<Price, PriceLevel>,

    /// OrderId -> arena slot for O(1) lookup; holds live orders only
    index: FxHashMap<OrderId, SlotIndex>,

    /// Cached best prices for O(1) BBO queries
    best_bid: Option<Price>,
    best_ask: Option<Price>,

    /// Sum of remaining quantity per side
    total_bid_volume: Quantity,
    total_ask_volume: Quantity,

    trade_callback: Option<TradeCallback>,
    book_update_callback: Option<BookUpdateCallback>,
}

impl OrderBook {
    /// Create a book with the default pool capacity.
    pub fn new() -> Self {
        Self::with_pool_size(DEFAULT_POOL_SIZE)
    }

    /// Create a book whose arena holds at most `pool_size` live orders.
    pub fn with_pool_size(pool_size: u32) -> Self {
        Self {
            arena: Arena::new(pool_size),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: FxHashMap::default(),
            best_bid: None,
            best_ask: None,
            total_bid_volume: 0,
            total_ask_volume: 0,
            trade_callback: None,
            book_update_callback: None,
        }
    }

    // ========================================================================
    // Order Management
    // ========================================================================

    /// Add a resting order to the book.
    ///
    /// Returns the order's arena slot, or `None` if the id is already
    /// present or the pool is exhausted. Emits a book update with the
    /// level's new aggregate.
    pub fn add_order(
        &mut self,
        id: OrderId,
        price: Price,
        quantity: Quantity,
        side: Side,
        kind: OrderType,
        timestamp: Timestamp,
        participant: u64,
    ) -> Option<SlotIndex> {
        self.insert_order(id, price, quantity, 0, side, kind, timestamp, participant)
    }

    /// Insert an order carrying a pre-existing cumulative fill (the
    /// residual of a partially matched aggressor). The level aggregate
    /// and side volume grow by the remaining quantity only.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn insert_order(
        &mut self,
        id: OrderId,
        price: Price,
        quantity: Quantity,
        filled: Quantity,
        side: Side,
        kind: OrderType,
        timestamp: Timestamp,
        participant: u64,
    ) -> Option<SlotIndex> {
        debug_assert!(filled < quantity, "resting order must have open quantity");

        if self.index.contains_key(&id) {
            return None;
        }

        let idx = self.arena.alloc()?;

        let node = self.arena.get_mut(idx);
        node.id = id;
        node.price = price;
        node.quantity = quantity;
        node.filled = filled;
        node.timestamp = timestamp;
        node.participant = participant;
        node.side = side;
        node.kind = kind;
        node.status = if filled > 0 {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::New
        };

        let remaining = quantity - filled;

        let level = match side {
            Side::Buy => self.bids.entry(price).or_insert_with(PriceLevel::new),
            Side::Sell => self.asks.entry(price).or_insert_with(PriceLevel::new),
        };
        level.enqueue(&mut self.arena, idx);
        let level_qty = level.total_qty;

        self.index.insert(id, idx);

        match side {
            Side::Buy => self.total_bid_volume += remaining,
            Side::Sell => self.total_ask_volume += remaining,
        }

        self.update_best_on_add(side, price);
        self.notify_book_update(price, level_qty, side, timestamp);

        Some(idx)
    }

    /// Cancel a live order by id.
    ///
    /// Returns `false` for an unknown or inactive id. On success the
    /// order is unlinked, marked `Cancelled`, its slot returned to the
    /// pool, and a book update emitted (quantity zero if the level
    /// vanished).
    pub fn cancel_order(&mut self, id: OrderId) -> bool {
        let Some(&idx) = self.index.get(&id) else {
            return false;
        };
        if !self.arena.get(idx).is_active() {
            return false;
        }

        let node = self.arena.get(idx);
        let price = node.price;
        let side = node.side;
        let timestamp = node.timestamp;

        let level = match side {
            Side::Buy => self.bids.get_mut(&price),
            Side::Sell => self.asks.get_mut(&price),
        }
        .expect("live order must have a level");

        let withdrawn = level.withdraw(&mut self.arena, idx);
        let now_empty = level.is_empty();
        let level_qty = level.total_qty;

        match side {
            Side::Buy => self.total_bid_volume -= withdrawn,
            Side::Sell => self.total_ask_volume -= withdrawn,
        }

        self.arena.get_mut(idx).status = OrderStatus::Cancelled;
        self.index.remove(&id);
        self.arena.free(idx);

        if now_empty {
            self.remove_empty_level(side, price);
        }

        self.notify_book_update(price, level_qty, side, timestamp);
        true
    }

    /// Modify an order: cancel-then-add preserving the id (and side,
    /// kind, timestamp, participant). The new order loses time priority.
    /// No partial state is observable outside the call.
    pub fn modify_order(
        &mut self,
        id: OrderId,
        new_price: Price,
        new_quantity: Quantity,
    ) -> Option<SlotIndex> {
        let node = self.get_order(id)?;
        let side = node.side;
        let kind = node.kind;
        let timestamp = node.timestamp;
        let participant = node.participant;

        self.cancel_order(id);
        self.add_order(id, new_price, new_quantity, side, kind, timestamp, participant)
    }

    /// Reduce a live order's open quantity in place, preserving its
    /// position in the level FIFO. Removes the order entirely when the
    /// reduction consumes all remaining quantity.
    ///
    /// Returns `false` for an unknown or inactive id.
    pub fn reduce_order(&mut self, id: OrderId, qty: Quantity) -> bool {
        let Some(&idx) = self.index.get(&id) else {
            return false;
        };
        if !self.arena.get(idx).is_active() {
            return false;
        }

        let node = self.arena.get(idx);
        if qty >= node.remaining() {
            return self.cancel_order(id);
        }

        let price = node.price;
        let side = node.side;
        let timestamp = node.timestamp;

        self.arena.get_mut(idx).quantity -= qty;

        let level = match side {
            Side::Buy => self.bids.get_mut(&price),
            Side::Sell => self.asks.get_mut(&price),
        }
        .expect("live order must have a level");
        level.shrink(qty);
        let level_qty = level.total_qty;

        match side {
            Side::Buy => self.total_bid_volume -= qty,
            Side::Sell => self.total_ask_volume -= qty,
        }

        self.notify_book_update(price, level_qty, side, timestamp);
        true
    }

    /// Look up a live order by id.
    #[inline]
    pub fn get_order(&self, id: OrderId) -> Option<&OrderNode> {
        self.index.get(&id).map(|&idx| self.arena.get(idx))
    }

    /// Check if a live order with this id exists.
    #[inline]
    pub fn contains_order(&self, id: OrderId) -> bool {
        self.index.contains_key(&id)
    }

    // ========================================================================
    // BBO Queries
    // ========================================================================

    /// Highest bid price
    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.best_bid
    }

    /// Lowest ask price
    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.best_ask
    }

    /// Aggregate quantity at the best bid (0 when no bids)
    #[inline]
    pub fn best_bid_quantity(&self) -> Quantity {
        self.best_bid
            .and_then(|price| self.bids.get(&price))
            .map_or(0, |level| level.total_qty)
    }

    /// Aggregate quantity at the best ask (0 when no asks)
    #[inline]
    pub fn best_ask_quantity(&self) -> Quantity {
        self.best_ask
            .and_then(|price| self.asks.get(&price))
            .map_or(0, |level| level.total_qty)
    }

    /// `(bid + ask) / 2`, if both sides exist
    #[inline]
    pub fn mid_price(&self) -> Option<Price> {
        Some((self.best_bid? + self.best_ask?) / 2)
    }

    /// `ask - bid`, if both sides exist
    #[inline]
    pub fn spread(&self) -> Option<Price> {
        Some(self.best_ask? - self.best_bid?)
    }

    /// Snapshot of the best bid and offer
    pub fn get_bbo(&self) -> Bbo {
        Bbo {
            bid_price: self.best_bid,
            bid_quantity: self.best_bid_quantity(),
            ask_price: self.best_ask,
            ask_quantity: self.best_ask_quantity(),
        }
    }

    // ========================================================================
    // Depth and Volume Queries
    // ========================================================================

    /// Up to `max_levels` bid levels, best (highest) first.
    pub fn get_bid_depth(&self, max_levels: usize) -> Vec<DepthLevel> {
        self.bids
            .iter()
            .rev()
            .take(max_levels)
            .map(|(&price, level)| DepthLevel {
                price,
                quantity: level.total_qty,
                order_count: level.count as usize,
            })
            .collect()
    }

    /// Up to `max_levels` ask levels, best (lowest) first.
    pub fn get_ask_depth(&self, max_levels: usize) -> Vec<DepthLevel> {
        self.asks
            .iter()
            .take(max_levels)
            .map(|(&price, level)| DepthLevel {
                price,
                quantity: level.total_qty,
                order_count: level.count as usize,
            })
            .collect()
    }

    /// Both sides of the depth ladder at once.
    pub fn get_depth(&self, max_levels: usize) -> (Vec<DepthLevel>, Vec<DepthLevel>) {
        (self.get_bid_depth(max_levels), self.get_ask_depth(max_levels))
    }

    /// Sum of remaining quantity across all bid levels
    #[inline]
    pub fn total_bid_volume(&self) -> Quantity {
        self.total_bid_volume
    }

    /// Sum of remaining quantity across all ask levels
    #[inline]
    pub fn total_ask_volume(&self) -> Quantity {
        self.total_ask_volume
    }

    #[inline]
    pub fn bid_level_count(&self) -> usize {
        self.bids.len()
    }

    #[inline]
    pub fn ask_level_count(&self) -> usize {
        self.asks.len()
    }

    /// Number of live orders in the book
    #[inline]
    pub fn total_order_count(&self) -> usize {
        self.index.len()
    }

    /// Volume-weighted average price of walking `side` best-first until
    /// `target_qty` is accumulated or the side is exhausted. Integer
    /// truncation; `None` when the side is empty.
    pub fn calculate_vwap(&self, side: Side, target_qty: Quantity) -> Option<Price> {
        let mut remaining = target_qty;
        let mut weighted_sum: i128 = 0;
        let mut total_filled: Quantity = 0;

        let mut walk = |price: Price, level: &PriceLevel| {
            let fill = level.total_qty.min(remaining);
            weighted_sum += price as i128 * fill as i128;
            total_filled += fill;
            remaining -= fill;
            remaining > 0
        };

        match side {
            Side::Buy => {
                for (&price, level) in self.bids.iter().rev() {
                    if !walk(price, level) {
                        break;
                    }
                }
            }
            Side::Sell => {
                for (&price, level) in self.asks.iter() {
                    if !walk(price, level) {
                        break;
                    }
                }
            }
        }

        if total_filled == 0 {
            return None;
        }
        Some((weighted_sum / total_filled as i128) as Price)
    }

    /// Would a new resting order at `price` on `side` be at-or-through
    /// the opposite best?
    pub fn would_cross(&self, price: Price, side: Side) -> bool {
        match side {
            Side::Buy => self.best_ask.is_some_and(|ask| prices_cross(price, ask)),
            Side::Sell => self.best_bid.is_some_and(|bid| prices_cross(bid, price)),
        }
    }

    // ========================================================================
    // Callbacks and Lifecycle
    // ========================================================================

    pub fn set_trade_callback(&mut self, callback: TradeCallback) {
        self.trade_callback = Some(callback);
    }

    pub fn set_book_update_callback(&mut self, callback: BookUpdateCallback) {
        self.book_update_callback = Some(callback);
    }

    /// Remove every order and return all slots to the pool.
    pub fn clear(&mut self) {
        let slots: Vec<SlotIndex> = self.index.values().copied().collect();
        for idx in slots {
            self.arena.free(idx);
        }
        self.index.clear();
        self.bids.clear();
        self.asks.clear();
        self.best_bid = None;
        self.best_ask = None;
        self.total_bid_volume = 0;
        self.total_ask_volume = 0;
    }

    /// True when the book holds no orders
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    // ========================================================================
    // Matching Engine Contract (crate-internal)
    // ========================================================================

    /// Direct slot access for the matcher's passive walk.
    #[inline]
    pub(crate) fn node(&self, idx: SlotIndex) -> &OrderNode {
        self.arena.get(idx)
    }

    /// Best level on `side`: `(price, head slot)`.
    #[inline]
    pub(crate) fn best_level(&self, side: Side) -> Option<(Price, SlotIndex)> {
        let price = match side {
            Side::Buy => self.best_bid?,
            Side::Sell => self.best_ask?,
        };
        let level = match side {
            Side::Buy => self.bids.get(&price),
            Side::Sell => self.asks.get(&price),
        }?;
        Some((price, level.front()))
    }

    /// Aggregate quantity resting at a level (0 when absent).
    #[inline]
    pub(crate) fn level_total(&self, side: Side, price: Price) -> Quantity {
        match side {
            Side::Buy => self.bids.get(&price),
            Side::Sell => self.asks.get(&price),
        }
        .map_or(0, |level| level.total_qty)
    }

    /// Next level strictly worse than `price` on `side` (lower for
    /// bids, higher for asks): `(price, head slot)`.
    pub(crate) fn level_after(&self, side: Side, price: Price) -> Option<(Price, SlotIndex)> {
        match side {
            Side::Buy => self
                .bids
                .range(..price)
                .next_back()
                .map(|(&p, level)| (p, level.front())),
            Side::Sell => self
                .asks
                .range((Excluded(price), Unbounded))
                .next()
                .map(|(&p, level)| (p, level.front())),
        }
    }

    /// Fill `qty` against the passive order in `idx`. The level owns
    /// the in-place execution and unlink; the book reconciles the side
    /// volume, the id index, the pool slot, and an emptied level, then
    /// emits the book update.
    ///
    /// Returns `true` when the passive order was removed.
    pub(crate) fn apply_fill(&mut self, idx: SlotIndex, qty: Quantity, timestamp: Timestamp) -> bool {
        let node = self.arena.get(idx);
        let id = node.id;
        let price = node.price;
        let side = node.side;

        let level = match side {
            Side::Buy => self.bids.get_mut(&price),
            Side::Sell => self.asks.get_mut(&price),
        }
        .expect("live order must have a level");

        let outcome = level.fill(&mut self.arena, idx, qty);
        debug_assert_eq!(outcome.executed, qty, "fill exceeds open quantity");
        let level_qty = level.total_qty;

        match side {
            Side::Buy => self.total_bid_volume -= outcome.executed,
            Side::Sell => self.total_ask_volume -= outcome.executed,
        }

        if outcome.removed {
            self.index.remove(&id);
            self.arena.free(idx);
            if outcome.now_empty {
                self.remove_empty_level(side, price);
            }
        }

        self.notify_book_update(price, level_qty, side, timestamp);
        outcome.removed
    }

    /// Forward a trade to the registered trade callback.
    pub(crate) fn notify_trade(&mut self, trade: &Trade) {
        if let Some(callback) = &mut self.trade_callback {
            callback(trade);
        }
    }

    // ========================================================================
    // Best Price Maintenance
    // ========================================================================

    fn update_best_on_add(&mut self, side: Side, price: Price) {
        let best = match side {
            Side::Buy => &mut self.best_bid,
            Side::Sell => &mut self.best_ask,
        };
        if (*best).map_or(true, |current| is_better_price(price, current, side)) {
            *best = Some(price);
        }
    }

    /// Remove an empty price level and refresh the best-price cache
    /// from the side map when the best level disappeared.
    fn remove_empty_level(&mut self, side: Side, price: Price) {
        match side {
            Side::Buy => {
                self.bids.remove(&price);
                if self.best_bid == Some(price) {
                    self.best_bid = self.bids.last_key_value().map(|(&p, _)| p);
                }
            }
            Side::Sell => {
                self.asks.remove(&price);
                if self.best_ask == Some(price) {
                    self.best_ask = self.asks.first_key_value().map(|(&p, _)| p);
                }
            }
        }
    }

    fn notify_book_update(&mut self, price: Price, quantity: Quantity, side: Side, timestamp: Timestamp) {
        if let Some(callback) = &mut self.book_update_callback {
            callback(&BookUpdate {
                price,
                quantity,
                side,
                timestamp,
            });
        }
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderBook")
            .field("best_bid", &self.best_bid.map(from_price))
            .field("best_ask", &self.best_ask.map(from_price))
            .field("bid_levels", &self.bids.len())
            .field("ask_levels", &self.asks.len())
            .field("order_count", &self.index.len())
            .finish()
    }
}

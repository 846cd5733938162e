//! Feed applier - maps decoded wire messages onto per-symbol books.
//!
//! Cancel/execute/delete/replace messages reference past orders by
//! `order_ref` without restating price or side, so the applier shadows
//! every live wire order with `{symbol, price, remaining, side, ts}`.
//! Partial executes and partial cancels reduce the resting order in
//! place, preserving its position in the level FIFO.

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::events::{TradeTick, TradeTickCallback};
use crate::itch::{self, MessageHandler, Parser};
use crate::order_book::{OrderBook, DEFAULT_POOL_SIZE};
use crate::types::{OrderType, Price, Quantity, Side, SymbolId, Timestamp};

/// Live state of a wire order, shadowing what the book holds.
#[derive(Clone, Copy, Debug)]
struct ShadowOrder {
    symbol_id: SymbolId,
    price: Price,
    remaining: Quantity,
    side: Side,
    timestamp: Timestamp,
}

/// Applies decoded feed messages to per-symbol order books.
pub struct ItchApplier {
    books: FxHashMap<SymbolId, OrderBook>,
    pool_size: u32,

    /// Blank-padded 8-byte symbol -> compact id
    symbols: FxHashMap<[u8; 8], SymbolId>,
    next_symbol_id: SymbolId,

    /// Wire order_ref -> live state
    shadow: FxHashMap<u64, ShadowOrder>,

    /// When set, events for any other symbol are ignored
    filter: Option<SymbolId>,

    trade_callback: Option<TradeTickCallback>,

    // Statistics
    orders_added: u64,
    orders_cancelled: u64,
    orders_executed: u64,
    trades_reported: u64,
}

impl ItchApplier {
    pub fn new() -> Self {
        Self::with_pool_size(DEFAULT_POOL_SIZE)
    }

    /// Each auto-created per-symbol book gets a pool of `pool_size`.
    pub fn with_pool_size(pool_size: u32) -> Self {
        Self {
            books: FxHashMap::default(),
            pool_size,
            symbols: FxHashMap::default(),
            next_symbol_id: 1,
            shadow: FxHashMap::default(),
            filter: None,
            trade_callback: None,
            orders_added: 0,
            orders_cancelled: 0,
            orders_executed: 0,
            trades_reported: 0,
        }
    }

    /// Track only `symbol`; all other symbols are dropped at the door.
    pub fn set_symbol_filter(&mut self, symbol: &str) {
        let stock = pad_symbol(symbol);
        self.filter = Some(self.intern(&stock));
    }

    /// Called once per reported trade (executions and hidden prints).
    pub fn set_trade_callback(&mut self, callback: TradeTickCallback) {
        self.trade_callback = Some(callback);
    }

    /// Compact id for a symbol already seen on the feed.
    pub fn symbol_id(&self, symbol: &str) -> Option<SymbolId> {
        self.symbols.get(&pad_symbol(symbol)).copied()
    }

    /// Book for a symbol id, if one has been created.
    pub fn book(&self, symbol_id: SymbolId) -> Option<&OrderBook> {
        self.books.get(&symbol_id)
    }

    pub fn book_mut(&mut self, symbol_id: SymbolId) -> Option<&mut OrderBook> {
        self.books.get_mut(&symbol_id)
    }

    // Statistics
    #[inline]
    pub fn orders_added(&self) -> u64 {
        self.orders_added
    }

    #[inline]
    pub fn orders_cancelled(&self) -> u64 {
        self.orders_cancelled
    }

    #[inline]
    pub fn orders_executed(&self) -> u64 {
        self.orders_executed
    }

    #[inline]
    pub fn trades_reported(&self) -> u64 {
        self.trades_reported
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn intern(&mut self, stock: &[u8; 8]) -> SymbolId {
        if let Some(&id) = self.symbols.get(stock) {
            return id;
        }
        let id = self.next_symbol_id;
        self.next_symbol_id += 1;
        self.symbols.insert(*stock, id);
        id
    }

    #[inline]
    fn passes_filter(&self, symbol_id: SymbolId) -> bool {
        self.filter.map_or(true, |only| only == symbol_id)
    }

    fn book_for(&mut self, symbol_id: SymbolId) -> &mut OrderBook {
        let pool_size = self.pool_size;
        self.books
            .entry(symbol_id)
            .or_insert_with(|| OrderBook::with_pool_size(pool_size))
    }

    fn emit_trade(&mut self, tick: TradeTick) {
        if let Some(callback) = &mut self.trade_callback {
            callback(&tick);
        }
        self.trades_reported += 1;
    }

    fn apply_add(
        &mut self,
        order_ref: u64,
        stock: &[u8; 8],
        side: Side,
        shares: u32,
        price: u32,
        timestamp: Timestamp,
    ) {
        let symbol_id = self.intern(stock);
        if !self.passes_filter(symbol_id) {
            return;
        }

        let price = price as Price;
        let shares = shares as Quantity;

        let book = self.book_for(symbol_id);
        if book
            .add_order(order_ref, price, shares, side, OrderType::Limit, timestamp, 0)
            .is_none()
        {
            trace!(order_ref, "add ignored: duplicate ref or pool exhausted");
            return;
        }

        self.shadow.insert(
            order_ref,
            ShadowOrder {
                symbol_id,
                price,
                remaining: shares,
                side,
                timestamp,
            },
        );
        self.orders_added += 1;
    }

    /// Shrink or remove a shadowed order. Returns the order's prior
    /// state when the event passed the filter and was applied.
    fn apply_reduce(&mut self, order_ref: u64, shares: Quantity) -> Option<ShadowOrder> {
        let info = *self.shadow.get(&order_ref)?;
        if !self.passes_filter(info.symbol_id) {
            return None;
        }

        let book = self.books.get_mut(&info.symbol_id)?;
        if shares >= info.remaining {
            book.cancel_order(order_ref);
            self.shadow.remove(&order_ref);
        } else {
            book.reduce_order(order_ref, shares);
            self.shadow.get_mut(&order_ref).expect("checked above").remaining -= shares;
        }

        Some(info)
    }
}

impl Default for ItchApplier {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHandler for ItchApplier {
    fn on_add_order(&mut self, msg: &itch::AddOrder) {
        self.apply_add(
            msg.order_ref,
            &msg.stock,
            msg.side,
            msg.shares,
            msg.price,
            msg.header.timestamp,
        );
    }

    fn on_add_order_mpid(&mut self, msg: &itch::AddOrderMpid) {
        self.apply_add(
            msg.order_ref,
            &msg.stock,
            msg.side,
            msg.shares,
            msg.price,
            msg.header.timestamp,
        );
    }

    fn on_order_executed(&mut self, msg: &itch::OrderExecuted) {
        let Some(info) = self.apply_reduce(msg.order_ref, msg.executed_shares as Quantity) else {
            return;
        };
        self.orders_executed += 1;

        self.emit_trade(TradeTick {
            match_id: msg.match_number,
            symbol_id: info.symbol_id,
            price: info.price,
            quantity: msg.executed_shares as Quantity,
            side: info.side,
            timestamp: msg.header.timestamp,
        });
    }

    fn on_order_executed_with_price(&mut self, msg: &itch::OrderExecutedWithPrice) {
        let Some(info) = self.apply_reduce(msg.order_ref, msg.executed_shares as Quantity) else {
            return;
        };
        self.orders_executed += 1;

        // The print carries its own execution price
        self.emit_trade(TradeTick {
            match_id: msg.match_number,
            symbol_id: info.symbol_id,
            price: msg.execution_price as Price,
            quantity: msg.executed_shares as Quantity,
            side: info.side,
            timestamp: msg.header.timestamp,
        });
    }

    fn on_order_cancel(&mut self, msg: &itch::OrderCancel) {
        if self
            .apply_reduce(msg.order_ref, msg.cancelled_shares as Quantity)
            .is_some()
        {
            self.orders_cancelled += 1;
        }
    }

    fn on_order_delete(&mut self, msg: &itch::OrderDelete) {
        let Some(info) = self.shadow.get(&msg.order_ref).copied() else {
            trace!(order_ref = msg.order_ref, "delete for unknown ref");
            return;
        };
        if !self.passes_filter(info.symbol_id) {
            return;
        }

        if let Some(book) = self.books.get_mut(&info.symbol_id) {
            book.cancel_order(msg.order_ref);
        }
        self.shadow.remove(&msg.order_ref);
        self.orders_cancelled += 1;
    }

    fn on_order_replace(&mut self, msg: &itch::OrderReplace) {
        let Some(info) = self.shadow.get(&msg.original_order_ref).copied() else {
            trace!(
                order_ref = msg.original_order_ref,
                "replace for unknown ref"
            );
            return;
        };
        if !self.passes_filter(info.symbol_id) {
            return;
        }

        let price = msg.price as Price;
        let shares = msg.shares as Quantity;

        let Some(book) = self.books.get_mut(&info.symbol_id) else {
            return;
        };
        book.cancel_order(msg.original_order_ref);
        self.shadow.remove(&msg.original_order_ref);
        self.orders_cancelled += 1;

        if book
            .add_order(
                msg.new_order_ref,
                price,
                shares,
                info.side,
                OrderType::Limit,
                msg.header.timestamp,
                0,
            )
            .is_some()
        {
            self.shadow.insert(
                msg.new_order_ref,
                ShadowOrder {
                    symbol_id: info.symbol_id,
                    price,
                    remaining: shares,
                    side: info.side,
                    timestamp: msg.header.timestamp,
                },
            );
            self.orders_added += 1;
        }
    }

    fn on_trade(&mut self, msg: &itch::Trade) {
        // Hidden-order print: report only, never touch the book
        let symbol_id = self.intern(&msg.stock);
        if !self.passes_filter(symbol_id) {
            return;
        }

        self.emit_trade(TradeTick {
            match_id: msg.match_number,
            symbol_id,
            price: msg.price as Price,
            quantity: msg.shares as Quantity,
            side: msg.side,
            timestamp: msg.header.timestamp,
        });
    }
}

fn pad_symbol(symbol: &str) -> [u8; 8] {
    let mut stock = [b' '; 8];
    let bytes = symbol.as_bytes();
    let len = bytes.len().min(8);
    stock[..len].copy_from_slice(&bytes[..len]);
    stock
}

/// A parser wired to an applier: feed bytes in, books come out.
pub struct ItchFeed {
    parser: Parser,
    applier: ItchApplier,
}

impl ItchFeed {
    pub fn new() -> Self {
        Self::with_pool_size(DEFAULT_POOL_SIZE)
    }

    pub fn with_pool_size(pool_size: u32) -> Self {
        Self {
            parser: Parser::new(),
            applier: ItchApplier::with_pool_size(pool_size),
        }
    }

    /// Process a chunk of raw feed bytes. Returns bytes consumed;
    /// anything unconsumed is a partial message the caller should
    /// retain and re-present with more data.
    pub fn process(&mut self, data: &[u8]) -> usize {
        self.parser.parse_messages(data, &mut self.applier)
    }

    #[inline]
    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    #[inline]
    pub fn applier(&self) -> &ItchApplier {
        &self.applier
    }

    #[inline]
    pub fn applier_mut(&mut self) -> &mut ItchApplier {
        &mut self.applier
    }
}

impl Default for ItchFeed {
    fn default() -> Self {
        Self::new()
    }
}

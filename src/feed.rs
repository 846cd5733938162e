//! Feed handler - consumes normalized L2 events off the handoff ring.
//!
//! The ring is the only synchronisation boundary in the crate: a
//! producer thread enqueues [`L2Event`]s, the processing thread drains
//! them, checks the feed sequence, fires callbacks, and (optionally)
//! maintains a synthetic per-symbol book where each price level is
//! represented by one synthetic order. Processing never stalls on a
//! gap; recovery is an external concern.
//!
//! `start` moves the worker (consumer, books, callbacks) into the
//! processing thread; `stop` clears the run flag, joins, and moves the
//! worker back so books are queryable between runs. Statistics are
//! atomics shared by both sides.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::events::{
    GapCallback, L2Action, L2Callback, L2Event, L3Callback, L3Event, TradeTick, TradeTickCallback,
};
use crate::order_book::{OrderBook, DEFAULT_POOL_SIZE};
use crate::ring::{self, Consumer, Producer};
use crate::types::{OrderId, OrderType, Price, Side, SymbolId};

/// Feed handler configuration.
#[derive(Clone, Copy, Debug)]
pub struct FeedConfig {
    /// Handoff ring size; must be a power of two
    pub ring_capacity: usize,
    /// Count sequence gaps and fire the gap callback
    pub detect_gaps: bool,
    /// Apply L2 updates to per-symbol books vs. deliver-only
    pub maintain_order_book: bool,
    /// Soft cap on auto-created per-symbol books
    pub max_symbols: u32,
    /// Pool capacity of each auto-created book
    pub pool_size: u32,
    /// Pin the processing thread to the last core
    pub pin_thread: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 65_536,
            detect_gaps: true,
            maintain_order_book: true,
            max_symbols: 1_000,
            pool_size: DEFAULT_POOL_SIZE,
            pin_thread: false,
        }
    }
}

/// Monotonic feed counters, shared between the enqueue side and the
/// processing thread.
#[derive(Debug, Default)]
pub struct FeedStats {
    messages_received: AtomicU64,
    messages_processed: AtomicU64,
    sequence_gaps: AtomicU64,
    parse_errors: AtomicU64,
    buffer_overflows: AtomicU64,
    last_sequence: AtomicU64,
    last_message_time: AtomicU64,
    last_process_time: AtomicU64,
}

impl FeedStats {
    fn snapshot(&self) -> FeedStatsSnapshot {
        FeedStatsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            sequence_gaps: self.sequence_gaps.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            buffer_overflows: self.buffer_overflows.load(Ordering::Relaxed),
            last_sequence: self.last_sequence.load(Ordering::Relaxed),
            last_message_time: self.last_message_time.load(Ordering::Relaxed),
            last_process_time: self.last_process_time.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.messages_received.store(0, Ordering::Relaxed);
        self.messages_processed.store(0, Ordering::Relaxed);
        self.sequence_gaps.store(0, Ordering::Relaxed);
        self.parse_errors.store(0, Ordering::Relaxed);
        self.buffer_overflows.store(0, Ordering::Relaxed);
        self.last_sequence.store(0, Ordering::Relaxed);
        self.last_message_time.store(0, Ordering::Relaxed);
        self.last_process_time.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`FeedStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStatsSnapshot {
    pub messages_received: u64,
    pub messages_processed: u64,
    pub sequence_gaps: u64,
    pub parse_errors: u64,
    pub buffer_overflows: u64,
    pub last_sequence: u64,
    pub last_message_time: u64,
    pub last_process_time: u64,
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Consumer-side state: everything the processing thread owns.
struct FeedWorker {
    consumer: Consumer<L2Event>,
    config: FeedConfig,
    stats: Arc<FeedStats>,

    books: FxHashMap<SymbolId, OrderBook>,

    /// One synthetic resting order per (symbol, side, price) level
    level_refs: FxHashMap<(SymbolId, Side, Price), OrderId>,
    next_synthetic_id: OrderId,

    expected_sequence: u64,

    l2_callback: Option<L2Callback>,
    l3_callback: Option<L3Callback>,
    trade_callback: Option<TradeTickCallback>,
    gap_callback: Option<GapCallback>,
}

impl FeedWorker {
    /// Drain up to `max` messages (0 = drain everything available).
    fn process(&mut self, max: usize) -> usize {
        let mut processed = 0usize;
        while max == 0 || processed < max {
            let Some(event) = self.consumer.try_pop() else {
                break;
            };
            self.process_event(&event);
            processed += 1;
        }
        if processed > 0 {
            self.stats
                .messages_processed
                .fetch_add(processed as u64, Ordering::Relaxed);
        }
        processed
    }

    fn process_event(&mut self, event: &L2Event) {
        if self.config.detect_gaps {
            self.check_sequence(event.sequence);
        }

        self.stats
            .last_sequence
            .store(event.sequence, Ordering::Relaxed);
        self.stats
            .last_message_time
            .store(event.timestamp, Ordering::Relaxed);

        if let Some(callback) = &mut self.l2_callback {
            callback(event);
        }

        if self.config.maintain_order_book {
            self.apply(event);
        }

        self.stats.last_process_time.store(now_ns(), Ordering::Relaxed);
    }

    fn check_sequence(&mut self, sequence: u64) {
        if self.expected_sequence != 0 && sequence != self.expected_sequence {
            self.stats.sequence_gaps.fetch_add(1, Ordering::Relaxed);
            warn!(
                expected = self.expected_sequence,
                received = sequence,
                "feed sequence gap"
            );
            if let Some(callback) = &mut self.gap_callback {
                callback(self.expected_sequence, sequence);
            }
        }
        self.expected_sequence = sequence + 1;
    }

    /// Apply an L2 update to the symbol's synthetic book. Add/Modify
    /// set the level to the carried quantity, Delete clears it, Execute
    /// reduces it in place and reports a trade tick.
    fn apply(&mut self, event: &L2Event) {
        if !self.books.contains_key(&event.symbol_id) {
            if self.books.len() >= self.config.max_symbols as usize {
                return;
            }
            self.books.insert(
                event.symbol_id,
                OrderBook::with_pool_size(self.config.pool_size),
            );
        }

        let key = (event.symbol_id, event.side, event.price);
        let mut l3_order_id = None;

        match event.action {
            L2Action::Add | L2Action::Modify => {
                let book = self.books.get_mut(&event.symbol_id).expect("just ensured");
                if let Some(id) = self.level_refs.remove(&key) {
                    book.cancel_order(id);
                }
                if event.quantity > 0 {
                    let id = self.next_synthetic_id;
                    self.next_synthetic_id += 1;
                    book.add_order(
                        id,
                        event.price,
                        event.quantity,
                        event.side,
                        OrderType::Limit,
                        event.timestamp,
                        0,
                    );
                    self.level_refs.insert(key, id);
                    l3_order_id = Some(id);
                }
            }
            L2Action::Delete => {
                if let Some(id) = self.level_refs.remove(&key) {
                    let book = self.books.get_mut(&event.symbol_id).expect("just ensured");
                    book.cancel_order(id);
                    l3_order_id = Some(id);
                }
            }
            L2Action::Execute => {
                if let Some(&id) = self.level_refs.get(&key) {
                    let book = self.books.get_mut(&event.symbol_id).expect("just ensured");
                    let remaining = book.get_order(id).map_or(0, |o| o.remaining());
                    book.reduce_order(id, event.quantity);
                    if event.quantity >= remaining {
                        self.level_refs.remove(&key);
                    }
                    l3_order_id = Some(id);

                    let tick = TradeTick {
                        match_id: 0,
                        symbol_id: event.symbol_id,
                        price: event.price,
                        quantity: event.quantity,
                        side: event.side,
                        timestamp: event.timestamp,
                    };
                    if let Some(callback) = &mut self.trade_callback {
                        callback(&tick);
                    }
                }
            }
        }

        if let (Some(order_id), Some(callback)) = (l3_order_id, &mut self.l3_callback) {
            callback(&L3Event {
                symbol_id: event.symbol_id,
                order_id,
                price: event.price,
                quantity: event.quantity,
                side: event.side,
                action: event.action,
                timestamp: event.timestamp,
            });
        }
    }
}

/// Feed handler: producer-side handle plus worker lifecycle control.
///
/// Enqueue from the producer thread; either drive `process_messages`
/// from your own consumer thread, or call `start` to spawn the internal
/// one (it yields when the ring is empty and joins cooperatively on
/// `stop`). Configure callbacks and books while the handler is stopped.
pub struct FeedHandler {
    config: FeedConfig,
    stats: Arc<FeedStats>,
    producer: Producer<L2Event>,

    /// Present while not running; migrates into the thread on `start`
    worker: Option<FeedWorker>,
    thread: Option<JoinHandle<FeedWorker>>,
    running: Arc<AtomicBool>,
}

impl FeedHandler {
    pub fn new(config: FeedConfig) -> Self {
        let (producer, consumer) = ring::spsc(config.ring_capacity);
        let stats = Arc::new(FeedStats::default());

        Self {
            config,
            stats: Arc::clone(&stats),
            producer,
            worker: Some(FeedWorker {
                consumer,
                config,
                stats,
                books: FxHashMap::default(),
                level_refs: FxHashMap::default(),
                next_synthetic_id: 1,
                expected_sequence: 1,
                l2_callback: None,
                l3_callback: None,
                trade_callback: None,
                gap_callback: None,
            }),
            thread: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Enqueue a typed L2 event (producer side). Returns `false` and
    /// counts an overflow when the ring is full; the producer decides
    /// the recovery.
    pub fn enqueue_l2(&mut self, event: L2Event) -> bool {
        if !self.producer.try_push(event) {
            self.stats.buffer_overflows.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.stats.messages_received.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Drain up to `max` messages on the calling thread (0 = all).
    /// Returns the number processed. No-op while the internal thread
    /// owns the worker.
    pub fn process_messages(&mut self, max: usize) -> usize {
        match &mut self.worker {
            Some(worker) => worker.process(max),
            None => 0,
        }
    }

    /// Spawn the internal processing thread.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return; // already running
        }
        let Some(mut worker) = self.worker.take() else {
            self.running.store(false, Ordering::SeqCst);
            return;
        };

        info!("feed handler starting");
        let running = Arc::clone(&self.running);
        let pin_thread = self.config.pin_thread;

        self.thread = Some(thread::spawn(move || {
            if pin_thread {
                if let Some(core_ids) = core_affinity::get_core_ids() {
                    // The last core is typically quietest
                    if let Some(last) = core_ids.last() {
                        core_affinity::set_for_current(*last);
                    }
                }
            }

            while running.load(Ordering::Relaxed) {
                if worker.process(1_000) == 0 {
                    thread::yield_now();
                }
            }
            worker
        }));
    }

    /// Clear the run flag and join the processing thread. In-flight
    /// message processing completes; the worker (and its books) moves
    /// back into the handler.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if let Ok(worker) = handle.join() {
                self.worker = Some(worker);
            }
            info!("feed handler stopped");
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Book for a symbol. Only available while the handler is stopped
    /// (the processing thread owns the books while running).
    pub fn get_order_book(&self, symbol_id: SymbolId) -> Option<&OrderBook> {
        self.worker.as_ref()?.books.get(&symbol_id)
    }

    /// Create (or fetch) the book for a symbol ahead of the feed.
    /// Returns `None` while the handler is running.
    pub fn create_order_book(&mut self, symbol_id: SymbolId) -> Option<&mut OrderBook> {
        let worker = self.worker.as_mut()?;
        let pool_size = worker.config.pool_size;
        Some(
            worker
                .books
                .entry(symbol_id)
                .or_insert_with(|| OrderBook::with_pool_size(pool_size)),
        )
    }

    pub fn set_l2_callback(&mut self, callback: L2Callback) {
        if let Some(worker) = self.worker.as_mut() {
            worker.l2_callback = Some(callback);
        }
    }

    pub fn set_l3_callback(&mut self, callback: L3Callback) {
        if let Some(worker) = self.worker.as_mut() {
            worker.l3_callback = Some(callback);
        }
    }

    pub fn set_trade_callback(&mut self, callback: TradeTickCallback) {
        if let Some(worker) = self.worker.as_mut() {
            worker.trade_callback = Some(callback);
        }
    }

    pub fn set_gap_callback(&mut self, callback: GapCallback) {
        if let Some(worker) = self.worker.as_mut() {
            worker.gap_callback = Some(callback);
        }
    }

    pub fn get_stats(&self) -> FeedStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }
}

impl Drop for FeedHandler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use std::sync::Mutex;
    use std::time::Duration;

    fn event(sequence: u64, action: L2Action, price: Price, quantity: u64) -> L2Event {
        L2Event {
            symbol_id: 1,
            price,
            quantity,
            side: Side::Buy,
            action,
            timestamp: 1_000 + sequence,
            sequence,
        }
    }

    fn small_config() -> FeedConfig {
        FeedConfig {
            ring_capacity: 64,
            pool_size: 1_000,
            ..FeedConfig::default()
        }
    }

    #[test]
    fn test_enqueue_and_process_inline() {
        let mut handler = FeedHandler::new(small_config());

        assert!(handler.enqueue_l2(event(1, L2Action::Add, 10_000, 100)));
        assert!(handler.enqueue_l2(event(2, L2Action::Add, 10_010, 50)));

        let processed = handler.process_messages(0);
        assert_eq!(processed, 2);

        let stats = handler.get_stats();
        assert_eq!(stats.messages_received, 2);
        assert_eq!(stats.messages_processed, 2);
        assert_eq!(stats.sequence_gaps, 0);
        assert_eq!(stats.last_sequence, 2);
        assert_eq!(stats.last_message_time, 1_002);

        let book = handler.get_order_book(1).unwrap();
        assert_eq!(book.best_bid(), Some(10_010));
    }

    #[test]
    fn test_process_messages_respects_max() {
        let mut handler = FeedHandler::new(small_config());
        for seq in 1..=5 {
            handler.enqueue_l2(event(seq, L2Action::Add, 10_000 + seq as Price, 10));
        }

        assert_eq!(handler.process_messages(2), 2);
        assert_eq!(handler.process_messages(0), 3);
        assert_eq!(handler.process_messages(0), 0);
    }

    #[test]
    fn test_sequence_gap_detection() {
        let mut handler = FeedHandler::new(small_config());
        let gaps = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&gaps);
        handler.set_gap_callback(Box::new(move |expected, received| {
            sink.lock().unwrap().push((expected, received));
        }));

        for seq in 1..=9 {
            handler.enqueue_l2(event(seq, L2Action::Add, 10_000, 10));
        }
        handler.process_messages(0);
        assert_eq!(handler.get_stats().sequence_gaps, 0);

        // Expected 10, received 12
        handler.enqueue_l2(event(12, L2Action::Add, 10_001, 10));
        handler.process_messages(0);

        let stats = handler.get_stats();
        assert_eq!(stats.sequence_gaps, 1);
        assert_eq!(stats.messages_processed, 10, "gapped message still processed");
        assert_eq!(*gaps.lock().unwrap(), vec![(10, 12)]);

        // Expectation resynced to received + 1
        handler.enqueue_l2(event(13, L2Action::Add, 10_002, 10));
        handler.process_messages(0);
        assert_eq!(handler.get_stats().sequence_gaps, 1);
    }

    #[test]
    fn test_gap_detection_disabled() {
        let mut handler = FeedHandler::new(FeedConfig {
            detect_gaps: false,
            ..small_config()
        });

        handler.enqueue_l2(event(5, L2Action::Add, 10_000, 10));
        handler.enqueue_l2(event(42, L2Action::Add, 10_001, 10));
        handler.process_messages(0);
        assert_eq!(handler.get_stats().sequence_gaps, 0);
    }

    #[test]
    fn test_ring_overflow() {
        let mut handler = FeedHandler::new(FeedConfig {
            ring_capacity: 8, // 7 usable
            ..FeedConfig::default()
        });

        for seq in 1..=7 {
            assert!(handler.enqueue_l2(event(seq, L2Action::Add, 10_000, 10)));
        }
        assert!(!handler.enqueue_l2(event(8, L2Action::Add, 10_000, 10)));

        let stats = handler.get_stats();
        assert_eq!(stats.buffer_overflows, 1);
        assert_eq!(stats.messages_received, 7);

        // One slot frees after a pop
        handler.process_messages(1);
        assert!(handler.enqueue_l2(event(8, L2Action::Add, 10_000, 10)));
    }

    #[test]
    fn test_level_maintenance() {
        let mut handler = FeedHandler::new(small_config());

        handler.enqueue_l2(event(1, L2Action::Add, 10_000, 100));
        handler.process_messages(0);
        assert_eq!(handler.get_order_book(1).unwrap().best_bid_quantity(), 100);

        // Modify replaces the level quantity outright
        handler.enqueue_l2(event(2, L2Action::Modify, 10_000, 70));
        handler.process_messages(0);
        let book = handler.get_order_book(1).unwrap();
        assert_eq!(book.best_bid_quantity(), 70);
        assert_eq!(book.bid_level_count(), 1);

        // Execute reduces it in place
        handler.enqueue_l2(event(3, L2Action::Execute, 10_000, 20));
        handler.process_messages(0);
        assert_eq!(handler.get_order_book(1).unwrap().best_bid_quantity(), 50);

        // Delete clears the level
        handler.enqueue_l2(event(4, L2Action::Delete, 10_000, 0));
        handler.process_messages(0);
        let book = handler.get_order_book(1).unwrap();
        assert_eq!(book.best_bid(), None);
        assert!(book.is_empty());
    }

    #[test]
    fn test_execute_emits_trade_tick() {
        let mut handler = FeedHandler::new(small_config());
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&ticks);
        handler.set_trade_callback(Box::new(move |tick: &TradeTick| {
            sink.lock().unwrap().push(*tick);
        }));

        handler.enqueue_l2(event(1, L2Action::Add, 10_000, 100));
        handler.enqueue_l2(event(2, L2Action::Execute, 10_000, 30));
        handler.process_messages(0);

        let ticks = ticks.lock().unwrap();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].price, 10_000);
        assert_eq!(ticks[0].quantity, 30);
        assert_eq!(ticks[0].symbol_id, 1);
    }

    #[test]
    fn test_l2_and_l3_callbacks() {
        let mut handler = FeedHandler::new(small_config());

        let l2_seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&l2_seen);
        handler.set_l2_callback(Box::new(move |event: &L2Event| {
            sink.lock().unwrap().push(event.sequence);
        }));

        let l3_seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&l3_seen);
        handler.set_l3_callback(Box::new(move |event: &L3Event| {
            sink.lock().unwrap().push((event.order_id, event.action));
        }));

        handler.enqueue_l2(event(1, L2Action::Add, 10_000, 100));
        handler.enqueue_l2(event(2, L2Action::Delete, 10_000, 0));
        handler.process_messages(0);

        assert_eq!(*l2_seen.lock().unwrap(), vec![1, 2]);
        let l3 = l3_seen.lock().unwrap();
        assert_eq!(l3.len(), 2);
        assert_eq!(l3[0].1, L2Action::Add);
        assert_eq!(l3[1].1, L2Action::Delete);
        assert_eq!(l3[0].0, l3[1].0, "delete names the synthetic order it clears");
    }

    #[test]
    fn test_deliver_only_mode() {
        let mut handler = FeedHandler::new(FeedConfig {
            maintain_order_book: false,
            ..small_config()
        });

        handler.enqueue_l2(event(1, L2Action::Add, 10_000, 100));
        handler.process_messages(0);
        assert!(handler.get_order_book(1).is_none());
    }

    #[test]
    fn test_max_symbols_cap() {
        let mut handler = FeedHandler::new(FeedConfig {
            max_symbols: 1,
            ..small_config()
        });

        let mut first = event(1, L2Action::Add, 10_000, 100);
        first.symbol_id = 1;
        let mut second = event(2, L2Action::Add, 10_000, 100);
        second.symbol_id = 2;

        handler.enqueue_l2(first);
        handler.enqueue_l2(second);
        handler.process_messages(0);

        assert!(handler.get_order_book(1).is_some());
        assert!(handler.get_order_book(2).is_none(), "over the symbol cap");
    }

    #[test]
    fn test_create_order_book_ahead_of_feed() {
        let mut handler = FeedHandler::new(small_config());
        assert!(handler.create_order_book(7).is_some());
        assert!(handler.get_order_book(7).is_some());
        assert!(handler.get_order_book(7).unwrap().is_empty());
    }

    #[test]
    fn test_start_stop_round_trip() {
        let mut handler = FeedHandler::new(small_config());

        handler.start();
        assert!(handler.is_running());
        // Idempotent start
        handler.start();

        for seq in 1..=3 {
            assert!(handler.enqueue_l2(event(seq, L2Action::Add, 10_000 + seq as Price, 10)));
        }

        // Wait for the processing thread to drain the ring
        for _ in 0..1_000 {
            if handler.get_stats().messages_processed >= 3 {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }

        handler.stop();
        assert!(!handler.is_running());

        let stats = handler.get_stats();
        assert_eq!(stats.messages_processed, 3);

        // Books return to the handler after stop
        let book = handler.get_order_book(1).unwrap();
        assert_eq!(book.bid_level_count(), 3);

        // And a second run picks up where the first left off
        handler.start();
        assert!(handler.enqueue_l2(event(4, L2Action::Add, 10_020, 10)));
        for _ in 0..1_000 {
            if handler.get_stats().messages_processed >= 4 {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        handler.stop();
        assert_eq!(handler.get_stats().sequence_gaps, 0);
    }

    #[test]
    fn test_reset_stats() {
        let mut handler = FeedHandler::new(small_config());
        handler.enqueue_l2(event(1, L2Action::Add, 10_000, 100));
        handler.process_messages(0);
        assert_ne!(handler.get_stats(), FeedStatsSnapshot::default());

        handler.reset_stats();
        assert_eq!(handler.get_stats(), FeedStatsSnapshot::default());
    }
}

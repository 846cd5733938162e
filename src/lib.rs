//! # Pulsebook
//!
//! A deterministic limit order book with an attached matching engine
//! and a binary (ITCH-style) feed ingestion path.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: one thread owns a book and its arena end-to-end
//!   (no locks); shard by symbol for parallelism
//! - **O(1) Operations**: add, cancel-by-id, and per-match work run in
//!   constant time over an index-linked arena
//! - **Cache-Optimized**: 64-byte aligned order slots, 32-bit indices
//! - **Arena Allocation**: no heap allocation in the hot path
//!
//! ## Architecture
//!
//! ```text
//! [Feed Thread] --> [SPSC Ring] --> [Processing Thread]
//!                                         |
//!                    decoder -> applier -> books -> matcher
//!                                         |
//!                                  [Trades / Book Updates]
//! ```

pub mod applier;
pub mod arena;
pub mod events;
pub mod feed;
pub mod itch;
pub mod matching;
pub mod order_book;
pub mod price_level;
pub mod ring;
pub mod types;

// Re-exports for convenience
pub use applier::{ItchApplier, ItchFeed};
pub use arena::{Arena, AtomicIndexPool, OrderNode, SlotIndex, NIL};
pub use events::{
    Bbo, BookUpdate, DepthLevel, ExecutionResult, L2Action, L2Event, L3Event, Trade, TradeTick,
};
pub use feed::{FeedConfig, FeedHandler, FeedStatsSnapshot};
pub use matching::{EngineConfig, MatchEngine};
pub use order_book::{OrderBook, DEFAULT_POOL_SIZE};
pub use price_level::PriceLevel;
pub use types::{
    OrderId, OrderStatus, OrderType, Price, Quantity, Side, SymbolId, Timestamp, INVALID_ORDER_ID,
    INVALID_PRICE, PRICE_SCALE,
};

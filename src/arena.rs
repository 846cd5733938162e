//! Arena allocator - O(1) slab of cache-line aligned order slots.
//!
//! The arena pre-allocates a contiguous block of nodes at startup,
//! eliminating heap allocation in the hot path. Free slots are chained
//! through the `next` field of unused nodes. A CAS-based variant is
//! provided for arenas shared between producer threads.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::types::{OrderId, OrderStatus, OrderType, Price, Quantity, Side, Timestamp};

/// Sentinel value representing a null/invalid index (like nullptr)
pub const NIL: u32 = u32::MAX;

/// Type alias for arena indices - compressed 32-bit "pointers".
pub type SlotIndex = u32;

/// A single order slot - exactly 64 bytes (one cache line).
///
/// # Memory Layout
///
/// | Field       | Type | Offset | Size |
/// |-------------|------|--------|------|
/// | price       | i64  | 0      | 8    |
/// | quantity    | u64  | 8      | 8    |
/// | filled      | u64  | 16     | 8    |
/// | id          | u64  | 24     | 8    |
/// | participant | u64  | 32     | 8    |
/// | timestamp   | u64  | 40     | 8    |
/// | next        | u32  | 48     | 4    |
/// | prev        | u32  | 52     | 4    |
/// | side        | u8   | 56     | 1    |
/// | kind        | u8   | 57     | 1    |
/// | status      | u8   | 58     | 1    |
/// | (padding)   | -    | 59     | 5    |
#[repr(C)]
#[repr(align(64))]
#[derive(Clone, Copy)]
pub struct OrderNode {
    /// Fixed-point limit price
    pub price: Price,

    /// Total order quantity
    pub quantity: Quantity,

    /// Cumulative filled quantity (`filled <= quantity` always)
    pub filled: Quantity,

    /// External order id (client-assigned, nonzero)
    pub id: OrderId,

    /// Participant id for self-trade prevention (0 = anonymous)
    pub participant: u64,

    /// Submission timestamp, nanoseconds
    pub timestamp: Timestamp,

    /// Index of the next order at the same price level; threads the
    /// free list while the slot is unallocated
    pub next: SlotIndex,

    /// Index of the previous order (enables O(1) cancel)
    pub prev: SlotIndex,

    pub side: Side,
    pub kind: OrderType,
    pub status: OrderStatus,
}

const _: () = assert!(
    std::mem::size_of::<OrderNode>() == 64,
    "OrderNode must be exactly 64 bytes (one cache line)"
);

const _: () = assert!(
    std::mem::align_of::<OrderNode>() == 64,
    "OrderNode must be 64-byte aligned"
);

impl OrderNode {
    /// Create an empty/uninitialized node (for the free list)
    #[inline]
    pub const fn empty() -> Self {
        Self {
            price: 0,
            quantity: 0,
            filled: 0,
            id: 0,
            participant: 0,
            timestamp: 0,
            next: NIL,
            prev: NIL,
            side: Side::Buy,
            kind: OrderType::Limit,
            status: OrderStatus::New,
        }
    }

    /// Quantity still open to fill
    #[inline]
    pub const fn remaining(&self) -> Quantity {
        self.quantity - self.filled
    }

    /// Completely filled?
    #[inline]
    pub const fn is_filled(&self) -> bool {
        self.filled >= self.quantity
    }

    /// Can still be matched or cancelled?
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, OrderStatus::New | OrderStatus::PartiallyFilled)
    }

    /// Advance the fill by up to `qty`, capping at the open quantity.
    /// Updates the status and returns the quantity actually filled.
    #[inline]
    pub fn fill(&mut self, qty: Quantity) -> Quantity {
        let actual = qty.min(self.remaining());
        self.filled += actual;
        if self.is_filled() {
            self.status = OrderStatus::Filled;
        } else if self.filled > 0 {
            self.status = OrderStatus::PartiallyFilled;
        }
        actual
    }

    /// Reset the node for reuse (when returning to the free list)
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::empty();
    }
}

impl fmt::Debug for OrderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderNode")
            .field("id", &self.id)
            .field("price", &self.price)
            .field("quantity", &self.quantity)
            .field("filled", &self.filled)
            .field("side", &self.side)
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("prev", &self.prev)
            .field("next", &self.next)
            .finish()
    }
}

/// Pre-allocated order pool with O(1) allocation and deallocation.
///
/// Uses a free list threaded through the `next` field of unused nodes.
/// No system calls or locks in the hot path. Single-threaded: one book
/// owns one arena exclusively.
pub struct Arena {
    /// Contiguous block of pre-allocated nodes
    nodes: Vec<OrderNode>,

    /// Head of the free list (index of first available node)
    free_head: SlotIndex,

    /// Number of currently allocated nodes
    allocated_count: u32,

    /// Total capacity
    capacity: u32,
}

impl Arena {
    /// Create a new arena with the specified capacity.
    ///
    /// # Panics
    /// Panics if capacity equals or exceeds `NIL` (reserved sentinel).
    pub fn new(capacity: u32) -> Self {
        assert!(capacity < NIL, "capacity must be less than NIL");

        let mut nodes = vec![OrderNode::empty(); capacity as usize];

        // Thread the free list through all nodes
        for i in 0..capacity.saturating_sub(1) {
            nodes[i as usize].next = i + 1;
        }
        if capacity > 0 {
            nodes[(capacity - 1) as usize].next = NIL;
        }

        Self {
            nodes,
            free_head: if capacity > 0 { 0 } else { NIL },
            allocated_count: 0,
            capacity,
        }
    }

    /// Allocate a node. Returns `None` if the arena is full.
    ///
    /// # Complexity
    /// O(1) - pops from head of free list
    #[inline]
    pub fn alloc(&mut self) -> Option<SlotIndex> {
        if self.free_head == NIL {
            return None;
        }

        let index = self.free_head;
        self.free_head = self.nodes[index as usize].next;
        self.allocated_count += 1;

        self.nodes[index as usize].next = NIL;
        self.nodes[index as usize].prev = NIL;

        Some(index)
    }

    /// Free a node back to the arena.
    ///
    /// The caller must ensure the index was previously allocated and has
    /// not already been freed (no double-free protection in release).
    ///
    /// # Complexity
    /// O(1) - pushes to head of free list
    #[inline]
    pub fn free(&mut self, index: SlotIndex) {
        debug_assert!(index < self.capacity, "index out of bounds");
        debug_assert!(self.allocated_count > 0, "double free detected");

        self.nodes[index as usize].reset();
        self.nodes[index as usize].next = self.free_head;
        self.free_head = index;
        self.allocated_count -= 1;
    }

    /// Get an immutable reference to a node.
    #[inline]
    pub fn get(&self, index: SlotIndex) -> &OrderNode {
        debug_assert!(index < self.capacity, "index out of bounds");
        &self.nodes[index as usize]
    }

    /// Get a mutable reference to a node.
    #[inline]
    pub fn get_mut(&mut self, index: SlotIndex) -> &mut OrderNode {
        debug_assert!(index < self.capacity, "index out of bounds");
        &mut self.nodes[index as usize]
    }

    /// Does `index` name a slot inside this arena?
    #[inline]
    pub fn contains(&self, index: SlotIndex) -> bool {
        index < self.capacity
    }

    /// Number of currently allocated nodes.
    #[inline]
    pub fn allocated(&self) -> u32 {
        self.allocated_count
    }

    /// Total capacity of the arena.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// True if no nodes are allocated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocated_count == 0
    }

    /// True if no free nodes remain.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.free_head == NIL
    }

    /// Pre-fault all memory pages (warm-up routine).
    ///
    /// Walks through all nodes to force the OS to map virtual pages to
    /// physical RAM, preventing page faults in the hot path.
    pub fn warm_up(&mut self) {
        for node in &mut self.nodes {
            let value = node.participant;
            // Volatile write to prevent optimization
            unsafe {
                std::ptr::write_volatile(&mut node.participant, value);
            }
        }
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity)
            .field("allocated", &self.allocated_count)
            .field("free_head", &self.free_head)
            .finish()
    }
}

/// Multi-producer free-index pool: a Treiber stack of slot indices.
///
/// The head packs `(generation << 32) | index` into one `AtomicU64`; the
/// generation bumps on every successful swap, so a recycled index cannot
/// be mistaken for the value originally read (ABA). Claim and release
/// are lock-free and linearisable from any number of threads.
///
/// The pool hands out indices only; the slabs they name are owned by the
/// claimer until release. Not used inside a single book's hot path.
pub struct AtomicIndexPool {
    /// `links[i]` = next free index below `i` on the stack
    links: Box<[AtomicU32]>,

    /// `(generation << 32) | head_index`
    head: AtomicU64,

    allocated: AtomicU32,
    capacity: u32,
}

impl AtomicIndexPool {
    /// Create a pool over `capacity` indices, all initially free.
    ///
    /// # Panics
    /// Panics if capacity equals or exceeds `NIL`.
    pub fn new(capacity: u32) -> Self {
        assert!(capacity < NIL, "capacity must be less than NIL");

        let links: Box<[AtomicU32]> = (0..capacity)
            .map(|i| AtomicU32::new(if i + 1 < capacity { i + 1 } else { NIL }))
            .collect();

        let head_index = if capacity > 0 { 0 } else { NIL };

        Self {
            links,
            head: AtomicU64::new(Self::pack(0, head_index)),
            allocated: AtomicU32::new(0),
            capacity,
        }
    }

    #[inline]
    const fn pack(generation: u32, index: u32) -> u64 {
        ((generation as u64) << 32) | index as u64
    }

    #[inline]
    const fn index_of(word: u64) -> u32 {
        word as u32
    }

    #[inline]
    const fn generation_of(word: u64) -> u32 {
        (word >> 32) as u32
    }

    /// Claim a free index. Returns `None` when the pool is exhausted.
    /// Never blocks.
    pub fn claim(&self) -> Option<SlotIndex> {
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            let index = Self::index_of(head);
            if index == NIL {
                return None;
            }

            let next = self.links[index as usize].load(Ordering::Relaxed);
            let new_head = Self::pack(Self::generation_of(head).wrapping_add(1), next);

            match self.head.compare_exchange_weak(
                head,
                new_head,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.allocated.fetch_add(1, Ordering::Relaxed);
                    return Some(index);
                }
                Err(observed) => head = observed,
            }
        }
    }

    /// Release a previously claimed index back to the pool.
    ///
    /// Releasing an index that was never claimed is a logic error; debug
    /// builds assert the index is at least in range.
    pub fn release(&self, index: SlotIndex) {
        debug_assert!(index < self.capacity, "index out of bounds");

        let mut head = self.head.load(Ordering::Acquire);
        loop {
            self.links[index as usize].store(Self::index_of(head), Ordering::Relaxed);
            let new_head = Self::pack(Self::generation_of(head).wrapping_add(1), index);

            match self.head.compare_exchange_weak(
                head,
                new_head,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.allocated.fetch_sub(1, Ordering::Relaxed);
                    return;
                }
                Err(observed) => head = observed,
            }
        }
    }

    /// Does `index` name a slot inside this pool?
    #[inline]
    pub fn contains(&self, index: SlotIndex) -> bool {
        index < self.capacity
    }

    /// Number of currently claimed indices (approximate under contention).
    #[inline]
    pub fn allocated(&self) -> u32 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Total capacity of the pool.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

impl fmt::Debug for AtomicIndexPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicIndexPool")
            .field("capacity", &self.capacity)
            .field("allocated", &self.allocated())
            .finish()
    }
}

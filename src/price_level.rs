//! Price level - all open orders resting at a single price.
//!
//! Orders queue in arrival order (price-time priority) on a doubly
//! linked chain threaded through their arena slots, so completing or
//! cancelling any member is O(1) with no per-level scan. The level owns
//! the member bookkeeping: fills advance an order's cumulative fill in
//! place, withdrawals carry away open quantity, and the cached
//! aggregate always equals the sum of open (unfilled) quantity across
//! the chain.

use crate::arena::{Arena, SlotIndex, NIL};
use crate::types::Quantity;

/// Summary of an in-place execution against a resting order.
#[derive(Clone, Copy, Debug)]
pub struct LevelFill {
    /// Quantity actually executed (capped at the order's open quantity)
    pub executed: Quantity,
    /// The order completed and was unlinked; its slot is ready to free
    pub removed: bool,
    /// No orders remain; the level should be dropped from its side
    pub now_empty: bool,
}

/// All open orders at one price, oldest first.
#[derive(Clone, Copy, Debug)]
pub struct PriceLevel {
    /// Oldest order (next to match)
    pub head: SlotIndex,
    /// Newest order
    pub tail: SlotIndex,
    /// Sum of `remaining()` across the chain
    pub total_qty: Quantity,
    /// Number of resting orders
    pub count: u32,
}

impl PriceLevel {
    /// Create a new empty price level
    #[inline]
    pub const fn new() -> Self {
        Self {
            head: NIL,
            tail: NIL,
            total_qty: 0,
            count: 0,
        }
    }

    /// Returns true if there are no orders at this level
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The oldest order, or `NIL` when empty.
    #[inline]
    pub const fn front(&self) -> SlotIndex {
        self.head
    }

    /// Queue an order behind everything already resting here. The
    /// aggregate grows by the order's open quantity, which for a
    /// partially filled residual is less than its nominal size.
    ///
    /// # Complexity
    /// O(1)
    pub fn enqueue(&mut self, arena: &mut Arena, index: SlotIndex) {
        let open = arena.get(index).remaining();
        debug_assert!(open > 0, "only open orders rest in a level");

        let node = arena.get_mut(index);
        node.next = NIL;
        node.prev = self.tail;

        match self.tail {
            NIL => self.head = index,
            tail => arena.get_mut(tail).next = index,
        }
        self.tail = index;

        self.count += 1;
        self.total_qty += open;
    }

    /// Execute up to `qty` against the order in `index`: advance its
    /// cumulative fill (which also moves its status through
    /// partially-filled to filled) and shrink the aggregate by what
    /// actually traded. A completed order is spliced out of the chain;
    /// the caller returns its slot to the pool and drops the level if
    /// `now_empty` reports it drained.
    ///
    /// # Complexity
    /// O(1)
    pub fn fill(&mut self, arena: &mut Arena, index: SlotIndex, qty: Quantity) -> LevelFill {
        let executed = arena.get_mut(index).fill(qty);
        self.shrink(executed);

        let removed = arena.get(index).is_filled();
        if removed {
            self.unlink(arena, index);
        }

        LevelFill {
            executed,
            removed,
            now_empty: self.count == 0,
        }
    }

    /// Take an order out of the queue before it trades (the cancel
    /// path). Returns the open quantity it carried away.
    ///
    /// # Complexity
    /// O(1)
    pub fn withdraw(&mut self, arena: &mut Arena, index: SlotIndex) -> Quantity {
        let open = arena.get(index).remaining();
        self.shrink(open);
        self.unlink(arena, index);
        open
    }

    /// Shrink the cached aggregate without touching the chain, for
    /// in-place quantity reductions where the order keeps its place.
    #[inline]
    pub fn shrink(&mut self, qty: Quantity) {
        debug_assert!(self.total_qty >= qty, "level aggregate underflow");
        self.total_qty -= qty;
    }

    /// Splice an order out of the chain and repair its neighbors. The
    /// aggregate is untouched; every caller has already accounted for
    /// the quantity leaving with the order.
    fn unlink(&mut self, arena: &mut Arena, index: SlotIndex) {
        debug_assert!(self.count > 0);

        let node = arena.get(index);
        match (node.prev, node.next) {
            (NIL, NIL) => {
                debug_assert!(self.head == index && self.tail == index);
                self.head = NIL;
                self.tail = NIL;
            }
            (NIL, next) => {
                self.head = next;
                arena.get_mut(next).prev = NIL;
            }
            (prev, NIL) => {
                self.tail = prev;
                arena.get_mut(prev).next = NIL;
            }
            (prev, next) => {
                arena.get_mut(prev).next = next;
                arena.get_mut(next).prev = prev;
            }
        }

        let node = arena.get_mut(index);
        node.prev = NIL;
        node.next = NIL;
        self.count -= 1;
    }
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self::new()
    }
}

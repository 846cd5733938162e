//! Lock-free ring buffers for feed message handoff.
//!
//! Both variants are bounded, power-of-two sized, and lossy at the
//! edges: `try_push` fails when full, `try_pop` fails when empty, and
//! nothing ever blocks. One slot is kept vacant so that full and empty
//! are distinguishable from the cursors alone.
//!
//! The producer publishes a slot and then releases its cursor; the
//! consumer acquires the producer cursor before reading the slot, which
//! gives transitive visibility of the payload. Cursors live on separate
//! cache lines from each other and from the buffer.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

fn check_capacity(capacity: usize) {
    assert!(capacity >= 2, "ring capacity must be at least 2");
    assert!(
        capacity.is_power_of_two(),
        "ring capacity must be a power of two"
    );
}

// ============================================================================
// SPSC
// ============================================================================

struct SpscInner<T> {
    write_pos: CachePadded<AtomicUsize>,
    read_pos: CachePadded<AtomicUsize>,
    mask: usize,
    slots: Box<[UnsafeCell<T>]>,
}

// Slots are only written by the single producer before the write cursor
// is released, and only read by the single consumer after acquiring it.
unsafe impl<T: Send> Send for SpscInner<T> {}
unsafe impl<T: Send> Sync for SpscInner<T> {}

/// Create a single-producer single-consumer ring.
///
/// `capacity` must be a power of two; usable capacity is `capacity - 1`.
pub fn spsc<T: Copy + Default>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    check_capacity(capacity);

    let inner = Arc::new(SpscInner {
        write_pos: CachePadded::new(AtomicUsize::new(0)),
        read_pos: CachePadded::new(AtomicUsize::new(0)),
        mask: capacity - 1,
        slots: (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect(),
    });

    (
        Producer {
            inner: Arc::clone(&inner),
        },
        Consumer { inner },
    )
}

/// Producer half of an SPSC ring. Exactly one exists per ring.
pub struct Producer<T> {
    inner: Arc<SpscInner<T>>,
}

impl<T: Copy + Default> Producer<T> {
    /// Push an item. Returns `false` when the ring is full; the caller
    /// counts that as an overflow and decides the recovery.
    #[inline]
    pub fn try_push(&mut self, item: T) -> bool {
        let inner = &*self.inner;
        let write_pos = inner.write_pos.load(Ordering::Relaxed);
        let next_write = (write_pos + 1) & inner.mask;

        if next_write == inner.read_pos.load(Ordering::Acquire) {
            return false;
        }

        unsafe {
            *inner.slots[write_pos].get() = item;
        }
        inner.write_pos.store(next_write, Ordering::Release);
        true
    }

    /// Usable capacity (one slot below the allocated size).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.mask
    }

    /// True when no further push can succeed right now.
    #[inline]
    pub fn is_full(&self) -> bool {
        let inner = &*self.inner;
        let write = inner.write_pos.load(Ordering::Acquire);
        let read = inner.read_pos.load(Ordering::Acquire);
        ((write + 1) & inner.mask) == read
    }

    /// Number of items currently queued (approximate under concurrency).
    #[inline]
    pub fn len(&self) -> usize {
        let inner = &*self.inner;
        let write = inner.write_pos.load(Ordering::Acquire);
        let read = inner.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read) & inner.mask
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer half of an SPSC ring. Exactly one exists per ring.
pub struct Consumer<T> {
    inner: Arc<SpscInner<T>>,
}

impl<T: Copy + Default> Consumer<T> {
    /// Pop the oldest item, or `None` when the ring is empty.
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        let inner = &*self.inner;
        let read_pos = inner.read_pos.load(Ordering::Relaxed);

        if read_pos == inner.write_pos.load(Ordering::Acquire) {
            return None;
        }

        let item = unsafe { *inner.slots[read_pos].get() };
        inner
            .read_pos
            .store((read_pos + 1) & inner.mask, Ordering::Release);
        Some(item)
    }

    /// Copy the oldest item without consuming it.
    #[inline]
    pub fn peek(&self) -> Option<T> {
        let inner = &*self.inner;
        let read_pos = inner.read_pos.load(Ordering::Relaxed);

        if read_pos == inner.write_pos.load(Ordering::Acquire) {
            return None;
        }

        Some(unsafe { *inner.slots[read_pos].get() })
    }

    /// Usable capacity (one slot below the allocated size).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.mask
    }

    /// Number of items currently queued (approximate under concurrency).
    #[inline]
    pub fn len(&self) -> usize {
        let inner = &*self.inner;
        let write = inner.write_pos.load(Ordering::Acquire);
        let read = inner.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read) & inner.mask
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// MPSC
// ============================================================================

struct MpscSlot<T> {
    /// Set (release) by the producer after the value is written; cleared
    /// by the consumer before the read cursor advances past the slot.
    ready: AtomicBool,
    value: UnsafeCell<T>,
}

struct MpscInner<T> {
    write_pos: CachePadded<AtomicUsize>,
    read_pos: CachePadded<AtomicUsize>,
    mask: usize,
    slots: Box<[MpscSlot<T>]>,
}

// A producer owns a slot between the CAS claim and the ready release;
// the single consumer owns it between observing ready and advancing the
// read cursor.
unsafe impl<T: Send> Send for MpscInner<T> {}
unsafe impl<T: Send> Sync for MpscInner<T> {}

/// Create a multi-producer single-consumer ring.
///
/// `capacity` must be a power of two; usable capacity is `capacity - 1`.
/// The producer handle is `Clone`; across producers, item order is the
/// order in which their claims won.
pub fn mpsc<T: Copy + Default>(capacity: usize) -> (MpscProducer<T>, MpscConsumer<T>) {
    check_capacity(capacity);

    let inner = Arc::new(MpscInner {
        write_pos: CachePadded::new(AtomicUsize::new(0)),
        read_pos: CachePadded::new(AtomicUsize::new(0)),
        mask: capacity - 1,
        slots: (0..capacity)
            .map(|_| MpscSlot {
                ready: AtomicBool::new(false),
                value: UnsafeCell::new(T::default()),
            })
            .collect(),
    });

    (
        MpscProducer {
            inner: Arc::clone(&inner),
        },
        MpscConsumer { inner },
    )
}

/// Producer half of an MPSC ring; clone one per producer thread.
pub struct MpscProducer<T> {
    inner: Arc<MpscInner<T>>,
}

impl<T> Clone for MpscProducer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Copy + Default> MpscProducer<T> {
    /// Push an item. Returns `false` when the ring is full.
    ///
    /// Producers serialise by claiming a slot with a weak CAS on the
    /// write cursor, then publish the payload through the slot's ready
    /// flag so the consumer never reads a half-written slot.
    #[inline]
    pub fn try_push(&self, item: T) -> bool {
        let inner = &*self.inner;
        let mut write_pos = inner.write_pos.load(Ordering::Relaxed);

        loop {
            let next_write = (write_pos + 1) & inner.mask;

            if next_write == inner.read_pos.load(Ordering::Acquire) {
                return false;
            }

            match inner.write_pos.compare_exchange_weak(
                write_pos,
                next_write,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    let slot = &inner.slots[write_pos];
                    unsafe {
                        *slot.value.get() = item;
                    }
                    slot.ready.store(true, Ordering::Release);
                    return true;
                }
                Err(observed) => write_pos = observed,
            }
        }
    }

    /// Usable capacity (one slot below the allocated size).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.mask
    }
}

/// Consumer half of an MPSC ring. Exactly one exists per ring.
pub struct MpscConsumer<T> {
    inner: Arc<MpscInner<T>>,
}

impl<T: Copy + Default> MpscConsumer<T> {
    /// Pop the oldest item, or `None` when the ring is empty.
    ///
    /// A slot that is claimed but not yet published reads as empty; the
    /// caller simply retries on its next drain pass.
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        let inner = &*self.inner;
        let read_pos = inner.read_pos.load(Ordering::Relaxed);

        if read_pos == inner.write_pos.load(Ordering::Acquire) {
            return None;
        }

        let slot = &inner.slots[read_pos];
        if !slot.ready.load(Ordering::Acquire) {
            return None;
        }

        let item = unsafe { *slot.value.get() };
        slot.ready.store(false, Ordering::Relaxed);
        inner
            .read_pos
            .store((read_pos + 1) & inner.mask, Ordering::Release);
        Some(item)
    }

    /// Number of items currently queued (approximate under concurrency).
    #[inline]
    pub fn len(&self) -> usize {
        let inner = &*self.inner;
        let write = inner.write_pos.load(Ordering::Acquire);
        let read = inner.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read) & inner.mask
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Usable capacity (one slot below the allocated size).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.mask
    }
}

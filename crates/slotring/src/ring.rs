use crate::invariants::{
    debug_assert_bounded_count, debug_assert_consume_within_count, debug_assert_monotonic,
};
use crate::range::RingRange;
use crate::slot::OwnedSlot;
use crate::sync::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use crossbeam_utils::CachePadded;
use std::fmt;

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// Many producers, one consumer. Three counters coordinate them:
//
// - `count`: slots reserved and not yet released by the consumer.
// - `head`:  next logical position a producer claims (producers only).
// - `tail`:  next logical position the consumer reads (consumer only).
//
// Positions are unbounded u64 sequence numbers; the array index is
// `position % capacity`, computed only when touching a slot. At 10 billion
// adds per second the counters wrap after ~58 years.
//
// **Producer (`try_add`):**
// 1. `count.fetch_add(1)` (AcqRel). If the previous value was already
//    `capacity`, undo with `fetch_sub` and hand the value back.
// 2. `head.fetch_add(1)` to claim a unique position.
// 3. CAS the slot at that position from empty to occupied (Release).
//
// **Consumer (`peek` / `consume`):**
// 1. Scan forward from `tail` while slots are occupied, at most `count`
//    slots. The scan stops early at a slot whose producer reserved but has
//    not stored yet; that is a smaller batch, not an error.
// 2. Empty every slot in the consumed window (swap to null, AcqRel).
// 3. Store the new `tail`, then `count.fetch_sub(n)` (AcqRel).
//
// ## Why step 3 of the producer cannot fail
//
// A producer that wins a reservation saw `count < capacity`, so fewer than
// `capacity` positions are claimed-but-unreleased. Its own position `p`
// therefore satisfies `p - capacity < tail`: the previous occupant of the same
// slot was already emptied by the consumer, whose clears happen-before the
// `fetch_sub` the producer's `fetch_add` read from. A failed CAS means the
// protocol was broken, and the producer panics rather than overwrite.
//
// ## Single-Consumer Rule
//
// `peek` and `consume` must only run on one thread at a time. `consume`
// enforces this with a flag and panics on concurrent entry.
//
// =============================================================================

/// Fixed-capacity MPSC ring of [`OwnedSlot`]s.
///
/// Any number of threads may call [`try_add`](Self::try_add) concurrently;
/// exactly one thread at a time may call [`peek`](Self::peek) and
/// [`consume`](Self::consume). `len()` is exact on the consumer thread and
/// approximate everywhere else.
pub struct RingBuffer<T> {
    // === PRODUCER HOT === (cache-line padded)
    /// Next position to claim (written by producers)
    head: CachePadded<AtomicU64>,
    /// Reserved, unreleased slots (written by producers and consumer)
    count: CachePadded<AtomicUsize>,

    // === CONSUMER HOT ===
    /// Next position to read (written by consumer only)
    tail: CachePadded<AtomicU64>,
    /// Set while a `consume` call is running
    consuming: AtomicBool,

    // === DATA BUFFER ===
    /// Fixed at construction; `Box<[_]>` because it never grows or shrinks.
    slots: Box<[OwnedSlot<T>]>,
}

impl<T> RingBuffer<T> {
    /// Creates a ring with room for `capacity` values.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be non-zero");

        let slots = (0..capacity).map(|_| OwnedSlot::new()).collect();

        Self {
            head: CachePadded::new(AtomicU64::new(0)),
            count: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
            consuming: AtomicBool::new(false),
            slots,
        }
    }

    // ---------------------------------------------------------------------
    // CONSTANTS & STATUS
    // ---------------------------------------------------------------------

    /// Returns the maximum number of values the ring holds.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of reserved slots.
    ///
    /// Includes values whose producer is still mid-store, so it can briefly
    /// exceed `peek().len()`.
    #[inline]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire).min(self.capacity())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the ring is full.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    #[inline]
    fn index(&self, position: u64) -> usize {
        (position % self.capacity() as u64) as usize
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Adds a value, or hands it back if the ring is full.
    ///
    /// Lock-free apart from the three atomic counters; safe to call from any
    /// number of threads.
    ///
    /// # Panics
    ///
    /// Panics if the reserved slot is still occupied, which means the
    /// single-consumer rule or the reservation protocol was broken.
    pub fn try_add(&self, value: T) -> Result<(), T> {
        let capacity = self.capacity();
        let reserved = self.count.fetch_add(1, Ordering::AcqRel);
        if reserved >= capacity {
            self.count.fetch_sub(1, Ordering::AcqRel);
            return Err(value);
        }
        debug_assert_bounded_count!(reserved + 1, capacity);

        let position = self.head.fetch_add(1, Ordering::AcqRel);
        let idx = self.index(position);

        if let Err(rejected) = self.slots[idx].try_set_if_empty(Box::new(value)) {
            drop(rejected);
            panic!(
                "RingBuffer invariant violated: reserved slot {} (position {}) is still occupied",
                idx, position
            );
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Returns the run of filled slots starting at the read position.
    ///
    /// Consumer-only. Stops at the first slot whose producer has reserved but
    /// not yet stored, so the view may be shorter than `len()`.
    pub fn peek(&self) -> RingRange<'_, OwnedSlot<T>> {
        let tail = self.tail.load(Ordering::Acquire);
        let limit = self.len();

        let mut filled = 0;
        while filled < limit && !self.slots[self.index(tail + filled as u64)].is_empty() {
            filled += 1;
        }

        self.range_at(self.index(tail), filled)
    }

    /// Builds the (possibly wrapped) view of `len` slots starting at `start`.
    fn range_at(&self, start: usize, len: usize) -> RingRange<'_, OwnedSlot<T>> {
        let first_len = len.min(self.capacity() - start);
        RingRange::new(
            &self.slots[start..start + first_len],
            &self.slots[..len - first_len],
        )
    }

    /// Hands the first `n` filled slots to `callback`, then releases them.
    ///
    /// `n` is clamped to `peek().len()`. The callback is expected to
    /// [`take`](OwnedSlot::take) every slot it visits; anything it leaves
    /// behind is dropped so the slots can be reused. Returns the number of
    /// slots released.
    ///
    /// # Panics
    ///
    /// Panics if another `consume` is running at the same time.
    pub fn consume<F>(&self, n: usize, callback: F) -> usize
    where
        F: FnOnce(RingRange<'_, OwnedSlot<T>>),
    {
        let _guard = ConsumerGuard::enter(&self.consuming);

        let peeked = self.peek();
        let range = peeked.take(n.min(peeked.len()));
        if range.is_empty() {
            return 0;
        }

        callback(range);
        for slot in range {
            slot.reset();
        }

        let consumed = range.len();
        let tail = self.tail.load(Ordering::Relaxed);
        let new_tail = tail + consumed as u64;
        debug_assert_monotonic!("tail", tail, new_tail);
        self.tail.store(new_tail, Ordering::Release);

        let counted = self.count.fetch_sub(consumed, Ordering::AcqRel);
        debug_assert_consume_within_count!(consumed, counted);

        consumed
    }

    /// Consume up to `max_items`, transferring ownership of each to `handler`.
    pub fn consume_up_to_owned<F>(&self, max_items: usize, mut handler: F) -> usize
    where
        F: FnMut(T),
    {
        self.consume(max_items, |range| {
            range.for_each(|slot| {
                if let Some(value) = slot.take() {
                    handler(*value);
                }
                true
            });
        })
    }
}

impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Marks the consumer side busy for the duration of one `consume` call.
struct ConsumerGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ConsumerGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        let busy = flag.swap(true, Ordering::Acquire);
        assert!(
            !busy,
            "RingBuffer::consume called concurrently; the ring supports a single consumer"
        );
        Self { flag }
    }
}

impl Drop for ConsumerGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

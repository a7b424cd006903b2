use crate::sync::{AtomicPtr, Ordering};
use std::fmt;
use std::marker::PhantomData;
use std::ptr;

// =============================================================================
// OWNERSHIP PROTOCOL
// =============================================================================
//
// A slot is a single `AtomicPtr<T>` that is either null (empty) or holds the
// pointer produced by `Box::into_raw` for exactly one value.
//
// **Producer (fill):** CAS null -> ptr with Release on success. A failed CAS
// hands the box straight back, so a producer that races onto an occupied slot
// sees an `Err`, never a leak or a double owner.
//
// **Consumer (empty):** swap ptr -> null with Acquire (AcqRel so the emptying
// is itself published). Whoever wins the swap owns the box; everyone else
// observes null.
//
// The raw pointer never leaves this module.
// =============================================================================

/// An atomically exchangeable cell holding zero or one exclusively owned `T`.
///
/// Lifecycle is `empty -> occupied -> empty`: one producer fills it with
/// [`try_set_if_empty`](Self::try_set_if_empty), one consumer empties it with
/// [`take`](Self::take). Dropping an occupied slot drops its value.
pub struct OwnedSlot<T> {
    ptr: AtomicPtr<T>,
    _owns: PhantomData<Box<T>>,
}

// Safety: the slot hands out `T` by value only, and every hand-off goes through
// an atomic RMW on `ptr`, so sharing a slot across threads is sound when the
// value itself may move between threads.
unsafe impl<T: Send> Send for OwnedSlot<T> {}
unsafe impl<T: Send> Sync for OwnedSlot<T> {}

impl<T> OwnedSlot<T> {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self {
            ptr: AtomicPtr::new(ptr::null_mut()),
            _owns: PhantomData,
        }
    }

    /// Returns `true` if the slot currently holds no value.
    ///
    /// Advisory: the answer may be stale by the time the caller acts on it.
    /// The consumer uses it to find how far a run of filled slots extends.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ptr.load(Ordering::Acquire).is_null()
    }

    /// Stores `value` if the slot is empty.
    ///
    /// Returns the box unchanged when the slot is already occupied; the caller
    /// keeps ownership in that case.
    pub fn try_set_if_empty(&self, value: Box<T>) -> Result<(), Box<T>> {
        let raw = Box::into_raw(value);
        match self
            .ptr
            .compare_exchange(ptr::null_mut(), raw, Ordering::Release, Ordering::Relaxed)
        {
            Ok(_) => Ok(()),
            // SAFETY: the CAS failed, so `raw` was never published and we still
            // hold the only pointer returned by `Box::into_raw` above.
            Err(_) => Err(unsafe { Box::from_raw(raw) }),
        }
    }

    /// Empties the slot, returning the value it held.
    pub fn take(&self) -> Option<Box<T>> {
        let raw = self.ptr.swap(ptr::null_mut(), Ordering::AcqRel);
        if raw.is_null() {
            None
        } else {
            // SAFETY: a non-null pointer in the slot always came from
            // `Box::into_raw` in `try_set_if_empty`, and the swap above made
            // this call its unique owner.
            Some(unsafe { Box::from_raw(raw) })
        }
    }

    /// Empties the slot and drops whatever it held.
    #[inline]
    pub fn reset(&self) {
        drop(self.take());
    }
}

impl<T> Default for OwnedSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for OwnedSlot<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T> fmt::Debug for OwnedSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedSlot")
            .field("occupied", &!self.is_empty())
            .finish()
    }
}

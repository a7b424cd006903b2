//! Miri-compatible tests for detecting undefined behavior.
//!
//! Run with: `cargo +nightly miri test -p slotring --test miri_tests`
//!
//! `OwnedSlot` moves values in and out through raw pointers from
//! `Box::into_raw`. These tests drive every path that touches those
//! pointers so Miri can check for leaks, double frees and use-after-free.

#![cfg(not(feature = "loom"))]

use slotring::{OwnedSlot, RingBuffer};
use std::sync::Arc;
use std::thread;

/// Fill, take, refill, and drop an occupied slot.
#[test]
fn miri_slot_lifecycle() {
    let slot = OwnedSlot::new();
    slot.try_set_if_empty(Box::new(String::from("first"))).unwrap();

    let rejected = slot.try_set_if_empty(Box::new(String::from("second")));
    assert_eq!(rejected.unwrap_err().as_str(), "second");

    assert_eq!(slot.take().as_deref().map(String::as_str), Some("first"));
    slot.try_set_if_empty(Box::new(String::from("third"))).unwrap();
    // Dropped while occupied.
}

/// Wrap-around with heap-owning values.
#[test]
fn miri_ring_wrap_around() {
    let ring = RingBuffer::new(3);

    for round in 0..4 {
        for i in 0..3 {
            assert!(ring.try_add(vec![round, i]).is_ok());
        }
        let mut seen = Vec::new();
        ring.consume_up_to_owned(2, |v| seen.push(v));
        assert_eq!(seen, vec![vec![round, 0], vec![round, 1]]);
        ring.consume_up_to_owned(1, drop);
    }
    assert!(ring.is_empty());
}

/// Slots the callback leaves behind and values still queued at drop time.
#[test]
fn miri_leftovers_released() {
    let ring = RingBuffer::new(4);
    for i in 0..4 {
        ring.try_add(Box::new(i)).unwrap();
    }

    ring.consume(2, |range| {
        // Take only the first; the second is reset by the ring.
        let first = range.iter().next().and_then(OwnedSlot::take);
        assert_eq!(first.map(|b| **b), Some(0));
    });
    assert_eq!(ring.len(), 2);
}

/// Small multi-threaded run; Miri checks the atomics for data races.
#[test]
fn miri_concurrent_producers() {
    let ring = Arc::new(RingBuffer::new(4));

    let handles: Vec<_> = (0..2u32)
        .map(|p| {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for i in 0..3 {
                    let _ = ring.try_add(p * 10 + i);
                }
            })
        })
        .collect();

    let mut received = 0;
    for h in handles {
        h.join().unwrap();
    }
    ring.consume_up_to_owned(4, |_| received += 1);
    assert_eq!(received, 4);
}

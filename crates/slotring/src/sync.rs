//! Atomic primitives used by the slot and ring types.
//!
//! Under the `loom` feature these resolve to loom's model-checked atomics so
//! `tests/loom_tests.rs` can explore every interleaving of the real code.

#[cfg(not(feature = "loom"))]
pub(crate) use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering};

#[cfg(feature = "loom")]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering};

//! Debug assertion macros for ring buffer invariants.
//!
//! Only active in debug builds (`debug_assert!`), so release builds pay
//! nothing for them. Invariants whose violation would corrupt ownership are
//! checked unconditionally in `ring.rs` instead.

// =============================================================================
// Bounded Count
// =============================================================================

/// Assert that the in-flight count does not exceed capacity.
///
/// **Invariant**: `0 ≤ count ≤ capacity`
///
/// Used in: `try_add()` after a successful reservation
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "bounded count violated: count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

/// Assert that the consumer does not release more slots than are counted.
///
/// **Invariant**: `consumed ≤ count` (before the decrement)
///
/// Used in: `consume()` before decrementing count
macro_rules! debug_assert_consume_within_count {
    ($consumed:expr, $count:expr) => {
        debug_assert!(
            $consumed <= $count,
            "bounded count violated: consuming {} slots with only {} counted",
            $consumed,
            $count
        )
    };
}

// =============================================================================
// Monotonic Progress
// =============================================================================

/// Assert that a position counter only increases.
///
/// **Invariant**: `new_value ≥ old_value`
///
/// Used in: `consume()` for tail
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "monotonic progress violated: {} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_consume_within_count;
pub(crate) use debug_assert_monotonic;

//! Rate-limited reporting of records dropped at admission.
//!
//! A full ring under sustained load would otherwise log once per dropped
//! record. The reporter logs at most once per interval and carries the number
//! of drops it swallowed in between.
//!
//! `record_drop` runs on the producer path, so it takes no lock: the time of
//! the last warning is an atomic offset from the reporter's creation, and
//! producers race on a CAS to claim the next warning. Losers stay silent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default interval between two overflow warnings
pub const DEFAULT_OVERFLOW_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// `last_log_nanos` before the first warning
const NEVER_LOGGED: u64 = u64::MAX;

#[derive(Debug)]
pub struct OverflowReporter {
    min_interval_nanos: u64,
    base: Instant,
    /// Nanoseconds after `base` at which the last warning was claimed
    last_log_nanos: AtomicU64,
    /// Drops since the last warning
    pending: AtomicU64,
}

impl OverflowReporter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval_nanos: saturating_nanos(min_interval),
            base: Instant::now(),
            last_log_nanos: AtomicU64::new(NEVER_LOGGED),
            pending: AtomicU64::new(0),
        }
    }

    /// Counts one dropped record and warns if the interval has passed.
    ///
    /// Lock-free. Returns true if this call emitted the warning.
    pub fn record_drop(&self, capacity: usize) -> bool {
        self.pending.fetch_add(1, Ordering::Relaxed);

        let now = saturating_nanos(self.base.elapsed());
        let last = self.last_log_nanos.load(Ordering::Relaxed);
        if last != NEVER_LOGGED && now.saturating_sub(last) < self.min_interval_nanos {
            return false;
        }
        // Another producer claimed this interval first.
        if self
            .last_log_nanos
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        let dropped = self.pending.swap(0, Ordering::Relaxed);
        if dropped > 1 {
            tracing::warn!(
                capacity,
                dropped,
                suppressed_count = dropped - 1,
                "queue full, dropping records (rate-limited)"
            );
        } else {
            tracing::warn!(capacity, "queue full, dropping record");
        }
        true
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(NEVER_LOGGED - 1)
}

impl Default for OverflowReporter {
    fn default() -> Self {
        Self::new(DEFAULT_OVERFLOW_LOG_INTERVAL)
    }
}

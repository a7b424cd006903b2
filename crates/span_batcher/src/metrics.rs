use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one `BatchProcessor`.
///
/// Relaxed atomics: the numbers are statistics, nothing synchronizes on them.
#[derive(Debug, Default)]
pub struct ProcessorMetrics {
    records_admitted: AtomicU64,
    records_dropped: AtomicU64,
    records_exported: AtomicU64,
    batches_exported: AtomicU64,
    export_errors: AtomicU64,
    force_flushes: AtomicU64,
}

impl ProcessorMetrics {
    /// Records accepted into the ring
    pub fn records_admitted(&self) -> u64 {
        self.records_admitted.load(Ordering::Relaxed)
    }

    /// Records rejected because the ring was full
    pub fn records_dropped(&self) -> u64 {
        self.records_dropped.load(Ordering::Relaxed)
    }

    /// Records in batches the exporter accepted
    pub fn records_exported(&self) -> u64 {
        self.records_exported.load(Ordering::Relaxed)
    }

    pub fn batches_exported(&self) -> u64 {
        self.batches_exported.load(Ordering::Relaxed)
    }

    /// Failed or timed-out export calls
    pub fn export_errors(&self) -> u64 {
        self.export_errors.load(Ordering::Relaxed)
    }

    /// Force flushes the worker acknowledged
    pub fn force_flushes(&self) -> u64 {
        self.force_flushes.load(Ordering::Relaxed)
    }

    pub(crate) fn record_admitted(&self) {
        self.records_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self, record_count: u64) {
        self.records_exported.fetch_add(record_count, Ordering::Relaxed);
        self.batches_exported.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.export_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_force_flush(&self) {
        self.force_flushes.fetch_add(1, Ordering::Relaxed);
    }
}

//! Batch Processor - admission, background export, flush and shutdown
//!
//! Producers hand records to [`BatchProcessor::on_end`], which moves them into
//! a [`RingBuffer`] without taking any lock. One worker thread drains the ring
//! in batches of at most `max_export_batch_size` and passes each batch to the
//! exporter. The exporter's futures run on a current-thread tokio runtime that
//! belongs to the worker, so callers never need a runtime of their own.
//!
//! # Usage
//!
//! ```rust
//! use span_batcher::{BatchConfig, BatchProcessor, InMemoryExporter};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let exporter = Arc::new(InMemoryExporter::<u64>::new());
//! let processor = BatchProcessor::new(BatchConfig::default(), Arc::clone(&exporter)).unwrap();
//!
//! for i in 0..10 {
//!     processor.on_end(i);
//! }
//!
//! assert!(processor.force_flush(Some(Duration::from_secs(5))));
//! assert_eq!(exporter.exported_count(), 10);
//! assert!(processor.shutdown(None));
//! ```

use crate::config::BatchConfig;
use crate::error::{ExportError, ProcessorError};
use crate::exporter::SpanExporterBoxed;
use crate::metrics::ProcessorMetrics;
use crate::overflow::OverflowReporter;
use crossbeam_utils::Backoff;
use parking_lot::{Condvar, Mutex};
use slotring::RingBuffer;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

// =============================================================================
// SYNCHRONIZATION STRATEGY
// =============================================================================
//
// Flags (all atomics, one writer role each):
//
// - `is_shutdown`:             set once by the first `shutdown` caller.
// - `is_force_wakeup`:         set by anyone who wants the worker awake now,
//                              cleared by the worker when it wakes.
// - `is_force_flush_pending`:  set by `force_flush`; taken (swapped to false)
//                              by the worker's export loop, or by the flush
//                              caller itself if the worker never took it.
//
// Flush generations (monotonic counters):
//
// - `flush_requested`: bumped by each `force_flush` before it raises
//                      `is_force_flush_pending`; the caller keeps the value.
// - `flush_acked`:     written by the worker only. After taking the pending
//                      flag it reads `flush_requested`, exports, and raises
//                      `flush_acked` to that value.
//
// **Worker wakeup:** the worker waits on `cv` while `!is_force_wakeup &&
// buffer.is_empty()`, at most until the next scheduled export. Wakers set the
// flag, then take `cv_m` before notifying, so a notify cannot fall between the
// worker's predicate check and its sleep. Producers crossing the size
// threshold do this only when they are the ones flipping `is_force_wakeup`
// from false, which keeps the mutex off the producer path under load.
//
// **Flush acknowledge:** the worker raises `flush_acked`, then takes
// `force_flush_m` before notifying `force_flush_cv`. The flush caller holds
// `force_flush_m` while it compares `flush_acked` with its own generation, so
// the notify cannot be lost. The caller still re-wakes the worker every
// `schedule_delay` while its request is pending.
//
// **Ordering of flush requests:** `flush_serial` admits one `force_flush` at
// a time so that the worker reads the right timeout. A caller whose deadline
// passes returns at once; an acknowledgement that arrives later carries its
// generation and can never satisfy a newer caller.
//
// **Shutdown:** the worker owns the whole sequence: final drain, then the
// exporter's `shutdown`, so exporter futures only ever run on the worker's
// runtime. Callers serialize on the `worker` handle mutex; the first one
// joins the worker, later ones find it gone and return true.
//
// No lock is held while the exporter runs.
// =============================================================================

/// State shared by producers, the worker and flush/shutdown callers.
struct SyncState {
    is_shutdown: AtomicBool,
    is_force_wakeup: AtomicBool,
    is_force_flush_pending: AtomicBool,
    /// Generation of the latest flush request
    flush_requested: AtomicU64,
    /// Latest generation the worker has exported and acknowledged
    flush_acked: AtomicU64,
    /// Cleared when the worker thread exits, normally or by panic
    worker_alive: AtomicBool,
    /// Result of the exporter's shutdown, written by the worker before exit
    exporter_shutdown_ok: AtomicBool,

    cv_m: Mutex<()>,
    cv: Condvar,

    /// Guards the timeout of the flush in progress
    force_flush_m: Mutex<Option<Duration>>,
    force_flush_cv: Condvar,
    flush_serial: Mutex<()>,

    /// Bound on the exporter's shutdown call, set before the worker is woken
    shutdown_timeout: Mutex<Option<Duration>>,
}

impl SyncState {
    fn new() -> Self {
        Self {
            is_shutdown: AtomicBool::new(false),
            is_force_wakeup: AtomicBool::new(false),
            is_force_flush_pending: AtomicBool::new(false),
            flush_requested: AtomicU64::new(0),
            flush_acked: AtomicU64::new(0),
            worker_alive: AtomicBool::new(true),
            exporter_shutdown_ok: AtomicBool::new(true),
            cv_m: Mutex::new(()),
            cv: Condvar::new(),
            force_flush_m: Mutex::new(None),
            force_flush_cv: Condvar::new(),
            flush_serial: Mutex::new(()),
            shutdown_timeout: Mutex::new(None),
        }
    }

    /// Sets the wakeup flag and notifies the worker under its mutex.
    fn wake_worker(&self) {
        self.is_force_wakeup.store(true, Ordering::Release);
        let _guard = self.cv_m.lock();
        self.cv.notify_all();
    }

    /// Acknowledges every flush request up to `generation`.
    fn notify_flushed(&self, generation: u64) {
        self.flush_acked.fetch_max(generation, Ordering::AcqRel);
        let _guard = self.force_flush_m.lock();
        self.force_flush_cv.notify_all();
    }
}

struct Shared<R> {
    buffer: RingBuffer<R>,
    sync: SyncState,
    metrics: ProcessorMetrics,
    overflow: OverflowReporter,
}

/// Batches records from any number of producer threads and exports them from
/// one background worker.
pub struct BatchProcessor<R: Send + 'static> {
    shared: Arc<Shared<R>>,
    exporter: Arc<dyn SpanExporterBoxed<Record = R>>,
    config: BatchConfig,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<R: Send + 'static> BatchProcessor<R> {
    /// Validates `config`, builds the export runtime and starts the worker
    /// thread (`span-batcher`).
    pub fn new<E>(config: BatchConfig, exporter: Arc<E>) -> Result<Self, ProcessorError>
    where
        E: SpanExporterBoxed<Record = R> + 'static,
    {
        config.validate()?;
        let exporter: Arc<dyn SpanExporterBoxed<Record = R>> = exporter;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(ProcessorError::Runtime)?;

        let shared = Arc::new(Shared {
            buffer: RingBuffer::new(config.max_queue_size),
            sync: SyncState::new(),
            metrics: ProcessorMetrics::default(),
            overflow: OverflowReporter::default(),
        });

        let worker = Worker {
            shared: Arc::clone(&shared),
            exporter: Arc::clone(&exporter),
            runtime,
            schedule_delay: config.schedule_delay,
            export_timeout: config.export_timeout,
            max_export_batch_size: config.max_export_batch_size,
        };

        let handle = thread::Builder::new()
            .name("span-batcher".to_string())
            .spawn(move || worker.run())
            .map_err(ProcessorError::Spawn)?;

        Ok(Self {
            shared,
            exporter,
            config,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Creates a blank record through the exporter.
    pub fn make_record(&self) -> R {
        self.exporter.make_record()
    }

    /// Called when a record starts. Batching only cares about finished
    /// records, so this does nothing.
    pub fn on_start(&self, _record: &mut R) {}

    /// Queues a finished record for export. Never blocks.
    ///
    /// If the queue is full the record is dropped and counted; after shutdown
    /// it is dropped silently.
    ///
    /// A call racing with [`shutdown`](Self::shutdown) can pass the shutdown
    /// check and land in the ring after the final drain. Such a record is not
    /// exported; it stays counted in [`len`](Self::len) and is released when
    /// the processor is dropped.
    pub fn on_end(&self, record: R) {
        let shared = &*self.shared;
        if shared.sync.is_shutdown.load(Ordering::Acquire) {
            tracing::debug!("record offered after shutdown, dropping");
            return;
        }

        if shared.buffer.try_add(record).is_err() {
            shared.metrics.record_dropped();
            shared.overflow.record_drop(self.config.max_queue_size);
            return;
        }
        shared.metrics.record_admitted();

        if shared.sync.is_shutdown.load(Ordering::Acquire) {
            if !shared.sync.worker_alive.load(Ordering::Acquire) {
                tracing::warn!("record admitted after the final drain, it will not be exported");
            }
            return;
        }

        let queued = shared.buffer.len();
        if (queued >= self.config.max_queue_size / 2
            || queued >= self.config.max_export_batch_size)
            && !shared.sync.is_force_wakeup.swap(true, Ordering::AcqRel)
        {
            shared.sync.wake_worker();
        }
    }

    /// Exports everything queued so far and waits for the worker to confirm.
    ///
    /// `None` or a zero timeout waits indefinitely. The timeout bounds the
    /// whole call, including waiting behind another flush. Returns false if
    /// the processor is shut down, or if the confirmation did not arrive in
    /// time; a timeout does not cancel the export already under way.
    pub fn force_flush(&self, timeout: Option<Duration>) -> bool {
        let sync = &self.shared.sync;
        if sync.is_shutdown.load(Ordering::Acquire) {
            return false;
        }

        let timeout = normalize_timeout(timeout);
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let _serial = match deadline {
            Some(deadline) => match sync.flush_serial.try_lock_until(deadline) {
                Some(serial) => serial,
                None => {
                    tracing::warn!(?timeout, "force flush timed out behind another flush");
                    return false;
                }
            },
            None => sync.flush_serial.lock(),
        };

        let mut guard = sync.force_flush_m.lock();
        *guard = timeout;
        let generation = sync.flush_requested.fetch_add(1, Ordering::AcqRel) + 1;
        sync.is_force_flush_pending.store(true, Ordering::Release);
        sync.wake_worker();

        let acknowledged = loop {
            if sync.flush_acked.load(Ordering::Acquire) >= generation {
                break true;
            }
            if sync.is_shutdown.load(Ordering::Acquire) || !sync.worker_alive.load(Ordering::Acquire)
            {
                break false;
            }
            // Re-wake in case the worker missed the first signal.
            if sync.is_force_flush_pending.load(Ordering::Acquire) {
                sync.wake_worker();
            }

            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break false;
                    }
                    (deadline - now).min(self.config.schedule_delay)
                }
                None => self.config.schedule_delay,
            };
            sync.force_flush_cv.wait_for(&mut guard, wait);
        };
        drop(guard);

        if acknowledged {
            self.shared.metrics.record_force_flush();
        } else {
            // Withdraw the request if the worker never took it.
            sync.is_force_flush_pending.store(false, Ordering::Release);
            tracing::warn!(?timeout, "force flush not acknowledged");
        }
        acknowledged
    }

    /// Drains the queue, shuts the exporter down and stops the worker.
    ///
    /// Idempotent: only the first call does the work, later and concurrent
    /// calls return true once it has finished. `timeout` bounds the exporter's
    /// shutdown, not the drain. Returns what the exporter's shutdown
    /// reported.
    pub fn shutdown(&self, timeout: Option<Duration>) -> bool {
        let sync = &self.shared.sync;
        let mut worker = self.worker.lock();

        if sync.is_shutdown.swap(true, Ordering::AcqRel) {
            return true;
        }
        *sync.shutdown_timeout.lock() = normalize_timeout(timeout);

        let Some(handle) = worker.take() else {
            return true;
        };
        sync.wake_worker();
        if handle.join().is_err() {
            tracing::error!("span batcher worker panicked");
            return false;
        }

        let ok = sync.exporter_shutdown_ok.load(Ordering::Acquire);
        if !ok {
            tracing::warn!(exporter = self.exporter.name(), "exporter shutdown failed");
        }
        ok
    }

    /// Approximate number of queued records.
    pub fn len(&self) -> usize {
        self.shared.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.buffer.is_empty()
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn metrics(&self) -> &ProcessorMetrics {
        &self.shared.metrics
    }
}

impl<R: Send + 'static> Drop for BatchProcessor<R> {
    fn drop(&mut self) {
        if self.worker.get_mut().is_some() {
            self.shutdown(None);
        }
    }
}

impl<R: Send + 'static> std::fmt::Debug for BatchProcessor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("config", &self.config)
            .field("exporter", &self.exporter.name())
            .field("queued", &self.len())
            .finish_non_exhaustive()
    }
}

/// Zero means "no limit".
fn normalize_timeout(timeout: Option<Duration>) -> Option<Duration> {
    timeout.filter(|t| !t.is_zero())
}

// =============================================================================
// Worker
// =============================================================================

struct Worker<R: Send + 'static> {
    shared: Arc<Shared<R>>,
    exporter: Arc<dyn SpanExporterBoxed<Record = R>>,
    runtime: Runtime,
    schedule_delay: Duration,
    export_timeout: Duration,
    max_export_batch_size: usize,
}

/// Marks the worker gone and releases any flush caller still waiting.
struct AliveGuard<'a>(&'a SyncState);

impl Drop for AliveGuard<'_> {
    fn drop(&mut self) {
        self.0.worker_alive.store(false, Ordering::Release);
        let _guard = self.0.force_flush_m.lock();
        self.0.force_flush_cv.notify_all();
    }
}

impl<R: Send + 'static> Worker<R> {
    fn run(self) {
        let shared = &*self.shared;
        let sync = &shared.sync;
        let _alive = AliveGuard(sync);
        tracing::debug!(exporter = self.exporter.name(), "worker started");

        let mut timeout = self.schedule_delay;
        loop {
            {
                let mut guard = sync.cv_m.lock();
                sync.cv.wait_while_for(
                    &mut guard,
                    |_| !sync.is_force_wakeup.load(Ordering::Acquire) && shared.buffer.is_empty(),
                    timeout,
                );
            }
            sync.is_force_wakeup.store(false, Ordering::Release);

            if sync.is_shutdown.load(Ordering::Acquire) {
                self.drain();
                self.shutdown_exporter();
                break;
            }

            let start = Instant::now();
            self.export();
            timeout = self.schedule_delay.saturating_sub(start.elapsed());
        }

        tracing::info!(
            exporter = self.exporter.name(),
            exported = shared.metrics.records_exported(),
            dropped = shared.metrics.records_dropped(),
            export_errors = shared.metrics.export_errors(),
            "worker stopped"
        );
    }

    /// Exports until the queue is empty. A pending flush takes the whole
    /// queue in one batch and is acknowledged after it.
    ///
    /// Returns the number of records taken from the ring.
    fn export(&self) -> usize {
        let shared = &*self.shared;
        let mut consumed = 0;
        loop {
            let flush = shared.sync.is_force_flush_pending.swap(false, Ordering::AcqRel);
            let generation = if flush {
                Some(shared.sync.flush_requested.load(Ordering::Acquire))
            } else {
                None
            };
            let queued = shared.buffer.len();
            let want = if flush {
                queued
            } else {
                queued.min(self.max_export_batch_size)
            };

            let mut batch = Vec::with_capacity(want);
            if want > 0 {
                shared.buffer.consume_up_to_owned(want, |record| batch.push(record));
            }

            if batch.is_empty() {
                if let Some(generation) = generation {
                    self.notify_completion(generation);
                }
                break;
            }

            consumed += batch.len();
            self.export_batch(batch);
            if let Some(generation) = generation {
                self.notify_completion(generation);
            }
        }
        consumed
    }

    fn export_batch(&self, batch: Vec<R>) {
        let count = batch.len();
        let export = self.exporter.export_boxed(batch);

        let result = if self.export_timeout.is_zero() {
            self.runtime.block_on(export)
        } else {
            self.runtime.block_on(async {
                tokio::time::timeout(self.export_timeout, export)
                    .await
                    .unwrap_or(Err(ExportError::Timeout))
            })
        };

        match result {
            Ok(()) => self.shared.metrics.record_success(count as u64),
            Err(error) => {
                self.shared.metrics.record_error();
                tracing::error!(
                    exporter = self.exporter.name(),
                    records = count,
                    %error,
                    "export failed"
                );
            }
        }
    }

    /// Flushes the exporter with the caller's timeout, then acknowledges
    /// `generation`.
    fn notify_completion(&self, generation: u64) {
        let sync = &self.shared.sync;
        let timeout = *sync.force_flush_m.lock();

        let flushed = self.run_bounded(self.exporter.force_flush_boxed(timeout), timeout);
        if flushed != Some(true) {
            tracing::warn!(
                exporter = self.exporter.name(),
                timed_out = flushed.is_none(),
                "exporter force flush failed"
            );
        }
        sync.notify_flushed(generation);
    }

    /// Final drain: exports until nothing is queued and no flush is pending.
    fn drain(&self) {
        let shared = &*self.shared;
        let backoff = Backoff::new();
        while !shared.buffer.is_empty()
            || shared.sync.is_force_flush_pending.load(Ordering::Acquire)
        {
            // A producer may still be storing into a reserved slot.
            if self.export() == 0 {
                backoff.snooze();
            }
        }
        tracing::debug!(
            exported = shared.metrics.records_exported(),
            "final drain complete"
        );
    }

    fn shutdown_exporter(&self) {
        let sync = &self.shared.sync;
        let timeout = *sync.shutdown_timeout.lock();

        let ok = self.run_bounded(self.exporter.shutdown_boxed(timeout), timeout);
        if ok.is_none() {
            tracing::warn!(exporter = self.exporter.name(), ?timeout, "exporter shutdown timed out");
        }
        sync.exporter_shutdown_ok.store(ok == Some(true), Ordering::Release);
    }

    /// Runs `future` on the worker runtime; `None` if `timeout` elapsed first.
    fn run_bounded<F, T>(&self, future: F, timeout: Option<Duration>) -> Option<T>
    where
        F: std::future::Future<Output = T>,
    {
        match timeout {
            Some(limit) => self
                .runtime
                .block_on(async { tokio::time::timeout(limit, future).await.ok() }),
            None => Some(self.runtime.block_on(future)),
        }
    }
}

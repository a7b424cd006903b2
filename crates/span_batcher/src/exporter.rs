use crate::error::ExportError;
use crate::span::Span;
use parking_lot::Mutex;
use std::future::Future;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Boxed future returned by [`SpanExporterBoxed`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for exporting record batches to various backends.
///
/// Uses native async fn in traits instead of `#[async_trait]`. The processor
/// never looks inside a `Record`; it only moves ownership from producers to
/// [`export`](Self::export).
///
/// # Note on Object Safety
///
/// This trait uses `impl Future` return types which are not object-safe.
/// The processor stores exporters as `dyn SpanExporterBoxed`, which every
/// `SpanExporter` implements through a blanket impl.
pub trait SpanExporter: Send + Sync {
    /// The record type this exporter consumes.
    type Record: Send + 'static;

    /// Creates a blank record for a producer to fill in.
    fn make_record(&self) -> Self::Record;

    /// Exports one batch. Failures are logged by the caller, never retried.
    fn export(
        &self,
        batch: Vec<Self::Record>,
    ) -> impl Future<Output = Result<(), ExportError>> + Send;

    /// Flushes anything the exporter buffers internally.
    fn force_flush(&self, _timeout: Option<Duration>) -> impl Future<Output = bool> + Send {
        async { true }
    }

    /// Releases exporter resources. Called at most once per processor.
    fn shutdown(&self, _timeout: Option<Duration>) -> impl Future<Output = bool> + Send {
        async { true }
    }

    /// Returns the exporter name for diagnostics.
    fn name(&self) -> &str;
}

/// Object-safe version of SpanExporter for dynamic dispatch.
pub trait SpanExporterBoxed: Send + Sync {
    type Record: Send + 'static;

    fn make_record(&self) -> Self::Record;

    fn export_boxed(&self, batch: Vec<Self::Record>) -> BoxFuture<'_, Result<(), ExportError>>;

    fn force_flush_boxed(&self, timeout: Option<Duration>) -> BoxFuture<'_, bool>;

    fn shutdown_boxed(&self, timeout: Option<Duration>) -> BoxFuture<'_, bool>;

    fn name(&self) -> &str;
}

/// Blanket implementation: any SpanExporter can be used as SpanExporterBoxed
impl<T: SpanExporter> SpanExporterBoxed for T {
    type Record = T::Record;

    fn make_record(&self) -> Self::Record {
        SpanExporter::make_record(self)
    }

    fn export_boxed(&self, batch: Vec<Self::Record>) -> BoxFuture<'_, Result<(), ExportError>> {
        Box::pin(self.export(batch))
    }

    fn force_flush_boxed(&self, timeout: Option<Duration>) -> BoxFuture<'_, bool> {
        Box::pin(self.force_flush(timeout))
    }

    fn shutdown_boxed(&self, timeout: Option<Duration>) -> BoxFuture<'_, bool> {
        Box::pin(self.shutdown(timeout))
    }

    fn name(&self) -> &str {
        SpanExporter::name(self)
    }
}

// =============================================================================
// Stdout
// =============================================================================

/// Prints spans to stdout. With `verbose == false` it accepts and discards.
pub struct StdoutExporter {
    verbose: bool,
}

impl StdoutExporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl SpanExporter for StdoutExporter {
    type Record = Span;

    fn make_record(&self) -> Span {
        Span::default()
    }

    async fn export(&self, batch: Vec<Span>) -> Result<(), ExportError> {
        if self.verbose {
            println!("=== Exporting {} spans ===", batch.len());
            for span in &batch {
                println!(
                    "Span: trace_id={:032x} span_id={:016x} name={} duration={}ns status={:?}",
                    span.trace_id,
                    span.span_id,
                    span.name,
                    span.duration_nanos(),
                    span.status
                );
            }
            println!("=== Export complete ===\n");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "stdout"
    }
}

// =============================================================================
// JSON lines file
// =============================================================================

/// Appends one JSON document per span to a file.
pub struct JsonFileExporter {
    file_path: PathBuf,
    shut_down: AtomicBool,
}

impl JsonFileExporter {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            shut_down: AtomicBool::new(false),
        }
    }
}

impl SpanExporter for JsonFileExporter {
    type Record = Span;

    fn make_record(&self) -> Span {
        Span::default()
    }

    async fn export(&self, batch: Vec<Span>) -> Result<(), ExportError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(ExportError::Shutdown);
        }

        let mut lines = Vec::with_capacity(batch.len() * 128);
        for span in &batch {
            serde_json::to_writer(&mut lines, span)
                .map_err(|e| ExportError::Serialization(e.to_string()))?;
            lines.push(b'\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .await
            .map_err(|e| ExportError::Transport(e.to_string()))?;
        file.write_all(&lines)
            .await
            .map_err(|e| ExportError::Transport(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| ExportError::Transport(e.to_string()))?;

        Ok(())
    }

    async fn shutdown(&self, _timeout: Option<Duration>) -> bool {
        self.shut_down.store(true, Ordering::Release);
        true
    }

    fn name(&self) -> &str {
        "json_file"
    }
}

// =============================================================================
// Null
// =============================================================================

/// Null exporter that discards all records (for benchmarking)
pub struct NullExporter<R = Span> {
    _record: PhantomData<fn() -> R>,
}

impl<R> NullExporter<R> {
    pub fn new() -> Self {
        Self {
            _record: PhantomData,
        }
    }
}

impl<R> Default for NullExporter<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Default + Send + 'static> SpanExporter for NullExporter<R> {
    type Record = R;

    fn make_record(&self) -> R {
        R::default()
    }

    async fn export(&self, _batch: Vec<R>) -> Result<(), ExportError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Keeps every exported batch so tests and demos can inspect what arrived.
///
/// Also counts `force_flush`/`shutdown` calls, and can be told to fail or
/// stall exports.
pub struct InMemoryExporter<R> {
    batches: Mutex<Vec<Vec<R>>>,
    force_flush_calls: AtomicUsize,
    shutdown_calls: AtomicUsize,
    fail_exports: AtomicBool,
    export_delay: Option<Duration>,
}

impl<R> InMemoryExporter<R> {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            force_flush_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
            fail_exports: AtomicBool::new(false),
            export_delay: None,
        }
    }

    /// Every export call after this sleeps for `delay` first.
    pub fn with_export_delay(mut self, delay: Duration) -> Self {
        self.export_delay = Some(delay);
        self
    }

    /// While set, exports return `ExportError::Transport` and keep nothing.
    pub fn set_fail_exports(&self, fail: bool) {
        self.fail_exports.store(fail, Ordering::Release);
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().iter().map(Vec::len).collect()
    }

    /// Total records across all batches
    pub fn exported_count(&self) -> usize {
        self.batches.lock().iter().map(Vec::len).sum()
    }

    pub fn force_flush_calls(&self) -> usize {
        self.force_flush_calls.load(Ordering::Acquire)
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::Acquire)
    }
}

impl<R: Clone> InMemoryExporter<R> {
    pub fn batches(&self) -> Vec<Vec<R>> {
        self.batches.lock().clone()
    }

    /// All exported records, concatenated in export order
    pub fn records(&self) -> Vec<R> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

impl<R> Default for InMemoryExporter<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Default + Send + 'static> SpanExporter for InMemoryExporter<R> {
    type Record = R;

    fn make_record(&self) -> R {
        R::default()
    }

    async fn export(&self, batch: Vec<R>) -> Result<(), ExportError> {
        if let Some(delay) = self.export_delay {
            tokio::time::sleep(delay).await;
        }
        if self.shutdown_calls.load(Ordering::Acquire) > 0 {
            return Err(ExportError::Shutdown);
        }
        if self.fail_exports.load(Ordering::Acquire) {
            return Err(ExportError::Transport("injected failure".to_string()));
        }
        self.batches.lock().push(batch);
        Ok(())
    }

    async fn force_flush(&self, _timeout: Option<Duration>) -> bool {
        self.force_flush_calls.fetch_add(1, Ordering::AcqRel);
        true
    }

    async fn shutdown(&self, _timeout: Option<Duration>) -> bool {
        self.shutdown_calls.fetch_add(1, Ordering::AcqRel);
        true
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

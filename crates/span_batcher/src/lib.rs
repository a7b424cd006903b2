//! Span Batcher
//!
//! The batching core of a telemetry export pipeline. Application threads hand
//! finished spans (or any other record type) to a [`BatchProcessor`], which
//! queues them in a lock-free [`slotring::RingBuffer`] and exports them in
//! batches from a single background worker.
//!
//! - [`BatchProcessor::on_end`] never blocks; a full queue drops the record
//!   and reports it through a rate-limited warning.
//! - [`BatchProcessor::force_flush`] exports the whole backlog and waits for
//!   the worker to confirm.
//! - [`BatchProcessor::shutdown`] drains the queue and shuts the exporter down
//!   exactly once.
//!
//! Exporters implement [`SpanExporter`] with native async fn in traits; the
//! worker drives them on a private tokio runtime.

pub mod config;
pub mod error;
pub mod exporter;
pub mod metrics;
pub mod overflow;
pub mod processor;
pub mod span;

// Re-export main types
pub use config::BatchConfig;
pub use error::{ConfigError, ExportError, ProcessorError};
pub use exporter::{
    BoxFuture, InMemoryExporter, JsonFileExporter, NullExporter, SpanExporter, SpanExporterBoxed,
    StdoutExporter,
};
pub use metrics::ProcessorMetrics;
pub use overflow::OverflowReporter;
pub use processor::BatchProcessor;
pub use span::{AttributeValue, Span, SpanKind, SpanStatus};

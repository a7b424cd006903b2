//! # Span Batcher Demo
//!
//! Several producer threads finish spans as fast as they can while a
//! simulated tracing backend, slow and occasionally failing, receives them in
//! batches.
//!
//! ## Features Demonstrated
//!
//! - Custom `SpanExporter` written with native async fn in traits
//! - `BatchConfig::from_env` (`OTEL_BSP_*` variables) with programmatic
//!   overrides
//! - Lock-free `on_end` from many threads, drops under overload
//! - `force_flush` in the middle of the run, `shutdown` at the end
//! - Structured logs through `tracing` (set `RUST_LOG=span_batcher=debug`)
//!
//! ## Running
//!
//! ```bash
//! # Quick mode (4 producers, 250 spans each)
//! cargo run -p span_batcher --features demo --bin demo --release -- --quick
//!
//! # Full mode (8 producers, 5000 spans each)
//! cargo run -p span_batcher --features demo --bin demo --release
//!
//! # Print every exported span
//! cargo run -p span_batcher --features demo --bin demo --release -- --quick --verbose
//! ```

use anyhow::Context;
use rand::Rng;
use span_batcher::{
    AttributeValue, BatchConfig, BatchProcessor, ExportError, Span, SpanExporter, SpanKind,
    SpanStatus, StdoutExporter,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const OPERATIONS: [(&str, SpanKind); 5] = [
    ("GET /api/orders", SpanKind::Server),
    ("SELECT orders", SpanKind::Client),
    ("cache.get", SpanKind::Client),
    ("publish order.created", SpanKind::Producer),
    ("render", SpanKind::Internal),
];

// =============================================================================
// SIMULATED BACKEND
// =============================================================================

/// Sleeps per batch and fails a fraction of exports.
struct SimulatedBackendExporter {
    failure_rate: f64,
    latency: Duration,
    spans_received: AtomicU64,
    failed_exports: AtomicU64,
    printer: Option<StdoutExporter>,
}

impl SimulatedBackendExporter {
    fn new(failure_rate: f64, latency: Duration, verbose: bool) -> Self {
        Self {
            failure_rate,
            latency,
            spans_received: AtomicU64::new(0),
            failed_exports: AtomicU64::new(0),
            printer: verbose.then(|| StdoutExporter::new(true)),
        }
    }
}

impl SpanExporter for SimulatedBackendExporter {
    type Record = Span;

    fn make_record(&self) -> Span {
        Span::default()
    }

    async fn export(&self, batch: Vec<Span>) -> Result<(), ExportError> {
        tokio::time::sleep(self.latency).await;

        let should_fail = rand::thread_rng().gen_bool(self.failure_rate);
        if should_fail {
            self.failed_exports.fetch_add(1, Ordering::Relaxed);
            return Err(ExportError::Transport(format!(
                "simulated backend failure (batch of {} spans)",
                batch.len()
            )));
        }

        self.spans_received
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        match &self.printer {
            Some(printer) => printer.export(batch).await,
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "simulated-backend"
    }
}

// =============================================================================
// PRODUCERS
// =============================================================================

fn produce(processor: &BatchProcessor<Span>, producer_id: usize, count: u64) {
    let mut rng = rand::thread_rng();
    let trace_id: u128 = rng.gen();

    for seq in 0..count {
        let (name, kind) = OPERATIONS[rng.gen_range(0..OPERATIONS.len())];

        let mut span = processor.make_record();
        processor.on_start(&mut span);
        span.trace_id = trace_id;
        span.span_id = (producer_id as u64) << 48 | (seq + 1);
        span.parent_span_id = if seq == 0 { 0 } else { (producer_id as u64) << 48 | 1 };
        span.name = name.to_string();
        span.kind = kind;
        span.set_attribute("service.name", AttributeValue::String("checkout".to_string()));
        span.set_attribute("producer.id", AttributeValue::Int(producer_id as i64));

        let status = if rng.gen_bool(0.1) {
            span.set_attribute("error", AttributeValue::Bool(true));
            SpanStatus::Error
        } else {
            SpanStatus::Ok
        };
        span.finish(status);
        processor.on_end(span);
    }
}

// =============================================================================
// MAIN APPLICATION
// =============================================================================

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose");
    let quick = args.iter().any(|a| a == "--quick");
    let (num_producers, spans_per_producer) = if quick { (4, 250) } else { (8, 5000) };

    let config = BatchConfig::from_env()
        .with_max_queue_size(4096)
        .with_schedule_delay(Duration::from_millis(200));
    println!("Demo configuration:");
    println!("   Producers: {}", num_producers);
    println!("   Spans per producer: {}", spans_per_producer);
    println!("   {:?}", config);
    println!();

    let backend = Arc::new(SimulatedBackendExporter::new(
        0.1,
        Duration::from_millis(2),
        verbose,
    ));
    let processor = Arc::new(
        BatchProcessor::new(config, Arc::clone(&backend)).context("starting batch processor")?,
    );

    let start = Instant::now();
    let handles: Vec<_> = (0..num_producers)
        .map(|producer_id| {
            let processor = Arc::clone(&processor);
            thread::Builder::new()
                .name(format!("producer-{}", producer_id))
                .spawn(move || produce(&processor, producer_id, spans_per_producer))
                .context("spawning producer")
        })
        .collect::<anyhow::Result<_>>()?;

    // Flush while producers are still running.
    thread::sleep(Duration::from_millis(50));
    let flushed = processor.force_flush(Some(Duration::from_secs(5)));
    println!("Mid-run force flush acknowledged: {}", flushed);

    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;
    }
    let produced = start.elapsed();

    let clean = processor.shutdown(Some(Duration::from_secs(5)));
    let elapsed = start.elapsed();

    let metrics = processor.metrics();
    let offered = num_producers as u64 * spans_per_producer;
    println!();
    println!("Final statistics:");
    println!("   Offered:          {}", offered);
    println!("   Admitted:         {}", metrics.records_admitted());
    println!("   Dropped (full):   {}", metrics.records_dropped());
    println!("   Exported:         {}", metrics.records_exported());
    println!("   Batches:          {}", metrics.batches_exported());
    println!("   Export errors:    {}", metrics.export_errors());
    println!("   Force flushes:    {}", metrics.force_flushes());
    println!(
        "   Backend received: {} spans ({} failed exports)",
        backend.spans_received.load(Ordering::Relaxed),
        backend.failed_exports.load(Ordering::Relaxed)
    );
    println!(
        "   Produce time:     {:?} ({:.0} spans/sec)",
        produced,
        offered as f64 / produced.as_secs_f64()
    );
    println!("   Total time:       {:?}", elapsed);
    println!("   Clean shutdown:   {}", clean);

    Ok(())
}

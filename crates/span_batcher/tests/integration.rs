use span_batcher::{
    AttributeValue, BatchConfig, BatchProcessor, ConfigError, InMemoryExporter, JsonFileExporter,
    ProcessorError, Span, SpanKind, SpanStatus,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const FLUSH_TIMEOUT: Option<Duration> = Some(Duration::from_secs(10));

fn processor_with(
    config: BatchConfig,
    exporter: &Arc<InMemoryExporter<u64>>,
) -> BatchProcessor<u64> {
    BatchProcessor::new(config, Arc::clone(exporter)).unwrap()
}

/// Polls `check` until it holds or `limit` passes.
fn wait_until(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    check()
}

fn tag(producer_id: usize, seq: u64) -> u64 {
    (producer_id as u64) << 48 | seq
}

#[test]
fn test_concurrent_producers_keep_per_producer_order() {
    let exporter = Arc::new(InMemoryExporter::new());
    let config = BatchConfig::default()
        .with_max_queue_size(8192)
        .with_max_export_batch_size(256)
        .with_schedule_delay(Duration::from_millis(20));
    let processor = Arc::new(processor_with(config, &exporter));

    let num_producers = 4;
    let per_producer = 2000u64;

    let handles: Vec<_> = (0..num_producers)
        .map(|producer_id| {
            let processor = Arc::clone(&processor);
            thread::spawn(move || {
                for seq in 0..per_producer {
                    processor.on_end(tag(producer_id, seq));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(processor.force_flush(FLUSH_TIMEOUT));
    assert_eq!(processor.metrics().records_dropped(), 0);
    assert_eq!(exporter.exported_count() as u64, num_producers as u64 * per_producer);

    let records = exporter.records();
    for producer_id in 0..num_producers {
        let seqs: Vec<u64> = records
            .iter()
            .filter(|r| (*r >> 48) as usize == producer_id)
            .map(|r| r & 0xFFFF_FFFF_FFFF)
            .collect();
        let expected: Vec<u64> = (0..per_producer).collect();
        assert_eq!(seqs, expected, "producer {} out of order", producer_id);
    }
    for size in exporter.batch_sizes() {
        assert!(size <= 256, "scheduled batch of {} exceeds limit", size);
    }
}

#[test]
fn test_force_flush_exports_backlog_before_returning() {
    let exporter = Arc::new(InMemoryExporter::new());
    // Far below any wakeup threshold, and a timer that never fires in-test.
    let config = BatchConfig::default()
        .with_max_queue_size(1024)
        .with_max_export_batch_size(512)
        .with_schedule_delay(Duration::from_secs(60));
    let processor = processor_with(config, &exporter);

    for i in 0..100 {
        processor.on_end(i);
    }
    assert_eq!(exporter.exported_count(), 0);

    assert!(processor.force_flush(FLUSH_TIMEOUT));
    assert_eq!(exporter.records(), (0..100).collect::<Vec<_>>());
    assert_eq!(exporter.force_flush_calls(), 1);
    assert_eq!(processor.metrics().force_flushes(), 1);
    assert!(processor.is_empty());

    // A second flush with nothing queued still acknowledges.
    assert!(processor.force_flush(FLUSH_TIMEOUT));
    assert_eq!(exporter.force_flush_calls(), 2);
}

#[test]
fn test_threshold_wakes_worker_before_timer() {
    let exporter = Arc::new(InMemoryExporter::new());
    let config = BatchConfig::default()
        .with_max_queue_size(4)
        .with_max_export_batch_size(2)
        .with_schedule_delay(Duration::from_secs(30));
    let processor = processor_with(config, &exporter);

    processor.on_end(1);
    processor.on_end(2);

    assert!(
        wait_until(Duration::from_secs(5), || exporter.exported_count() == 2),
        "half-full queue did not wake the worker"
    );
    assert_eq!(exporter.records(), vec![1, 2]);
}

#[test]
fn test_small_queue_scenario_exports_in_order() {
    let exporter = Arc::new(InMemoryExporter::new());
    let config = BatchConfig::default()
        .with_max_queue_size(4)
        .with_max_export_batch_size(2)
        .with_schedule_delay(Duration::from_millis(50));
    let processor = processor_with(config, &exporter);

    for i in 1..=3 {
        processor.on_end(i);
    }

    assert!(wait_until(Duration::from_secs(5), || exporter.exported_count() == 3));
    assert_eq!(exporter.records(), vec![1, 2, 3]);
    for size in exporter.batch_sizes() {
        assert!(size <= 2);
    }
}

#[test]
fn test_full_queue_drops_and_counts() {
    let exporter = Arc::new(InMemoryExporter::new().with_export_delay(Duration::from_millis(20)));
    let config = BatchConfig::default()
        .with_max_queue_size(4)
        .with_max_export_batch_size(2)
        .with_schedule_delay(Duration::from_millis(10));
    let processor = processor_with(config, &exporter);

    let offered = 1000u64;
    for i in 0..offered {
        processor.on_end(i);
    }

    assert!(processor.shutdown(None));
    let metrics = processor.metrics();
    assert!(metrics.records_dropped() > 0);
    assert_eq!(metrics.records_admitted() + metrics.records_dropped(), offered);
    assert_eq!(exporter.exported_count() as u64, metrics.records_admitted());
    assert_eq!(metrics.records_exported(), metrics.records_admitted());

    // Whatever got through is still in offer order.
    let records = exporter.records();
    assert!(records.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_concurrent_producers_overflow_without_stalling() {
    let exporter = Arc::new(InMemoryExporter::new().with_export_delay(Duration::from_millis(20)));
    let config = BatchConfig::default()
        .with_max_queue_size(8)
        .with_max_export_batch_size(4)
        .with_schedule_delay(Duration::from_millis(10));
    let processor = Arc::new(processor_with(config, &exporter));

    let num_producers = 8;
    let per_producer = 20_000u64;
    let start = Instant::now();
    let handles: Vec<_> = (0..num_producers)
        .map(|producer_id| {
            let processor = Arc::clone(&processor);
            thread::spawn(move || {
                for seq in 0..per_producer {
                    processor.on_end(tag(producer_id, seq));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let produced = start.elapsed();

    assert!(processor.shutdown(None));
    let metrics = processor.metrics();
    let offered = num_producers as u64 * per_producer;
    assert!(metrics.records_dropped() > 0);
    assert_eq!(metrics.records_admitted() + metrics.records_dropped(), offered);
    assert_eq!(exporter.exported_count() as u64, metrics.records_admitted());
    assert!(
        produced < Duration::from_secs(10),
        "overflowing producers took {:?}",
        produced
    );
}

#[test]
fn test_producers_racing_shutdown_lose_nothing_silently() {
    let exporter = Arc::new(InMemoryExporter::new());
    let config = BatchConfig::default()
        .with_max_queue_size(4096)
        .with_schedule_delay(Duration::from_millis(5));
    let processor = Arc::new(processor_with(config, &exporter));

    let handles: Vec<_> = (0..4)
        .map(|producer_id| {
            let processor = Arc::clone(&processor);
            thread::spawn(move || {
                for seq in 0..5_000 {
                    processor.on_end(tag(producer_id, seq));
                }
            })
        })
        .collect();
    thread::sleep(Duration::from_millis(2));
    assert!(processor.shutdown(None));
    for handle in handles {
        handle.join().unwrap();
    }

    // Every admitted record was either exported or is still visibly queued.
    let metrics = processor.metrics();
    assert_eq!(
        exporter.exported_count() as u64 + processor.len() as u64,
        metrics.records_admitted()
    );
}

#[test]
fn test_concurrent_shutdown_drains_once() {
    let exporter = Arc::new(InMemoryExporter::new());
    let config = BatchConfig::default().with_schedule_delay(Duration::from_secs(60));
    let processor = Arc::new(processor_with(config, &exporter));

    for i in 0..300 {
        processor.on_end(i);
    }

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let processor = Arc::clone(&processor);
            thread::spawn(move || processor.shutdown(Some(Duration::from_secs(5))))
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }

    assert_eq!(processor.len(), 0);
    assert_eq!(exporter.exported_count(), 300);
    assert_eq!(exporter.shutdown_calls(), 1);

    // Later calls are no-ops.
    assert!(processor.shutdown(None));
    assert_eq!(exporter.shutdown_calls(), 1);
}

#[test]
fn test_operations_after_shutdown() {
    let exporter = Arc::new(InMemoryExporter::new());
    let processor = processor_with(BatchConfig::default(), &exporter);

    assert!(processor.shutdown(None));
    assert!(!processor.force_flush(FLUSH_TIMEOUT));

    processor.on_end(42);
    assert_eq!(processor.metrics().records_admitted(), 0);
    assert!(processor.is_empty());
    assert_eq!(exporter.exported_count(), 0);
}

#[test]
fn test_exporter_failure_does_not_stall_pipeline() {
    let exporter = Arc::new(InMemoryExporter::new());
    let config = BatchConfig::default().with_schedule_delay(Duration::from_secs(60));
    let processor = processor_with(config, &exporter);

    exporter.set_fail_exports(true);
    for i in 0..10 {
        processor.on_end(i);
    }
    assert!(processor.force_flush(FLUSH_TIMEOUT));
    assert_eq!(processor.metrics().export_errors(), 1);
    assert_eq!(exporter.exported_count(), 0);

    exporter.set_fail_exports(false);
    for i in 10..20 {
        processor.on_end(i);
    }
    assert!(processor.force_flush(FLUSH_TIMEOUT));
    assert_eq!(exporter.records(), (10..20).collect::<Vec<_>>());
}

#[test]
fn test_export_timeout_counts_as_failure() {
    let exporter = Arc::new(InMemoryExporter::new().with_export_delay(Duration::from_millis(500)));
    let config = BatchConfig::default()
        .with_schedule_delay(Duration::from_secs(60))
        .with_export_timeout(Duration::from_millis(20));
    let processor = processor_with(config, &exporter);

    processor.on_end(1);
    assert!(processor.force_flush(FLUSH_TIMEOUT));

    assert_eq!(processor.metrics().export_errors(), 1);
    assert_eq!(exporter.exported_count(), 0);
}

#[test]
fn test_force_flush_times_out_then_recovers() {
    let exporter = Arc::new(InMemoryExporter::new().with_export_delay(Duration::from_millis(300)));
    let config = BatchConfig::default()
        .with_schedule_delay(Duration::from_secs(60))
        .with_export_timeout(Duration::ZERO);
    let processor = processor_with(config, &exporter);

    processor.on_end(1);
    assert!(!processor.force_flush(Some(Duration::from_millis(20))));

    // The slow export still completes; a later flush acknowledges normally.
    processor.on_end(2);
    assert!(processor.force_flush(None));
    assert_eq!(exporter.records(), vec![1, 2]);
}

#[test]
fn test_force_flush_returns_at_deadline_while_export_hangs() {
    let exporter = Arc::new(InMemoryExporter::new().with_export_delay(Duration::from_millis(1500)));
    let config = BatchConfig::default()
        .with_schedule_delay(Duration::from_secs(60))
        .with_export_timeout(Duration::ZERO);
    let processor = processor_with(config, &exporter);

    processor.on_end(1);
    let start = Instant::now();
    let acknowledged = processor.force_flush(Some(Duration::from_millis(50)));
    let elapsed = start.elapsed();

    assert!(!acknowledged);
    assert!(
        elapsed < Duration::from_millis(750),
        "force_flush(50ms) blocked for {:?}",
        elapsed
    );

    assert!(processor.shutdown(None));
    assert_eq!(exporter.records(), vec![1]);
}

#[test]
fn test_force_flush_deadline_covers_wait_behind_other_flush() {
    let exporter = Arc::new(InMemoryExporter::new().with_export_delay(Duration::from_millis(1000)));
    let config = BatchConfig::default()
        .with_schedule_delay(Duration::from_secs(60))
        .with_export_timeout(Duration::ZERO);
    let processor = Arc::new(processor_with(config, &exporter));

    processor.on_end(1);
    let slow = {
        let processor = Arc::clone(&processor);
        thread::spawn(move || processor.force_flush(None))
    };
    assert!(wait_until(Duration::from_secs(5), || processor.is_empty()));

    let start = Instant::now();
    assert!(!processor.force_flush(Some(Duration::from_millis(50))));
    assert!(start.elapsed() < Duration::from_millis(500));

    // The first caller still gets its own acknowledgement.
    assert!(slow.join().unwrap());
    assert_eq!(processor.metrics().force_flushes(), 1);
    assert_eq!(exporter.records(), vec![1]);
}

#[test]
fn test_concurrent_force_flush_callers() {
    let exporter = Arc::new(InMemoryExporter::new());
    let config = BatchConfig::default().with_schedule_delay(Duration::from_secs(60));
    let processor = Arc::new(processor_with(config, &exporter));

    let handles: Vec<_> = (0..4)
        .map(|producer_id| {
            let processor = Arc::clone(&processor);
            thread::spawn(move || {
                let mut acknowledged = 0;
                for seq in 0..50 {
                    processor.on_end(tag(producer_id, seq));
                    if seq % 10 == 9 && processor.force_flush(FLUSH_TIMEOUT) {
                        acknowledged += 1;
                    }
                }
                acknowledged
            })
        })
        .collect();

    let acknowledged: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(acknowledged, 20);
    assert_eq!(exporter.exported_count(), 200);
}

#[test]
fn test_drop_without_shutdown_drains() {
    let exporter = Arc::new(InMemoryExporter::new());
    {
        let config = BatchConfig::default().with_schedule_delay(Duration::from_secs(60));
        let processor = processor_with(config, &exporter);
        for i in 0..25 {
            processor.on_end(i);
        }
    }

    assert_eq!(exporter.exported_count(), 25);
    assert_eq!(exporter.shutdown_calls(), 1);
}

#[test]
fn test_invalid_config_is_rejected() {
    let exporter = Arc::new(InMemoryExporter::<u64>::new());
    let config = BatchConfig::default()
        .with_max_queue_size(8)
        .with_max_export_batch_size(16);

    let err = BatchProcessor::new(config, exporter).unwrap_err();
    assert!(matches!(
        err,
        ProcessorError::Config(ConfigError::BatchExceedsQueue { batch: 16, queue: 8 })
    ));
}

#[tokio::test]
async fn test_usable_from_inside_a_runtime() {
    let exporter = Arc::new(InMemoryExporter::new());
    let processor = processor_with(BatchConfig::default(), &exporter);

    processor.on_end(7);
    assert!(processor.force_flush(FLUSH_TIMEOUT));
    assert!(processor.shutdown(None));
    assert_eq!(exporter.records(), vec![7]);
}

#[test]
fn test_spans_reach_json_file() {
    let path = std::env::temp_dir().join(format!("span_batcher_it_{}.jsonl", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let exporter = Arc::new(JsonFileExporter::new(&path));
    let processor = BatchProcessor::new(BatchConfig::default(), exporter).unwrap();

    for i in 0..3u64 {
        let mut span = processor.make_record();
        processor.on_start(&mut span);
        span.trace_id = 0xABCD;
        span.span_id = i + 1;
        span.name = format!("op-{}", i);
        span.kind = SpanKind::Server;
        span.set_attribute("http.status_code", AttributeValue::Int(200));
        span.finish(SpanStatus::Ok);
        processor.on_end(span);
    }
    assert!(processor.shutdown(None));

    let contents = std::fs::read_to_string(&path).unwrap();
    let spans: Vec<Span> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(spans.len(), 3);
    assert_eq!(spans[2].name, "op-2");
    assert_eq!(spans[0].status, SpanStatus::Ok);
    assert!(matches!(
        spans[1].attributes.get("http.status_code"),
        Some(AttributeValue::Int(200))
    ));

    std::fs::remove_file(&path).unwrap();
}

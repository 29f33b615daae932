//! End-to-end tests for the metrics buffer under concurrent load.

use std::sync::Arc;
use std::time::Duration;

use nimbus_telemetry::{BufferConfig, Dimension, MemorySink, MetricsBuffer};

fn service() -> Vec<Dimension> {
    vec![
        Dimension::new("Service", "images"),
        Dimension::new("Operation", "GET /images"),
    ]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_are_published_once() {
    let sink = Arc::new(MemorySink::new());
    let buffer = MetricsBuffer::new(
        BufferConfig::default()
            .with_flush_threshold(20)
            .without_timer(),
        sink.clone(),
    );

    let mut tasks = Vec::new();
    for worker in 0..8 {
        let buffer = buffer.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..125 {
                buffer.add_metric("ProcessingTime", f64::from(worker * 1000 + i), service());
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    buffer.shutdown().await.unwrap();
    assert_eq!(buffer.stats().samples_published, 1000);

    let samples = sink.samples();
    assert_eq!(samples.len(), 1000);
    assert!(sink.batches().iter().all(|batch| batch.len() <= 20));

    let mut values: Vec<i64> = samples.iter().map(|s| s.value as i64).collect();
    values.sort_unstable();
    values.dedup();
    assert_eq!(values.len(), 1000, "no sample may be published twice");

    let stats = buffer.stats();
    assert_eq!(stats.samples_added, 1000);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn threshold_flush_does_not_block_the_caller() {
    let sink = Arc::new(MemorySink::new());
    let buffer = MetricsBuffer::new(
        BufferConfig::default().with_flush_threshold(3).without_timer(),
        sink.clone(),
    );

    for _ in 0..3 {
        buffer.add_metric("Successful", 1.0, service());
    }
    // The flush runs on a spawned task; nothing was published synchronously.
    assert_eq!(sink.publish_calls(), 0);

    assert!(sink.wait_for_samples(3, Duration::from_secs(1)).await);
    buffer.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_publishes_remaining_in_capped_batches() {
    let sink = Arc::new(MemorySink::new());
    let buffer = MetricsBuffer::new(
        BufferConfig::default().with_flush_threshold(1000),
        sink.clone(),
    );
    buffer.start().unwrap();

    for _ in 0..45 {
        buffer.add_metric("Invocations", 1.0, service());
    }
    buffer.shutdown().await.unwrap();

    let sizes: Vec<usize> = sink.batches().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![20, 20, 5]);
    assert!(!buffer.is_running());
}

#[tokio::test]
async fn failed_sub_batch_drops_the_rest_of_the_flush() {
    let sink = Arc::new(MemorySink::new());
    let buffer = MetricsBuffer::new(
        BufferConfig::default().with_flush_threshold(1000).without_timer(),
        sink.clone(),
    );

    for _ in 0..45 {
        buffer.add_metric("Errors", 1.0, service());
    }
    sink.fail_next(1);

    assert!(buffer.flush().await.is_err());
    assert!(sink.samples().is_empty());

    let stats = buffer.stats();
    assert_eq!(stats.samples_dropped, 45);
    assert_eq!(stats.samples_published, 0);
    assert_eq!(stats.pending, 0);
}

#[tokio::test(start_paused = true)]
async fn timer_keeps_flushing_until_shutdown() {
    let sink = Arc::new(MemorySink::new());
    let buffer = MetricsBuffer::new(
        BufferConfig::default()
            .with_flush_threshold(1000)
            .with_flush_interval(Duration::from_secs(10)),
        sink.clone(),
    );
    buffer.start().unwrap();

    for round in 1..=3 {
        buffer.add_metric("Invocations", 1.0, service());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(sink.wait_for_samples(round, Duration::from_secs(1)).await);
    }

    buffer.shutdown().await.unwrap();
    assert_eq!(sink.samples().len(), 3);
}

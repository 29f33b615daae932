//! Buffered metrics publishing.
//!
//! [`MetricsBuffer`] keeps the request path free of telemetry I/O. Samples are
//! appended under a short lock and published to a [`MetricsSink`] later, when
//! one of three things happens:
//!
//! - the buffer reaches its flush threshold (a flush is spawned, the caller never waits)
//! - the background timer fires
//! - [`MetricsBuffer::shutdown`] runs, which waits for in-flight threshold
//!   flushes and then performs exactly one final flush
//!
//! A flush swaps the buffer for an empty one under the lock and publishes the
//! swapped-out samples outside it, in sub-batches no larger than the publish
//! cap. Delivery is at-most-once: a failed sub-batch is reported and dropped,
//! and the sub-batches after it are dropped with it.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use nimbus_telemetry::{BufferConfig, Dimension, MemorySink, MetricsBuffer};
//!
//! # tokio_test::block_on(async {
//! let sink = Arc::new(MemorySink::new());
//! let buffer = MetricsBuffer::new(BufferConfig::default(), sink.clone());
//!
//! buffer.add_metric("Invocations", 1.0, vec![Dimension::new("Service", "images")]);
//! buffer.shutdown().await.unwrap();
//!
//! assert_eq!(sink.samples().len(), 1);
//! # });
//! ```

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use nimbus_config::PipelineConfig;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::TelemetryError;
use crate::sample::{Dimension, MetricSample};
use crate::sink::MetricsSink;
use crate::TelemetryResult;

/// Largest number of samples sent in one publish call.
pub const MAX_PUBLISH_BATCH: usize = 20;

/// Configuration for a [`MetricsBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferConfig {
    /// Namespace passed to the sink.
    pub namespace: String,
    /// Buffered samples that trigger an early flush.
    pub flush_threshold: usize,
    /// Timer period; `None` disables the timer.
    pub flush_interval: Option<Duration>,
    /// Publish cap per sink call.
    pub max_publish_batch: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            namespace: "Nimbus/Functions".to_string(),
            flush_threshold: 20,
            flush_interval: Some(Duration::from_secs(60)),
            max_publish_batch: MAX_PUBLISH_BATCH,
        }
    }
}

impl BufferConfig {
    /// Derives the buffer settings from the pipeline configuration.
    #[must_use]
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            namespace: config.metrics_namespace.clone(),
            flush_threshold: config.batch_size.max(1),
            flush_interval: config.flush_interval(),
            max_publish_batch: MAX_PUBLISH_BATCH,
        }
    }

    /// Set the flush threshold.
    #[must_use]
    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold.max(1);
        self
    }

    /// Set the timer period.
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    /// Disable the timer.
    #[must_use]
    pub fn without_timer(mut self) -> Self {
        self.flush_interval = None;
        self
    }
}

/// Point-in-time counters of a buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Samples accepted by `add_metric`.
    pub samples_added: u64,
    /// Flush runs, empty ones included.
    pub flushes: u64,
    /// Flushes started by reaching the threshold.
    pub threshold_flushes: u64,
    /// Samples the sink accepted.
    pub samples_published: u64,
    /// Samples lost to failed publishes or added after shutdown.
    pub samples_dropped: u64,
    /// Failed publish calls.
    pub publish_failures: u64,
    /// Samples currently buffered.
    pub pending: usize,
}

#[derive(Debug, Default)]
struct Counters {
    samples_added: AtomicU64,
    flushes: AtomicU64,
    threshold_flushes: AtomicU64,
    samples_published: AtomicU64,
    samples_dropped: AtomicU64,
    publish_failures: AtomicU64,
}

type ShutdownAck = oneshot::Sender<TelemetryResult<usize>>;

struct Inner {
    config: BufferConfig,
    sink: Arc<dyn MetricsSink>,
    samples: Mutex<Vec<MetricSample>>,
    counters: Counters,
    flush_pending: AtomicBool,
    running: AtomicBool,
    closed: AtomicBool,
    flush_tasks: Mutex<JoinSet<()>>,
    shutdown_tx: RwLock<Option<mpsc::Sender<ShutdownAck>>>,
    loop_handle: RwLock<Option<JoinHandle<()>>>,
}

/// Thread-safe metrics buffer with threshold, timer and shutdown flushes.
///
/// Cloning is cheap; clones share one buffer.
#[derive(Clone)]
pub struct MetricsBuffer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MetricsBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsBuffer")
            .field("config", &self.inner.config)
            .field("sink", &self.inner.sink.name())
            .field("stats", &self.stats())
            .finish()
    }
}

impl MetricsBuffer {
    /// Creates a buffer. The timer is not running until [`start`](Self::start).
    pub fn new(config: BufferConfig, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                sink,
                samples: Mutex::new(Vec::new()),
                counters: Counters::default(),
                flush_pending: AtomicBool::new(false),
                running: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                flush_tasks: Mutex::new(JoinSet::new()),
                shutdown_tx: RwLock::new(None),
                loop_handle: RwLock::new(None),
            }),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BufferConfig {
        &self.inner.config
    }

    /// Check if the timer loop is running.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Returns the number of buffered samples.
    pub fn pending(&self) -> usize {
        self.inner.samples.lock().len()
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> BufferStats {
        let c = &self.inner.counters;
        BufferStats {
            samples_added: c.samples_added.load(Ordering::Relaxed),
            flushes: c.flushes.load(Ordering::Relaxed),
            threshold_flushes: c.threshold_flushes.load(Ordering::Relaxed),
            samples_published: c.samples_published.load(Ordering::Relaxed),
            samples_dropped: c.samples_dropped.load(Ordering::Relaxed),
            publish_failures: c.publish_failures.load(Ordering::Relaxed),
            pending: self.pending(),
        }
    }

    /// Appends one sample.
    ///
    /// Never waits on the sink. When the buffer reaches the flush threshold a
    /// flush is spawned on the current tokio runtime; without a runtime the
    /// samples wait for the next timer or shutdown flush.
    pub fn add_metric(&self, name: impl Into<String>, value: f64, dimensions: Vec<Dimension>) {
        self.add_sample(MetricSample::new(name, value, dimensions));
    }

    /// Appends a pre-built sample.
    ///
    /// After [`shutdown`](Self::shutdown) the sample is counted as dropped.
    pub fn add_sample(&self, sample: MetricSample) {
        let len = {
            let mut samples = self.inner.samples.lock();
            if self.inner.closed.load(Ordering::Acquire) {
                drop(samples);
                self.inner
                    .counters
                    .samples_dropped
                    .fetch_add(1, Ordering::Relaxed);
                debug!(metric = %sample.name, "metrics buffer shut down; sample dropped");
                return;
            }
            samples.push(sample);
            samples.len()
        };
        self.inner
            .counters
            .samples_added
            .fetch_add(1, Ordering::Relaxed);

        if len >= self.inner.config.flush_threshold {
            self.spawn_threshold_flush(len);
        }
    }

    fn spawn_threshold_flush(&self, len: usize) {
        if self.inner.flush_pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.inner.flush_pending.store(false, Ordering::Release);
            debug!(pending = len, "no runtime for threshold flush; deferring to timer");
            return;
        };

        let mut tasks = self.inner.flush_tasks.lock();
        // Shutdown already took the task set; its final flush covers these samples.
        if self.inner.closed.load(Ordering::Acquire) {
            self.inner.flush_pending.store(false, Ordering::Release);
            return;
        }
        while tasks.try_join_next().is_some() {}

        self.inner
            .counters
            .threshold_flushes
            .fetch_add(1, Ordering::Relaxed);
        debug!(pending = len, "flush threshold reached");

        let inner = Arc::clone(&self.inner);
        tasks.spawn_on(
            async move {
                inner.flush_pending.store(false, Ordering::Release);
                if let Err(e) = inner.flush().await {
                    warn!(error = %e, "threshold flush failed");
                }
            },
            &runtime,
        );
    }

    /// Publishes everything buffered right now.
    ///
    /// Returns the number of samples the sink accepted. An empty buffer is a
    /// successful no-op.
    ///
    /// # Errors
    ///
    /// Returns the sink's error for the first failed sub-batch. The swapped-out
    /// samples are not re-enqueued.
    pub async fn flush(&self) -> TelemetryResult<usize> {
        self.inner.flush().await
    }

    /// Starts the background flush timer.
    ///
    /// Does nothing when the timer is disabled.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::Buffer` if the timer is already running, the
    /// buffer was shut down, or there is no tokio runtime.
    pub fn start(&self) -> TelemetryResult<()> {
        let Some(period) = self.inner.config.flush_interval else {
            debug!("flush timer disabled");
            return Ok(());
        };

        if self.inner.closed.load(Ordering::Acquire) {
            return Err(TelemetryError::Buffer("buffer already shut down".to_string()));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TelemetryError::Buffer(format!("no tokio runtime: {e}")))?;

        if self.inner.running.swap(true, Ordering::AcqRel) {
            return Err(TelemetryError::Buffer("flush timer already running".to_string()));
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<ShutdownAck>(1);
        *self.inner.shutdown_tx.write() = Some(shutdown_tx);

        let handle = runtime.spawn(flush_loop(Arc::downgrade(&self.inner), period, shutdown_rx));
        *self.inner.loop_handle.write() = Some(handle);

        info!(
            interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
            threshold = self.inner.config.flush_threshold,
            namespace = %self.inner.config.namespace,
            "metrics flush timer started"
        );
        Ok(())
    }

    /// Stops the timer and performs exactly one final flush.
    ///
    /// Threshold flushes still publishing are awaited first. When the timer
    /// is running the final flush happens inside the timer task before it
    /// exits; otherwise it happens here. Samples added afterwards are
    /// dropped. Calling `shutdown` again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the final flush's publish error.
    pub async fn shutdown(&self) -> TelemetryResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.join_threshold_flushes().await;

        let result = if self.inner.running.swap(false, Ordering::AcqRel) {
            self.stop_loop().await
        } else {
            self.inner.flush().await
        };

        match &result {
            Ok(published) => info!(published, "metrics buffer shut down"),
            Err(e) => error!(error = %e, "final metrics flush failed"),
        }
        result.map(|_| ())
    }

    async fn join_threshold_flushes(&self) {
        let mut tasks = mem::take(&mut *self.inner.flush_tasks.lock());
        if !tasks.is_empty() {
            debug!(in_flight = tasks.len(), "waiting for threshold flushes");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "threshold flush task panicked");
            }
        }
    }

    async fn stop_loop(&self) -> TelemetryResult<usize> {
        let tx = self.inner.shutdown_tx.write().take();
        let handle = self.inner.loop_handle.write().take();

        let mut result = None;
        if let Some(tx) = tx {
            let (ack_tx, ack_rx) = oneshot::channel();
            if tx.send(ack_tx).await.is_ok() {
                result = ack_rx.await.ok();
            }
        }

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "metrics flush loop panicked");
            }
        }

        // The loop is gone without answering; flush here so shutdown still flushes once.
        match result {
            Some(result) => result,
            None => self.inner.flush().await,
        }
    }
}

impl Inner {
    async fn flush(&self) -> TelemetryResult<usize> {
        let batch = mem::take(&mut *self.samples.lock());
        self.counters.flushes.fetch_add(1, Ordering::Relaxed);

        if batch.is_empty() {
            return Ok(0);
        }

        let total = batch.len();
        let cap = self.config.max_publish_batch.max(1);
        let mut published = 0;

        for chunk in batch.chunks(cap) {
            if let Err(e) = self.sink.publish(&self.config.namespace, chunk).await {
                let dropped = total - published;
                self.counters
                    .publish_failures
                    .fetch_add(1, Ordering::Relaxed);
                self.counters
                    .samples_dropped
                    .fetch_add(dropped as u64, Ordering::Relaxed);
                self.counters
                    .samples_published
                    .fetch_add(published as u64, Ordering::Relaxed);
                warn!(
                    sink = self.sink.name(),
                    dropped,
                    published,
                    error = %e,
                    "metrics publish failed; dropping batch"
                );
                return Err(e);
            }
            published += chunk.len();
        }

        self.counters
            .samples_published
            .fetch_add(published as u64, Ordering::Relaxed);
        debug!(sink = self.sink.name(), published, "metrics flushed");
        Ok(published)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let pending = self.samples.get_mut().len();
        if pending > 0 && !*self.closed.get_mut() {
            warn!(pending, "metrics buffer dropped without shutdown; samples lost");
        }
    }
}

async fn flush_loop(
    inner: Weak<Inner>,
    period: Duration,
    mut shutdown_rx: mpsc::Receiver<ShutdownAck>,
) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            ack = shutdown_rx.recv() => {
                let Some(ack) = ack else { break };
                debug!("metrics flush loop received shutdown signal");
                let result = match inner.upgrade() {
                    Some(inner) => inner.flush().await,
                    None => Ok(0),
                };
                let _ = ack.send(result);
                break;
            }
            _ = interval.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                if let Err(e) = inner.flush().await {
                    warn!(error = %e, "timer flush failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{BoxFuture, MemorySink};

    fn buffer(config: BufferConfig) -> (MetricsBuffer, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (MetricsBuffer::new(config, sink.clone()), sink)
    }

    fn dims() -> Vec<Dimension> {
        vec![Dimension::new("Service", "test")]
    }

    #[test]
    fn test_config_from_pipeline() {
        let pipeline = PipelineConfig {
            batch_size: 7,
            flush_interval_secs: 0,
            metrics_namespace: "Custom/NS".to_string(),
            ..Default::default()
        };
        let config = BufferConfig::from_pipeline(&pipeline);
        assert_eq!(config.flush_threshold, 7);
        assert_eq!(config.flush_interval, None);
        assert_eq!(config.namespace, "Custom/NS");
        assert_eq!(config.max_publish_batch, 20);
    }

    #[test]
    fn test_add_without_runtime_keeps_samples() {
        let (buffer, sink) = buffer(BufferConfig::default().with_flush_threshold(1));
        buffer.add_metric("Errors", 1.0, dims());
        buffer.add_metric("Errors", 1.0, dims());
        assert_eq!(buffer.pending(), 2);
        assert_eq!(sink.publish_calls(), 0);
        assert_eq!(buffer.stats().threshold_flushes, 0);
    }

    #[tokio::test]
    async fn test_flush_empty_is_noop() {
        let (buffer, sink) = buffer(BufferConfig::default());
        assert_eq!(buffer.flush().await.unwrap(), 0);
        assert_eq!(sink.publish_calls(), 0);
        assert_eq!(buffer.stats().flushes, 1);
    }

    #[tokio::test]
    async fn test_flush_splits_into_sub_batches() {
        let (buffer, sink) = buffer(BufferConfig::default().with_flush_threshold(1000));
        for i in 0..45 {
            buffer.add_metric("Invocations", f64::from(i), dims());
        }

        assert_eq!(buffer.flush().await.unwrap(), 45);

        let sizes: Vec<usize> = sink.batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![20, 20, 5]);
        assert_eq!(buffer.pending(), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_drops_batch() {
        let (buffer, sink) = buffer(BufferConfig::default().with_flush_threshold(1000));
        for _ in 0..25 {
            buffer.add_metric("Errors", 1.0, dims());
        }
        sink.fail_next(1);

        let result = buffer.flush().await;
        assert!(matches!(result, Err(TelemetryError::Publish { count: 20, .. })));
        assert_eq!(buffer.pending(), 0, "failed samples must not be re-enqueued");

        let stats = buffer.stats();
        assert_eq!(stats.samples_dropped, 25);
        assert_eq!(stats.publish_failures, 1);
        assert_eq!(sink.publish_calls(), 1);

        // Later flushes keep working.
        buffer.add_metric("Errors", 1.0, dims());
        assert_eq!(buffer.flush().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_threshold_triggers_flush() {
        let (buffer, sink) = buffer(
            BufferConfig::default()
                .with_flush_threshold(5)
                .without_timer(),
        );
        for _ in 0..5 {
            buffer.add_metric("Successful", 1.0, dims());
        }

        assert!(sink.wait_for_samples(5, Duration::from_secs(1)).await);
        assert_eq!(buffer.stats().threshold_flushes, 1);
        assert_eq!(buffer.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_flushes_periodically() {
        let (buffer, sink) = buffer(
            BufferConfig::default()
                .with_flush_threshold(1000)
                .with_flush_interval(Duration::from_secs(60)),
        );
        buffer.start().unwrap();
        buffer.add_metric("Invocations", 1.0, dims());

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(sink.samples().len(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(sink.wait_for_samples(1, Duration::from_secs(1)).await);

        buffer.shutdown().await.unwrap();
        assert!(!buffer.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_flushes_exactly_once() {
        let (buffer, sink) = buffer(BufferConfig::default().with_flush_threshold(1000));
        buffer.start().unwrap();
        buffer.add_metric("Invocations", 1.0, dims());
        buffer.add_metric("ProcessingTime", 12.0, dims());

        buffer.shutdown().await.unwrap();
        assert_eq!(sink.samples().len(), 2);
        assert_eq!(buffer.stats().flushes, 1);

        buffer.shutdown().await.unwrap();
        assert_eq!(buffer.stats().flushes, 1);
    }

    #[tokio::test]
    async fn test_shutdown_on_empty_buffer_without_timer() {
        let (buffer, sink) = buffer(BufferConfig::default().without_timer());
        buffer.start().unwrap();
        assert!(!buffer.is_running());

        buffer.shutdown().await.unwrap();
        assert_eq!(buffer.stats().flushes, 1);
        assert_eq!(sink.publish_calls(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_reports_final_publish_error() {
        let (buffer, sink) = buffer(BufferConfig::default().with_flush_threshold(1000));
        buffer.start().unwrap();
        buffer.add_metric("Errors", 1.0, dims());
        sink.fail_next(1);

        assert!(buffer.shutdown().await.is_err());
        assert_eq!(buffer.stats().samples_dropped, 1);
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let (buffer, _sink) = buffer(BufferConfig::default());
        buffer.start().unwrap();
        assert!(matches!(buffer.start(), Err(TelemetryError::Buffer(_))));
        buffer.shutdown().await.unwrap();
        assert!(matches!(buffer.start(), Err(TelemetryError::Buffer(_))));
    }

    struct SlowSink {
        delay: Duration,
        inner: MemorySink,
    }

    impl MetricsSink for SlowSink {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn publish<'a>(
            &'a self,
            namespace: &'a str,
            batch: &'a [MetricSample],
        ) -> BoxFuture<'a, TelemetryResult<()>> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                self.inner.publish(namespace, batch).await
            })
        }
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_threshold_flush() {
        let sink = Arc::new(SlowSink {
            delay: Duration::from_millis(200),
            inner: MemorySink::new(),
        });
        let buffer = MetricsBuffer::new(
            BufferConfig::default()
                .with_flush_threshold(5)
                .without_timer(),
            sink.clone(),
        );
        for _ in 0..5 {
            buffer.add_metric("Successful", 1.0, dims());
        }

        // Let the threshold flush take the batch and block in the sink.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(buffer.pending(), 0);

        buffer.shutdown().await.unwrap();
        let stats = buffer.stats();
        assert_eq!(stats.samples_published, 5);
        assert_eq!(stats.samples_dropped, 0);
        assert_eq!(sink.inner.samples().len(), 5);
    }

    #[tokio::test]
    async fn test_add_after_shutdown_is_dropped() {
        let (buffer, sink) = buffer(BufferConfig::default().without_timer());
        buffer.add_metric("Invocations", 1.0, dims());
        buffer.shutdown().await.unwrap();

        buffer.add_metric("Invocations", 1.0, dims());
        buffer.add_metric("Errors", 1.0, dims());

        let stats = buffer.stats();
        assert_eq!(stats.samples_added, 1);
        assert_eq!(stats.samples_dropped, 2);
        assert_eq!(stats.pending, 0);
        assert_eq!(sink.samples().len(), 1);
    }
}

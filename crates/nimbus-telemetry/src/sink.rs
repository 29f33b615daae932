//! Metric sinks.
//!
//! A [`MetricsSink`] is the downstream end of the metrics buffer: it receives
//! sub-batches of at most the publish cap and delivers them somewhere.
//!
//! | Sink | Destination |
//! |------|-------------|
//! | [`LogSink`] | One structured `tracing` event per sample |
//! | [`RecorderSink`] | The `metrics` facade (scraped by the Prometheus exporter) |
//! | [`MemorySink`] | An in-memory list, for tests and local runs |

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use metrics::Label;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::info;

use crate::error::TelemetryError;
use crate::sample::{MetricSample, MetricUnit};
use crate::TelemetryResult;

/// A boxed future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Destination for flushed metric samples.
///
/// Implementations must not retain `batch` beyond the call; the buffer has
/// already dropped the samples from its own state when `publish` runs.
pub trait MetricsSink: Send + Sync + 'static {
    /// Short sink name for logs and errors.
    fn name(&self) -> &'static str;

    /// Publishes one sub-batch under `namespace`.
    fn publish<'a>(
        &'a self,
        namespace: &'a str,
        batch: &'a [MetricSample],
    ) -> BoxFuture<'a, TelemetryResult<()>>;
}

/// Writes every sample as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MetricsSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn publish<'a>(
        &'a self,
        namespace: &'a str,
        batch: &'a [MetricSample],
    ) -> BoxFuture<'a, TelemetryResult<()>> {
        Box::pin(async move {
            for sample in batch {
                let dimensions = serde_json::to_string(&sample.dimensions)
                    .map_err(|e| TelemetryError::publish(self.name(), batch.len(), e.to_string()))?;
                info!(
                    target: "nimbus::metrics",
                    namespace = %namespace,
                    metric = %sample.name,
                    value = sample.value,
                    unit = sample.unit.as_str(),
                    dimensions = %dimensions,
                    timestamp = %sample.timestamp.to_rfc3339(),
                    "metric"
                );
            }
            Ok(())
        })
    }
}

/// Forwards samples to the global `metrics` recorder.
///
/// Millisecond samples become histogram observations and count samples become
/// counter increments. The key is `<namespace>_<name>` lowercased with every
/// character outside `[a-z0-9_]` replaced by `_`, and dimensions become labels.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecorderSink;

impl RecorderSink {
    /// Builds the recorder key for a sample.
    #[must_use]
    pub fn metric_key(namespace: &str, name: &str) -> String {
        let raw = format!("{namespace}_{name}");
        raw.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl MetricsSink for RecorderSink {
    fn name(&self) -> &'static str {
        "recorder"
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn publish<'a>(
        &'a self,
        namespace: &'a str,
        batch: &'a [MetricSample],
    ) -> BoxFuture<'a, TelemetryResult<()>> {
        Box::pin(async move {
            for sample in batch {
                let key = Self::metric_key(namespace, &sample.name);
                let labels: Vec<Label> = sample
                    .dimensions
                    .iter()
                    .map(|d| Label::new(d.name.clone(), d.value.clone()))
                    .collect();

                match sample.unit {
                    MetricUnit::Milliseconds => {
                        metrics::histogram!(key, labels).record(sample.value);
                    }
                    MetricUnit::Count => {
                        metrics::counter!(key, labels).increment(sample.value.max(0.0).round() as u64);
                    }
                }
            }
            Ok(())
        })
    }
}

/// Collects published batches in memory.
///
/// `fail_next` makes the next publishes fail, which is how tests exercise
/// the buffer's at-most-once behavior.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<MetricSample>>>,
    failures_pending: AtomicUsize,
    publish_calls: AtomicUsize,
    published: Notify,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` publish calls fail.
    pub fn fail_next(&self, count: usize) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Returns the successfully published batches in order.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<MetricSample>> {
        self.batches.lock().clone()
    }

    /// Returns every successfully published sample, flattened.
    #[must_use]
    pub fn samples(&self) -> Vec<MetricSample> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    /// Returns the published samples called `name`.
    #[must_use]
    pub fn samples_named(&self, name: &str) -> Vec<MetricSample> {
        self.samples()
            .into_iter()
            .filter(|s| s.name == name)
            .collect()
    }

    /// Number of publish calls, failed ones included.
    #[must_use]
    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` samples were published or `timeout` passes.
    ///
    /// Returns `true` if the count was reached.
    pub async fn wait_for_samples(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.published.notified();
                if self.samples().len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

impl MetricsSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn publish<'a>(
        &'a self,
        _namespace: &'a str,
        batch: &'a [MetricSample],
    ) -> BoxFuture<'a, TelemetryResult<()>> {
        Box::pin(async move {
            self.publish_calls.fetch_add(1, Ordering::SeqCst);

            let should_fail = self
                .failures_pending
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if should_fail {
                return Err(TelemetryError::publish(
                    self.name(),
                    batch.len(),
                    "injected failure",
                ));
            }

            self.batches.lock().push(batch.to_vec());
            self.published.notify_waiters();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Dimension;

    fn sample(name: &str) -> MetricSample {
        MetricSample::new(name, 1.0, vec![Dimension::new("Service", "test")])
    }

    #[test]
    fn test_metric_key_sanitizes() {
        assert_eq!(
            RecorderSink::metric_key("Nimbus/Functions", "ProcessingTime"),
            "nimbus_functions_processingtime"
        );
        assert_eq!(RecorderSink::metric_key("Nimbus", "2xx"), "nimbus_2xx");
    }

    #[tokio::test]
    async fn test_memory_sink_records_batches() {
        let sink = MemorySink::new();
        sink.publish("ns", &[sample("Errors"), sample("Successful")])
            .await
            .unwrap();
        sink.publish("ns", &[sample("Errors")]).await.unwrap();

        assert_eq!(sink.batches().len(), 2);
        assert_eq!(sink.samples_named("Errors").len(), 2);
        assert_eq!(sink.publish_calls(), 2);
    }

    #[tokio::test]
    async fn test_memory_sink_injected_failures() {
        let sink = MemorySink::new();
        sink.fail_next(1);

        let first = sink.publish("ns", &[sample("Errors")]).await;
        assert!(matches!(first, Err(TelemetryError::Publish { count: 1, .. })));

        sink.publish("ns", &[sample("Errors")]).await.unwrap();
        assert_eq!(sink.samples().len(), 1);
        assert_eq!(sink.publish_calls(), 2);
    }

    #[tokio::test]
    async fn test_log_and_recorder_sinks_accept_batches() {
        let batch = [sample("ProcessingTime"), sample("Invocations")];
        assert!(LogSink.publish("ns", &batch).await.is_ok());
        // Without an installed recorder the facade is a no-op.
        assert!(RecorderSink.publish("ns", &batch).await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_samples_times_out() {
        let sink = MemorySink::new();
        assert!(!sink.wait_for_samples(1, Duration::from_millis(10)).await);
    }
}

//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur during telemetry operations.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A sink rejected a batch of samples.
    #[error("Failed to publish {count} samples to {sink}: {message}")]
    Publish {
        /// Name of the sink.
        sink: &'static str,
        /// Samples in the rejected sub-batch.
        count: usize,
        /// Sink-provided reason.
        message: String,
    },

    /// The background flush loop could not be started or stopped.
    #[error("Metrics buffer error: {0}")]
    Buffer(String),

    /// Failed to install the Prometheus exporter.
    #[error("Failed to initialize exporter: {0}")]
    ExporterInit(String),

    /// Failed to initialize logging.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Failed to parse address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl TelemetryError {
    /// Creates a publish error.
    pub fn publish(sink: &'static str, count: usize, message: impl Into<String>) -> Self {
        Self::Publish {
            sink,
            count,
            message: message.into(),
        }
    }
}

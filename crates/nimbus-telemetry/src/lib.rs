//! Observability for Nimbus functions.
//!
//! This crate provides the telemetry side of the interceptor pipeline:
//!
//! - **Metrics buffer**: [`MetricsBuffer`] accepts samples on the request path
//!   and publishes them in the background
//! - **Sinks**: [`MetricsSink`] implementations the buffer publishes to
//! - **Export**: a Prometheus scrape endpoint fed by [`RecorderSink`]
//! - **Logging**: structured JSON or pretty logging via `tracing-subscriber`
//!
//! # Architecture
//!
//! ```text
//!   interceptors ──add_metric──▶ ┌───────────────┐
//!                                │ MetricsBuffer │──threshold / timer / shutdown
//!                                └───────┬───────┘
//!                                        │ sub-batches of ≤ 20
//!                                        ▼
//!                 ┌──────────┬───────────────┬────────────┐
//!                 │ LogSink  │ RecorderSink  │ MemorySink │
//!                 └──────────┴───────┬───────┴────────────┘
//!                                    ▼
//!                           Prometheus /metrics
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nimbus_telemetry::{init_telemetry, MetricsBuffer, RecorderSink, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TelemetryConfig::builder()
//!         .service_name("images")
//!         .exporter_addr("0.0.0.0:9090")
//!         .build();
//!     init_telemetry(&config)?;
//!
//!     let buffer = MetricsBuffer::new(config.buffer.clone(), Arc::new(RecorderSink));
//!     buffer.start()?;
//!     // ... serve invocations ...
//!     buffer.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod buffer;
pub mod config;
pub mod error;
pub mod exporter;
pub mod logging;
pub mod sample;
pub mod sink;

pub use buffer::{BufferConfig, BufferStats, MetricsBuffer, MAX_PUBLISH_BATCH};
pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use exporter::{init_exporter, render_metrics, ExporterConfig};
pub use logging::{init_logging, LogConfig};
pub use sample::{Dimension, MetricSample, MetricUnit};
pub use sink::{BoxFuture, LogSink, MemorySink, MetricsSink, RecorderSink};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging and, when enabled, the Prometheus exporter.
///
/// The metrics buffer is not global; create one per pipeline with
/// [`MetricsBuffer::new`].
///
/// # Errors
///
/// Returns `TelemetryError` if any subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_exporter(&config.exporter)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_with_everything_disabled() {
        let config = TelemetryConfig::builder()
            .logging(LogConfig {
                enabled: false,
                ..LogConfig::default()
            })
            .build();
        assert!(init_telemetry(&config).is_ok());
    }
}

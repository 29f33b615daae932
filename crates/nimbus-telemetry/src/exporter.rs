//! Prometheus scrape endpoint.
//!
//! Installs the `metrics-exporter-prometheus` recorder so that samples
//! forwarded by [`RecorderSink`](crate::RecorderSink) can be scraped. The
//! recorder is process-global; the handle is kept for [`render_metrics`].

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use nimbus_config::ExporterSection;

use crate::error::TelemetryError;
use crate::sink::RecorderSink;
use crate::TelemetryResult;

static EXPORTER_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Exporter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    /// Whether to install the exporter.
    pub enabled: bool,

    /// Address to serve `/metrics` on (e.g. "0.0.0.0:9090").
    pub addr: String,

    /// Namespace used for metric descriptions.
    pub namespace: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
            namespace: "Nimbus/Functions".to_string(),
        }
    }
}

impl ExporterConfig {
    /// Builds an exporter configuration from the `[telemetry.exporter]` section.
    #[must_use]
    pub fn from_section(section: &ExporterSection, namespace: &str) -> Self {
        Self {
            enabled: section.enabled,
            addr: section.addr.clone(),
            namespace: namespace.to_string(),
        }
    }

    /// Parses the listen address.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::InvalidAddress` if `addr` is not a socket address.
    pub fn socket_addr(&self) -> TelemetryResult<SocketAddr> {
        self.addr
            .parse()
            .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", self.addr)))
    }
}

/// Installs the Prometheus recorder and HTTP listener.
///
/// Must be called from within a tokio runtime when enabled. Does nothing
/// when disabled.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for a bad address, or
/// `TelemetryError::ExporterInit` if a recorder is already installed.
pub fn init_exporter(config: &ExporterConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr = config.socket_addr()?;

    let handle = PrometheusBuilder::new()
        .with_http_listener(addr)
        .install_recorder()
        .map_err(|e| TelemetryError::ExporterInit(e.to_string()))?;

    let _ = EXPORTER_HANDLE.set(handle);
    describe_standard_metrics(&config.namespace);

    tracing::info!(%addr, "prometheus exporter listening");
    Ok(())
}

/// Renders the current metrics in Prometheus text format.
///
/// Returns `None` if the exporter is not installed.
#[must_use]
pub fn render_metrics() -> Option<String> {
    EXPORTER_HANDLE.get().map(PrometheusHandle::render)
}

fn describe_standard_metrics(namespace: &str) {
    let key = |name: &str| RecorderSink::metric_key(namespace, name);

    describe_histogram!(key("ProcessingTime"), "Handler processing time in milliseconds");
    describe_counter!(key("Successful"), "Invocations that completed without error");
    describe_counter!(key("Errors"), "Invocations that failed");
    describe_counter!(key("ClientErrors"), "API invocations answered with a 4xx status");
    describe_counter!(key("ServerErrors"), "API invocations answered with a 5xx status");
    describe_counter!(key("Invocations"), "Batch and scheduled invocations");
    describe_counter!(key("BatchSize"), "Records received by batch invocations");
    describe_histogram!(
        key("AverageItemProcessingTime"),
        "Average per-record processing time in milliseconds"
    );
}

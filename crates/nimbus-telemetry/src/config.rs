//! Telemetry configuration.

use nimbus_config::NimbusConfig;

use crate::buffer::BufferConfig;
use crate::exporter::ExporterConfig;
use crate::logging::LogConfig;

/// Configuration for all telemetry subsystems.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name (used in logs and metric dimensions).
    pub service_name: String,

    /// Logging configuration.
    pub logging: LogConfig,

    /// Prometheus exporter configuration.
    pub exporter: ExporterConfig,

    /// Metrics buffer configuration.
    pub buffer: BufferConfig,
}

impl TelemetryConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::new()
    }

    /// Derives telemetry settings from a loaded Nimbus configuration.
    #[must_use]
    pub fn from_config(config: &NimbusConfig) -> Self {
        let pipeline = &config.pipeline;
        Self {
            service_name: pipeline.service_name.clone(),
            logging: LogConfig::from_section(&config.telemetry.logging, &pipeline.service_name),
            exporter: ExporterConfig::from_section(
                &config.telemetry.exporter,
                &pipeline.metrics_namespace,
            ),
            buffer: BufferConfig::from_pipeline(pipeline),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::from_config(&NimbusConfig::default())
    }
}

/// Builder for [`TelemetryConfig`].
#[derive(Debug, Default)]
pub struct TelemetryConfigBuilder {
    service_name: Option<String>,
    logging: Option<LogConfig>,
    exporter: Option<ExporterConfig>,
    buffer: Option<BufferConfig>,
}

impl TelemetryConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the service name.
    #[must_use]
    pub fn service_name(mut self, name: &str) -> Self {
        self.service_name = Some(name.to_string());
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn logging(mut self, config: LogConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// Sets the exporter configuration.
    #[must_use]
    pub fn exporter(mut self, config: ExporterConfig) -> Self {
        self.exporter = Some(config);
        self
    }

    /// Sets the buffer configuration.
    #[must_use]
    pub fn buffer(mut self, config: BufferConfig) -> Self {
        self.buffer = Some(config);
        self
    }

    /// Enables the exporter on `addr`.
    #[must_use]
    pub fn exporter_addr(mut self, addr: &str) -> Self {
        let config = self.exporter.take().unwrap_or_default();
        self.exporter = Some(ExporterConfig {
            enabled: true,
            addr: addr.to_string(),
            ..config
        });
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        let defaults = TelemetryConfig::default();

        let service_name = self.service_name.unwrap_or(defaults.service_name);

        let mut logging = self.logging.unwrap_or(defaults.logging);
        logging.service_name = service_name.clone();

        let buffer = self.buffer.unwrap_or(defaults.buffer);

        let mut exporter = self.exporter.unwrap_or(defaults.exporter);
        exporter.namespace = buffer.namespace.clone();

        TelemetryConfig {
            service_name,
            logging,
            exporter,
            buffer,
        }
    }
}

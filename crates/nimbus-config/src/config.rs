//! Main configuration types.
//!
//! This module provides the top-level [`NimbusConfig`] struct.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, LogFormat, PipelineConfig, TelemetrySection};

/// Complete Nimbus function configuration.
///
/// This is the root configuration type that contains all configuration sections.
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use nimbus_config::NimbusConfig;
///
/// let config = NimbusConfig::default();
/// assert_eq!(config.pipeline.metrics_namespace, "Nimbus/Functions");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct NimbusConfig {
    /// Interceptor pipeline configuration.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging and exporter configuration.
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

impl NimbusConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - `pipeline.batch_size` is zero
    /// - `pipeline.max_body_log_length` is zero
    /// - `pipeline.service_name` or `pipeline.metrics_namespace` is empty
    /// - the exporter is enabled with an address that is not a socket address
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_pipeline(&self.pipeline)?;

        let exporter = &self.telemetry.exporter;
        if exporter.enabled && exporter.addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "telemetry.exporter.addr",
                format!("invalid socket address: {}", exporter.addr),
            ));
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// Pretty, colored debug logs and a short flush interval so metric lines
    /// show up quickly during local runs.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.ansi_enabled = true;

        config.pipeline.detailed_request_log = true;
        config.pipeline.detailed_response_log = true;
        config.pipeline.flush_interval_secs = 5;

        config
    }

    /// Create a production configuration preset.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.logging.ansi_enabled = false;

        config
    }
}

/// Validates a pipeline section on its own.
///
/// Used by [`NimbusConfig::validate`] and by adapters that receive a
/// [`PipelineConfig`] directly.
pub fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    if pipeline.batch_size == 0 {
        return Err(ConfigError::invalid_value(
            "pipeline.batch_size",
            "must be at least 1",
        ));
    }

    if pipeline.max_body_log_length == 0 {
        return Err(ConfigError::invalid_value(
            "pipeline.max_body_log_length",
            "must be at least 1",
        ));
    }

    if pipeline.service_name.trim().is_empty() {
        return Err(ConfigError::invalid_value(
            "pipeline.service_name",
            "must not be empty",
        ));
    }

    if pipeline.metrics_namespace.trim().is_empty() {
        return Err(ConfigError::invalid_value(
            "pipeline.metrics_namespace",
            "must not be empty",
        ));
    }

    Ok(())
}

//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Name of the standard logging interceptor.
pub const LOGGING_INTERCEPTOR: &str = "logging";

/// Name of the standard metrics interceptor.
pub const METRICS_INTERCEPTOR: &str = "metrics";

/// Name of the standard auth interceptor.
pub const AUTH_INTERCEPTOR: &str = "auth";

/// Interceptor pipeline configuration section.
///
/// Controls which standard interceptors are registered, how the metrics
/// buffer batches samples, and what the logging interceptor records.
///
/// # Example
///
/// ```
/// use nimbus_config::PipelineConfig;
///
/// let config = PipelineConfig::default();
/// assert_eq!(config.batch_size, 20);
/// assert_eq!(config.default_interceptor_names(), vec!["logging", "metrics", "auth"]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Register the auth interceptor.
    #[serde(default = "default_true")]
    pub auth_enabled: bool,

    /// Register the metrics interceptor.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Register the logging interceptor.
    #[serde(default = "default_true")]
    pub logging_enabled: bool,

    /// `Service` dimension on every metric sample.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// `Operation` dimension; empty means "derive from the trigger".
    #[serde(default)]
    pub operation_name: String,

    /// `FunctionName` dimension; empty when the platform does not say.
    #[serde(default)]
    pub function_name: String,

    /// Namespace the metrics sink publishes under.
    #[serde(default = "default_metrics_namespace")]
    pub metrics_namespace: String,

    /// Buffered samples that trigger an early flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Seconds between timer flushes; `0` disables the timer.
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,

    /// Log request headers and body.
    #[serde(default)]
    pub detailed_request_log: bool,

    /// Log response headers and body.
    #[serde(default)]
    pub detailed_response_log: bool,

    /// Log (masked) headers.
    #[serde(default)]
    pub include_headers: bool,

    /// Log query parameters.
    #[serde(default = "default_true")]
    pub include_query_params: bool,

    /// Log bodies when detailed logging is on.
    #[serde(default)]
    pub include_body: bool,

    /// Bodies longer than this are truncated in logs.
    #[serde(default = "default_max_body_log_length")]
    pub max_body_log_length: usize,

    /// Header names whose values are masked in logs (case-insensitive).
    #[serde(default = "default_sensitive_headers")]
    pub sensitive_header_names: BTreeSet<String>,

    /// Extra interceptor names appended after the standard ones.
    #[serde(default)]
    pub additional_interceptors: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            auth_enabled: true,
            metrics_enabled: true,
            logging_enabled: true,
            service_name: default_service_name(),
            operation_name: String::new(),
            function_name: String::new(),
            metrics_namespace: default_metrics_namespace(),
            batch_size: default_batch_size(),
            flush_interval_secs: default_flush_interval(),
            detailed_request_log: false,
            detailed_response_log: false,
            include_headers: false,
            include_query_params: true,
            include_body: false,
            max_body_log_length: default_max_body_log_length(),
            sensitive_header_names: default_sensitive_headers(),
            additional_interceptors: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Returns the flush timer period, or `None` when the timer is disabled.
    #[must_use]
    pub fn flush_interval(&self) -> Option<Duration> {
        (self.flush_interval_secs > 0).then(|| Duration::from_secs(self.flush_interval_secs))
    }

    /// Returns the interceptor names in chain order, outermost first.
    ///
    /// Logging wraps metrics wraps auth; disabled interceptors are left out and
    /// [`additional_interceptors`](Self::additional_interceptors) follow.
    #[must_use]
    pub fn default_interceptor_names(&self) -> Vec<String> {
        let standard = [
            (self.logging_enabled, LOGGING_INTERCEPTOR),
            (self.metrics_enabled, METRICS_INTERCEPTOR),
            (self.auth_enabled, AUTH_INTERCEPTOR),
        ];

        standard
            .into_iter()
            .filter(|(enabled, _)| *enabled)
            .map(|(_, name)| name.to_string())
            .chain(self.additional_interceptors.iter().cloned())
            .collect()
    }

    /// Returns `true` if `name` is a sensitive header (case-insensitive).
    #[must_use]
    pub fn is_sensitive_header(&self, name: &str) -> bool {
        self.sensitive_header_names
            .iter()
            .any(|sensitive| sensitive.eq_ignore_ascii_case(name))
    }
}

fn default_true() -> bool {
    true
}

fn default_service_name() -> String {
    "nimbus".to_string()
}

fn default_metrics_namespace() -> String {
    "Nimbus/Functions".to_string()
}

fn default_batch_size() -> usize {
    20
}

fn default_flush_interval() -> u64 {
    60
}

fn default_max_body_log_length() -> usize {
    1000
}

fn default_sensitive_headers() -> BTreeSet<String> {
    ["Authorization", "X-Api-Key", "Cookie", "X-Amz-Security-Token"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Telemetry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingSection,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub exporter: ExporterSection,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Install the subscriber at startup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `EnvFilter` directive, e.g. `info` or `nimbus=debug,info`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Colored output (pretty format only).
    #[serde(default)]
    pub ansi_enabled: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::Json,
            ansi_enabled: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Prometheus exporter configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExporterSection {
    /// Serve the scrape endpoint.
    #[serde(default)]
    pub enabled: bool,

    /// Scrape endpoint address.
    #[serde(default = "default_exporter_addr")]
    pub addr: String,
}

impl Default for ExporterSection {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_exporter_addr(),
        }
    }
}

fn default_exporter_addr() -> String {
    "0.0.0.0:9090".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_defaults() {
        let config = PipelineConfig::default();
        assert!(config.auth_enabled && config.metrics_enabled && config.logging_enabled);
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.flush_interval(), Some(Duration::from_secs(60)));
        assert_eq!(config.max_body_log_length, 1000);
        assert!(config.include_query_params);
        assert!(!config.include_headers);
        assert_eq!(config.sensitive_header_names.len(), 4);
    }

    #[test]
    fn test_omitted_fields_take_defaults() {
        let config: PipelineConfig = toml::from_str("batch_size = 5").unwrap();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.flush_interval_secs, 60);
        assert!(config.is_sensitive_header("Cookie"));
    }

    #[test]
    fn test_zero_interval_disables_timer() {
        let config = PipelineConfig {
            flush_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.flush_interval(), None);
    }

    #[test]
    fn test_interceptor_names_skip_disabled() {
        let config = PipelineConfig {
            metrics_enabled: false,
            additional_interceptors: vec!["audit".to_string()],
            ..Default::default()
        };
        assert_eq!(config.default_interceptor_names(), vec!["logging", "auth", "audit"]);
    }

    #[test]
    fn test_sensitive_header_match_ignores_case() {
        let config = PipelineConfig::default();
        assert!(config.is_sensitive_header("authorization"));
        assert!(config.is_sensitive_header("x-amz-security-token"));
        assert!(!config.is_sensitive_header("Content-Type"));
    }

    #[test]
    fn test_log_format_serialization() {
        let section: LoggingSection = toml::from_str(r#"format = "pretty""#).unwrap();
        assert_eq!(section.format, LogFormat::Pretty);
        assert_eq!(section.level, "info");
    }
}

//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::{ConfigError, LogFormat, NimbusConfig};

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use nimbus_config::ConfigLoader;
///
/// # fn main() -> Result<(), nimbus_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("nimbus.toml")?
///     .with_env_prefix("NIMBUS")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: NimbusConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader seeded with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: NimbusConfig::default(),
            env_prefix: None,
        }
    }

    /// Start with development preset configuration.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = NimbusConfig::development();
        self
    }

    /// Start with production preset configuration.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = NimbusConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// Supports TOML (.toml) and JSON (.json) formats, chosen by extension.
    /// Fields the file omits take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The file contains invalid TOML/JSON
    /// - The file contains unknown fields
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;

        self.config = Self::parse(&content, &format)?;
        Ok(self)
    }

    /// Load configuration from an optional file.
    ///
    /// If the file exists, loads it. If not, silently continues.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails or the format is not `toml`/`json`.
    ///
    /// # Example
    ///
    /// ```
    /// use nimbus_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [pipeline]
    ///     batch_size = 50
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.pipeline.batch_size, 50);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = Self::parse(content, &format.to_lowercase())?;
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`.
    /// For example, with prefix "NIMBUS":
    /// - `NIMBUS__PIPELINE__AUTH_ENABLED=false`
    /// - `NIMBUS__PIPELINE__SENSITIVE_HEADER_NAMES=Authorization,Cookie`
    /// - `NIMBUS__TELEMETRY__LOGGING__LEVEL=debug`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment.
    ///
    /// A missing `.env` file is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EnvParseError` if the file exists but is malformed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::env_parse_error(".env", e.to_string())),
        }
    }

    /// Finalize and return the loaded configuration.
    ///
    /// Applies environment variable overrides (if a prefix was set) and
    /// validates the final configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an environment variable cannot be parsed or
    /// validation fails.
    pub fn load(mut self) -> Result<NimbusConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without validation.
    #[must_use]
    pub fn load_unvalidated(self) -> NimbusConfig {
        self.config
    }

    fn parse(content: &str, format: &str) -> Result<NimbusConfig, ConfigError> {
        match format {
            "toml" => Ok(toml::from_str(content)?),
            "json" => Ok(serde_json::from_str(content)?),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let mut vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect();
        vars.sort();

        for (key, value) in vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(key_without_prefix) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__"))
        else {
            return Ok(());
        };

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let pipeline = &mut self.config.pipeline;
        let telemetry = &mut self.config.telemetry;

        match parts.as_slice() {
            ["PIPELINE", "AUTH_ENABLED"] => pipeline.auth_enabled = parse_flag(key, value)?,
            ["PIPELINE", "METRICS_ENABLED"] => pipeline.metrics_enabled = parse_flag(key, value)?,
            ["PIPELINE", "LOGGING_ENABLED"] => pipeline.logging_enabled = parse_flag(key, value)?,
            ["PIPELINE", "SERVICE_NAME"] => pipeline.service_name = value.to_string(),
            ["PIPELINE", "OPERATION_NAME"] => pipeline.operation_name = value.to_string(),
            ["PIPELINE", "FUNCTION_NAME"] => pipeline.function_name = value.to_string(),
            ["PIPELINE", "METRICS_NAMESPACE"] => pipeline.metrics_namespace = value.to_string(),
            ["PIPELINE", "BATCH_SIZE"] => pipeline.batch_size = parse_number(key, value)?,
            ["PIPELINE", "FLUSH_INTERVAL_SECS"] => {
                pipeline.flush_interval_secs = parse_number(key, value)?;
            }
            ["PIPELINE", "DETAILED_REQUEST_LOG"] => {
                pipeline.detailed_request_log = parse_flag(key, value)?;
            }
            ["PIPELINE", "DETAILED_RESPONSE_LOG"] => {
                pipeline.detailed_response_log = parse_flag(key, value)?;
            }
            ["PIPELINE", "INCLUDE_HEADERS"] => pipeline.include_headers = parse_flag(key, value)?,
            ["PIPELINE", "INCLUDE_QUERY_PARAMS"] => {
                pipeline.include_query_params = parse_flag(key, value)?;
            }
            ["PIPELINE", "INCLUDE_BODY"] => pipeline.include_body = parse_flag(key, value)?,
            ["PIPELINE", "MAX_BODY_LOG_LENGTH"] => {
                pipeline.max_body_log_length = parse_number(key, value)?;
            }
            ["PIPELINE", "SENSITIVE_HEADER_NAMES"] => {
                pipeline.sensitive_header_names = split_list(value).collect();
            }
            ["PIPELINE", "ADDITIONAL_INTERCEPTORS"] => {
                pipeline.additional_interceptors = split_list(value).collect();
            }

            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                telemetry.logging.enabled = parse_flag(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => telemetry.logging.level = value.to_string(),
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["TELEMETRY", "LOGGING", "ANSI_ENABLED"] => {
                telemetry.logging.ansi_enabled = parse_flag(key, value)?;
            }
            ["TELEMETRY", "EXPORTER", "ENABLED"] => {
                telemetry.exporter.enabled = parse_flag(key, value)?;
            }
            ["TELEMETRY", "EXPORTER", "ADDR"] => telemetry.exporter.addr = value.to_string(),

            // Unknown keys are ignored so unrelated NIMBUS__ variables do not break startup.
            _ => {}
        }

        Ok(())
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
}

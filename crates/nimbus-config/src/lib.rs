//! Typed configuration system for Nimbus.
//!
//! This crate provides a strongly-typed configuration system for Nimbus
//! functions with support for:
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Overview
//!
//! The configuration system is built around the [`NimbusConfig`] struct:
//!
//! - [`PipelineConfig`] - which interceptors run, metrics batching, request logging
//! - [`TelemetrySection`] - log output and the Prometheus exporter
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration.
//!
//! # Example
//!
//! ```no_run
//! use nimbus_config::ConfigLoader;
//!
//! # fn main() -> Result<(), nimbus_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()?
//!     .with_optional_file("nimbus.toml")?
//!     .with_env_prefix("NIMBUS")
//!     .load()?;
//!
//! println!("Publishing metrics under {}", config.pipeline.metrics_namespace);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [pipeline]
//! auth_enabled = true
//! metrics_enabled = true
//! logging_enabled = true
//! service_name = "image-service"
//! function_name = "thumbnail"
//! metrics_namespace = "Nimbus/Functions"
//! batch_size = 20
//! flush_interval_secs = 60
//! include_query_params = true
//! max_body_log_length = 1000
//! sensitive_header_names = ["Authorization", "X-Api-Key", "Cookie", "X-Amz-Security-Token"]
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [telemetry.exporter]
//! enabled = false
//! addr = "0.0.0.0:9090"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden via environment variables using the format
//! `PREFIX__SECTION__KEY`. For example:
//!
//! - `NIMBUS__PIPELINE__METRICS_ENABLED=false`
//! - `NIMBUS__PIPELINE__BATCH_SIZE=50`
//! - `NIMBUS__TELEMETRY__LOGGING__LEVEL=debug`

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{validate_pipeline, NimbusConfig};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;

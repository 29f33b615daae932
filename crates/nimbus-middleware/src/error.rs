//! Middleware error types.
//!
//! These errors never reach the caller of an invocation; they describe
//! wiring and shutdown problems of the pipeline itself.

use nimbus_telemetry::TelemetryError;
use thiserror::Error;

/// Errors raised while assembling or shutting down the pipeline.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    /// An interceptor was requested without a dependency it needs.
    #[error("interceptor '{interceptor}' requires {dependency}")]
    MissingDependency {
        /// Interceptor name.
        interceptor: String,
        /// What was missing.
        dependency: &'static str,
    },

    /// The metrics buffer failed to start or flush.
    #[error("metrics buffer error: {0}")]
    Telemetry(#[from] TelemetryError),
}

impl MiddlewareError {
    /// Creates a missing dependency error.
    pub fn missing_dependency(interceptor: impl Into<String>, dependency: &'static str) -> Self {
        Self::MissingDependency {
            interceptor: interceptor.into(),
            dependency,
        }
    }
}

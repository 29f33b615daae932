//! Adapter construction errors.

use nimbus_config::ConfigError;
use nimbus_middleware::MiddlewareError;
use thiserror::Error;

/// Errors raised while wiring a pipeline or an adapter.
///
/// Invocation failures are [`NimbusError`](nimbus_core::NimbusError)s and
/// never use this type.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    Config(#[from] ConfigError),

    /// An interceptor could not be registered.
    #[error("pipeline wiring failed: {0}")]
    Middleware(#[from] MiddlewareError),
}

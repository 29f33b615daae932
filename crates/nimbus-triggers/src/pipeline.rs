//! Shared pipeline state for the trigger adapters.
//!
//! A [`Pipeline`] bundles the configuration, the interceptor registry and
//! the metrics buffer. Build it once at process start and hand it to every
//! adapter; the adapters build their chains from it.

use crate::error::AdapterError;
use nimbus_config::{validate_pipeline, PipelineConfig, AUTH_INTERCEPTOR};
use nimbus_middleware::{
    AuthGate, BoxedHandler, Chain, InterceptorRegistry, MiddlewareError, StandardDeps,
};
use nimbus_telemetry::{MetricsBuffer, MetricsSink};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Process-lifetime pipeline shared by all adapters.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    registry: Arc<InterceptorRegistry>,
    buffer: Option<MetricsBuffer>,
}

impl Pipeline {
    /// Creates a builder.
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the registry.
    pub fn registry(&self) -> &Arc<InterceptorRegistry> {
        &self.registry
    }

    /// Returns the metrics buffer, if this pipeline created one.
    pub fn buffer(&self) -> Option<&MetricsBuffer> {
        self.buffer.as_ref()
    }

    /// Builds the configured chain from the registry.
    pub fn chain(&self) -> Chain {
        self.registry.build_chain(&self.config.default_interceptor_names())
    }

    /// Wraps `handler` with the configured chain.
    pub fn wrap(&self, handler: BoxedHandler) -> BoxedHandler {
        self.chain().then(handler)
    }

    /// Shuts down the registered interceptors, flushing buffered metrics.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("metrics_buffer", &self.buffer.is_some())
            .finish()
    }
}

/// Builder for [`Pipeline`].
///
/// # Example
///
/// ```
/// use nimbus_config::PipelineConfig;
/// use nimbus_triggers::Pipeline;
///
/// let config = PipelineConfig {
///     auth_enabled: false,
///     metrics_enabled: false,
///     ..PipelineConfig::default()
/// };
/// let pipeline = Pipeline::builder(config).build().unwrap();
/// assert_eq!(pipeline.chain().names(), vec!["logging"]);
/// ```
pub struct PipelineBuilder {
    config: PipelineConfig,
    auth_gate: Option<Arc<dyn AuthGate>>,
    metrics_sink: Option<Arc<dyn MetricsSink>>,
    registry: Option<Arc<InterceptorRegistry>>,
}

impl PipelineBuilder {
    /// Creates a builder for `config`.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            auth_gate: None,
            metrics_sink: None,
            registry: None,
        }
    }

    /// Sets the auth gate. Required when auth is enabled.
    pub fn auth_gate(mut self, gate: Arc<dyn AuthGate>) -> Self {
        self.auth_gate = Some(gate);
        self
    }

    /// Sets the sink the metrics buffer publishes to.
    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics_sink = Some(sink);
        self
    }

    /// Uses an existing registry instead of a fresh one.
    ///
    /// The standard interceptors are registered only if it is empty.
    pub fn registry(mut self, registry: Arc<InterceptorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validates the wiring and registers the standard interceptors.
    ///
    /// # Errors
    ///
    /// - [`AdapterError::Config`] if the configuration is invalid
    /// - [`AdapterError::Middleware`] if auth is enabled without a gate
    pub fn build(self) -> Result<Pipeline, AdapterError> {
        validate_pipeline(&self.config)?;

        if self.config.auth_enabled && self.auth_gate.is_none() {
            let err = MiddlewareError::missing_dependency(AUTH_INTERCEPTOR, "an auth gate");
            return Err(err.into());
        }

        let registry = self.registry.unwrap_or_default();
        let deps = StandardDeps {
            auth_gate: self.auth_gate,
            metrics_sink: self.metrics_sink,
        };
        let buffer = registry.ensure_standard(&self.config, deps)?;

        info!(
            service = %self.config.service_name,
            interceptors = ?self.config.default_interceptor_names(),
            registered = registry.count(),
            "pipeline ready"
        );

        Ok(Pipeline {
            config: Arc::new(self.config),
            registry,
            buffer,
        })
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("config", &self.config)
            .field("auth_gate", &self.auth_gate.is_some())
            .field("metrics_sink", &self.metrics_sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_telemetry::MemorySink;

    fn logging_only() -> PipelineConfig {
        PipelineConfig {
            auth_enabled: false,
            metrics_enabled: false,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_auth_without_gate_fails_closed() {
        let err = Pipeline::builder(PipelineConfig::default())
            .build()
            .unwrap_err();
        match err {
            AdapterError::Middleware(MiddlewareError::MissingDependency { interceptor, .. }) => {
                assert_eq!(interceptor, AUTH_INTERCEPTOR);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PipelineConfig {
            batch_size: 0,
            ..logging_only()
        };
        let err = Pipeline::builder(config).build().unwrap_err();
        assert!(matches!(err, AdapterError::Config(_)));
    }

    #[test]
    fn test_shared_registry_registers_once() {
        let registry = Arc::new(InterceptorRegistry::new());
        let first = Pipeline::builder(logging_only())
            .registry(Arc::clone(&registry))
            .build()
            .unwrap();
        let before = registry.get("logging").unwrap();

        let second = Pipeline::builder(logging_only())
            .registry(Arc::clone(&registry))
            .build()
            .unwrap();

        assert!(Arc::ptr_eq(&before, &registry.get("logging").unwrap()));
        assert!(Arc::ptr_eq(first.registry(), second.registry()));
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn test_metrics_pipeline_owns_buffer() {
        let config = PipelineConfig {
            auth_enabled: false,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::builder(config)
            .metrics_sink(Arc::new(MemorySink::new()))
            .build()
            .unwrap();

        let buffer = pipeline.buffer().unwrap();
        assert!(buffer.is_running());
        assert_eq!(pipeline.chain().names(), vec!["logging", "metrics"]);

        pipeline.shutdown().await;
        assert!(!buffer.is_running());
    }
}

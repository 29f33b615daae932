//! Named interceptor registry.
//!
//! The registry maps names to shared interceptor instances and assembles
//! [`Chain`]s from ordered name lists. It is created once per process and
//! handed to every trigger adapter.

use crate::chain::Chain;
use crate::error::MiddlewareError;
use crate::interceptor::BoxedInterceptor;
use crate::stages::{
    AuthGate, AuthInterceptor, LoggingInterceptor, LoggingSettings, MetricLabels,
    MetricsInterceptor,
};
use nimbus_config::{PipelineConfig, AUTH_INTERCEPTOR, LOGGING_INTERCEPTOR, METRICS_INTERCEPTOR};
use nimbus_telemetry::{BufferConfig, MetricsBuffer, MetricsSink};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Collaborators the standard interceptors need.
#[derive(Default, Clone)]
pub struct StandardDeps {
    /// Authenticates requests; required when auth is enabled.
    pub auth_gate: Option<Arc<dyn AuthGate>>,
    /// Receives published samples; metrics are not recorded without one.
    pub metrics_sink: Option<Arc<dyn MetricsSink>>,
}

impl StandardDeps {
    /// Creates an empty set of dependencies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the auth gate.
    #[must_use]
    pub fn with_auth_gate(mut self, gate: Arc<dyn AuthGate>) -> Self {
        self.auth_gate = Some(gate);
        self
    }

    /// Sets the metrics sink.
    #[must_use]
    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics_sink = Some(sink);
        self
    }
}

impl fmt::Debug for StandardDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardDeps")
            .field("auth_gate", &self.auth_gate.is_some())
            .field("metrics_sink", &self.metrics_sink.is_some())
            .finish()
    }
}

/// A table of named interceptors.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use nimbus_middleware::{InterceptorRegistry, LoggingInterceptor};
///
/// let registry = InterceptorRegistry::new();
/// registry.register("logging", Arc::new(LoggingInterceptor::default()));
///
/// let chain = registry.build_chain(&["logging", "unknown"]);
/// assert_eq!(chain.names(), vec!["logging"]);
/// ```
#[derive(Default)]
pub struct InterceptorRegistry {
    entries: RwLock<HashMap<String, BoxedInterceptor>>,
    setup: Mutex<()>,
    retiring: Mutex<JoinSet<()>>,
}

impl InterceptorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `interceptor` under `name`.
    ///
    /// Returns the entry it replaced. The caller owns the replaced
    /// interceptor; [`shutdown`](Self::shutdown) no longer reaches it.
    pub fn register(
        &self,
        name: impl Into<String>,
        interceptor: BoxedInterceptor,
    ) -> Option<BoxedInterceptor> {
        let name = name.into();
        let replaced = self.entries.write().insert(name.clone(), interceptor);
        if replaced.is_some() {
            info!(interceptor = %name, "interceptor replaced");
        } else {
            debug!(interceptor = %name, "interceptor registered");
        }
        replaced
    }

    /// Registers a standard interceptor and shuts down the one it replaces.
    fn register_owned(&self, name: &'static str, interceptor: BoxedInterceptor) {
        let Some(old) = self.register(name, interceptor) else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(interceptor = name, "no runtime to shut down replaced interceptor");
            return;
        };
        self.retiring.lock().spawn_on(
            async move {
                match old.shutdown().await {
                    Ok(()) => debug!(interceptor = name, "replaced interceptor shut down"),
                    Err(err) => error!(
                        interceptor = name,
                        error = %err,
                        "replaced interceptor shutdown failed"
                    ),
                }
            },
            &runtime,
        );
    }

    /// Removes and returns the interceptor registered under `name`.
    pub fn unregister(&self, name: &str) -> Option<BoxedInterceptor> {
        self.entries.write().remove(name)
    }

    /// Returns the interceptor registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<BoxedInterceptor> {
        self.entries.read().get(name).cloned()
    }

    /// Returns the registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered interceptors.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    /// Builds a chain from `names`, outermost first.
    ///
    /// Unknown names are skipped with a warning. The chain holds the
    /// interceptor instances, so later registry changes do not affect it.
    pub fn build_chain<S: AsRef<str>>(&self, names: &[S]) -> Chain {
        let entries = self.entries.read();
        let mut chain = Chain::new();
        for name in names {
            let name = name.as_ref();
            match entries.get(name) {
                Some(interceptor) => chain = chain.with(Arc::clone(interceptor)),
                None => warn!(interceptor = %name, "unknown interceptor skipped"),
            }
        }
        chain
    }

    /// Registers the standard interceptors enabled in `config`.
    ///
    /// Returns the metrics buffer when metrics are enabled and a sink was
    /// supplied. The buffer's timer is started if a runtime is available.
    ///
    /// Entries already registered under a standard name are replaced and
    /// shut down in the background, so a replaced metrics buffer still
    /// flushes. Chains built from them stop recording metrics. Prefer
    /// [`ensure_standard`](Self::ensure_standard) for shared registries.
    ///
    /// # Errors
    ///
    /// Returns [`MiddlewareError::MissingDependency`] if auth is enabled
    /// without an auth gate. Nothing is registered in that case.
    pub fn register_standard(
        &self,
        config: &PipelineConfig,
        deps: StandardDeps,
    ) -> Result<Option<MetricsBuffer>, MiddlewareError> {
        let auth = if config.auth_enabled {
            let gate = deps.auth_gate.ok_or_else(|| {
                MiddlewareError::missing_dependency(AUTH_INTERCEPTOR, "an auth gate")
            })?;
            Some(AuthInterceptor::new(gate))
        } else {
            None
        };

        if config.logging_enabled {
            let settings = LoggingSettings::from_config(config);
            self.register_owned(LOGGING_INTERCEPTOR, Arc::new(LoggingInterceptor::new(settings)));
        }

        let mut buffer = None;
        if config.metrics_enabled {
            let labels = MetricLabels::from_config(config);
            let interceptor = match deps.metrics_sink {
                Some(sink) => {
                    let created = MetricsBuffer::new(BufferConfig::from_pipeline(config), sink);
                    if let Err(err) = created.start() {
                        warn!(error = %err, "metrics flush timer not started");
                    }
                    buffer = Some(created.clone());
                    MetricsInterceptor::new(created, labels)
                }
                None => {
                    warn!("metrics enabled without a sink; samples will not be recorded");
                    MetricsInterceptor::disabled(labels)
                }
            };
            self.register_owned(METRICS_INTERCEPTOR, Arc::new(interceptor));
        }

        if let Some(auth) = auth {
            self.register_owned(AUTH_INTERCEPTOR, Arc::new(auth));
        }

        for name in &config.additional_interceptors {
            info!(
                interceptor = %name,
                registered = self.get(name).is_some(),
                "additional interceptor requested"
            );
        }

        Ok(buffer)
    }

    /// Registers the standard interceptors if the registry is empty.
    ///
    /// Concurrent callers are serialized, so only the first one registers.
    /// Later calls return `Ok(None)` and leave the registry untouched.
    ///
    /// # Errors
    ///
    /// Same as [`register_standard`](Self::register_standard).
    pub fn ensure_standard(
        &self,
        config: &PipelineConfig,
        deps: StandardDeps,
    ) -> Result<Option<MetricsBuffer>, MiddlewareError> {
        let _guard = self.setup.lock();
        if self.count() > 0 {
            debug!(count = self.count(), "interceptors already registered");
            return Ok(None);
        }
        self.register_standard(config, deps)
    }

    /// Shuts down every registered interceptor.
    ///
    /// Waits for replaced standard interceptors to finish shutting down
    /// first. Failures are logged and do not stop the remaining shutdowns.
    pub async fn shutdown(&self) {
        let mut retiring = std::mem::take(&mut *self.retiring.lock());
        while let Some(joined) = retiring.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "replaced interceptor shutdown panicked");
            }
        }

        let entries: Vec<(String, BoxedInterceptor)> = self
            .entries
            .read()
            .iter()
            .map(|(name, interceptor)| (name.clone(), Arc::clone(interceptor)))
            .collect();

        for (name, interceptor) in entries {
            match interceptor.shutdown().await {
                Ok(()) => debug!(interceptor = %name, "interceptor shut down"),
                Err(err) => error!(interceptor = %name, error = %err, "interceptor shutdown failed"),
            }
        }
    }
}

impl fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorRegistry")
            .field("names", &self.names())
            .finish()
    }
}

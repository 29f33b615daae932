//! # Nimbus
//!
//! **Cross-cutting request processing for serverless functions**
//!
//! Nimbus wraps business handlers in a composable interceptor pipeline and
//! publishes invocation metrics through a background buffer:
//!
//! - **Interceptors** – logging, metrics and authentication, chained in a
//!   declared order
//! - **Trigger adapters** – request/response, change-notification batches
//!   and scheduled ticks
//! - **Metrics buffer** – threshold and timer flushes, never on the
//!   request's return path
//! - **Layered configuration** – defaults, TOML/JSON files, `NIMBUS__*`
//!   environment variables
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nimbus::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().with_env_prefix("NIMBUS").load()?;
//!     init_telemetry(&TelemetryConfig::from_config(&config))?;
//!
//!     let pipeline = Pipeline::builder(config.pipeline)
//!         .auth_gate(Arc::new(BearerTokenGate::new(verifier())))
//!         .metrics_sink(Arc::new(RecorderSink))
//!         .build()?;
//!
//!     let api = ApiAdapter::new(&pipeline, handler_fn(|ctx, _event| async move {
//!         let user = ctx.principal().map(|p| p.id.clone()).unwrap_or_default();
//!         Ok(Outcome::Response(ApiResponse::ok(user)))
//!     }));
//!
//!     let response = api.respond(ApiRequest::new("GET", "/images")).await;
//!     println!("{}", response.status_code);
//!
//!     pipeline.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! trigger ─▶ adapter ─▶ logging ─▶ metrics ─▶ auth ─▶ handler
//!                                    │
//!                                    ▼
//!                             MetricsBuffer ─▶ MetricsSink
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use nimbus_core as core;

// Re-export configuration
pub use nimbus_config as config;

// Re-export telemetry
pub use nimbus_telemetry as telemetry;

// Re-export the interceptor pipeline
pub use nimbus_middleware as middleware;

// Re-export trigger adapters
pub use nimbus_triggers as triggers;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```
/// use nimbus::prelude::*;
///
/// let config = PipelineConfig::default();
/// assert_eq!(config.default_interceptor_names(), vec!["logging", "metrics", "auth"]);
/// ```
pub mod prelude {
    pub use nimbus_core::{
        ApiRequest, ApiResponse, ChangeBatch, ChangeRecord, InvocationResult, NimbusError,
        NimbusResult, Outcome, Principal, RequestContext, RequestId, ScheduledEvent, TriggerEvent,
        TriggerKind,
    };

    pub use nimbus_config::{ConfigError, ConfigLoader, NimbusConfig, PipelineConfig};

    pub use nimbus_telemetry::{
        init_telemetry, Dimension, LogSink, MemorySink, MetricSample, MetricsBuffer, MetricsSink,
        RecorderSink, TelemetryConfig,
    };

    pub use nimbus_middleware::{
        handler_fn, AuthGate, AuthOutcome, BearerTokenGate, BoxedHandler, Chain, Interceptor,
        InterceptorRegistry, InvocationContext, Next, TokenVerifier, VerifiedUser, VerifyError,
    };

    pub use nimbus_triggers::{
        for_each_record, AdapterError, ApiAdapter, BatchAdapter, BatchReport, Pipeline,
        ScheduledAdapter,
    };
}

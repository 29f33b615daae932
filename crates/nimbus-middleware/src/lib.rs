//! # Nimbus Middleware
//!
//! The interceptor pipeline that wraps every Nimbus function.
//!
//! Interceptors are registered by name in an [`InterceptorRegistry`] and
//! composed into a [`Chain`] from an ordered name list. The first name is
//! the outermost layer:
//!
//! ```text
//! trigger ─▶ logging ─▶ metrics ─▶ auth ─▶ handler
//!                                            │
//! result  ◀─ logging ◀─ metrics ◀─ auth ◀────┘
//! ```
//!
//! | Interceptor | Purpose |
//! |-------------|---------|
//! | `logging` | `invocation` span, request and completion logs, header masking |
//! | `metrics` | Duration, success/error, status class and per-trigger samples |
//! | `auth` | Authenticates requests and attaches the [`Principal`](nimbus_core::Principal) |
//!
//! Any interceptor may short-circuit by returning without running
//! [`Next`]. Handler results and errors pass through every layer unchanged.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use nimbus_core::{fixtures, ApiResponse, Outcome, TriggerKind};
//! use nimbus_middleware::{handler_fn, InterceptorRegistry, InvocationContext, LoggingInterceptor};
//!
//! # tokio_test::block_on(async {
//! let registry = InterceptorRegistry::new();
//! registry.register("logging", Arc::new(LoggingInterceptor::default()));
//!
//! let handler = registry
//!     .build_chain(&["logging"])
//!     .then(handler_fn(|_ctx, _event| async { Ok(Outcome::Response(ApiResponse::ok("hi"))) }));
//!
//! let mut ctx = InvocationContext::new(TriggerKind::Api);
//! let outcome = handler
//!     .call(&mut ctx, fixtures::api_request("GET", "/").into())
//!     .await
//!     .unwrap();
//! assert_eq!(outcome.response().map(|r| r.status_code), Some(200));
//! # });
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod context;
pub mod error;
pub mod handler;
pub mod interceptor;
pub mod registry;
pub mod stages;

pub use chain::Chain;
pub use context::InvocationContext;
pub use error::MiddlewareError;
pub use handler::{handler_fn, BoxFuture, BoxedHandler, FnHandler, Handler};
pub use interceptor::{BoxedInterceptor, Interceptor, Next};
pub use registry::{InterceptorRegistry, StandardDeps};
pub use stages::{
    AuthGate, AuthInterceptor, AuthOutcome, BearerTokenGate, LoggingInterceptor, LoggingSettings,
    MetricLabels, MetricsInterceptor, TokenVerifier, VerifiedUser, VerifyError,
};

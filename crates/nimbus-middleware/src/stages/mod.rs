//! The standard interceptors.
//!
//! Registered under the names in `nimbus_config` and chained outermost
//! first:
//!
//! 1. [`logging`] - invocation span, request and completion logs
//! 2. [`metrics`] - per-trigger samples into the metrics buffer
//! 3. [`auth`] - principal injection through an [`AuthGate`]

pub mod auth;
pub mod logging;
pub mod metrics;

pub use auth::{
    AuthGate, AuthInterceptor, AuthOutcome, BearerTokenGate, TokenVerifier, VerifiedUser,
    VerifyError, AUTHORIZATION_HEADER,
};
pub use logging::{LoggingInterceptor, LoggingSettings};
pub use metrics::{status_class, MetricLabels, MetricsInterceptor};

//! # Nimbus Core
//!
//! Core types shared by every crate of the Nimbus trigger pipeline.
//!
//! This crate provides the foundational types used throughout Nimbus:
//!
//! - [`RequestContext`] - Per-invocation view handed to business handlers
//! - [`RequestId`] - UUID v7 invocation identifier
//! - [`Principal`] - Authenticated caller derived by the auth gate
//! - [`TriggerEvent`] - The three trigger shapes (request/response, change batch, scheduled tick)
//! - [`NimbusError`] - Standard error taxonomy with HTTP status mapping
//!
//! Nothing in this crate performs I/O; the pipeline, telemetry and adapter
//! crates build on these types.

#![doc(html_root_url = "https://docs.rs/nimbus-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
pub mod fixtures;
mod identity;
mod trigger;

pub use context::{RequestContext, RequestId};
pub use error::{ErrorCategory, ErrorDetail, ErrorEnvelope, NimbusError, NimbusResult};
pub use identity::{Principal, ADMIN_ROLE, PREMIUM_ROLE};
pub use trigger::{
    ApiRequest, ApiResponse, ChangeBatch, ChangeRecord, InvocationResult, Outcome,
    ScheduledEvent, TriggerEvent, TriggerKind,
};

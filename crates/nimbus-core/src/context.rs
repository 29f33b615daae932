//! Invocation context types.
//!
//! The [`RequestContext`] is the read-only view of one invocation that
//! business handlers receive once every interceptor has run.

use crate::identity::Principal;
use crate::trigger::TriggerKind;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A unique identifier for each invocation, using UUID v7.
///
/// UUID v7 is time-ordered, which keeps log lines from one cold start
/// sortable by id.
///
/// # Example
///
/// ```
/// use nimbus_core::RequestId;
///
/// let id = RequestId::new();
/// println!("Invocation ID: {}", id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parses an upstream request id, falling back to a fresh one.
    ///
    /// Trigger payloads often carry the platform's own request id. When it is
    /// a UUID it is reused so logs correlate with the platform; anything else
    /// gets a new v7 id.
    #[must_use]
    pub fn parse_or_new(raw: Option<&str>) -> Self {
        raw.and_then(|value| Uuid::parse_str(value.trim()).ok())
            .map_or_else(Self::new, Self)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Read-only view of one invocation.
///
/// Carries the request id, the trigger kind, the operation name and, when the
/// auth interceptor accepted the caller, the [`Principal`].
///
/// # Example
///
/// ```
/// use nimbus_core::{Principal, RequestContext, TriggerKind};
///
/// let ctx = RequestContext::new(TriggerKind::Api)
///     .with_operation("GET /images")
///     .with_principal(Principal::new("u1"));
/// assert_eq!(ctx.principal().map(|p| p.id.as_str()), Some("u1"));
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: RequestId,
    trigger: TriggerKind,
    operation: Option<String>,
    principal: Option<Principal>,
    started_at: Instant,
}

impl RequestContext {
    /// Creates a new context with a fresh request ID and no principal.
    #[must_use]
    pub fn new(trigger: TriggerKind) -> Self {
        Self::with_request_id(RequestId::new(), trigger)
    }

    /// Creates a new context with the specified request ID.
    #[must_use]
    pub fn with_request_id(request_id: RequestId, trigger: TriggerKind) -> Self {
        Self {
            request_id,
            trigger,
            operation: None,
            principal: None,
            started_at: Instant::now(),
        }
    }

    /// Returns a new context with the specified operation name.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Returns a new context carrying the given principal.
    #[must_use]
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Overrides the start instant, used when the view is derived from a
    /// longer-lived pipeline context.
    #[must_use]
    pub fn started_at(mut self, started_at: Instant) -> Self {
        self.started_at = started_at;
        self
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns which trigger shape started this invocation.
    #[must_use]
    pub const fn trigger(&self) -> TriggerKind {
        self.trigger
    }

    /// Returns the operation name if set.
    #[must_use]
    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    /// Returns the authenticated principal, if any.
    #[must_use]
    pub const fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Returns the elapsed time since the invocation started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

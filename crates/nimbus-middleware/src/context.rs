//! Invocation context types.
//!
//! The [`InvocationContext`] carries state through the interceptor chain.
//! It is separate from [`RequestContext`] so interceptors can enrich it
//! (principal, operation) before business code sees an immutable view.

use nimbus_core::{Principal, RequestContext, RequestId, TriggerKind};
use std::time::{Duration, Instant};

/// Context that flows through the interceptor chain.
///
/// Created by a trigger adapter once per invocation and dropped when the
/// invocation returns. The principal never outlives it.
///
/// # Example
///
/// ```
/// use nimbus_core::{Principal, TriggerKind};
/// use nimbus_middleware::InvocationContext;
///
/// let mut ctx = InvocationContext::new(TriggerKind::Api);
/// ctx.set_principal(Principal::new("u1"));
///
/// assert_eq!(ctx.user_id(), Some("u1"));
/// assert_eq!(ctx.request_context().principal().map(|p| p.id.as_str()), Some("u1"));
/// ```
#[derive(Debug, Clone)]
pub struct InvocationContext {
    request_id: RequestId,
    trigger: TriggerKind,
    operation: Option<String>,
    principal: Option<Principal>,
    started_at: Instant,
}

impl InvocationContext {
    /// Creates a new context with a fresh request ID.
    #[must_use]
    pub fn new(trigger: TriggerKind) -> Self {
        Self::with_request_id(RequestId::new(), trigger)
    }

    /// Creates a context with a specific request ID.
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

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns which trigger started this invocation.
    #[must_use]
    pub const fn trigger(&self) -> TriggerKind {
        self.trigger
    }

    /// Returns the operation label, if set.
    #[must_use]
    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    /// Sets the operation label.
    pub fn set_operation(&mut self, operation: impl Into<String>) {
        self.operation = Some(operation.into());
    }

    /// Returns the authenticated principal, if any.
    #[must_use]
    pub const fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Attaches the authenticated principal.
    ///
    /// Only the auth interceptor should call this.
    pub fn set_principal(&mut self, principal: Principal) {
        self.principal = Some(principal);
    }

    /// Returns the principal's ID, if authenticated.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.principal.as_ref().map(|p| p.id.as_str())
    }

    /// Returns when the invocation started.
    #[must_use]
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the invocation started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Builds the read-only view handed to business handlers.
    #[must_use]
    pub fn request_context(&self) -> RequestContext {
        let mut view = RequestContext::with_request_id(self.request_id, self.trigger)
            .started_at(self.started_at);
        if let Some(operation) = &self.operation {
            view = view.with_operation(operation.clone());
        }
        if let Some(principal) = &self.principal {
            view = view.with_principal(principal.clone());
        }
        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_anonymous() {
        let ctx = InvocationContext::new(TriggerKind::Batch);
        assert!(ctx.principal().is_none());
        assert!(ctx.operation().is_none());
        assert_eq!(ctx.trigger(), TriggerKind::Batch);
    }

    #[test]
    fn test_request_context_view() {
        let id = RequestId::new();
        let mut ctx = InvocationContext::with_request_id(id, TriggerKind::Api);
        ctx.set_operation("GET /images");
        ctx.set_principal(Principal::new("u1"));

        let view = ctx.request_context();
        assert_eq!(view.request_id(), id);
        assert_eq!(view.operation(), Some("GET /images"));
        assert_eq!(view.principal().map(|p| p.id.as_str()), Some("u1"));
        assert_eq!(view.trigger(), TriggerKind::Api);
    }

    #[test]
    fn test_elapsed_is_monotonic() {
        let ctx = InvocationContext::new(TriggerKind::Scheduled);
        let first = ctx.elapsed();
        assert!(ctx.elapsed() >= first);
    }
}

//! Core interceptor trait and types.
//!
//! An [`Interceptor`] is one cross-cutting layer of the pipeline. It receives
//! the mutable context, the trigger event and a [`Next`] callback for the
//! layer below it, and decides whether and how to continue.
//!
//! # Example
//!
//! ```
//! use nimbus_core::{InvocationResult, TriggerEvent};
//! use nimbus_middleware::{BoxFuture, Interceptor, InvocationContext, Next};
//!
//! struct Timing;
//!
//! impl Interceptor for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn intercept<'a>(
//!         &'a self,
//!         ctx: &'a mut InvocationContext,
//!         event: TriggerEvent,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, InvocationResult> {
//!         Box::pin(async move {
//!             let result = next.run(ctx, event).await;
//!             tracing::debug!(elapsed = ?ctx.elapsed(), "done");
//!             result
//!         })
//!     }
//! }
//! ```

use crate::context::InvocationContext;
use crate::error::MiddlewareError;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use nimbus_core::{InvocationResult, TriggerEvent};
use std::sync::Arc;

/// A shared, type-erased interceptor.
pub type BoxedInterceptor = Arc<dyn Interceptor>;

/// One layer of the interceptor chain.
///
/// # Invariants
///
/// - An interceptor calls `next.run()` at most once
/// - An interceptor that does not call `next` must return its own result
/// - Errors from `next` are returned unchanged
pub trait Interceptor: Send + Sync + 'static {
    /// Returns the interceptor's name for logs.
    fn name(&self) -> &'static str;

    /// Processes the event, usually by delegating to `next`.
    fn intercept<'a>(
        &'a self,
        ctx: &'a mut InvocationContext,
        event: TriggerEvent,
        next: Next<'a>,
    ) -> BoxFuture<'a, InvocationResult>;

    /// Releases resources held by the interceptor.
    ///
    /// Called once by [`InterceptorRegistry::shutdown`](crate::InterceptorRegistry::shutdown).
    fn shutdown(&self) -> BoxFuture<'_, Result<(), MiddlewareError>> {
        Box::pin(async { Ok(()) })
    }
}

impl dyn Interceptor {
    /// Wraps `next`, producing a handler that runs this interceptor first.
    #[must_use]
    pub fn wrap(self: Arc<Self>, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Wrapped {
            interceptor: self,
            next,
        })
    }
}

/// Callback to invoke the rest of the chain.
///
/// Consumed by [`run`](Next::run), so it can be invoked only once. Dropping
/// it without running short-circuits the chain.
pub struct Next<'a> {
    handler: &'a dyn Handler,
}

impl<'a> Next<'a> {
    /// Creates a `Next` that continues with `handler`.
    pub fn new(handler: &'a dyn Handler) -> Self {
        Self { handler }
    }

    /// Invokes the next layer or the business handler.
    pub async fn run(self, ctx: &mut InvocationContext, event: TriggerEvent) -> InvocationResult {
        self.handler.call(ctx, event).await
    }
}

struct Wrapped {
    interceptor: BoxedInterceptor,
    next: BoxedHandler,
}

impl Handler for Wrapped {
    fn call<'a>(
        &'a self,
        ctx: &'a mut InvocationContext,
        event: TriggerEvent,
    ) -> BoxFuture<'a, InvocationResult> {
        self.interceptor
            .intercept(ctx, event, Next::new(self.next.as_ref()))
    }
}

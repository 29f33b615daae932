//! The handler abstraction every chain terminates in.
//!
//! A [`Handler`] is anything that can process one [`TriggerEvent`] with a
//! mutable [`InvocationContext`]. Business handlers are usually closures
//! wrapped with [`handler_fn`]; a wrapped chain is itself a `Handler`, which
//! is what lets interceptors nest.

use crate::context::InvocationContext;
use nimbus_core::{InvocationResult, RequestContext, TriggerEvent};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A shared, type-erased handler.
pub type BoxedHandler = Arc<dyn Handler>;

/// Processes one invocation.
pub trait Handler: Send + Sync + 'static {
    /// Handles `event`.
    fn call<'a>(
        &'a self,
        ctx: &'a mut InvocationContext,
        event: TriggerEvent,
    ) -> BoxFuture<'a, InvocationResult>;
}

/// A handler built from an async function.
///
/// The function receives the read-only [`RequestContext`] view, so business
/// code sees the principal attached by the auth interceptor but cannot
/// change the pipeline's state.
pub struct FnHandler<F> {
    func: F,
}

impl<F> FnHandler<F> {
    /// Creates a new function-based handler.
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(RequestContext, TriggerEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = InvocationResult> + Send + 'static,
{
    fn call<'a>(
        &'a self,
        ctx: &'a mut InvocationContext,
        event: TriggerEvent,
    ) -> BoxFuture<'a, InvocationResult> {
        let fut = (self.func)(ctx.request_context(), event);
        Box::pin(fut)
    }
}

/// Wraps an async function as a [`BoxedHandler`].
///
/// # Example
///
/// ```
/// use nimbus_core::{ApiResponse, Outcome};
/// use nimbus_middleware::handler_fn;
///
/// let handler = handler_fn(|ctx, _event| async move {
///     let user = ctx.principal().map(|p| p.id.clone()).unwrap_or_default();
///     Ok(Outcome::Response(ApiResponse::ok(user)))
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(func: F) -> BoxedHandler
where
    F: Fn(RequestContext, TriggerEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = InvocationResult> + Send + 'static,
{
    Arc::new(FnHandler::new(func))
}

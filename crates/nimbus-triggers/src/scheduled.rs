//! Scheduled-tick adapter.

use crate::pipeline::Pipeline;
use nimbus_core::{NimbusError, ScheduledEvent, TriggerKind};
use nimbus_middleware::{BoxedHandler, InvocationContext};
use std::fmt;

/// Runs scheduled invocations through the pipeline.
///
/// The operation label is the event's source name, so each schedule gets
/// its own metric series.
#[derive(Clone)]
pub struct ScheduledAdapter {
    handler: BoxedHandler,
    names: Vec<&'static str>,
}

impl ScheduledAdapter {
    /// Wraps `handler` with the pipeline's chain.
    pub fn new(pipeline: &Pipeline, handler: BoxedHandler) -> Self {
        let chain = pipeline.chain();
        Self {
            names: chain.names(),
            handler: chain.then(handler),
        }
    }

    /// Handles one tick.
    ///
    /// # Errors
    ///
    /// Returns the handler's error.
    pub async fn handle(&self, event: ScheduledEvent) -> Result<(), NimbusError> {
        let mut ctx = InvocationContext::new(TriggerKind::Scheduled);
        ctx.set_operation(event.source_name.clone());
        self.handler.call(&mut ctx, event.into()).await.map(|_| ())
    }
}

impl fmt::Debug for ScheduledAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledAdapter")
            .field("interceptors", &self.names)
            .finish()
    }
}

//! Change-notification batch adapter.
//!
//! A batch invocation succeeds or fails as a whole. Handlers that must keep
//! going after a bad record use [`for_each_record`], which collects
//! per-record failures in a [`BatchReport`] instead of returning early.

use crate::pipeline::Pipeline;
use nimbus_core::{ChangeBatch, ChangeRecord, NimbusError, TriggerKind};
use nimbus_middleware::{BoxedHandler, InvocationContext};
use std::fmt;
use std::future::Future;
use tracing::warn;

/// Operation label for batch invocations.
pub const BATCH_OPERATION: &str = "batch";

/// Runs batch invocations through the pipeline.
#[derive(Clone)]
pub struct BatchAdapter {
    handler: BoxedHandler,
    names: Vec<&'static str>,
}

impl BatchAdapter {
    /// Wraps `handler` with the pipeline's chain.
    pub fn new(pipeline: &Pipeline, handler: BoxedHandler) -> Self {
        let chain = pipeline.chain();
        Self {
            names: chain.names(),
            handler: chain.then(handler),
        }
    }

    /// Handles one batch.
    ///
    /// # Errors
    ///
    /// Returns the handler's error. Per-record failures the handler
    /// swallowed are not errors.
    pub async fn handle(&self, batch: ChangeBatch) -> Result<(), NimbusError> {
        let mut ctx = InvocationContext::new(TriggerKind::Batch);
        ctx.set_operation(BATCH_OPERATION);
        self.handler.call(&mut ctx, batch.into()).await.map(|_| ())
    }
}

impl fmt::Debug for BatchAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchAdapter")
            .field("interceptors", &self.names)
            .finish()
    }
}

/// A record that failed inside a batch.
#[derive(Debug)]
pub struct RecordFailure {
    /// Position in the batch.
    pub index: usize,
    /// The record's item key.
    pub item_key: String,
    /// What went wrong.
    pub error: NimbusError,
}

/// Per-record results of [`for_each_record`].
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Records processed without error.
    pub succeeded: usize,
    /// Records that failed, in batch order.
    pub failures: Vec<RecordFailure>,
}

impl BatchReport {
    /// Returns the number of records attempted.
    pub fn total(&self) -> usize {
        self.succeeded + self.failures.len()
    }

    /// Returns `true` if every record succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs `f` on every record, continuing past failures.
///
/// Records are processed one at a time in batch order. Each failure is
/// logged and recorded in the report.
pub async fn for_each_record<F, Fut>(batch: &ChangeBatch, mut f: F) -> BatchReport
where
    F: FnMut(&ChangeRecord) -> Fut,
    Fut: Future<Output = Result<(), NimbusError>>,
{
    let mut report = BatchReport::default();
    for (index, record) in batch.iter().enumerate() {
        match f(record).await {
            Ok(()) => report.succeeded += 1,
            Err(error) => {
                warn!(
                    index,
                    item_key = %record.item_key,
                    source_location = %record.source_location,
                    error = %error,
                    "record failed, continuing with batch"
                );
                report.failures.push(RecordFailure {
                    index,
                    item_key: record.item_key.clone(),
                    error,
                });
            }
        }
    }
    report
}

//! Metrics interceptor.
//!
//! Records per-invocation samples into a [`MetricsBuffer`]. The samples
//! depend on the trigger:
//!
//! | Trigger | Before the handler | After the handler |
//! |---------|--------------------|-------------------|
//! | request | - | `ProcessingTime`, `Successful`/`Errors`, status class, `ClientErrors`/`ServerErrors`, `UserRequests` |
//! | batch | `Invocations`, `BatchSize` | `ProcessingTime`, `Successful`/`Errors`, `AverageItemProcessingTime` |
//! | scheduled | `Invocations` | `ProcessingTime`, `Successful`/`Errors` |
//!
//! Every sample carries the standard dimensions `Service`, `Operation` and
//! `FunctionName` (omitted when unset). Scheduled samples add `EventSource`.
//! `UserRequests` uses `Service` and `UserID` only.
//!
//! Recording never fails the invocation and never waits on the sink. The
//! handler's result is returned unchanged.

use crate::context::InvocationContext;
use crate::error::MiddlewareError;
use crate::handler::BoxFuture;
use crate::interceptor::{Interceptor, Next};
use nimbus_config::{PipelineConfig, METRICS_INTERCEPTOR};
use nimbus_core::{InvocationResult, Outcome, TriggerEvent, TriggerKind};
use nimbus_telemetry::{Dimension, MetricsBuffer};
use std::time::{Duration, Instant};
use tracing::debug;

/// Metric names emitted by the interceptor.
pub mod names {
    /// Handler duration in milliseconds.
    pub const PROCESSING_TIME: &str = "ProcessingTime";
    /// Invocation finished without error.
    pub const SUCCESSFUL: &str = "Successful";
    /// Invocation returned an error.
    pub const ERRORS: &str = "Errors";
    /// Response status was 4xx.
    pub const CLIENT_ERRORS: &str = "ClientErrors";
    /// Response status was 5xx.
    pub const SERVER_ERRORS: &str = "ServerErrors";
    /// Request by an authenticated principal.
    pub const USER_REQUESTS: &str = "UserRequests";
    /// Batch or scheduled invocation started.
    pub const INVOCATIONS: &str = "Invocations";
    /// Records in a batch.
    pub const BATCH_SIZE: &str = "BatchSize";
    /// Handler duration divided by the batch size.
    pub const AVERAGE_ITEM_PROCESSING_TIME: &str = "AverageItemProcessingTime";
}

/// Dimension keys.
pub mod dimensions {
    /// Service name.
    pub const SERVICE: &str = "Service";
    /// Operation label.
    pub const OPERATION: &str = "Operation";
    /// Deployed function name.
    pub const FUNCTION_NAME: &str = "FunctionName";
    /// Principal ID.
    pub const USER_ID: &str = "UserID";
    /// Scheduled trigger source.
    pub const EVENT_SOURCE: &str = "EventSource";
}

/// Static labels attached to every sample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricLabels {
    /// Service name.
    pub service: String,
    /// Fixed operation label; empty means "derive from the invocation".
    pub operation: String,
    /// Function name; empty means "omit the dimension".
    pub function_name: String,
}

impl MetricLabels {
    /// Takes the labels from the pipeline configuration.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            service: config.service_name.clone(),
            operation: config.operation_name.clone(),
            function_name: config.function_name.clone(),
        }
    }
}

/// Returns the status class label (`1xx` .. `5xx`) for a status code.
///
/// Codes outside 100..=599 have no class.
#[must_use]
pub fn status_class(status_code: u16) -> Option<&'static str> {
    match status_code {
        100..=199 => Some("1xx"),
        200..=299 => Some("2xx"),
        300..=399 => Some("3xx"),
        400..=499 => Some("4xx"),
        500..=599 => Some("5xx"),
        _ => None,
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Interceptor that records invocation metrics.
#[derive(Debug, Clone)]
pub struct MetricsInterceptor {
    buffer: Option<MetricsBuffer>,
    labels: MetricLabels,
}

impl MetricsInterceptor {
    /// Creates an interceptor recording into `buffer`.
    pub fn new(buffer: MetricsBuffer, labels: MetricLabels) -> Self {
        Self {
            buffer: Some(buffer),
            labels,
        }
    }

    /// Creates an interceptor that records nothing.
    pub fn disabled(labels: MetricLabels) -> Self {
        Self {
            buffer: None,
            labels,
        }
    }

    /// Returns the buffer, if recording is enabled.
    pub fn buffer(&self) -> Option<&MetricsBuffer> {
        self.buffer.as_ref()
    }

    fn record(&self, name: &str, value: f64, dims: &[Dimension]) {
        if let Some(buffer) = &self.buffer {
            buffer.add_metric(name, value, dims.to_vec());
        }
    }

    fn standard_dimensions(&self, ctx: &InvocationContext) -> Vec<Dimension> {
        let operation = if self.labels.operation.is_empty() {
            ctx.operation().unwrap_or(ctx.trigger().as_str())
        } else {
            self.labels.operation.as_str()
        };

        let mut dims = vec![
            Dimension::new(dimensions::SERVICE, &self.labels.service),
            Dimension::new(dimensions::OPERATION, operation),
        ];
        if !self.labels.function_name.is_empty() {
            dims.push(Dimension::new(
                dimensions::FUNCTION_NAME,
                &self.labels.function_name,
            ));
        }
        dims
    }

    fn record_outcome(&self, dims: &[Dimension], elapsed: Duration, result: &InvocationResult) {
        self.record(names::PROCESSING_TIME, millis(elapsed), dims);
        let name = if result.is_ok() {
            names::SUCCESSFUL
        } else {
            names::ERRORS
        };
        self.record(name, 1.0, dims);
    }

    fn record_status(&self, dims: &[Dimension], result: &InvocationResult) {
        let status_code = match result {
            Ok(Outcome::Response(response)) => response.status_code,
            Ok(Outcome::Completed) => return,
            Err(error) => error.status_code().as_u16(),
        };

        if let Some(class) = status_class(status_code) {
            self.record(class, 1.0, dims);
        }
        match status_code {
            400..=499 => self.record(names::CLIENT_ERRORS, 1.0, dims),
            500..=599 => self.record(names::SERVER_ERRORS, 1.0, dims),
            _ => {}
        }
    }

    fn record_user(&self, ctx: &InvocationContext) {
        if let Some(user_id) = ctx.user_id() {
            let dims = [
                Dimension::new(dimensions::SERVICE, &self.labels.service),
                Dimension::new(dimensions::USER_ID, user_id),
            ];
            self.record(names::USER_REQUESTS, 1.0, &dims);
        }
    }
}

impl Interceptor for MetricsInterceptor {
    fn name(&self) -> &'static str {
        METRICS_INTERCEPTOR
    }

    fn intercept<'a>(
        &'a self,
        ctx: &'a mut InvocationContext,
        event: TriggerEvent,
        next: Next<'a>,
    ) -> BoxFuture<'a, InvocationResult> {
        Box::pin(async move {
            if self.buffer.is_none() {
                return next.run(ctx, event).await;
            }

            let mut dims = self.standard_dimensions(ctx);
            let kind = event.kind();
            let batch_size = match &event {
                TriggerEvent::Batch(batch) => batch.len(),
                TriggerEvent::Scheduled(scheduled) => {
                    dims.push(Dimension::new(
                        dimensions::EVENT_SOURCE,
                        &scheduled.source_name,
                    ));
                    0
                }
                TriggerEvent::Api(_) => 0,
            };

            match kind {
                TriggerKind::Batch => {
                    self.record(names::INVOCATIONS, 1.0, &dims);
                    self.record(names::BATCH_SIZE, batch_size as f64, &dims);
                }
                TriggerKind::Scheduled => self.record(names::INVOCATIONS, 1.0, &dims),
                TriggerKind::Api => {}
            }

            let started = Instant::now();
            let result = next.run(ctx, event).await;
            let elapsed = started.elapsed();

            self.record_outcome(&dims, elapsed, &result);
            match kind {
                TriggerKind::Api => {
                    self.record_status(&dims, &result);
                    self.record_user(ctx);
                }
                TriggerKind::Batch if batch_size > 0 => {
                    self.record(
                        names::AVERAGE_ITEM_PROCESSING_TIME,
                        millis(elapsed) / batch_size as f64,
                        &dims,
                    );
                }
                TriggerKind::Batch | TriggerKind::Scheduled => {}
            }
            result
        })
    }

    fn shutdown(&self) -> BoxFuture<'_, Result<(), MiddlewareError>> {
        Box::pin(async move {
            if let Some(buffer) = &self.buffer {
                debug!("flushing metrics buffer on shutdown");
                buffer.shutdown().await?;
            }
            Ok(())
        })
    }
}

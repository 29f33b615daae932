//! End-to-end tests for the trigger adapters with the standard pipeline.

use nimbus_config::PipelineConfig;
use nimbus_core::{
    fixtures, ApiRequest, ApiResponse, NimbusError, Outcome, TriggerEvent,
};
use nimbus_middleware::{handler_fn, AuthGate, AuthOutcome, BoxFuture, InterceptorRegistry};
use nimbus_telemetry::{MemorySink, MetricSample};
use nimbus_triggers::{for_each_record, ApiAdapter, BatchAdapter, Pipeline, ScheduledAdapter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

enum GateMode {
    Allow,
    Deny,
    Unreachable,
}

struct StubGate {
    mode: GateMode,
    calls: AtomicUsize,
}

impl StubGate {
    fn new(mode: GateMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicUsize::new(0),
        })
    }
}

impl AuthGate for StubGate {
    fn authenticate<'a>(
        &'a self,
        _request: &'a ApiRequest,
    ) -> BoxFuture<'a, Result<AuthOutcome, NimbusError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            match self.mode {
                GateMode::Allow => Ok(AuthOutcome::Authenticated(fixtures::principal("u1"))),
                GateMode::Deny => Ok(AuthOutcome::unauthorized("invalid token")),
                GateMode::Unreachable => Err(NimbusError::external(
                    "identity provider timed out",
                    Some("identity"),
                )),
            }
        })
    }
}

fn config() -> PipelineConfig {
    PipelineConfig {
        service_name: "images".to_string(),
        function_name: "images-fn".to_string(),
        flush_interval_secs: 0,
        batch_size: 1000,
        ..PipelineConfig::default()
    }
}

fn pipeline(config: PipelineConfig, gate: Arc<StubGate>) -> (Pipeline, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let pipeline = Pipeline::builder(config)
        .auth_gate(gate)
        .metrics_sink(sink.clone())
        .build()
        .unwrap();
    (pipeline, sink)
}

async fn drain(pipeline: &Pipeline, sink: &MemorySink) -> Vec<MetricSample> {
    if let Some(buffer) = pipeline.buffer() {
        buffer.flush().await.unwrap();
    }
    sink.samples()
}

fn named<'a>(samples: &'a [MetricSample], name: &str) -> Vec<&'a MetricSample> {
    samples.iter().filter(|s| s.name == name).collect()
}

#[tokio::test]
async fn test_api_request_with_authenticated_principal() {
    let (pipeline, sink) = pipeline(config(), StubGate::new(GateMode::Allow));
    let adapter = ApiAdapter::new(
        &pipeline,
        handler_fn(|ctx, _event| async move {
            let user = ctx.principal().map(|p| p.id.clone()).unwrap_or_default();
            Ok(Outcome::Response(ApiResponse::ok(user)))
        }),
    );

    let response = adapter
        .handle(fixtures::authorized_request("GET", "/images", "token"))
        .await
        .unwrap();
    assert_eq!(response.status_code, 200);
    assert_eq!(response.body, "u1");

    let samples = drain(&pipeline, &sink).await;
    assert_eq!(named(&samples, "ProcessingTime").len(), 1);
    assert_eq!(named(&samples, "Successful").len(), 1);
    assert_eq!(named(&samples, "2xx").len(), 1);

    let processing = named(&samples, "ProcessingTime")[0];
    assert_eq!(processing.dimension("Service"), Some("images"));
    assert_eq!(processing.dimension("Operation"), Some("GET /images"));
    assert_eq!(processing.dimension("FunctionName"), Some("images-fn"));

    let user = named(&samples, "UserRequests");
    assert_eq!(user.len(), 1);
    assert_eq!(user[0].dimension("UserID"), Some("u1"));
}

#[tokio::test]
async fn test_api_rejection_short_circuits() {
    let (pipeline, sink) = pipeline(config(), StubGate::new(GateMode::Deny));
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let adapter = ApiAdapter::new(
        &pipeline,
        handler_fn(move |_ctx, _event| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(Outcome::Response(ApiResponse::ok(""))) }
        }),
    );

    let response = adapter
        .handle(fixtures::api_request("GET", "/images"))
        .await
        .unwrap();
    assert_eq!(response.status_code, 401);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let samples = drain(&pipeline, &sink).await;
    assert_eq!(named(&samples, "4xx").len(), 1);
    assert!(named(&samples, "UserRequests").is_empty());
}

#[tokio::test]
async fn test_api_gate_failure_is_401_error() {
    let gate = StubGate::new(GateMode::Unreachable);
    let (pipeline, sink) = pipeline(config(), Arc::clone(&gate));
    let adapter = ApiAdapter::new(
        &pipeline,
        handler_fn(|_ctx, _event| async { Ok(Outcome::Response(ApiResponse::ok(""))) }),
    );

    let err = adapter
        .handle(fixtures::authorized_request("GET", "/images", "token"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code().as_u16(), 401);

    let response = adapter
        .respond(fixtures::authorized_request("GET", "/images", "token"))
        .await;
    assert_eq!(response.status_code, 401);
    assert_eq!(gate.calls.load(Ordering::SeqCst), 2);

    let samples = drain(&pipeline, &sink).await;
    assert_eq!(named(&samples, "Errors").len(), 2);
    assert_eq!(named(&samples, "4xx").len(), 2);
    assert_eq!(named(&samples, "ClientErrors").len(), 2);
}

#[tokio::test]
async fn test_batch_of_four_with_swallowed_failure() {
    let (pipeline, sink) = pipeline(config(), StubGate::new(GateMode::Allow));
    let adapter = BatchAdapter::new(
        &pipeline,
        handler_fn(|_ctx, event| async move {
            let TriggerEvent::Batch(batch) = event else {
                return Err(NimbusError::validation("expected a batch"));
            };
            let report = for_each_record(&batch, |record| {
                let fail = record.item_key.ends_with("image-1.jpg");
                async move {
                    if fail {
                        Err(NimbusError::internal("decode failed"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
            assert_eq!(report.succeeded, 3);
            assert_eq!(report.failures.len(), 1);
            Ok(Outcome::Completed)
        }),
    );

    adapter.handle(fixtures::change_batch(4)).await.unwrap();

    let samples = drain(&pipeline, &sink).await;
    assert_eq!(named(&samples, "Successful").len(), 1);
    assert!(named(&samples, "Errors").is_empty());
    assert_eq!(named(&samples, "Invocations").len(), 1);
    assert_eq!(named(&samples, "BatchSize")[0].value, 4.0);

    let total = named(&samples, "ProcessingTime")[0].value;
    let average = named(&samples, "AverageItemProcessingTime");
    assert_eq!(average.len(), 1);
    assert!((average[0].value - total / 4.0).abs() < 1e-9);
    assert_eq!(average[0].dimension("Operation"), Some("batch"));
}

#[tokio::test]
async fn test_scheduled_tick_tags_event_source() {
    let (pipeline, sink) = pipeline(config(), StubGate::new(GateMode::Deny));
    let adapter = ScheduledAdapter::new(
        &pipeline,
        handler_fn(|_ctx, _event| async { Ok(Outcome::Completed) }),
    );

    adapter
        .handle(fixtures::scheduled_event("nightly-archive"))
        .await
        .unwrap();

    let samples = drain(&pipeline, &sink).await;
    let invocations = named(&samples, "Invocations");
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].dimension("EventSource"), Some("nightly-archive"));
    assert_eq!(named(&samples, "Successful").len(), 1);
    assert!(samples.iter().all(|s| !s.name.ends_with("xx")));
}

#[tokio::test]
async fn test_metrics_disabled_still_runs_handler() {
    let config = PipelineConfig {
        metrics_enabled: false,
        ..config()
    };
    let (pipeline, sink) = pipeline(config, StubGate::new(GateMode::Allow));
    assert!(pipeline.buffer().is_none());

    let adapter = ApiAdapter::new(
        &pipeline,
        handler_fn(|_ctx, _event| async { Err(NimbusError::not_found("no such image")) }),
    );
    let err = adapter
        .handle(fixtures::authorized_request("GET", "/images/9", "token"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code().as_u16(), 404);

    let batch = BatchAdapter::new(
        &pipeline,
        handler_fn(|_ctx, _event| async { Ok(Outcome::Completed) }),
    );
    batch.handle(fixtures::change_batch(2)).await.unwrap();

    pipeline.shutdown().await;
    assert_eq!(sink.publish_calls(), 0);
}

#[tokio::test]
async fn test_adapters_share_one_registration() {
    let registry = Arc::new(InterceptorRegistry::new());
    let sink = Arc::new(MemorySink::new());

    let first = Pipeline::builder(config())
        .auth_gate(StubGate::new(GateMode::Allow))
        .metrics_sink(sink.clone())
        .registry(Arc::clone(&registry))
        .build()
        .unwrap();
    let second = Pipeline::builder(config())
        .auth_gate(StubGate::new(GateMode::Deny))
        .metrics_sink(sink.clone())
        .registry(Arc::clone(&registry))
        .build()
        .unwrap();

    assert!(first.buffer().is_some());
    assert!(second.buffer().is_none());
    assert_eq!(registry.count(), 3);

    // The second pipeline reuses the first one's allow-all gate.
    let adapter = ApiAdapter::new(
        &second,
        handler_fn(|_ctx, _event| async { Ok(Outcome::Response(ApiResponse::ok(""))) }),
    );
    let response = adapter
        .handle(fixtures::authorized_request("GET", "/", "token"))
        .await
        .unwrap();
    assert_eq!(response.status_code, 200);

    second.shutdown().await;
    assert_eq!(named(&sink.samples(), "Successful").len(), 1);
}

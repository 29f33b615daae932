//! Request/response trigger adapter.

use crate::pipeline::Pipeline;
use nimbus_core::{ApiRequest, ApiResponse, NimbusError, Outcome, RequestId, TriggerKind};
use nimbus_middleware::{BoxedHandler, InvocationContext};
use std::fmt;
use tracing::debug;

/// Runs request/response invocations through the pipeline.
///
/// The chain is built once, when the adapter is created.
#[derive(Clone)]
pub struct ApiAdapter {
    handler: BoxedHandler,
    names: Vec<&'static str>,
}

impl ApiAdapter {
    /// Wraps `handler` with the pipeline's chain.
    pub fn new(pipeline: &Pipeline, handler: BoxedHandler) -> Self {
        let chain = pipeline.chain();
        Self {
            names: chain.names(),
            handler: chain.then(handler),
        }
    }

    /// Handles one request.
    ///
    /// The request id comes from the request when it is a valid UUID. A
    /// handler that completes without a response yields `204 No Content`.
    ///
    /// # Errors
    ///
    /// Returns the handler's error, or an authentication error (401) when
    /// the auth gate could not be reached.
    pub async fn handle(&self, request: ApiRequest) -> Result<ApiResponse, NimbusError> {
        let (_, result) = self.invoke(request).await;
        result
    }

    /// Handles one request and renders errors as JSON error responses.
    pub async fn respond(&self, request: ApiRequest) -> ApiResponse {
        let (request_id, result) = self.invoke(request).await;
        result.unwrap_or_else(|err| err.to_response(Some(&request_id.to_string())))
    }

    async fn invoke(&self, request: ApiRequest) -> (RequestId, Result<ApiResponse, NimbusError>) {
        let request_id = RequestId::parse_or_new(request.request_id.as_deref());
        let mut ctx = InvocationContext::with_request_id(request_id, TriggerKind::Api);
        ctx.set_operation(request.route_label());

        let result = self
            .handler
            .call(&mut ctx, request.into())
            .await
            .map(|outcome| match outcome {
                Outcome::Response(response) => response,
                Outcome::Completed => {
                    debug!(%request_id, "handler completed without a response");
                    ApiResponse::new(204)
                }
            });
        (request_id, result)
    }
}

impl fmt::Debug for ApiAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiAdapter")
            .field("interceptors", &self.names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_config::PipelineConfig;
    use nimbus_core::fixtures;
    use nimbus_middleware::handler_fn;

    fn pipeline() -> Pipeline {
        Pipeline::builder(PipelineConfig {
            auth_enabled: false,
            metrics_enabled: false,
            ..PipelineConfig::default()
        })
        .build()
        .unwrap()
    }

    #[tokio::test]
    async fn test_handle_returns_handler_response() {
        let adapter = ApiAdapter::new(
            &pipeline(),
            handler_fn(|ctx, _event| async move {
                let body = ctx.operation().unwrap_or_default().to_string();
                Ok(Outcome::Response(ApiResponse::ok(body)))
            }),
        );

        let response = adapter
            .handle(fixtures::api_request("GET", "/images"))
            .await
            .unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "GET /images");
    }

    #[tokio::test]
    async fn test_completed_maps_to_no_content() {
        let adapter = ApiAdapter::new(
            &pipeline(),
            handler_fn(|_ctx, _event| async { Ok(Outcome::Completed) }),
        );

        let response = adapter
            .handle(fixtures::api_request("DELETE", "/images/1"))
            .await
            .unwrap();
        assert_eq!(response.status_code, 204);
    }

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        let id = RequestId::new();
        let adapter = ApiAdapter::new(
            &pipeline(),
            handler_fn(|ctx, _event| async move {
                Ok(Outcome::Response(ApiResponse::ok(ctx.request_id().to_string())))
            }),
        );

        let mut request = fixtures::api_request("GET", "/");
        request.request_id = Some(id.to_string());
        let response = adapter.handle(request).await.unwrap();
        assert_eq!(response.body, id.to_string());
    }

    #[tokio::test]
    async fn test_respond_renders_errors() {
        let adapter = ApiAdapter::new(
            &pipeline(),
            handler_fn(|_ctx, _event| async { Err(NimbusError::not_found("image not found")) }),
        );

        let response = adapter
            .respond(fixtures::api_request("GET", "/images/missing"))
            .await;
        assert_eq!(response.status_code, 404);
        assert!(response.body.contains("image not found"));
    }

    #[test]
    fn test_debug_lists_interceptors() {
        let adapter = ApiAdapter::new(
            &pipeline(),
            handler_fn(|_ctx, _event| async { Ok(Outcome::Completed) }),
        );
        assert_eq!(format!("{adapter:?}"), r#"ApiAdapter { interceptors: ["logging"] }"#);
    }
}

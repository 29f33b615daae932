//! Logging interceptor.
//!
//! Opens an `invocation` span for every call and logs one line when the
//! invocation starts and one when it finishes. Request details are opt-in:
//!
//! - request headers when `include_headers` or `detailed_request_log` is
//!   set, response headers when `detailed_response_log` is set, with
//!   sensitive values replaced by [`MASK`] in both
//! - query parameters when `include_query_params` is set
//! - request and response bodies only when `include_body` is set together
//!   with the matching `detailed_*_log` flag, cut to `max_body_log_length`

use crate::context::InvocationContext;
use crate::handler::BoxFuture;
use crate::interceptor::{Interceptor, Next};
use nimbus_config::{PipelineConfig, LOGGING_INTERCEPTOR};
use nimbus_core::{ApiRequest, ApiResponse, InvocationResult, Outcome, TriggerEvent};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{error, info, info_span, warn, Instrument};

/// Replacement for sensitive header values.
pub const MASK: &str = "******";

/// Suffix appended to truncated bodies.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// What the logging interceptor includes in its log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Log request headers.
    pub request_headers: bool,
    /// Log query parameters.
    pub query_params: bool,
    /// Log the request body.
    pub request_body: bool,
    /// Log response headers.
    pub response_headers: bool,
    /// Log the response body.
    pub response_body: bool,
    /// Longest body logged before truncation, in bytes.
    pub max_body_log_length: usize,
    /// Header names whose values are masked (compared case-insensitively).
    pub sensitive_headers: BTreeSet<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl LoggingSettings {
    /// Derives the settings from the pipeline flags.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            request_headers: config.include_headers || config.detailed_request_log,
            query_params: config.include_query_params,
            request_body: config.include_body && config.detailed_request_log,
            response_headers: config.detailed_response_log,
            response_body: config.include_body && config.detailed_response_log,
            max_body_log_length: config.max_body_log_length,
            sensitive_headers: config.sensitive_header_names.clone(),
        }
    }

    /// Returns `true` if `name` must be masked.
    #[must_use]
    pub fn is_sensitive(&self, name: &str) -> bool {
        self.sensitive_headers
            .iter()
            .any(|sensitive| sensitive.eq_ignore_ascii_case(name))
    }

    /// Copies `headers`, masking sensitive values.
    #[must_use]
    pub fn mask_headers<'h>(
        &self,
        headers: &'h HashMap<String, String>,
    ) -> BTreeMap<&'h str, &'h str> {
        headers
            .iter()
            .map(|(name, value)| {
                let value = if self.is_sensitive(name) {
                    MASK
                } else {
                    value.as_str()
                };
                (name.as_str(), value)
            })
            .collect()
    }

    /// Cuts `body` to the configured length.
    #[must_use]
    pub fn truncate_body<'b>(&self, body: &'b str) -> Cow<'b, str> {
        truncate_body(body, self.max_body_log_length)
    }
}

/// Cuts `body` to at most `max_len` bytes plus [`TRUNCATION_MARKER`].
///
/// The cut never splits a UTF-8 character.
#[must_use]
pub fn truncate_body(body: &str, max_len: usize) -> Cow<'_, str> {
    if body.len() <= max_len {
        return Cow::Borrowed(body);
    }
    let mut end = max_len;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Owned(format!("{}{TRUNCATION_MARKER}", &body[..end]))
}

/// Interceptor that logs each invocation inside an `invocation` span.
#[derive(Debug, Clone, Default)]
pub struct LoggingInterceptor {
    settings: LoggingSettings,
}

impl LoggingInterceptor {
    /// Creates a logging interceptor.
    pub fn new(settings: LoggingSettings) -> Self {
        Self { settings }
    }

    /// Returns the settings.
    pub fn settings(&self) -> &LoggingSettings {
        &self.settings
    }

    fn log_request(&self, request: &ApiRequest) {
        let headers = self
            .settings
            .request_headers
            .then(|| self.settings.mask_headers(&request.headers));
        let query = (self.settings.query_params && !request.query_params.is_empty())
            .then(|| request.query_params.iter().collect::<BTreeMap<_, _>>());
        let body = (self.settings.request_body && !request.body.is_empty())
            .then(|| self.settings.truncate_body(&request.body));

        info!(
            method = %request.method,
            path = %request.path,
            source = request.source_identity.as_deref().unwrap_or(""),
            headers = ?headers,
            query = ?query,
            body = body.as_deref(),
            "request started"
        );
    }

    fn log_response(&self, response: &ApiResponse, duration_ms: u64) {
        let headers = (self.settings.response_headers && !response.headers.is_empty())
            .then(|| self.settings.mask_headers(&response.headers));
        let body = (self.settings.response_body && !response.body.is_empty())
            .then(|| self.settings.truncate_body(&response.body));

        if response.status_code >= 500 {
            warn!(
                status_code = response.status_code,
                duration_ms,
                headers = ?headers,
                body = body.as_deref(),
                "request completed with server error"
            );
        } else {
            info!(
                status_code = response.status_code,
                duration_ms,
                headers = ?headers,
                body = body.as_deref(),
                "request completed"
            );
        }
    }

    fn log_start(&self, event: &TriggerEvent) {
        match event {
            TriggerEvent::Api(request) => self.log_request(request),
            TriggerEvent::Batch(batch) => info!(batch_size = batch.len(), "batch started"),
            TriggerEvent::Scheduled(scheduled) => info!(
                event_source = %scheduled.source_name,
                fired_at = %scheduled.fired_at,
                "scheduled run started"
            ),
        }
    }

    fn log_finish(&self, ctx: &InvocationContext, result: &InvocationResult) {
        let duration_ms = u64::try_from(ctx.elapsed().as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(Outcome::Response(response)) => self.log_response(response, duration_ms),
            Ok(Outcome::Completed) => info!(duration_ms, "invocation completed"),
            Err(err) => error!(
                error = %err,
                status_code = err.status_code().as_u16(),
                duration_ms,
                "invocation failed"
            ),
        }
    }
}

impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &'static str {
        LOGGING_INTERCEPTOR
    }

    fn intercept<'a>(
        &'a self,
        ctx: &'a mut InvocationContext,
        event: TriggerEvent,
        next: Next<'a>,
    ) -> BoxFuture<'a, InvocationResult> {
        let span = info_span!(
            "invocation",
            request_id = %ctx.request_id(),
            trigger = ctx.trigger().as_str(),
            operation = ctx.operation().unwrap_or(""),
            user_id = tracing::field::Empty,
        );

        Box::pin(
            async move {
                self.log_start(&event);
                let result = next.run(ctx, event).await;
                if let Some(user_id) = ctx.user_id() {
                    tracing::Span::current().record("user_id", user_id);
                }
                self.log_finish(ctx, &result);
                result
            }
            .instrument(span),
        )
    }
}

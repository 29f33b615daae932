//! Trigger descriptors.
//!
//! A function is started by one of three trigger shapes:
//!
//! - [`ApiRequest`] - synchronous request/response exchange, answered with an [`ApiResponse`]
//! - [`ChangeBatch`] - a batch of change notifications from object storage
//! - [`ScheduledEvent`] - a timer tick
//!
//! All descriptors use `camelCase` field names on the wire so they can be
//! deserialized straight from the platform's JSON payload.

use crate::error::NimbusError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The result every handler in the pipeline produces.
pub type InvocationResult = Result<Outcome, NimbusError>;

/// Inbound request descriptor of the request/response trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiRequest {
    /// HTTP method, e.g. `GET`.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Request headers as delivered by the gateway.
    pub headers: HashMap<String, String>,
    /// Query string parameters.
    pub query_params: HashMap<String, String>,
    /// Raw request body.
    pub body: String,
    /// Caller network identity (source IP).
    pub source_identity: Option<String>,
    /// Platform-assigned request id, if any.
    pub request_id: Option<String>,
}

impl ApiRequest {
    /// Creates a request with the given method and path.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the caller's source identity.
    #[must_use]
    pub fn with_source_identity(mut self, source: impl Into<String>) -> Self {
        self.source_identity = Some(source.into());
        self
    }

    /// Looks up a header value, ignoring the header name's case.
    ///
    /// Gateways are inconsistent about header casing, so an exact match is
    /// tried first and a case-insensitive scan second.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str).or_else(|| {
            self.headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        })
    }

    /// Returns the `METHOD path` label used as the default operation name.
    #[must_use]
    pub fn route_label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Outbound response descriptor of the request/response trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Response body.
    #[serde(default)]
    pub body: String,
}

impl ApiResponse {
    /// Creates an empty response with the given status.
    #[must_use]
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: HashMap::new(),
            body: String::new(),
        }
    }

    /// Creates a `200 OK` response with a plain body.
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200).with_body(body)
    }

    /// Creates a JSON response.
    ///
    /// Serialization of plain data types does not fail; if it ever does the
    /// body is left as `{}` rather than failing the response.
    #[must_use]
    pub fn json<T: Serialize + ?Sized>(status_code: u16, value: &T) -> Self {
        let body = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
        Self::new(status_code)
            .with_header("Content-Type", "application/json")
            .with_body(body)
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status_code >= 200 && self.status_code < 300
    }
}

/// One change notification: an object was written to a storage location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    /// Bucket or container the object lives in.
    pub source_location: String,
    /// Object key.
    pub item_key: String,
}

impl ChangeRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(source_location: impl Into<String>, item_key: impl Into<String>) -> Self {
        Self {
            source_location: source_location.into(),
            item_key: item_key.into(),
        }
    }
}

/// A batch of change notifications delivered in one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeBatch {
    /// The records, in delivery order.
    #[serde(default)]
    pub records: Vec<ChangeRecord>,
}

impl ChangeBatch {
    /// Creates a batch from records.
    #[must_use]
    pub fn new(records: Vec<ChangeRecord>) -> Self {
        Self { records }
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the batch holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over the records.
    pub fn iter(&self) -> std::slice::Iter<'_, ChangeRecord> {
        self.records.iter()
    }
}

impl FromIterator<ChangeRecord> for ChangeBatch {
    fn from_iter<I: IntoIterator<Item = ChangeRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A scheduled timer tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEvent {
    /// Name of the rule or scheduler that fired.
    pub source_name: String,
    /// When the tick fired.
    pub fired_at: DateTime<Utc>,
}

impl ScheduledEvent {
    /// Creates a tick that fired now.
    #[must_use]
    pub fn now(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            fired_at: Utc::now(),
        }
    }
}

/// Which trigger shape started an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Synchronous request/response.
    Api,
    /// Change-notification batch.
    Batch,
    /// Scheduled tick.
    Scheduled,
}

impl TriggerKind {
    /// Returns the kind as a static label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Batch => "batch",
            Self::Scheduled => "scheduled",
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The event flowing through the interceptor chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    /// A request/response exchange.
    Api(ApiRequest),
    /// A change-notification batch.
    Batch(ChangeBatch),
    /// A scheduled tick.
    Scheduled(ScheduledEvent),
}

impl TriggerEvent {
    /// Returns the trigger kind.
    #[must_use]
    pub const fn kind(&self) -> TriggerKind {
        match self {
            Self::Api(_) => TriggerKind::Api,
            Self::Batch(_) => TriggerKind::Batch,
            Self::Scheduled(_) => TriggerKind::Scheduled,
        }
    }

    /// Returns the request if this is a request/response trigger.
    #[must_use]
    pub const fn as_api(&self) -> Option<&ApiRequest> {
        match self {
            Self::Api(request) => Some(request),
            _ => None,
        }
    }
}

impl From<ApiRequest> for TriggerEvent {
    fn from(request: ApiRequest) -> Self {
        Self::Api(request)
    }
}

impl From<ChangeBatch> for TriggerEvent {
    fn from(batch: ChangeBatch) -> Self {
        Self::Batch(batch)
    }
}

impl From<ScheduledEvent> for TriggerEvent {
    fn from(event: ScheduledEvent) -> Self {
        Self::Scheduled(event)
    }
}

/// What a handler produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A response for the request/response trigger.
    Response(ApiResponse),
    /// The batch or scheduled work finished; there is no payload.
    Completed,
}

impl Outcome {
    /// Returns the response, if any.
    #[must_use]
    pub const fn response(&self) -> Option<&ApiResponse> {
        match self {
            Self::Response(response) => Some(response),
            Self::Completed => None,
        }
    }

    /// Consumes the outcome, returning the response, if any.
    #[must_use]
    pub fn into_response(self) -> Option<ApiResponse> {
        match self {
            Self::Response(response) => Some(response),
            Self::Completed => None,
        }
    }
}

impl From<ApiResponse> for Outcome {
    fn from(response: ApiResponse) -> Self {
        Self::Response(response)
    }
}

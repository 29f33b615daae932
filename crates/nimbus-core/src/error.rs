//! Error types for Nimbus.
//!
//! [`NimbusError`] is the error every handler and interceptor returns. Each
//! variant belongs to an [`ErrorCategory`], which fixes the HTTP status used
//! when the error has to be rendered as a response on the request/response
//! trigger.
//!
//! | `ErrorCategory` | Status |
//! |---|---|
//! | `Validation` | 400 |
//! | `Authentication` | 401 |
//! | `Authorization` | 403 |
//! | `NotFound` | 404 |
//! | `Conflict` | 409 |
//! | `Internal` | 500 |
//! | `External` | 502 |
//! | `Timeout` | 504 |

use crate::trigger::ApiResponse;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`NimbusError`].
pub type NimbusResult<T> = Result<T, NimbusError>;

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid input.
    Validation,
    /// Invalid or missing credentials.
    Authentication,
    /// Permission denied.
    Authorization,
    /// Resource not found.
    NotFound,
    /// Conflicting modification.
    Conflict,
    /// Internal failure.
    Internal,
    /// Downstream service failure.
    External,
    /// Operation timed out.
    Timeout,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::External => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

/// Standard error type for Nimbus.
///
/// Business handlers return it for their own failures; the pipeline passes it
/// through every interceptor unchanged. The auth interceptor produces the
/// [`NimbusError::Authentication`] variant when the gate itself fails.
///
/// # Example
///
/// ```
/// use nimbus_core::NimbusError;
///
/// fn parse_limit(raw: &str) -> Result<u32, NimbusError> {
///     raw.parse()
///         .map_err(|_| NimbusError::validation("limit must be a number"))
/// }
/// assert!(parse_limit("ten").is_err());
/// ```
#[derive(Error, Debug)]
pub enum NimbusError {
    /// Input validation failed.
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// Authentication failed.
    #[error("Authentication error: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
        /// Transport failure reported by the identity collaborator.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Authorization denied.
    #[error("Authorization denied: {message}")]
    Authorization {
        /// Human-readable error message.
        message: String,
    },

    /// Resource not found.
    #[error("Not found: {message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
        /// The type of resource that was not found.
        resource_type: Option<String>,
        /// The identifier of the resource.
        resource_id: Option<String>,
    },

    /// Conflicting modification.
    #[error("Conflict: {message}")]
    Conflict {
        /// Human-readable error message.
        message: String,
    },

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Downstream service error.
    #[error("External service error: {message}")]
    External {
        /// Human-readable error message.
        message: String,
        /// The name of the external service.
        service: Option<String>,
    },

    /// Timeout.
    #[error("Timeout: {message}")]
    Timeout {
        /// Human-readable error message.
        message: String,
    },
}

impl NimbusError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an authentication error caused by a collaborator failure.
    pub fn authentication_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Authentication {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates an authorization error.
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            resource_type: None,
            resource_id: None,
        }
    }

    /// Creates a not found error with resource context.
    #[must_use]
    pub fn not_found_resource(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        let resource_type = resource_type.into();
        let resource_id = resource_id.into();
        Self::NotFound {
            message: format!("{resource_type} with ID '{resource_id}' not found"),
            resource_type: Some(resource_type),
            resource_id: Some(resource_id),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates an external service error.
    #[must_use]
    pub fn external(message: impl Into<String>, service: Option<impl Into<String>>) -> Self {
        Self::External {
            message: message.into(),
            service: service.map(Into::into),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Authentication { .. } => ErrorCategory::Authentication,
            Self::Authorization { .. } => ErrorCategory::Authorization,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::Internal { .. } => ErrorCategory::Internal,
            Self::External { .. } => ErrorCategory::External,
            Self::Timeout { .. } => ErrorCategory::Timeout,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }

    /// Converts this error to a serializable error envelope.
    #[must_use]
    pub fn to_envelope(&self, request_id: Option<&str>) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.message().to_string(),
                category: self.category(),
                details: self.error_details(),
            },
            request_id: request_id.map(ToString::to_string),
        }
    }

    /// Renders this error as a JSON response for the request/response trigger.
    #[must_use]
    pub fn to_response(&self, request_id: Option<&str>) -> ApiResponse {
        let envelope = self.to_envelope(request_id);
        ApiResponse::json(self.status_code().as_u16(), &envelope)
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Authentication { .. } => "AUTHENTICATION_ERROR",
            Self::Authorization { .. } => "AUTHORIZATION_DENIED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            Self::Internal { .. } => "INTERNAL_ERROR",
            Self::External { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
        }
    }

    /// Returns the client-facing message without the category prefix.
    ///
    /// Sources are never included; they stay in the logs.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message }
            | Self::Authentication { message, .. }
            | Self::Authorization { message }
            | Self::NotFound { message, .. }
            | Self::Conflict { message }
            | Self::Internal { message, .. }
            | Self::External { message, .. }
            | Self::Timeout { message } => message,
        }
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            Self::NotFound {
                resource_type: Some(rt),
                resource_id: Some(rid),
                ..
            } => Some(serde_json::json!({
                "resource_type": rt,
                "resource_id": rid
            })),
            Self::External {
                service: Some(svc), ..
            } => Some(serde_json::json!({
                "service": svc
            })),
            _ => None,
        }
    }
}

/// Serializable error envelope for error responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
    /// The request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error detail within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Error category.
    pub category: ErrorCategory,
    /// Additional error details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let error = NimbusError::validation("Invalid tag");
        assert_eq!(error.category(), ErrorCategory::Validation);
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert!(error.to_string().contains("Invalid tag"));
    }

    #[test]
    fn test_authentication_error_is_401() {
        let error =
            NimbusError::authentication_with_source("verifier unreachable", anyhow::anyhow!("dns"));
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_not_found_resource() {
        let error = NimbusError::not_found_resource("Image", "img-123");
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert!(error.to_string().contains("img-123"));

        let envelope = error.to_envelope(None);
        let details = envelope.error.details.expect("details should be set");
        assert_eq!(details["resource_id"], "img-123");
    }

    #[test]
    fn test_internal_error_hides_source_from_clients() {
        let error = NimbusError::internal_with_source("storage failed", anyhow::anyhow!("secret"));
        let envelope = error.to_envelope(Some("req-1"));
        assert_eq!(envelope.error.message, "storage failed");
        assert_eq!(envelope.error.code, "INTERNAL_ERROR");
    }

    #[test]
    fn test_to_response_renders_json_envelope() {
        let response = NimbusError::not_found("no such image").to_response(Some("req-456"));
        assert_eq!(response.status_code, 404);
        assert_eq!(
            response.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        assert!(response.body.contains("\"code\":\"NOT_FOUND\""));
        assert!(response.body.contains("\"request_id\":\"req-456\""));
        assert!(response.body.contains("\"category\":\"not_found\""));
    }

    #[test]
    fn test_all_error_categories_have_status_codes() {
        let categories = [
            ErrorCategory::Validation,
            ErrorCategory::Authentication,
            ErrorCategory::Authorization,
            ErrorCategory::NotFound,
            ErrorCategory::Conflict,
            ErrorCategory::Internal,
            ErrorCategory::External,
            ErrorCategory::Timeout,
        ];

        for category in categories {
            let status = category.default_status_code();
            assert!(
                status.is_client_error() || status.is_server_error(),
                "Category {:?} should map to error status code, got {}",
                category,
                status
            );
        }
    }
}

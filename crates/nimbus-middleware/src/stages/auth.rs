//! Authentication interceptor.
//!
//! The interceptor delegates credential checks to an [`AuthGate`]. A gate
//! answers one of three ways:
//!
//! | Gate result | Interceptor behavior |
//! |-------------|----------------------|
//! | `Ok(Authenticated(principal))` | attach the principal, call the handler |
//! | `Ok(Rejected(response))` | return the response, never call the handler |
//! | `Err(error)` | return an authentication error (401), never call the handler |
//!
//! Batch and scheduled triggers carry no credentials and pass through.
//!
//! [`BearerTokenGate`] is the standard gate: it reads an
//! `Authorization: Bearer <token>` header and asks a [`TokenVerifier`].

use crate::context::InvocationContext;
use crate::handler::BoxFuture;
use crate::interceptor::{Interceptor, Next};
use nimbus_config::AUTH_INTERCEPTOR;
use nimbus_core::{
    ApiRequest, ApiResponse, ErrorCategory, InvocationResult, NimbusError, Outcome, Principal,
    TriggerEvent,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Authorization header name.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

const BEARER_PREFIX: &str = "Bearer ";

/// Result of a successful gate call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The caller is authenticated.
    Authenticated(Principal),
    /// The caller is refused with this terminal response.
    Rejected(ApiResponse),
}

impl AuthOutcome {
    /// Creates a JSON `{"error": message}` rejection with the given status.
    #[must_use]
    pub fn reject(status_code: u16, message: &str) -> Self {
        Self::Rejected(ApiResponse::json(
            status_code,
            &serde_json::json!({ "error": message }),
        ))
    }

    /// Creates a 401 rejection.
    #[must_use]
    pub fn unauthorized(message: &str) -> Self {
        Self::reject(401, message)
    }
}

/// Authenticates inbound requests.
///
/// `Err` means the gate itself failed (e.g. the identity provider was
/// unreachable), not that the caller was refused.
pub trait AuthGate: Send + Sync + 'static {
    /// Authenticates `request`.
    fn authenticate<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> BoxFuture<'a, Result<AuthOutcome, NimbusError>>;
}

/// A user as reported by a [`TokenVerifier`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifiedUser {
    /// Stable user ID.
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Email address.
    pub email: String,
    /// Group memberships.
    pub roles: Vec<String>,
}

impl VerifiedUser {
    fn into_principal(self) -> Principal {
        Principal::new(self.id)
            .with_display_name(self.display_name)
            .with_email(self.email)
            .with_roles(self.roles)
    }
}

/// Why a token was not verified.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The token is malformed, expired or revoked.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The token is valid but its user no longer exists.
    #[error("user not found")]
    UserNotFound,

    /// The identity provider could not be reached.
    #[error("identity provider unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

/// Verifies bearer tokens against an identity provider.
pub trait TokenVerifier: Send + Sync + 'static {
    /// Verifies `token` and returns the user it belongs to.
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<VerifiedUser, VerifyError>>;
}

/// Gate that authenticates `Authorization: Bearer <token>` headers.
pub struct BearerTokenGate {
    verifier: Arc<dyn TokenVerifier>,
}

impl BearerTokenGate {
    /// Creates a gate backed by `verifier`.
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }

    fn extract_token(request: &ApiRequest) -> Result<&str, AuthOutcome> {
        let header = request.header(AUTHORIZATION_HEADER).ok_or_else(|| {
            warn!("missing authorization header");
            AuthOutcome::unauthorized("missing authorization header")
        })?;

        header
            .strip_prefix(BEARER_PREFIX)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                warn!("invalid authorization format");
                AuthOutcome::unauthorized("invalid authorization format")
            })
    }
}

impl std::fmt::Debug for BearerTokenGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenGate").finish_non_exhaustive()
    }
}

impl AuthGate for BearerTokenGate {
    fn authenticate<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> BoxFuture<'a, Result<AuthOutcome, NimbusError>> {
        Box::pin(async move {
            let token = match Self::extract_token(request) {
                Ok(token) => token,
                Err(rejection) => return Ok(rejection),
            };

            match self.verifier.verify(token).await {
                Ok(user) => {
                    let principal = user.into_principal();
                    info!(
                        user_id = %principal.id,
                        is_admin = principal.is_admin,
                        "user authenticated"
                    );
                    Ok(AuthOutcome::Authenticated(principal))
                }
                Err(VerifyError::InvalidCredentials) => {
                    warn!("invalid token");
                    Ok(AuthOutcome::unauthorized("invalid token"))
                }
                Err(VerifyError::UserNotFound) => {
                    warn!("token user not found");
                    Ok(AuthOutcome::unauthorized("user not found"))
                }
                Err(VerifyError::Unavailable(source)) => Err(NimbusError::authentication_with_source(
                    "authentication service unavailable",
                    source,
                )),
            }
        })
    }
}

/// Interceptor that authenticates request/response triggers.
pub struct AuthInterceptor {
    gate: Arc<dyn AuthGate>,
}

impl AuthInterceptor {
    /// Creates the interceptor around `gate`.
    pub fn new(gate: Arc<dyn AuthGate>) -> Self {
        Self { gate }
    }
}

impl std::fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInterceptor").finish_non_exhaustive()
    }
}

impl Interceptor for AuthInterceptor {
    fn name(&self) -> &'static str {
        AUTH_INTERCEPTOR
    }

    fn intercept<'a>(
        &'a self,
        ctx: &'a mut InvocationContext,
        event: TriggerEvent,
        next: Next<'a>,
    ) -> BoxFuture<'a, InvocationResult> {
        Box::pin(async move {
            let Some(request) = event.as_api() else {
                debug!(trigger = %event.kind(), "no credentials on trigger; skipping authentication");
                return next.run(ctx, event).await;
            };

            let verdict = self.gate.authenticate(request).await;
            match verdict {
                Ok(AuthOutcome::Authenticated(principal)) => {
                    ctx.set_principal(principal);
                    next.run(ctx, event).await
                }
                Ok(AuthOutcome::Rejected(response)) => {
                    debug!(status_code = response.status_code, "request rejected by auth gate");
                    Ok(Outcome::Response(response))
                }
                Err(error) => {
                    warn!(error = %error, "authentication failed");
                    Err(into_authentication_error(error))
                }
            }
        })
    }
}

fn into_authentication_error(error: NimbusError) -> NimbusError {
    if error.category() == ErrorCategory::Authentication {
        error
    } else {
        NimbusError::authentication_with_source("authentication failed", anyhow::Error::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, BoxedHandler, Handler};
    use crate::interceptor::BoxedInterceptor;
    use nimbus_core::{fixtures, TriggerKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticVerifier;

    impl TokenVerifier for StaticVerifier {
        fn verify<'a>(
            &'a self,
            token: &'a str,
        ) -> BoxFuture<'a, Result<VerifiedUser, VerifyError>> {
            Box::pin(async move {
                match token {
                    "good" => Ok(VerifiedUser {
                        id: "u1".to_string(),
                        display_name: "Una".to_string(),
                        email: "u1@example.com".to_string(),
                        roles: vec!["Users".to_string(), "Premium".to_string()],
                    }),
                    "ghost" => Err(VerifyError::UserNotFound),
                    "down" => Err(VerifyError::Unavailable(anyhow::anyhow!("connection reset"))),
                    _ => Err(VerifyError::InvalidCredentials),
                }
            })
        }
    }

    fn gate() -> BearerTokenGate {
        BearerTokenGate::new(Arc::new(StaticVerifier))
    }

    fn rejection_message(outcome: &AuthOutcome) -> Option<String> {
        match outcome {
            AuthOutcome::Rejected(response) => {
                assert_eq!(response.status_code, 401);
                let body: serde_json::Value = serde_json::from_str(&response.body).ok()?;
                body["error"].as_str().map(ToString::to_string)
            }
            AuthOutcome::Authenticated(_) => None,
        }
    }

    fn counting_handler(hits: &Arc<AtomicUsize>) -> BoxedHandler {
        let hits = Arc::clone(hits);
        handler_fn(move |ctx, _event| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                let user = ctx.principal().map(|p| p.id.clone()).unwrap_or_default();
                Ok(Outcome::Response(ApiResponse::ok(user)))
            }
        })
    }

    #[tokio::test]
    async fn test_gate_rejections() {
        let gate = gate();
        let cases = [
            (fixtures::api_request("GET", "/"), "missing authorization header"),
            (
                fixtures::api_request("GET", "/").with_header("Authorization", "Basic abc"),
                "invalid authorization format",
            ),
            (fixtures::authorized_request("GET", "/", "bad"), "invalid token"),
            (fixtures::authorized_request("GET", "/", "ghost"), "user not found"),
        ];

        for (request, expected) in cases {
            let outcome = gate.authenticate(&request).await.unwrap();
            assert_eq!(rejection_message(&outcome).as_deref(), Some(expected));
        }
    }

    #[tokio::test]
    async fn test_gate_accepts_lowercase_header() {
        let request = fixtures::api_request("GET", "/").with_header("authorization", "Bearer good");
        let outcome = gate().authenticate(&request).await.unwrap();
        let AuthOutcome::Authenticated(principal) = outcome else {
            panic!("expected authentication to succeed");
        };
        assert_eq!(principal.id, "u1");
        assert!(principal.is_premium);
        assert!(!principal.is_admin);
    }

    #[tokio::test]
    async fn test_gate_transport_failure_is_error() {
        let request = fixtures::authorized_request("GET", "/", "down");
        let err = gate().authenticate(&request).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Authentication);
        assert_eq!(err.to_response(None).status_code, 401);
    }

    #[tokio::test]
    async fn test_interceptor_injects_principal() {
        let hits = Arc::new(AtomicUsize::new(0));
        let auth: BoxedInterceptor = Arc::new(AuthInterceptor::new(Arc::new(gate())));
        let wrapped = auth.wrap(counting_handler(&hits));

        let mut ctx = InvocationContext::new(TriggerKind::Api);
        let outcome = wrapped
            .call(&mut ctx, fixtures::authorized_request("GET", "/", "good").into())
            .await
            .unwrap();

        assert_eq!(outcome.response().map(|r| r.body.as_str()), Some("u1"));
        assert_eq!(ctx.user_id(), Some("u1"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_interceptor_short_circuits_on_rejection() {
        let hits = Arc::new(AtomicUsize::new(0));
        let auth: BoxedInterceptor = Arc::new(AuthInterceptor::new(Arc::new(gate())));
        let wrapped = auth.wrap(counting_handler(&hits));

        let mut ctx = InvocationContext::new(TriggerKind::Api);
        let outcome = wrapped
            .call(&mut ctx, fixtures::api_request("GET", "/").into())
            .await
            .unwrap();

        assert_eq!(outcome.response().map(|r| r.status_code), Some(401));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(ctx.principal().is_none());
    }

    #[tokio::test]
    async fn test_interceptor_transport_failure_skips_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let auth: BoxedInterceptor = Arc::new(AuthInterceptor::new(Arc::new(gate())));
        let wrapped = auth.wrap(counting_handler(&hits));

        let mut ctx = InvocationContext::new(TriggerKind::Api);
        let err = wrapped
            .call(&mut ctx, fixtures::authorized_request("GET", "/", "down").into())
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 401);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_api_triggers_pass_through() {
        let hits = Arc::new(AtomicUsize::new(0));
        let auth: BoxedInterceptor = Arc::new(AuthInterceptor::new(Arc::new(gate())));
        let wrapped = auth.wrap(counting_handler(&hits));

        let mut ctx = InvocationContext::new(TriggerKind::Batch);
        wrapped
            .call(&mut ctx, fixtures::change_batch(2).into())
            .await
            .unwrap();

        let mut ctx = InvocationContext::new(TriggerKind::Scheduled);
        wrapped
            .call(&mut ctx, fixtures::scheduled_event("nightly").into())
            .await
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_non_auth_errors_are_normalized() {
        let err = into_authentication_error(NimbusError::internal("boom"));
        assert_eq!(err.category(), ErrorCategory::Authentication);

        let err = into_authentication_error(NimbusError::authentication("expired"));
        assert_eq!(err.message(), "expired");
    }
}

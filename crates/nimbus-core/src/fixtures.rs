//! Test fixtures for Nimbus development and testing.
//!
//! Pre-built trigger descriptors and principals used by the tests of every
//! crate in the workspace.
//!
//! # Example
//!
//! ```
//! use nimbus_core::fixtures;
//!
//! let request = fixtures::authorized_request("GET", "/images", "token-1");
//! assert_eq!(request.header("Authorization"), Some("Bearer token-1"));
//! ```

use crate::identity::Principal;
use crate::trigger::{ApiRequest, ChangeBatch, ChangeRecord, ScheduledEvent};

/// Bucket name used by the batch fixtures.
pub const UPLOAD_BUCKET: &str = "nimbus-uploads";

/// Creates an unauthenticated request.
#[must_use]
pub fn api_request(method: &str, path: &str) -> ApiRequest {
    ApiRequest::new(method, path).with_source_identity("203.0.113.7")
}

/// Creates a request carrying a bearer token.
#[must_use]
pub fn authorized_request(method: &str, path: &str, token: &str) -> ApiRequest {
    api_request(method, path).with_header("Authorization", format!("Bearer {token}"))
}

/// Creates a plain user principal.
#[must_use]
pub fn principal(id: &str) -> Principal {
    Principal::new(id)
        .with_display_name(format!("user-{id}"))
        .with_email(format!("{id}@example.com"))
        .with_roles(["Users"])
}

/// Creates a principal holding the admin and premium roles.
#[must_use]
pub fn admin_principal(id: &str) -> Principal {
    principal(id).with_roles(["Users", "Admin", "Premium"])
}

/// Creates a batch of `count` uploads in [`UPLOAD_BUCKET`].
#[must_use]
pub fn change_batch(count: usize) -> ChangeBatch {
    (0..count)
        .map(|i| ChangeRecord::new(UPLOAD_BUCKET, format!("uploads/image-{i}.jpg")))
        .collect()
}

/// Creates a scheduled tick that fired now.
#[must_use]
pub fn scheduled_event(source: &str) -> ScheduledEvent {
    ScheduledEvent::now(source)
}

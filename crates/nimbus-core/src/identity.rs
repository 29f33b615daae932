//! Authenticated caller identity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Role name that grants [`Principal::is_admin`].
pub const ADMIN_ROLE: &str = "Admin";

/// Role name that grants [`Principal::is_premium`].
pub const PREMIUM_ROLE: &str = "Premium";

/// The caller an auth gate accepted for one invocation.
///
/// A principal never outlives the invocation it was derived for. The
/// `is_admin` and `is_premium` flags are kept in sync with `roles` by the
/// role setters.
///
/// # Example
///
/// ```rust
/// use nimbus_core::Principal;
///
/// let principal = Principal::new("u-123")
///     .with_email("alice@example.com")
///     .with_roles(["Admin", "Editors"]);
/// assert!(principal.is_admin);
/// assert!(!principal.is_premium);
/// assert_eq!(principal.log_id(), "user:u-123");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Stable user identifier from the identity provider.
    pub id: String,
    /// Human-readable name (the identity provider's username).
    #[serde(default)]
    pub display_name: String,
    /// Email address, empty when the provider did not share one.
    #[serde(default)]
    pub email: String,
    /// Group memberships.
    #[serde(default)]
    pub roles: BTreeSet<String>,
    /// Holds [`ADMIN_ROLE`].
    #[serde(default)]
    pub is_admin: bool,
    /// Holds [`PREMIUM_ROLE`].
    #[serde(default)]
    pub is_premium: bool,
}

impl Principal {
    /// Creates a principal with only an id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Replaces the role set and recomputes the role flags.
    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self.sync_flags();
        self
    }

    /// Returns `true` if the principal holds `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Returns an identifier suitable for logging.
    ///
    /// Never contains the email or any credential material.
    #[must_use]
    pub fn log_id(&self) -> String {
        format!("user:{}", self.id)
    }

    fn sync_flags(&mut self) {
        self.is_admin = self.has_role(ADMIN_ROLE);
        self.is_premium = self.has_role(PREMIUM_ROLE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_drive_flags() {
        let principal = Principal::new("u1").with_roles(["Premium"]);
        assert!(principal.is_premium);
        assert!(!principal.is_admin);

        let principal = principal.with_roles(["Admin", "Premium"]);
        assert!(principal.is_admin);
        assert!(principal.is_premium);
    }

    #[test]
    fn test_role_names_are_case_sensitive() {
        let principal = Principal::new("u1").with_roles(["admin"]);
        assert!(!principal.is_admin);
    }

    #[test]
    fn test_log_id_hides_email() {
        let principal = Principal::new("u1").with_email("bob@example.com");
        assert_eq!(principal.log_id(), "user:u1");
    }

    #[test]
    fn test_serialization_uses_camel_case() {
        let principal = Principal::new("u1")
            .with_display_name("bob")
            .with_roles(["Admin"]);
        let json = serde_json::to_string(&principal).expect("serialization should work");
        assert!(json.contains("\"displayName\":\"bob\""));
        assert!(json.contains("\"isAdmin\":true"));

        let parsed: Principal = serde_json::from_str(&json).expect("deserialization should work");
        assert_eq!(parsed, principal);
    }
}

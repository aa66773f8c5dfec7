use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use myduka_core::{StoreId, UserId};

use crate::Role;

/// Bearer credential of the active session.
///
/// The token is opaque to the client. `refresh_token`, when the backend issues
/// one, is the session's refresh capability; otherwise the access token itself is
/// presented to the refresh endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredential {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    role: Role,
    issued_at: DateTime<Utc>,
}

impl SessionCredential {
    pub fn new(access_token: impl Into<String>, role: Role) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            role,
            issued_at: Utc::now(),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Token to present when asking for a new credential.
    pub fn refresh_capability(&self) -> &str {
        self.refresh_token.as_deref().unwrap_or(&self.access_token)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

// Tokens must never end up in logs.
impl core::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionCredential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("role", &self.role)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Minimal profile persisted next to the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub merchant_id: Option<UserId>,
    #[serde(default)]
    pub store_id: Option<StoreId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_tokens() {
        let cred = SessionCredential::new("secret-access", Role::Merchant).with_refresh_token("secret-refresh");
        let printed = format!("{cred:?}");
        assert!(!printed.contains("secret-access"));
        assert!(!printed.contains("secret-refresh"));
        assert!(printed.contains("MERCHANT") || printed.contains("Merchant"));
    }

    #[test]
    fn refresh_capability_falls_back_to_access_token() {
        let cred = SessionCredential::new("abc", Role::Clerk);
        assert_eq!(cred.refresh_capability(), "abc");
        assert_eq!(cred.bearer(), "Bearer abc");
        let cred = cred.with_refresh_token("r1");
        assert_eq!(cred.refresh_capability(), "r1");
    }
}

//! The persisted token entity and its public projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A persisted API token.
///
/// The plaintext secret is never part of this type; only its one-way
/// digest is stored. `secret_digest`, `tenant_id`, `user_id` and
/// `plugin_id` are immutable once persisted — only `last_used_at`,
/// `metadata` and lifecycle (deletion) may change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Unique token ID.
    pub id: Uuid,

    /// Owning tenant.
    pub tenant_id: Uuid,

    /// The member this token acts as.
    pub user_id: Uuid,

    /// Namespace of the integration that issued/consumes this token.
    /// Tokens from different plugins are isolated even within a tenant.
    pub plugin_id: String,

    /// Caller-defined sub-category (e.g. "service-account",
    /// "personal-access-token") scoping queries and revocation.
    pub kind: String,

    /// Human label, non-empty and trimmed.
    pub name: String,

    /// SHA-256 hex digest of the secret. Unique per `plugin_id`.
    /// Never serialized out of the engine.
    #[serde(default, skip_serializing)]
    pub secret_digest: String,

    /// Granted permission scopes. Set semantics; stored in a stable
    /// order. Never empty for a persisted token.
    pub scopes: BTreeSet<String>,

    /// Opaque caller-defined metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    /// Absolute expiry; `None` means the token never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Stamped opportunistically on successful validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Token {
    /// Whether the token is expired as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    /// The token's public fields, safe to return to callers.
    pub fn summary(&self) -> TokenSummary {
        TokenSummary {
            id: self.id,
            tenant_id: self.tenant_id,
            user_id: self.user_id,
            plugin_id: self.plugin_id.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            scopes: self.scopes.clone(),
            metadata: self.metadata.clone(),
            expires_at: self.expires_at,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
        }
    }
}

/// Public projection of a [`Token`] — everything except the digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSummary {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub plugin_id: String,
    pub kind: String,
    pub name: String,
    pub scopes: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TokenSummary {
    /// Exact-match superset check against a list of required scopes.
    /// Returns the first missing scope, if any.
    pub fn missing_scope<'a>(&self, required: &'a [String]) -> Option<&'a str> {
        required
            .iter()
            .find(|scope| !self.scopes.contains(scope.as_str()))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_token(expires_at: Option<DateTime<Utc>>) -> Token {
        Token {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plugin_id: "crm".into(),
            kind: "personal-access-token".into(),
            name: "ci bot".into(),
            secret_digest: "0".repeat(64),
            scopes: ["read".to_string(), "write".to_string()].into(),
            metadata: None,
            expires_at,
            last_used_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_expiry_check() {
        let now = Utc::now();
        assert!(!sample_token(None).is_expired(now));
        assert!(!sample_token(Some(now + Duration::hours(1))).is_expired(now));
        assert!(sample_token(Some(now - Duration::seconds(1))).is_expired(now));
    }

    #[test]
    fn test_digest_never_serialized() {
        let token = sample_token(None);
        let json = serde_json::to_value(&token).unwrap();
        assert!(json.get("secret_digest").is_none());
        assert_eq!(json["plugin_id"], "crm");
    }

    #[test]
    fn test_missing_scope() {
        let summary = sample_token(None).summary();
        assert_eq!(summary.missing_scope(&["read".into()]), None);
        assert_eq!(
            summary.missing_scope(&["read".into(), "admin".into()]),
            Some("admin")
        );
    }
}

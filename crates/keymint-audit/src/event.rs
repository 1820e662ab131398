//! Audit event types.
//!
//! Events are emitted on policy denial only; successful operations are
//! not audited by this subsystem. Format follows:
//! [event_type - tenant - actor - resource] with a metadata bag carrying
//! the violated rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditEventType {
    /// Token issuance was denied by quota or an external policy.
    IssuanceDeniedPolicy,
    /// Token usage (validation) was denied by an external policy.
    UsageDeniedPolicy,
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IssuanceDeniedPolicy => write!(f, "issuance-denied-policy"),
            Self::UsageDeniedPolicy => write!(f, "usage-denied-policy"),
        }
    }
}

/// Who triggered the denied operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActorIdentity {
    /// The acting user, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,

    /// Client IP address, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// Client user agent, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// An audit event emitted on policy denial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: Uuid,

    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,

    /// Event type.
    pub event_type: AuditEventType,

    /// Tenant the denied operation targeted.
    pub tenant_id: Uuid,

    /// Actor identity.
    #[serde(default)]
    pub actor: ActorIdentity,

    /// Resource reference: `plugin_id:kind` for issuance, or a token id.
    pub resource: String,

    /// Metadata bag including the violated rule.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub meta: serde_json::Value,
}

impl AuditEvent {
    /// Create a new audit event with the given type and core fields.
    pub fn new(
        event_type: AuditEventType,
        tenant_id: Uuid,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            event_type,
            tenant_id,
            actor: ActorIdentity::default(),
            resource: resource.into(),
            meta: serde_json::Value::Null,
        }
    }

    /// Set the actor identity.
    pub fn with_actor(mut self, actor: ActorIdentity) -> Self {
        self.actor = actor;
        self
    }

    /// Set the metadata bag.
    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = meta;
        self
    }

    /// Format the event as a human-readable log line.
    pub fn to_log_line(&self) -> String {
        format!(
            "[{} - {} - {} - {}]",
            self.event_type,
            self.tenant_id,
            self.actor
                .user_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            self.resource,
        )
    }
}

//! Optional deployment-specific policy hooks.
//!
//! Deployments can install extra rules (e.g. enterprise compliance
//! checks) without the core depending on them. Resolution is attempted
//! once per process lifetime and the result — including absence — is
//! cached. Absence means "no additional policy, allow".

use crate::membership::TenantRole;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

/// A denied policy check: machine-readable rule, human message,
/// optional structured detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub rule: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl PolicyViolation {
    pub fn new(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            message: message.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Everything an issuance policy gets to look at.
pub struct IssuancePolicyContext<'a> {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub actor_role: TenantRole,
    pub plugin_id: &'a str,
    pub kind: &'a str,
    pub scopes: &'a BTreeSet<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Externally supplied policy rules, evaluated in addition to the core
/// membership and quota checks.
#[async_trait]
pub trait PolicyHooks: Send + Sync {
    /// Called before a token is persisted. `Some` denies issuance.
    async fn check_issuance_policy(
        &self,
        ctx: &IssuancePolicyContext<'_>,
    ) -> Option<PolicyViolation>;

    /// Called on validation. `Some` denies usage.
    async fn check_usage_policy(
        &self,
        tenant_id: Uuid,
        request_ip: Option<&str>,
    ) -> Option<PolicyViolation>;
}

type HookResolver = Box<dyn Fn() -> Option<Arc<dyn PolicyHooks>> + Send + Sync>;

/// Lazily resolved, process-lifetime-cached registry of policy hooks.
///
/// First use runs the resolver; the outcome (hooks or their absence) is
/// memoized. Racing first resolutions is safe as long as the resolver
/// is idempotent — only one result is ever cached.
pub struct PolicyHookRegistry {
    resolver: HookResolver,
    resolved: OnceCell<Option<Arc<dyn PolicyHooks>>>,
}

impl PolicyHookRegistry {
    /// Registry that resolves hooks through the given closure on first
    /// use.
    pub fn new(resolver: impl Fn() -> Option<Arc<dyn PolicyHooks>> + Send + Sync + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
            resolved: OnceCell::new(),
        }
    }

    /// Registry with no hooks installed; every check allows.
    pub fn disabled() -> Self {
        Self::new(|| None)
    }

    /// Registry with the given hooks pre-installed. Used by tests and
    /// by deployments that wire hooks at startup.
    pub fn with_hooks(hooks: Arc<dyn PolicyHooks>) -> Self {
        Self::new(move || Some(Arc::clone(&hooks)))
    }

    async fn hooks(&self) -> Option<&Arc<dyn PolicyHooks>> {
        self.resolved
            .get_or_init(|| async { (self.resolver)() })
            .await
            .as_ref()
    }

    /// Evaluate the issuance policy. Absent hooks allow.
    pub async fn check_issuance_policy(
        &self,
        ctx: &IssuancePolicyContext<'_>,
    ) -> Option<PolicyViolation> {
        match self.hooks().await {
            Some(hooks) => hooks.check_issuance_policy(ctx).await,
            None => None,
        }
    }

    /// Evaluate the usage policy. Absent hooks allow.
    pub async fn check_usage_policy(
        &self,
        tenant_id: Uuid,
        request_ip: Option<&str>,
    ) -> Option<PolicyViolation> {
        match self.hooks().await {
            Some(hooks) => hooks.check_usage_policy(tenant_id, request_ip).await,
            None => None,
        }
    }
}

//! Token issuance.
//!
//! Issuance runs every admission check serialized under the
//! (tenant, user) issuance lock: actor membership, owner membership,
//! tenant-wide quota, per-user quota, then the optional external
//! policy. Only after all of them pass is a secret generated and the
//! row persisted. Denials by quota or policy emit an audit event before
//! the error is returned.

use chrono::{DateTime, Utc};
use keymint_audit::{ActorIdentity, AuditEvent, AuditEventType, AuditSink};
use keymint_core::{normalize_scopes, Token, TokenSummary};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::EngineError;
use crate::lock::IssuanceLocks;
use crate::membership::MembershipResolver;
use crate::policy::{IssuancePolicyContext, PolicyHookRegistry};
use crate::quota::{will_exceed, QuotaEnforcer};
use crate::secret::{digest_secret, generate_secret};
use crate::store::TokenStore;

/// A request to issue a new token.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    /// Tenant the token belongs to.
    pub tenant_id: Uuid,
    /// The member the token will act as.
    pub user_id: Uuid,
    /// The member performing the issuance. May differ from `user_id`
    /// when a privileged actor issues on behalf of another member.
    pub actor_id: Uuid,
    pub plugin_id: String,
    pub kind: String,
    pub name: String,
    pub scopes: Vec<String>,
    pub metadata: Option<serde_json::Value>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// An issued token: the persisted public fields plus the one-time
/// plaintext secret. The secret is never stored and never logged; this
/// is the only place it ever appears.
pub struct IssuedToken {
    pub token: TokenSummary,
    pub secret: String,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The plaintext secret must never reach logs or test output.
        f.debug_struct("IssuedToken")
            .field("token", &self.token)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Orchestrates membership, quota and policy checks around the creation
/// of a new token.
pub struct TokenIssuer {
    store: Arc<dyn TokenStore>,
    membership: Arc<dyn MembershipResolver>,
    quota: QuotaEnforcer,
    policy: Arc<PolicyHookRegistry>,
    locks: Arc<IssuanceLocks>,
    audit: Arc<dyn AuditSink>,
}

impl TokenIssuer {
    pub fn new(
        store: Arc<dyn TokenStore>,
        membership: Arc<dyn MembershipResolver>,
        quota: QuotaEnforcer,
        policy: Arc<PolicyHookRegistry>,
        locks: Arc<IssuanceLocks>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            membership,
            quota,
            policy,
            locks,
            audit,
        }
    }

    /// Issue a new token for `(tenant_id, user_id)`.
    ///
    /// Any failure leaves no partial token behind; the issuance lock is
    /// released when the guard drops on every exit path.
    pub async fn issue(&self, request: IssueRequest) -> Result<IssuedToken, EngineError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::Validation(
                "token name must not be empty".to_string(),
            ));
        }
        let scopes = normalize_scopes(&request.scopes);
        if scopes.is_empty() {
            return Err(EngineError::Validation(
                "at least one non-empty scope is required".to_string(),
            ));
        }
        if let Some(expires_at) = request.expires_at {
            if expires_at <= Utc::now() {
                return Err(EngineError::Validation(
                    "expiry must be in the future".to_string(),
                ));
            }
        }

        // Serialize with every other issuance for this (tenant, user)
        // pair; quota counts below are only trustworthy under this
        // guard.
        let _guard = self
            .locks
            .acquire(request.tenant_id, request.user_id)
            .await;

        let actor_role = self
            .membership
            .resolve_role(request.tenant_id, request.actor_id)
            .await?
            .ok_or(EngineError::NotAMember {
                tenant_id: request.tenant_id,
                user_id: request.actor_id,
            })?;

        // Issuing for another member requires the same privilege as
        // managing their tokens.
        if request.user_id != request.actor_id {
            if !actor_role.is_privileged() {
                return Err(EngineError::Forbidden(
                    "cannot issue tokens for another user".to_string(),
                ));
            }
            self.membership
                .resolve_role(request.tenant_id, request.user_id)
                .await?
                .ok_or(EngineError::NotAMember {
                    tenant_id: request.tenant_id,
                    user_id: request.user_id,
                })?;
        }

        let limits = self.quota.effective_limits(request.tenant_id);

        // Quota counts and the insert run through one store
        // transaction. Backends with cross-instance serialization
        // (advisory locks) take it when the transaction opens; any
        // failure below drops the transaction and leaves no partial
        // token.
        let mut txn = self
            .store
            .begin_issuance(request.tenant_id, request.user_id)
            .await?;

        let tenant_count = txn
            .count_for_tenant(&request.plugin_id, request.tenant_id)
            .await?;
        if let Some(err) =
            self.quota_denied(&request, "max-tokens-per-tenant", limits.per_tenant, tenant_count)
        {
            self.emit_denied(&request, &err).await;
            return Err(err);
        }

        let user_count = txn
            .count_for_user(&request.plugin_id, request.tenant_id, request.user_id)
            .await?;
        if let Some(err) =
            self.quota_denied(&request, "max-tokens-per-user", limits.per_user, user_count)
        {
            self.emit_denied(&request, &err).await;
            return Err(err);
        }

        let ctx = IssuancePolicyContext {
            tenant_id: request.tenant_id,
            user_id: request.user_id,
            actor_role,
            plugin_id: &request.plugin_id,
            kind: &request.kind,
            scopes: &scopes,
            expires_at: request.expires_at,
        };
        if let Some(violation) = self.policy.check_issuance_policy(&ctx).await {
            let err = EngineError::PolicyViolation {
                rule: violation.rule,
                message: violation.message,
                metadata: violation.metadata,
            };
            self.emit_denied(&request, &err).await;
            return Err(err);
        }

        let secret = generate_secret();
        let token = Token {
            id: Uuid::new_v4(),
            tenant_id: request.tenant_id,
            user_id: request.user_id,
            plugin_id: request.plugin_id.clone(),
            kind: request.kind.clone(),
            name,
            secret_digest: digest_secret(&secret),
            scopes,
            metadata: request.metadata.clone(),
            expires_at: request.expires_at,
            last_used_at: None,
            created_at: Utc::now(),
        };
        txn.insert(&token).await?;
        txn.commit().await?;

        tracing::debug!(
            token_id = %token.id,
            tenant = %token.tenant_id,
            user = %token.user_id,
            plugin = %token.plugin_id,
            kind = %token.kind,
            "issued token"
        );

        Ok(IssuedToken {
            token: token.summary(),
            secret,
        })
    }

    fn quota_denied(
        &self,
        request: &IssueRequest,
        rule: &str,
        limit: Option<u32>,
        current: u64,
    ) -> Option<EngineError> {
        let limit = limit?;
        if !will_exceed(Some(limit), current, 1) {
            return None;
        }
        tracing::debug!(
            tenant = %request.tenant_id,
            user = %request.user_id,
            rule,
            current,
            limit,
            "issuance denied by quota"
        );
        Some(EngineError::QuotaExceeded {
            rule: rule.to_string(),
            current,
            limit,
        })
    }

    /// Emit an issuance-denied audit event. Emission failures are
    /// logged and swallowed; the denial itself is already decided.
    async fn emit_denied(&self, request: &IssueRequest, err: &EngineError) {
        let meta = match err {
            EngineError::QuotaExceeded {
                rule,
                current,
                limit,
            } => json!({ "rule": rule, "current": current, "limit": limit }),
            EngineError::PolicyViolation { rule, message, metadata } => {
                json!({ "rule": rule, "message": message, "metadata": metadata })
            }
            _ => serde_json::Value::Null,
        };
        let event = AuditEvent::new(
            AuditEventType::IssuanceDeniedPolicy,
            request.tenant_id,
            format!("{}:{}", request.plugin_id, request.kind),
        )
        .with_actor(ActorIdentity {
            user_id: Some(request.actor_id),
            ip: None,
            user_agent: None,
        })
        .with_meta(meta);

        if let Err(emit_err) = self.audit.emit(event).await {
            tracing::warn!(error = %emit_err, "failed to emit audit event");
        }
    }
}

//! Token listing and revocation.
//!
//! Both operations gate on the same rule: an actor manages their own
//! tokens freely; managing another member's tokens (or the whole
//! tenant's) requires a privileged role.

use keymint_core::TokenSummary;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::EngineError;
use crate::membership::{MembershipResolver, TenantRole};
use crate::store::TokenStore;

/// A request to list tokens within a tenant.
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub tenant_id: Uuid,
    pub actor_id: Uuid,
    pub plugin_id: String,
    pub kind: Option<String>,
    /// Restrict to one member's tokens. Non-privileged actors must set
    /// this to themselves.
    pub user_id: Option<Uuid>,
}

/// A request to revoke a single token.
#[derive(Debug, Clone)]
pub struct RevokeRequest {
    pub tenant_id: Uuid,
    pub actor_id: Uuid,
    pub plugin_id: String,
    pub token_id: Uuid,
    pub kind: Option<String>,
    pub user_id: Option<Uuid>,
}

/// Result of a revocation. Revoking a token that does not exist (or was
/// already revoked) is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    NotFound,
}

/// Scoped listing and revocation of tokens.
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    membership: Arc<dyn MembershipResolver>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn TokenStore>, membership: Arc<dyn MembershipResolver>) -> Self {
        Self { store, membership }
    }

    /// List tokens, narrowed by the optional kind/user filters.
    pub async fn list_tokens(&self, request: ListRequest) -> Result<Vec<TokenSummary>, EngineError> {
        let role = self.actor_role(request.tenant_id, request.actor_id).await?;
        assert_actor_can_manage(request.actor_id, role, request.user_id)?;

        let tokens = self
            .store
            .list(
                &request.plugin_id,
                request.tenant_id,
                request.kind.as_deref(),
                request.user_id,
            )
            .await?;
        Ok(tokens.iter().map(|t| t.summary()).collect())
    }

    /// Revoke one token. Idempotent: a missing row is reported, not an
    /// error.
    pub async fn revoke_token(&self, request: RevokeRequest) -> Result<RevokeOutcome, EngineError> {
        let role = self.actor_role(request.tenant_id, request.actor_id).await?;
        assert_actor_can_manage(request.actor_id, role, request.user_id)?;

        // Non-privileged actors only ever match their own rows.
        let user_filter = if role.is_privileged() {
            request.user_id
        } else {
            Some(request.actor_id)
        };

        let removed = self
            .store
            .delete(
                &request.plugin_id,
                request.tenant_id,
                request.token_id,
                request.kind.as_deref(),
                user_filter,
            )
            .await?;

        if removed {
            tracing::debug!(
                token_id = %request.token_id,
                tenant = %request.tenant_id,
                actor = %request.actor_id,
                "revoked token"
            );
            Ok(RevokeOutcome::Revoked)
        } else {
            Ok(RevokeOutcome::NotFound)
        }
    }

    async fn actor_role(&self, tenant_id: Uuid, actor_id: Uuid) -> Result<TenantRole, EngineError> {
        self.membership
            .resolve_role(tenant_id, actor_id)
            .await?
            .ok_or(EngineError::NotAMember {
                tenant_id,
                user_id: actor_id,
            })
    }
}

/// The actor must be acting on their own tokens, or hold a privileged
/// tenant role. `target_user = None` means tenant-wide scope, which is
/// always privileged.
fn assert_actor_can_manage(
    actor_id: Uuid,
    role: TenantRole,
    target_user: Option<Uuid>,
) -> Result<(), EngineError> {
    if role.is_privileged() || target_user == Some(actor_id) {
        return Ok(());
    }
    Err(EngineError::Forbidden(
        "cannot manage tokens for another user".to_string(),
    ))
}

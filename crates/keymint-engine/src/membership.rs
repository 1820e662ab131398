//! Tenant membership resolution.
//!
//! The engine never owns membership data; it asks a resolver for the
//! role a user holds within a tenant. `None` means the user is not an
//! active member. Membership is checked at issuance time only — a token
//! outlives later membership changes until it is revoked.

use crate::store::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// A member's role within a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantRole {
    Owner,
    Admin,
    Member,
}

impl TenantRole {
    /// Privileged roles may manage (and issue) tokens for other
    /// members.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

/// Looks up a user's role within a tenant.
#[async_trait]
pub trait MembershipResolver: Send + Sync {
    /// The role `user_id` holds in `tenant_id`, or `None` if the user
    /// is not an active member.
    async fn resolve_role(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TenantRole>, StoreError>;
}

/// In-memory membership table, for tests and embedded use.
#[derive(Default)]
pub struct MemoryMembership {
    members: RwLock<HashMap<(Uuid, Uuid), TenantRole>>,
}

impl MemoryMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a member with a role.
    pub fn add_member(&self, tenant_id: Uuid, user_id: Uuid, role: TenantRole) {
        if let Ok(mut members) = self.members.write() {
            members.insert((tenant_id, user_id), role);
        }
    }

    /// Remove a member.
    pub fn remove_member(&self, tenant_id: Uuid, user_id: Uuid) {
        if let Ok(mut members) = self.members.write() {
            members.remove(&(tenant_id, user_id));
        }
    }
}

#[async_trait]
impl MembershipResolver for MemoryMembership {
    async fn resolve_role(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TenantRole>, StoreError> {
        let members = self
            .members
            .read()
            .map_err(|e| StoreError::Unavailable(format!("membership lock poisoned: {e}")))?;
        Ok(members.get(&(tenant_id, user_id)).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privileged_roles() {
        assert!(TenantRole::Owner.is_privileged());
        assert!(TenantRole::Admin.is_privileged());
        assert!(!TenantRole::Member.is_privileged());
    }

    #[tokio::test]
    async fn test_memory_membership() {
        let membership = MemoryMembership::new();
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();

        assert_eq!(membership.resolve_role(tenant, user).await.unwrap(), None);

        membership.add_member(tenant, user, TenantRole::Member);
        assert_eq!(
            membership.resolve_role(tenant, user).await.unwrap(),
            Some(TenantRole::Member)
        );

        membership.remove_member(tenant, user);
        assert_eq!(membership.resolve_role(tenant, user).await.unwrap(), None);
    }
}

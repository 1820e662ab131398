//! In-memory token store.

use super::{IssuanceTxn, StoreError, TokenStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keymint_core::Token;
use std::sync::RwLock;
use uuid::Uuid;

/// Token store backed by a vector behind a lock. Enforces the
/// per-plugin digest uniqueness invariant the same way the database
/// backend's unique index does.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<Vec<Token>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Token>>, StoreError> {
        self.tokens
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<Token>>, StoreError> {
        self.tokens
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }
}

fn matches_filters(token: &Token, kind: Option<&str>, user_id: Option<Uuid>) -> bool {
    if let Some(kind) = kind {
        if token.kind != kind {
            return false;
        }
    }
    if let Some(user_id) = user_id {
        if token.user_id != user_id {
            return false;
        }
    }
    true
}

/// Issuance transaction over the in-memory store. The insert is staged
/// and only applied on commit; dropping the transaction discards it.
pub struct MemoryIssuanceTxn<'a> {
    store: &'a MemoryTokenStore,
    staged: Vec<Token>,
}

#[async_trait]
impl IssuanceTxn for MemoryIssuanceTxn<'_> {
    async fn count_for_tenant(
        &mut self,
        plugin_id: &str,
        tenant_id: Uuid,
    ) -> Result<u64, StoreError> {
        let staged = self
            .staged
            .iter()
            .filter(|t| t.plugin_id == plugin_id && t.tenant_id == tenant_id)
            .count() as u64;
        Ok(self.store.count_for_tenant(plugin_id, tenant_id).await? + staged)
    }

    async fn count_for_user(
        &mut self,
        plugin_id: &str,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, StoreError> {
        let staged = self
            .staged
            .iter()
            .filter(|t| {
                t.plugin_id == plugin_id && t.tenant_id == tenant_id && t.user_id == user_id
            })
            .count() as u64;
        Ok(self
            .store
            .count_for_user(plugin_id, tenant_id, user_id)
            .await?
            + staged)
    }

    async fn insert(&mut self, token: &Token) -> Result<(), StoreError> {
        let committed = self.store.read()?;
        let duplicate = committed
            .iter()
            .chain(self.staged.iter())
            .any(|t| t.plugin_id == token.plugin_id && t.secret_digest == token.secret_digest);
        if duplicate {
            return Err(StoreError::DuplicateDigest);
        }
        drop(committed);
        self.staged.push(token.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        for token in &self.staged {
            self.store.insert(token).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn begin_issuance<'a>(
        &'a self,
        _tenant_id: Uuid,
        _user_id: Uuid,
    ) -> Result<Box<dyn IssuanceTxn + 'a>, StoreError> {
        // Serialization comes from the engine's in-process lock; the
        // memory transaction only provides staged visibility.
        Ok(Box::new(MemoryIssuanceTxn {
            store: self,
            staged: Vec::new(),
        }))
    }

    async fn insert(&self, token: &Token) -> Result<(), StoreError> {
        let mut tokens = self.write()?;
        if tokens
            .iter()
            .any(|t| t.plugin_id == token.plugin_id && t.secret_digest == token.secret_digest)
        {
            return Err(StoreError::DuplicateDigest);
        }
        tokens.push(token.clone());
        Ok(())
    }

    async fn count_for_tenant(&self, plugin_id: &str, tenant_id: Uuid) -> Result<u64, StoreError> {
        let tokens = self.read()?;
        Ok(tokens
            .iter()
            .filter(|t| t.plugin_id == plugin_id && t.tenant_id == tenant_id)
            .count() as u64)
    }

    async fn count_for_user(
        &self,
        plugin_id: &str,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, StoreError> {
        let tokens = self.read()?;
        Ok(tokens
            .iter()
            .filter(|t| {
                t.plugin_id == plugin_id && t.tenant_id == tenant_id && t.user_id == user_id
            })
            .count() as u64)
    }

    async fn find_by_digest(
        &self,
        plugin_id: &str,
        kind: Option<&str>,
        digest: &str,
    ) -> Result<Option<Token>, StoreError> {
        let tokens = self.read()?;
        Ok(tokens
            .iter()
            .find(|t| {
                t.plugin_id == plugin_id
                    && t.secret_digest == digest
                    && kind.is_none_or(|k| t.kind == k)
            })
            .cloned())
    }

    async fn touch_last_used(&self, token_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tokens = self.write()?;
        if let Some(token) = tokens.iter_mut().find(|t| t.id == token_id) {
            token.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn delete(
        &self,
        plugin_id: &str,
        tenant_id: Uuid,
        token_id: Uuid,
        kind: Option<&str>,
        user_id: Option<Uuid>,
    ) -> Result<bool, StoreError> {
        let mut tokens = self.write()?;
        let before = tokens.len();
        tokens.retain(|t| {
            !(t.id == token_id
                && t.plugin_id == plugin_id
                && t.tenant_id == tenant_id
                && matches_filters(t, kind, user_id))
        });
        Ok(tokens.len() < before)
    }

    async fn list(
        &self,
        plugin_id: &str,
        tenant_id: Uuid,
        kind: Option<&str>,
        user_id: Option<Uuid>,
    ) -> Result<Vec<Token>, StoreError> {
        let tokens = self.read()?;
        Ok(tokens
            .iter()
            .filter(|t| {
                t.plugin_id == plugin_id
                    && t.tenant_id == tenant_id
                    && matches_filters(t, kind, user_id)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn token(plugin: &str, tenant: Uuid, user: Uuid, digest: &str) -> Token {
        Token {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            user_id: user,
            plugin_id: plugin.to_string(),
            kind: "pat".to_string(),
            name: "test".to_string(),
            secret_digest: digest.to_string(),
            scopes: BTreeSet::from(["read".to_string()]),
            metadata: None,
            expires_at: None,
            last_used_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_digest_rejected_per_plugin() {
        let store = MemoryTokenStore::new();
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();

        store.insert(&token("crm", tenant, user, "d1")).await.unwrap();
        let err = store
            .insert(&token("crm", tenant, user, "d1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateDigest));

        // Same digest under a different plugin is fine
        store.insert(&token("erp", tenant, user, "d1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_counts_scoped_by_plugin_tenant_user() {
        let store = MemoryTokenStore::new();
        let tenant = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        store.insert(&token("crm", tenant, alice, "a")).await.unwrap();
        store.insert(&token("crm", tenant, alice, "b")).await.unwrap();
        store.insert(&token("crm", tenant, bob, "c")).await.unwrap();
        store.insert(&token("erp", tenant, alice, "d")).await.unwrap();

        assert_eq!(store.count_for_tenant("crm", tenant).await.unwrap(), 3);
        assert_eq!(store.count_for_user("crm", tenant, alice).await.unwrap(), 2);
        assert_eq!(store.count_for_user("crm", tenant, bob).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_respects_kind_filter() {
        let store = MemoryTokenStore::new();
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        store.insert(&token("crm", tenant, user, "d1")).await.unwrap();

        assert!(store
            .find_by_digest("crm", Some("pat"), "d1")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_by_digest("crm", Some("service-account"), "d1")
            .await
            .unwrap()
            .is_none());
        assert!(store.find_by_digest("crm", None, "d1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_issuance_txn_commit_makes_insert_visible() {
        let store = MemoryTokenStore::new();
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();

        let mut txn = store.begin_issuance(tenant, user).await.unwrap();
        txn.insert(&token("crm", tenant, user, "d1")).await.unwrap();
        // Counts inside the transaction see the staged row.
        assert_eq!(txn.count_for_user("crm", tenant, user).await.unwrap(), 1);
        // Committed state does not, yet.
        assert_eq!(store.count_for_user("crm", tenant, user).await.unwrap(), 0);

        txn.commit().await.unwrap();
        assert_eq!(store.count_for_user("crm", tenant, user).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_issuance_txn_drop_discards_insert() {
        let store = MemoryTokenStore::new();
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();

        {
            let mut txn = store.begin_issuance(tenant, user).await.unwrap();
            txn.insert(&token("crm", tenant, user, "d1")).await.unwrap();
        }
        assert_eq!(store.count_for_tenant("crm", tenant).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_issuance_txn_rejects_duplicate_digest() {
        let store = MemoryTokenStore::new();
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        store.insert(&token("crm", tenant, user, "d1")).await.unwrap();

        let mut txn = store.begin_issuance(tenant, user).await.unwrap();
        let err = txn.insert(&token("crm", tenant, user, "d1")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateDigest));
    }

    #[tokio::test]
    async fn test_delete_reports_removal() {
        let store = MemoryTokenStore::new();
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        let t = token("crm", tenant, user, "d1");
        store.insert(&t).await.unwrap();

        assert!(store
            .delete("crm", tenant, t.id, None, None)
            .await
            .unwrap());
        assert!(!store
            .delete("crm", tenant, t.id, None, None)
            .await
            .unwrap());
    }
}

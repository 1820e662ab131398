//! Token persistence seam.
//!
//! All reads and writes of token rows go through [`TokenStore`]. The
//! in-memory backend lives here for tests and embedded use; the
//! Postgres backend lives in the `keymint-adapter-pg` crate.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keymint_core::Token;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryTokenStore;

/// Errors from a token store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A token with the same digest already exists for this plugin.
    #[error("secret digest already exists for this plugin")]
    DuplicateDigest,

    /// The backend is unreachable or failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Row data could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// An open issuance transaction.
///
/// The issuer reads its quota counts and writes the new row through one
/// of these, then commits. Dropping the transaction without committing
/// discards the insert, so no partial token is ever visible. Backends
/// that serialize across processes (e.g. Postgres advisory locks) take
/// their locks when the transaction opens and release them when it
/// ends.
#[async_trait]
pub trait IssuanceTxn: Send {
    /// Live tokens for a plugin across the tenant, read inside the
    /// transaction.
    async fn count_for_tenant(&mut self, plugin_id: &str, tenant_id: Uuid)
        -> Result<u64, StoreError>;

    /// Live tokens for a plugin held by one (tenant, user) pair, read
    /// inside the transaction.
    async fn count_for_user(
        &mut self,
        plugin_id: &str,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, StoreError>;

    /// Stage the new token. Fails with [`StoreError::DuplicateDigest`]
    /// if the (plugin_id, secret_digest) pair already exists.
    async fn insert(&mut self, token: &Token) -> Result<(), StoreError>;

    /// Commit the transaction, making the insert visible.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Persistence operations for token rows.
///
/// The issuer calls [`TokenStore::begin_issuance`] while it holds the
/// in-process issuance lock for the affected (tenant, user) pair;
/// backends do not need their own admission logic, only the per-plugin
/// digest uniqueness constraint and transactional visibility.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Open an issuance transaction for a (tenant, user) pair.
    async fn begin_issuance<'a>(
        &'a self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Box<dyn IssuanceTxn + 'a>, StoreError>;

    /// Persist a new token outside an issuance transaction. Fails with
    /// [`StoreError::DuplicateDigest`] if the (plugin_id,
    /// secret_digest) pair already exists.
    async fn insert(&self, token: &Token) -> Result<(), StoreError>;

    /// Live tokens for a plugin across a whole tenant.
    async fn count_for_tenant(&self, plugin_id: &str, tenant_id: Uuid) -> Result<u64, StoreError>;

    /// Live tokens for a plugin held by one (tenant, user) pair.
    async fn count_for_user(
        &self,
        plugin_id: &str,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, StoreError>;

    /// Look up a token by plugin, optional kind filter, and digest.
    async fn find_by_digest(
        &self,
        plugin_id: &str,
        kind: Option<&str>,
        digest: &str,
    ) -> Result<Option<Token>, StoreError>;

    /// Stamp `last_used_at`. Best-effort callers swallow failures.
    async fn touch_last_used(&self, token_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Delete one token matched by id + tenant + plugin, narrowed by
    /// the optional kind/user filters. Returns whether a row was
    /// removed.
    async fn delete(
        &self,
        plugin_id: &str,
        tenant_id: Uuid,
        token_id: Uuid,
        kind: Option<&str>,
        user_id: Option<Uuid>,
    ) -> Result<bool, StoreError>;

    /// List tokens for a plugin within a tenant, narrowed by the
    /// optional kind/user filters.
    async fn list(
        &self,
        plugin_id: &str,
        tenant_id: Uuid,
        kind: Option<&str>,
        user_id: Option<Uuid>,
    ) -> Result<Vec<Token>, StoreError>;
}

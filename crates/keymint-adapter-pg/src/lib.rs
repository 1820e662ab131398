//! Postgres-backed token store.
//!
//! Implements the engine's `TokenStore` trait over a `keymint_tokens`
//! table. The per-plugin digest uniqueness invariant is a unique index;
//! violations map to `StoreError::DuplicateDigest`.
//!
//! The issuer's `begin_issuance` call lands on
//! [`PgTokenStore::issuance_guard`], which opens a transaction holding
//! `pg_advisory_xact_lock` keys derived from the (tenant, user) pair.
//! Quota counts and the insert run inside that transaction, so
//! issuance is serialized across engine instances sharing one
//! database. The locks are released automatically at commit or
//! rollback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keymint_core::Token;
use keymint_engine::{IssuanceTxn, StoreError, TokenStore};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

const INSERT_SQL: &str = "INSERT INTO keymint_tokens \
     (id, tenant_id, user_id, plugin_id, kind, name, secret_digest, scopes, metadata, \
      expires_at, last_used_at, created_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)";

const COUNT_TENANT_SQL: &str =
    "SELECT COUNT(*) FROM keymint_tokens WHERE plugin_id = $1 AND tenant_id = $2";

const COUNT_USER_SQL: &str = "SELECT COUNT(*) FROM keymint_tokens \
     WHERE plugin_id = $1 AND tenant_id = $2 AND user_id = $3";

/// Token store backed by Postgres.
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    /// Connect to the database.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tokens table and its indexes if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS keymint_tokens (
                id UUID PRIMARY KEY,
                tenant_id UUID NOT NULL,
                user_id UUID NOT NULL,
                plugin_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                secret_digest TEXT NOT NULL,
                scopes TEXT[] NOT NULL,
                metadata JSONB,
                expires_at TIMESTAMPTZ,
                last_used_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL
            )",
            "CREATE UNIQUE INDEX IF NOT EXISTS keymint_tokens_plugin_digest \
             ON keymint_tokens (plugin_id, secret_digest)",
            "CREATE INDEX IF NOT EXISTS keymint_tokens_plugin_tenant_user \
             ON keymint_tokens (plugin_id, tenant_id, user_id)",
        ];
        for sql in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
        }
        Ok(())
    }

    /// Open a transaction that holds the advisory locks for a
    /// (tenant, user) pair. Counting and insertion through the guard
    /// are serialized with every other issuance for the same pair,
    /// across engine instances.
    pub async fn issuance_guard(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<PgIssuanceGuard, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
            .bind(lock_key(tenant_id))
            .bind(lock_key(user_id))
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
        Ok(PgIssuanceGuard { tx })
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn begin_issuance<'a>(
        &'a self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Box<dyn IssuanceTxn + 'a>, StoreError> {
        Ok(Box::new(self.issuance_guard(tenant_id, user_id).await?))
    }

    async fn insert(&self, token: &Token) -> Result<(), StoreError> {
        bind_token(sqlx::query(INSERT_SQL), token)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn count_for_tenant(&self, plugin_id: &str, tenant_id: Uuid) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(COUNT_TENANT_SQL)
            .bind(plugin_id)
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(count as u64)
    }

    async fn count_for_user(
        &self,
        plugin_id: &str,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(COUNT_USER_SQL)
            .bind(plugin_id)
            .bind(tenant_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(count as u64)
    }

    async fn find_by_digest(
        &self,
        plugin_id: &str,
        kind: Option<&str>,
        digest: &str,
    ) -> Result<Option<Token>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM keymint_tokens \
             WHERE plugin_id = $1 AND secret_digest = $2 \
               AND ($3::text IS NULL OR kind = $3)",
        )
        .bind(plugin_id)
        .bind(digest)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;

        row.map(|row| token_from_row(&row)).transpose()
    }

    async fn touch_last_used(&self, token_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE keymint_tokens SET last_used_at = $2 WHERE id = $1")
            .bind(token_id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
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
        let result = sqlx::query(
            "DELETE FROM keymint_tokens \
             WHERE id = $1 AND plugin_id = $2 AND tenant_id = $3 \
               AND ($4::text IS NULL OR kind = $4) \
               AND ($5::uuid IS NULL OR user_id = $5)",
        )
        .bind(token_id)
        .bind(plugin_id)
        .bind(tenant_id)
        .bind(kind)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(
        &self,
        plugin_id: &str,
        tenant_id: Uuid,
        kind: Option<&str>,
        user_id: Option<Uuid>,
    ) -> Result<Vec<Token>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM keymint_tokens \
             WHERE plugin_id = $1 AND tenant_id = $2 \
               AND ($3::text IS NULL OR kind = $3) \
               AND ($4::uuid IS NULL OR user_id = $4) \
             ORDER BY created_at DESC",
        )
        .bind(plugin_id)
        .bind(tenant_id)
        .bind(kind)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        rows.iter().map(token_from_row).collect()
    }
}

/// A transaction holding the advisory issuance locks for one
/// (tenant, user) pair. Dropping the guard without committing rolls the
/// transaction back and releases the locks.
pub struct PgIssuanceGuard {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl IssuanceTxn for PgIssuanceGuard {
    async fn count_for_tenant(
        &mut self,
        plugin_id: &str,
        tenant_id: Uuid,
    ) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(COUNT_TENANT_SQL)
            .bind(plugin_id)
            .bind(tenant_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_err)?;
        Ok(count as u64)
    }

    async fn count_for_user(
        &mut self,
        plugin_id: &str,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(COUNT_USER_SQL)
            .bind(plugin_id)
            .bind(tenant_id)
            .bind(user_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_err)?;
        Ok(count as u64)
    }

    async fn insert(&mut self, token: &Token) -> Result<(), StoreError> {
        bind_token(sqlx::query(INSERT_SQL), token)
            .execute(&mut *self.tx)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(map_err)
    }
}

/// Derive an advisory lock key from a UUID. Only the first four bytes
/// are used; a key collision merely serializes two unrelated pairs,
/// which is safe.
fn lock_key(id: Uuid) -> i32 {
    let bytes = id.as_bytes();
    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

type PgQuery<'q> =
    sqlx::query::Query<'q, Postgres, <Postgres as sqlx::Database>::Arguments<'q>>;

fn bind_token<'q>(query: PgQuery<'q>, token: &'q Token) -> PgQuery<'q> {
    let scopes: Vec<String> = token.scopes.iter().cloned().collect();
    query
        .bind(token.id)
        .bind(token.tenant_id)
        .bind(token.user_id)
        .bind(&token.plugin_id)
        .bind(&token.kind)
        .bind(&token.name)
        .bind(&token.secret_digest)
        .bind(scopes)
        .bind(&token.metadata)
        .bind(token.expires_at)
        .bind(token.last_used_at)
        .bind(token.created_at)
}

fn token_from_row(row: &PgRow) -> Result<Token, StoreError> {
    let scopes: Vec<String> = row.try_get("scopes").map_err(map_err)?;
    Ok(Token {
        id: row.try_get("id").map_err(map_err)?,
        tenant_id: row.try_get("tenant_id").map_err(map_err)?,
        user_id: row.try_get("user_id").map_err(map_err)?,
        plugin_id: row.try_get("plugin_id").map_err(map_err)?,
        kind: row.try_get("kind").map_err(map_err)?,
        name: row.try_get("name").map_err(map_err)?,
        secret_digest: row.try_get("secret_digest").map_err(map_err)?,
        scopes: scopes.into_iter().collect(),
        metadata: row.try_get("metadata").map_err(map_err)?,
        expires_at: row.try_get("expires_at").map_err(map_err)?,
        last_used_at: row.try_get("last_used_at").map_err(map_err)?,
        created_at: row.try_get("created_at").map_err(map_err)?,
    })
}

fn map_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db) = err {
        if db.code().as_deref() == Some("23505") {
            return StoreError::DuplicateDigest;
        }
    }
    StoreError::Unavailable(err.to_string())
}

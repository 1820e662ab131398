//! Error types for the token engine.
//!
//! Expected validation-path outcomes (not found, expired, bad format)
//! are not errors; they live in [`crate::validator::ValidationOutcome`].
//! This enum covers caller mistakes, authorization failures, policy
//! denials and infrastructure faults.

use crate::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by issuance and management operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller input was malformed (empty name, empty scopes, bad date).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced user is not an active member of the tenant.
    #[error("user {user_id} is not an active member of tenant {tenant_id}")]
    NotAMember { tenant_id: Uuid, user_id: Uuid },

    /// The actor is not allowed to perform this operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A quota limit would be exceeded.
    #[error("quota exceeded ({rule}): {current} of {limit} tokens in use")]
    QuotaExceeded {
        rule: String,
        current: u64,
        limit: u32,
    },

    /// An external policy hook denied the operation.
    #[error("policy violation ({rule}): {message}")]
    PolicyViolation {
        rule: String,
        message: String,
        metadata: Option<serde_json::Value>,
    },

    /// The token store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

//! Multi-tenant API token issuance and validation engine.
//!
//! The engine creates, lists, revokes and verifies scoped bearer tokens
//! that let external plugins act on behalf of a (tenant, user) pair.
//! Issuance is admission-controlled: membership, quota and optional
//! policy checks run serialized per (tenant, user) so concurrent
//! requests cannot double-spend a quota slot.
//!
//! External collaborators sit behind traits: [`store::TokenStore`] for
//! persistence, [`membership::MembershipResolver`] for role lookup,
//! [`policy::PolicyHooks`] for deployment-specific rules, and
//! `keymint_audit::AuditSink` for denial events.

pub mod error;
pub mod issuer;
pub mod lock;
pub mod manage;
pub mod membership;
pub mod policy;
pub mod quota;
pub mod secret;
pub mod store;
pub mod validator;

pub use error::EngineError;
pub use issuer::{IssueRequest, IssuedToken, TokenIssuer};
pub use lock::IssuanceLocks;
pub use manage::{ListRequest, RevokeOutcome, RevokeRequest, TokenManager};
pub use membership::{MembershipResolver, MemoryMembership, TenantRole};
pub use policy::{IssuancePolicyContext, PolicyHookRegistry, PolicyHooks, PolicyViolation};
pub use quota::{will_exceed, QuotaEnforcer};
pub use secret::{digest_secret, generate_secret, MIN_SECRET_LEN};
pub use store::{IssuanceTxn, MemoryTokenStore, StoreError, TokenStore};
pub use validator::{TokenValidator, ValidateRequest, ValidationOutcome};

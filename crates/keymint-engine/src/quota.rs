//! Quota admission.
//!
//! The enforcer is pure arithmetic over counts and limits; the counts
//! themselves must be read while the issuance lock for the affected
//! (tenant, user) pair is held, otherwise two concurrent issuances can
//! both observe a stale count and both pass.

use keymint_core::config::{EffectiveLimits, QuotaConfig};
use uuid::Uuid;

/// Whether adding `increment` tokens to `current` would exceed `limit`.
/// A `None` limit means unlimited.
pub fn will_exceed(limit: Option<u32>, current: u64, increment: u64) -> bool {
    match limit {
        Some(limit) => current + increment > u64::from(limit),
        None => false,
    }
}

/// Resolves tenant-tier limits and decides admission.
pub struct QuotaEnforcer {
    config: QuotaConfig,
}

impl QuotaEnforcer {
    pub fn new(config: QuotaConfig) -> Self {
        Self { config }
    }

    /// Enforcer with no limits at all.
    pub fn unlimited() -> Self {
        Self {
            config: QuotaConfig::default(),
        }
    }

    /// The per-tenant / per-user maxima that apply to a tenant.
    pub fn effective_limits(&self, tenant_id: Uuid) -> EffectiveLimits {
        self.config.effective_limits(tenant_id)
    }
}

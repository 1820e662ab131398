//! Quota tier configuration.
//!
//! Tenants are assigned a named tier; each tier carries optional maxima
//! for tokens per tenant and tokens per user. An absent limit means
//! unlimited. Tenants without an explicit assignment fall back to the
//! default tier.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::error::ConfigError;

/// Limits carried by a single quota tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierLimits {
    /// Maximum live tokens across the whole tenant. `None` = unlimited.
    #[serde(default)]
    pub max_tokens_per_tenant: Option<u32>,

    /// Maximum live tokens per (tenant, user) pair. `None` = unlimited.
    #[serde(default)]
    pub max_tokens_per_user: Option<u32>,
}

/// The limits that apply to one tenant after tier resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveLimits {
    pub per_tenant: Option<u32>,
    pub per_user: Option<u32>,
}

/// Quota configuration: named tiers plus per-tenant assignments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Named tiers (e.g. "free", "team", "enterprise").
    #[serde(default)]
    pub tiers: HashMap<String, TierLimits>,

    /// Tier used for tenants without an explicit assignment.
    #[serde(default = "default_tier_name")]
    pub default_tier: String,

    /// Per-tenant tier overrides, keyed by tenant UUID.
    #[serde(default)]
    pub tenant_tiers: HashMap<Uuid, String>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            tiers: HashMap::new(),
            default_tier: default_tier_name(),
            tenant_tiers: HashMap::new(),
        }
    }
}

impl QuotaConfig {
    /// Load quota configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse quota configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every tenant assignment references a defined tier.
    /// The default tier may be undefined, in which case it means
    /// unlimited.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (tenant, tier) in &self.tenant_tiers {
            if !self.tiers.contains_key(tier) {
                return Err(ConfigError::UnknownTier {
                    tier: tier.clone(),
                    tenant: tenant.to_string(),
                });
            }
        }
        Ok(())
    }

    /// The tier name that applies to a tenant.
    pub fn tier_for(&self, tenant_id: Uuid) -> &str {
        self.tenant_tiers
            .get(&tenant_id)
            .map(String::as_str)
            .unwrap_or(&self.default_tier)
    }

    /// Resolve the effective limits for a tenant. An unknown tier
    /// (including an undefined default) resolves to unlimited.
    pub fn effective_limits(&self, tenant_id: Uuid) -> EffectiveLimits {
        match self.tiers.get(self.tier_for(tenant_id)) {
            Some(limits) => EffectiveLimits {
                per_tenant: limits.max_tokens_per_tenant,
                per_user: limits.max_tokens_per_user,
            },
            None => EffectiveLimits {
                per_tenant: None,
                per_user: None,
            },
        }
    }
}

fn default_tier_name() -> String {
    "default".to_string()
}

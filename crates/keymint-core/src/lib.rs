//! Shared types and configuration for the Keymint token engine.
//!
//! This crate holds the persisted [`Token`] entity, its public
//! [`TokenSummary`] projection, scope normalization, and the YAML-loadable
//! quota configuration used by the engine's admission checks.

pub mod config;
pub mod scopes;
pub mod token;

mod error;

pub use config::{EffectiveLimits, KeymintConfig, QuotaConfig, TierLimits};
pub use error::ConfigError;
pub use scopes::normalize_scopes;
pub use token::{Token, TokenSummary};

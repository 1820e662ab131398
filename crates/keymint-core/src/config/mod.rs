//! Configuration types for the Keymint token engine.
//!
//! Configuration is loaded from a YAML file (keymint.yaml) and holds the
//! quota tiers used by issuance admission. The quota section can also be
//! split into its own file and referenced by path.

pub mod quota;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub use quota::{EffectiveLimits, QuotaConfig, TierLimits};

/// Complete Keymint configuration loaded from files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeymintConfig {
    /// Project name.
    #[serde(default)]
    pub project: Option<String>,

    /// Quota tiers (inline or from file).
    #[serde(default)]
    pub quotas: QuotaConfig,

    /// Path to a quota configuration file (alternative to inline).
    #[serde(default)]
    pub quotas_file: Option<PathBuf>,
}

impl KeymintConfig {
    /// Load configuration from a YAML file, resolving a `quotas_file`
    /// reference relative to the config file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config: Self = serde_yaml::from_str(&content)?;

        if let Some(quotas_file) = config.quotas_file.clone() {
            let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
            let quotas_path = if quotas_file.is_absolute() {
                quotas_file
            } else {
                base_dir.join(quotas_file)
            };
            config.quotas = QuotaConfig::from_file(quotas_path)?;
        }

        config.quotas.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.quotas.validate()?;
        Ok(config)
    }
}

//! Error types for configuration loading.

use thiserror::Error;

/// Errors that can occur when loading Keymint configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse YAML content.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A tenant override references a tier that is not defined.
    #[error("unknown quota tier '{tier}' referenced by tenant '{tenant}'")]
    UnknownTier { tier: String, tenant: String },

    /// Configuration is invalid.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

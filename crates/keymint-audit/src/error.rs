//! Error types for the audit crate.

use thiserror::Error;

/// Errors that can occur when emitting audit events.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The sink failed to accept the event.
    #[error("failed to emit audit event: {0}")]
    EmitFailed(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

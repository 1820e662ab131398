//! Audit sinks.
//!
//! The engine emits events through [`AuditSink`]; durable persistence
//! and delivery live behind this trait, outside the engine.

use crate::error::AuditError;
use crate::event::AuditEvent;
use async_trait::async_trait;
use std::sync::RwLock;

/// Trait for audit event sinks.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Emit an audit event.
    async fn emit(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Sink that writes events as structured tracing output. The default.
pub struct TracingSink;

#[async_trait]
impl AuditSink for TracingSink {
    async fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        tracing::info!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            tenant = %event.tenant_id,
            resource = %event.resource,
            meta = %event.meta,
            "audit event"
        );
        Ok(())
    }
}

/// Sink that discards events.
pub struct NullSink;

#[async_trait]
impl AuditSink for NullSink {
    async fn emit(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct MemorySink {
    events: RwLock<Vec<AuditEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events emitted so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events
            .write()
            .map_err(|e| AuditError::EmitFailed(format!("lock poisoned: {e}")))?
            .push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditEventType;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_memory_sink_records_events() {
        let sink = MemorySink::new();
        let event = AuditEvent::new(
            AuditEventType::IssuanceDeniedPolicy,
            Uuid::new_v4(),
            "crm:pat",
        );
        sink.emit(event.clone()).await.unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, event.event_id);
    }

    #[tokio::test]
    async fn test_null_sink_accepts_anything() {
        let sink = NullSink;
        let event = AuditEvent::new(
            AuditEventType::UsageDeniedPolicy,
            Uuid::new_v4(),
            "token-id",
        );
        assert!(sink.emit(event).await.is_ok());
    }
}

//! Audit events for the Keymint token engine.
//!
//! The engine emits a structured event whenever a policy or quota check
//! denies an operation. Persistence and delivery are external concerns;
//! this crate only defines the event shape and the [`AuditSink`] seam
//! the engine emits through.

pub mod event;
pub mod sink;

mod error;

pub use error::AuditError;
pub use event::{ActorIdentity, AuditEvent, AuditEventType};
pub use sink::{AuditSink, MemorySink, NullSink, TracingSink};

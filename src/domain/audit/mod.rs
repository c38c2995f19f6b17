//! Security audit logging.

pub mod events;
pub mod logger;
pub mod sink;

pub use events::{AuditEvent, AuditEventType, AuditSeverity};
pub use logger::{AuditLogger, ResourceAction};
pub use sink::{AuditSink, AuditSinkError, InMemoryAuditSink, TracingAuditSink};

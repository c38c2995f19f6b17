//! Audit Sinks

use std::sync::Mutex;

use thiserror::Error;
use tracing::{error, info};

use crate::domain::audit::events::{AuditEvent, AuditSeverity};

/// A sink delivery failure. Confined to this module: the logger swallows it.
#[derive(Debug, Error)]
pub enum AuditSinkError {
    #[error("failed to serialize audit event")]
    Serialize(#[from] serde_json::Error),

    #[error("audit sink rejected event: {0}")]
    Rejected(String),
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    /// Delivers one event.
    ///
    /// # Errors
    ///
    /// Returns an [`AuditSinkError`] when the event could not be delivered.
    fn record(&self, event: &AuditEvent) -> Result<(), AuditSinkError>;
}

/// Emits events on the `tenancy::audit` tracing target as single-line JSON.
///
/// Critical events are emitted on the standard stream *and* the error-level
/// channel so alerting pipelines see them without parsing payloads.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        let payload = serde_json::to_string(event)?;

        info!(
            target: "tenancy::audit",
            event_type = ?event.event_type,
            severity = event.severity.as_str(),
            tenant = event.tenant.map(|t| t.to_string()),
            success = event.success,
            audit = %payload,
        );

        if event.severity == AuditSeverity::Critical {
            error!(
                target: "tenancy::audit",
                event_type = ?event.event_type,
                tenant = event.tenant.map(|t| t.to_string()),
                audit = %payload,
                "critical audit event"
            );
        }

        Ok(())
    }
}

/// Collects events in memory. Used by tests and short-lived tools.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());

        Ok(())
    }
}

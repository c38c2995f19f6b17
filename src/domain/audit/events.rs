//! Audit Events

use jiff::Timestamp;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::tenants::TenantUuid;

/// Security-relevant event families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    Authentication,
    WorkspaceAccessGranted,
    WorkspaceAccessDenied,
    ResourceCreated,
    ResourceUpdated,
    ResourceDeleted,
    QuotaExceeded,
    QuotaWarning,
    QuotaUpdated,
    SuspiciousActivity,
    BulkOperation,
}

/// Event severity. `Critical` events are additionally routed to the
/// error-level channel by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AuditSeverity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// An immutable, structured audit record.
///
/// Events are data, not formatted strings: a hostile value in `message` or
/// `context` cannot forge adjacent fields in the emitted record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub uuid: Uuid,
    pub recorded_at: Timestamp,
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    /// Absent when the event is about input that failed tenant validation.
    pub tenant: Option<TenantUuid>,
    pub message: String,
    pub context: Map<String, Value>,
    pub success: bool,
    pub error: Option<String>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(
        event_type: AuditEventType,
        severity: AuditSeverity,
        tenant: Option<TenantUuid>,
        message: impl Into<String>,
        context: Map<String, Value>,
        success: bool,
        error: Option<String>,
    ) -> Self {
        Self {
            uuid: Uuid::now_v7(),
            recorded_at: Timestamp::now(),
            event_type,
            severity,
            tenant,
            message: message.into(),
            context,
            success,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn events_serialize_as_structured_records() {
        let tenant = TenantUuid::new();

        let mut context = Map::new();
        context.insert("resource_kind".to_string(), json!("segments"));

        let event = AuditEvent::new(
            AuditEventType::QuotaExceeded,
            AuditSeverity::Medium,
            Some(tenant),
            "segment quota exceeded",
            context,
            false,
            None,
        );

        let value: Value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["event_type"], "QUOTA_EXCEEDED");
        assert_eq!(value["severity"], "MEDIUM");
        assert_eq!(value["tenant"], json!(tenant.to_string()));
        assert_eq!(value["context"]["resource_kind"], "segments");
        assert_eq!(value["success"], false);
    }

    #[test]
    fn log_injection_stays_inside_its_field() {
        // A newline-and-fake-fields payload must remain a plain string value.
        let payload = "x\" , \"severity\": \"LOW\"\ninjected=true";

        let event = AuditEvent::new(
            AuditEventType::SuspiciousActivity,
            AuditSeverity::High,
            None,
            payload,
            Map::new(),
            false,
            None,
        );

        let json = serde_json::to_string(&event).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(back["message"], payload);
        assert_eq!(back["severity"], "HIGH");
    }

    #[test]
    fn severity_orders_by_escalation() {
        assert!(AuditSeverity::Low < AuditSeverity::Medium);
        assert!(AuditSeverity::High < AuditSeverity::Critical);
    }
}

//! Audit Logger

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use serde_json::{Map, Value, json};
use tracing::error;

use crate::{
    domain::{
        audit::{
            events::{AuditEvent, AuditEventType, AuditSeverity},
            sink::AuditSink,
        },
        quota::records::{QuotaLimits, ResourceKind},
    },
    tenants::{TenantUuid, parse_tenant_id},
};

/// Longest slice of hostile input echoed back inside an audit event.
const MALFORMED_INPUT_SAMPLE_LEN: usize = 64;

/// CRUD action recorded by [`AuditLogger::resource_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceAction {
    Created,
    Updated,
    Deleted,
}

impl ResourceAction {
    const fn event_type(self) -> AuditEventType {
        match self {
            Self::Created => AuditEventType::ResourceCreated,
            Self::Updated => AuditEventType::ResourceUpdated,
            Self::Deleted => AuditEventType::ResourceDeleted,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// Emits structured, tenant-tagged security events.
///
/// Logging is infallible from the caller's perspective: a failing sink is
/// counted and reported on the tracing error channel, never propagated.
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    dropped: AtomicU64,
}

impl AuditLogger {
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            dropped: AtomicU64::new(0),
        }
    }

    /// Records a fully-formed event. Never fails.
    pub fn log(&self, event: AuditEvent) {
        if let Err(sink_error) = self.sink.record(&event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            error!(
                target: "tenancy::audit",
                event_uuid = %event.uuid,
                error = %sink_error,
                "dropped audit event"
            );
        }
    }

    /// Number of events lost to sink failures since startup.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn authentication(&self, tenant: &str, actor: &str, success: bool) {
        let Some(tenant) = self.checked_tenant(tenant, "authentication") else {
            return;
        };

        let severity = if success {
            AuditSeverity::Low
        } else {
            AuditSeverity::Medium
        };

        self.log(AuditEvent::new(
            AuditEventType::Authentication,
            severity,
            Some(tenant),
            "authentication attempt",
            context([("actor", json!(actor))]),
            success,
            None,
        ));
    }

    pub fn workspace_access(&self, tenant: &str, actor: &str, granted: bool) {
        let Some(tenant) = self.checked_tenant(tenant, "workspace_access") else {
            return;
        };

        let (event_type, severity) = if granted {
            (AuditEventType::WorkspaceAccessGranted, AuditSeverity::Low)
        } else {
            (AuditEventType::WorkspaceAccessDenied, AuditSeverity::High)
        };

        self.log(AuditEvent::new(
            event_type,
            severity,
            Some(tenant),
            "workspace access",
            context([("actor", json!(actor))]),
            granted,
            None,
        ));
    }

    pub fn resource_change(
        &self,
        tenant: &str,
        action: ResourceAction,
        kind: ResourceKind,
        resource_id: &str,
        success: bool,
    ) {
        let Some(tenant) = self.checked_tenant(tenant, "resource_change") else {
            return;
        };

        self.log(AuditEvent::new(
            action.event_type(),
            AuditSeverity::Low,
            Some(tenant),
            format!("resource {}", action.as_str()),
            context([
                ("resource_kind", json!(kind.as_str())),
                ("resource_id", json!(resource_id)),
            ]),
            success,
            None,
        ));
    }

    pub fn quota_exceeded(&self, tenant: &str, kind: ResourceKind, current: i64, limit: i64) {
        let Some(tenant) = self.checked_tenant(tenant, "quota_exceeded") else {
            return;
        };

        self.log(AuditEvent::new(
            AuditEventType::QuotaExceeded,
            AuditSeverity::Medium,
            Some(tenant),
            "quota exceeded",
            quota_context(kind, current, limit),
            false,
            None,
        ));
    }

    pub fn quota_warning(&self, tenant: &str, kind: ResourceKind, current: i64, limit: i64) {
        let Some(tenant) = self.checked_tenant(tenant, "quota_warning") else {
            return;
        };

        self.log(AuditEvent::new(
            AuditEventType::QuotaWarning,
            AuditSeverity::Low,
            Some(tenant),
            "quota nearing its ceiling",
            quota_context(kind, current, limit),
            true,
            None,
        ));
    }

    pub fn quota_updated(&self, tenant: &str, limits: &QuotaLimits) {
        let Some(tenant) = self.checked_tenant(tenant, "quota_updated") else {
            return;
        };

        let limits = serde_json::to_value(limits).unwrap_or(Value::Null);

        self.log(AuditEvent::new(
            AuditEventType::QuotaUpdated,
            AuditSeverity::Medium,
            Some(tenant),
            "quota limits updated",
            context([("limits", limits)]),
            true,
            None,
        ));
    }

    pub fn suspicious_activity(&self, tenant: Option<&str>, detail: &str) {
        let tenant = tenant.and_then(|raw| parse_tenant_id(raw).ok());

        self.log(AuditEvent::new(
            AuditEventType::SuspiciousActivity,
            AuditSeverity::High,
            tenant,
            "suspicious activity",
            context([("detail", json!(detail))]),
            false,
            None,
        ));
    }

    pub fn bulk_operation(&self, tenant: &str, operation: &str, row_count: u64) {
        let Some(tenant) = self.checked_tenant(tenant, "bulk_operation") else {
            return;
        };

        self.log(AuditEvent::new(
            AuditEventType::BulkOperation,
            AuditSeverity::Medium,
            Some(tenant),
            "bulk data operation",
            context([
                ("operation", json!(operation)),
                ("row_count", json!(row_count)),
            ]),
            true,
            None,
        ));
    }

    /// Validates a raw tenant identifier. On malformed input the event is
    /// about the input itself: a `SuspiciousActivity`/High record carrying a
    /// truncated sample, and the wrapper does not proceed.
    fn checked_tenant(&self, raw: &str, wrapper: &'static str) -> Option<TenantUuid> {
        match parse_tenant_id(raw) {
            Ok(tenant) => Some(tenant),
            Err(_) => {
                self.log(AuditEvent::new(
                    AuditEventType::SuspiciousActivity,
                    AuditSeverity::High,
                    None,
                    "malformed tenant identifier",
                    context([
                        ("wrapper", json!(wrapper)),
                        ("input_sample", json!(truncate(raw))),
                    ]),
                    false,
                    None,
                ));

                None
            }
        }
    }
}

fn context<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn quota_context(kind: ResourceKind, current: i64, limit: i64) -> Map<String, Value> {
    context([
        ("resource_kind", json!(kind.as_str())),
        ("current_usage", json!(current)),
        ("limit", json!(limit)),
    ])
}

fn truncate(raw: &str) -> &str {
    let mut end = MALFORMED_INPUT_SAMPLE_LEN.min(raw.len());
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    &raw[..end]
}

//! Quota Records

use std::{fmt, str::FromStr};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::tenants::{TenantUuid, ValidationError};

/// Tables that must carry forced row-level security for this layer to be
/// safe to run. Checked at startup by
/// [`GovernanceContext::init`](crate::context::GovernanceContext::init).
pub const GOVERNED_TABLES: [&str; 7] = [
    "workspace_quotas",
    "workspace_members",
    "segments",
    "journeys",
    "message_templates",
    "messages",
    "tenant_metrics",
];

/// The closed set of countable, quota-governed resource kinds.
///
/// Adding a kind is a compile-time-checked change: every `match` over this
/// enum is exhaustive, so a new variant cannot silently fall into a default
/// limit of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Users,
    Segments,
    Journeys,
    Templates,
    Storage,
    Messages,
}

impl ResourceKind {
    pub const ALL: [Self; 6] = [
        Self::Users,
        Self::Segments,
        Self::Journeys,
        Self::Templates,
        Self::Storage,
        Self::Messages,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Segments => "segments",
            Self::Journeys => "journeys",
            Self::Templates => "templates",
            Self::Storage => "storage",
            Self::Messages => "messages",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "users" => Ok(Self::Users),
            "segments" => Ok(Self::Segments),
            "journeys" => Ok(Self::Journeys),
            "templates" => Ok(Self::Templates),
            "storage" => Ok(Self::Storage),
            "messages" => Ok(Self::Messages),
            other => Err(ValidationError::UnknownResourceKind(other.to_string())),
        }
    }
}

/// Per-tenant resource ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    pub max_users: i64,
    pub max_segments: i64,
    pub max_journeys: i64,
    pub max_templates: i64,
    pub max_storage_bytes: i64,
    pub max_messages_per_month: i64,
}

impl Default for QuotaLimits {
    /// The documented default ceilings applied to a workspace that has no
    /// explicit quota row yet.
    fn default() -> Self {
        Self {
            max_users: 50,
            max_segments: 100,
            max_journeys: 50,
            max_templates: 200,
            max_storage_bytes: 1024 * 1024 * 1024,
            max_messages_per_month: 10_000,
        }
    }
}

impl QuotaLimits {
    /// The ceiling governing `kind`.
    #[must_use]
    pub const fn limit_for(&self, kind: ResourceKind) -> i64 {
        match kind {
            ResourceKind::Users => self.max_users,
            ResourceKind::Segments => self.max_segments,
            ResourceKind::Journeys => self.max_journeys,
            ResourceKind::Templates => self.max_templates,
            ResourceKind::Storage => self.max_storage_bytes,
            ResourceKind::Messages => self.max_messages_per_month,
        }
    }
}

/// Workspace Quota Record
#[derive(Debug, Clone)]
pub struct WorkspaceQuotaRecord {
    /// Workspace the ceilings apply to.
    pub workspace: TenantUuid,

    /// The ceilings themselves.
    pub limits: QuotaLimits,

    /// Row creation timestamp.
    pub created_at: Timestamp,

    /// Last update timestamp.
    pub updated_at: Timestamp,
}

/// Point-in-time resource counts for one tenant, computed from the source
/// of truth on demand and never persisted as the only record of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsageSnapshot {
    pub users: i64,
    pub segments: i64,
    pub journeys: i64,
    pub templates: i64,
    pub storage_bytes: i64,
    pub messages_this_month: i64,
}

/// Outcome of a quota check. `Exceeded` is an expected business outcome,
/// not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum QuotaDecision {
    Allowed {
        current_usage: i64,
        limit: i64,
        remaining: i64,
    },
    Exceeded {
        current_usage: i64,
        limit: i64,
    },
}

impl QuotaDecision {
    /// Allows iff `current + increment <= limit`.
    #[must_use]
    pub const fn evaluate(current_usage: i64, limit: i64, increment: i64) -> Self {
        if current_usage + increment <= limit {
            Self::Allowed {
                current_usage,
                limit,
                remaining: limit - current_usage - increment,
            }
        } else {
            Self::Exceeded {
                current_usage,
                limit,
            }
        }
    }

    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_is_monotonic_at_the_boundary() {
        // limit 5: usage 0..=4 allowed for a single increment, 5 is not
        for current in 0..5 {
            assert!(
                QuotaDecision::evaluate(current, 5, 1).is_allowed(),
                "usage {current} should be allowed"
            );
        }

        assert_eq!(
            QuotaDecision::evaluate(5, 5, 1),
            QuotaDecision::Exceeded {
                current_usage: 5,
                limit: 5
            }
        );
    }

    #[test]
    fn decision_accounts_for_bulk_increments() {
        assert_eq!(
            QuotaDecision::evaluate(2, 10, 8),
            QuotaDecision::Allowed {
                current_usage: 2,
                limit: 10,
                remaining: 0
            }
        );

        assert!(!QuotaDecision::evaluate(2, 10, 9).is_allowed());
    }

    #[test]
    fn resource_kind_round_trips_through_strings() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>(), Ok(kind));
        }
    }

    #[test]
    fn unknown_resource_kind_is_a_validation_error() {
        assert_eq!(
            "topics".parse::<ResourceKind>(),
            Err(ValidationError::UnknownResourceKind("topics".to_string()))
        );
    }

    #[test]
    fn default_limits_cover_every_kind() {
        let limits = QuotaLimits::default();

        for kind in ResourceKind::ALL {
            assert!(limits.limit_for(kind) > 0, "{kind} has no default limit");
        }
    }
}

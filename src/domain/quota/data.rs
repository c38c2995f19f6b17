//! Quota Data

use serde::Deserialize;

use crate::domain::quota::records::QuotaLimits;

/// Partial quota override supplied by an administrative upsert. Absent
/// fields leave the existing (or default) ceiling untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QuotaUpdate {
    pub max_users: Option<i64>,
    pub max_segments: Option<i64>,
    pub max_journeys: Option<i64>,
    pub max_templates: Option<i64>,
    pub max_storage_bytes: Option<i64>,
    pub max_messages_per_month: Option<i64>,
}

impl QuotaUpdate {
    /// Merges this update over `base`, field by field.
    #[must_use]
    pub fn apply_to(&self, base: QuotaLimits) -> QuotaLimits {
        QuotaLimits {
            max_users: self.max_users.unwrap_or(base.max_users),
            max_segments: self.max_segments.unwrap_or(base.max_segments),
            max_journeys: self.max_journeys.unwrap_or(base.max_journeys),
            max_templates: self.max_templates.unwrap_or(base.max_templates),
            max_storage_bytes: self.max_storage_bytes.unwrap_or(base.max_storage_bytes),
            max_messages_per_month: self
                .max_messages_per_month
                .unwrap_or(base.max_messages_per_month),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_update_is_identity() {
        let base = QuotaLimits::default();
        assert_eq!(QuotaUpdate::default().apply_to(base), base);
    }

    #[test]
    fn update_touches_only_supplied_fields() {
        let base = QuotaLimits::default();

        let merged = QuotaUpdate {
            max_segments: Some(500),
            max_messages_per_month: Some(1),
            ..QuotaUpdate::default()
        }
        .apply_to(base);

        assert_eq!(merged.max_segments, 500);
        assert_eq!(merged.max_messages_per_month, 1);
        assert_eq!(merged.max_users, base.max_users);
        assert_eq!(merged.max_storage_bytes, base.max_storage_bytes);
    }
}

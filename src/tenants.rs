//! Tenant identifiers and boundary validation.
//!
//! Internal APIs take [`TenantUuid`], so a malformed identifier cannot get
//! past the parse boundary. Anything arriving as a raw string (HTTP headers,
//! audit wrapper inputs) must go through [`parse_tenant_id`] first.

use thiserror::Error;
use uuid::Uuid;

use crate::uuids::TypedUuid;

/// Marker type for tenant-scoped UUIDs.
#[derive(Debug)]
pub enum TenantMarker {}

/// Tenant (workspace) UUID
pub type TenantUuid = TypedUuid<TenantMarker>;

/// Input validation failures, always raised before any I/O happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The supplied tenant identifier is not a well-formed, non-nil UUID.
    #[error("malformed tenant identifier")]
    MalformedTenantId,

    /// The resource kind is not part of the closed set.
    #[error("unknown resource kind `{0}`")]
    UnknownResourceKind(String),

    /// A quota increment must be at least 1.
    #[error("increment must be at least 1")]
    ZeroIncrement,
}

/// Parses a raw tenant identifier into a [`TenantUuid`].
///
/// Only canonical hyphenated UUIDs are accepted. The nil UUID is rejected:
/// it is never a valid tenant and would otherwise make a handy probe value.
///
/// # Errors
///
/// Returns [`ValidationError::MalformedTenantId`] for anything else.
pub fn parse_tenant_id(raw: &str) -> Result<TenantUuid, ValidationError> {
    let uuid = Uuid::try_parse(raw).map_err(|_| ValidationError::MalformedTenantId)?;

    if uuid.is_nil() || raw.len() != 36 {
        return Err(ValidationError::MalformedTenantId);
    }

    Ok(TenantUuid::from_uuid(uuid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_canonical_uuid() {
        let id = parse_tenant_id("018f4ac3-7b0a-7c3e-bf1a-4d2a9a6b1c2d").unwrap();
        assert_eq!(id.to_string(), "018f4ac3-7b0a-7c3e-bf1a-4d2a9a6b1c2d");
    }

    #[test]
    fn rejects_nil_uuid() {
        assert_eq!(
            parse_tenant_id("00000000-0000-0000-0000-000000000000"),
            Err(ValidationError::MalformedTenantId)
        );
    }

    #[test]
    fn rejects_non_canonical_forms() {
        // simple (unhyphenated), urn, and braced forms are not accepted
        for raw in [
            "018f4ac37b0a7c3ebf1a4d2a9a6b1c2d",
            "urn:uuid:018f4ac3-7b0a-7c3e-bf1a-4d2a9a6b1c2d",
            "{018f4ac3-7b0a-7c3e-bf1a-4d2a9a6b1c2d}",
        ] {
            assert_eq!(
                parse_tenant_id(raw),
                Err(ValidationError::MalformedTenantId),
                "should reject {raw}"
            );
        }
    }

    #[test]
    fn rejects_injection_attempts() {
        for raw in [
            "",
            "not-a-uuid",
            "tenant:*",
            "018f4ac3-7b0a-7c3e-bf1a-4d2a9a6b1c2d'; DROP TABLE segments; --",
            "018f4ac3-7b0a-7c3e-bf1a-4d2a9a6b1c2d:*",
        ] {
            assert!(parse_tenant_id(raw).is_err(), "should reject {raw:?}");
        }
    }
}

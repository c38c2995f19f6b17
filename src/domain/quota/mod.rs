//! Workspace quota governance.

pub mod data;
pub mod errors;
pub mod records;
mod repository;
pub mod service;

pub use errors::QuotaServiceError;
pub use records::{
    GOVERNED_TABLES, QuotaDecision, QuotaLimits, ResourceKind, ResourceUsageSnapshot,
    WorkspaceQuotaRecord,
};
pub use service::*;

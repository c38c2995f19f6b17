//! Tenant resource governance: quotas, caching, pooling, row isolation,
//! audit, and metrics for a multi-tenant PostgreSQL application.

pub mod config;
pub mod context;
pub mod database;
pub mod domain;
pub mod tenants;
pub mod uuids;

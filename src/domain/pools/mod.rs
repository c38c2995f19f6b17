//! Per-tenant connection pool management.

mod manager;

pub use manager::{PoolError, PoolMetadata, PoolStatistics, TenantPoolManager};

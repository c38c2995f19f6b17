//! Tenant-namespaced caching.

pub mod errors;
pub mod service;
pub mod stats;
pub mod store;

pub use errors::{CacheError, CacheStoreError};
pub use service::{CacheOptions, TenantCache};
pub use stats::CacheStatsSnapshot;
pub use store::{CacheStore, RedisCacheStore};

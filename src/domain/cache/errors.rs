//! Cache errors.

use thiserror::Error;

/// Transport-level failure talking to the cache store.
#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("cache transport error")]
    Transport(#[from] redis::RedisError),
}

/// Failures surfaced by cache management operations. Read/write hot paths
/// never return these; they degrade to a miss instead.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] CacheStoreError),

    #[error("failed to serialize cache value")]
    Serialize(#[from] serde_json::Error),
}

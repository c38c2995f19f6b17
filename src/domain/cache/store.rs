//! Cache Store

use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use redis::{AsyncCommands, aio::ConnectionManager};

use crate::domain::cache::errors::CacheStoreError;

/// Raw key-value operations against the shared cache store.
///
/// Key namespacing, serialization, and per-tenant accounting live above
/// this seam in [`TenantCache`](crate::domain::cache::TenantCache); a store
/// implementation only moves opaque strings.
#[automock]
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheStoreError>;

    /// Deletes the given keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, CacheStoreError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheStoreError>;

    /// Sets a fresh TTL on an existing key; `false` when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheStoreError>;

    /// Enumerates keys matching `pattern` using bounded batches of at most
    /// `batch` keys per store round trip. Never a blocking full-store scan.
    async fn scan_keys(&self, pattern: &str, batch: usize)
        -> Result<Vec<String>, CacheStoreError>;
}

/// Redis-backed store over a multiplexed connection manager.
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
}

impl RedisCacheStore {
    /// Connects to Redis and builds the shared connection manager.
    ///
    /// # Errors
    ///
    /// Returns a [`CacheStoreError`] when the URL is invalid or the initial
    /// connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self, CacheStoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheStoreError> {
        let mut conn = self.conn.clone();
        // SETEX with a zero TTL is an error; clamp to one second.
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds).await?;

        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheStoreError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.clone();
        Ok(conn.del(keys).await?)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheStoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheStoreError> {
        let mut conn = self.conn.clone();
        let seconds = i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX);
        Ok(conn.expire(key, seconds).await?)
    }

    async fn scan_keys(
        &self,
        pattern: &str,
        batch: usize,
    ) -> Result<Vec<String>, CacheStoreError> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut cursor = 0u64;

        // Cursor-driven SCAN; COUNT bounds the work done per round trip so
        // a large keyspace never blocks the store.
        loop {
            let (next, chunk): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(batch)
                .query_async(&mut conn)
                .await?;

            keys.extend(chunk);
            cursor = next;

            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }
}

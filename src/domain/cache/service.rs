//! Tenant Cache

use std::{future::Future, sync::Arc, sync::atomic::Ordering, time::Duration};

use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;

use crate::{
    config::CacheConfig,
    domain::cache::{
        errors::CacheError,
        stats::{CacheStats, CacheStatsSnapshot},
        store::CacheStore,
    },
    tenants::TenantUuid,
};

/// Per-call options for cache reads and writes.
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Extra namespace segment between the tenant and the key.
    pub prefix: Option<String>,

    /// Overrides the configured default TTL.
    pub ttl: Option<Duration>,
}

impl CacheOptions {
    #[must_use]
    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ttl: None,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Namespaced read/write/invalidate operations over the shared key-value
/// store, with per-tenant hit/miss accounting.
///
/// The cache is never a source of truth: `get`/`set` swallow store failures
/// (counting and logging them) and degrade to a miss, so every caller must
/// have a fallback path. Management operations surface [`CacheError`].
pub struct TenantCache {
    store: Arc<dyn CacheStore>,
    stats: DashMap<TenantUuid, Arc<CacheStats>>,
    default_ttl: Duration,
    scan_batch: usize,
}

impl TenantCache {
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            stats: DashMap::new(),
            default_ttl: config.default_ttl(),
            scan_batch: config.scan_batch.max(1),
        }
    }

    /// Builds the namespaced store key. Taking [`TenantUuid`] (not a raw
    /// string) makes key injection unrepresentable: the tenant segment is
    /// always a formatted UUID.
    #[must_use]
    pub fn tenant_key(tenant: TenantUuid, prefix: Option<&str>, key: &str) -> String {
        match prefix {
            Some(prefix) => format!("tenant:{tenant}:{prefix}:{key}"),
            None => format!("tenant:{tenant}:{key}"),
        }
    }

    /// Reads and deserializes a value. Store and decode failures degrade to
    /// `None`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        tenant: TenantUuid,
        key: &str,
        opts: &CacheOptions,
    ) -> Option<T> {
        let store_key = Self::tenant_key(tenant, opts.prefix.as_deref(), key);
        let stats = self.tenant_stats(tenant);

        match self.store.get(&store_key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    stats.hits.fetch_add(1, Ordering::Relaxed);
                    Some(value)
                }
                Err(error) => {
                    stats.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(tenant_uuid = %tenant, key, error = %error, "undecodable cache value");
                    None
                }
            },
            Ok(None) => {
                stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(error) => {
                stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(tenant_uuid = %tenant, key, error = %error, "cache read failed");
                None
            }
        }
    }

    /// Serializes and writes a value with the configured or supplied TTL.
    /// Returns whether the write reached the store.
    pub async fn set<T: Serialize + Sync>(
        &self,
        tenant: TenantUuid,
        key: &str,
        value: &T,
        opts: &CacheOptions,
    ) -> bool {
        let store_key = Self::tenant_key(tenant, opts.prefix.as_deref(), key);
        let ttl = opts.ttl.unwrap_or(self.default_ttl);
        let stats = self.tenant_stats(tenant);

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(error) => {
                stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(tenant_uuid = %tenant, key, error = %error, "unserializable cache value");
                return false;
            }
        };

        match self.store.set(&store_key, &raw, ttl).await {
            Ok(()) => {
                stats.sets.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(error) => {
                stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(tenant_uuid = %tenant, key, error = %error, "cache write failed");
                false
            }
        }
    }

    /// Cache-aside read: on a miss, `producer` supplies the value, which is
    /// written back (best effort) before being returned.
    ///
    /// # Errors
    ///
    /// Only `producer`'s own error is ever returned; cache failures on
    /// either side degrade silently.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        tenant: TenantUuid,
        key: &str,
        opts: &CacheOptions,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get(tenant, key, opts).await {
            return Ok(cached);
        }

        let value = producer().await?;
        self.set(tenant, key, &value, opts).await;

        Ok(value)
    }

    /// Deletes one key.
    ///
    /// # Errors
    ///
    /// Surfaces store failures so operators see invalidation problems.
    pub async fn delete(
        &self,
        tenant: TenantUuid,
        key: &str,
        opts: &CacheOptions,
    ) -> Result<bool, CacheError> {
        let removed = self
            .delete_many(tenant, std::slice::from_ref(&key.to_string()), opts)
            .await?;

        Ok(removed > 0)
    }

    /// Deletes several keys, returning how many existed.
    ///
    /// # Errors
    ///
    /// Surfaces store failures.
    pub async fn delete_many(
        &self,
        tenant: TenantUuid,
        keys: &[String],
        opts: &CacheOptions,
    ) -> Result<u64, CacheError> {
        let store_keys: Vec<String> = keys
            .iter()
            .map(|key| Self::tenant_key(tenant, opts.prefix.as_deref(), key))
            .collect();

        let stats = self.tenant_stats(tenant);

        match self.store.delete(&store_keys).await {
            Ok(removed) => {
                stats.deletes.fetch_add(removed, Ordering::Relaxed);
                Ok(removed)
            }
            Err(error) => {
                stats.errors.fetch_add(1, Ordering::Relaxed);
                Err(error.into())
            }
        }
    }

    /// # Errors
    ///
    /// Surfaces store failures.
    pub async fn exists(
        &self,
        tenant: TenantUuid,
        key: &str,
        opts: &CacheOptions,
    ) -> Result<bool, CacheError> {
        let store_key = Self::tenant_key(tenant, opts.prefix.as_deref(), key);
        Ok(self.store.exists(&store_key).await?)
    }

    /// Refreshes a key's TTL; `false` when the key is absent.
    ///
    /// # Errors
    ///
    /// Surfaces store failures.
    pub async fn expire(
        &self,
        tenant: TenantUuid,
        key: &str,
        ttl: Duration,
        opts: &CacheOptions,
    ) -> Result<bool, CacheError> {
        let store_key = Self::tenant_key(tenant, opts.prefix.as_deref(), key);
        Ok(self.store.expire(&store_key, ttl).await?)
    }

    /// Removes every cached key belonging to `tenant` and nothing else,
    /// enumerating with bounded batches.
    ///
    /// # Errors
    ///
    /// Surfaces store failures.
    pub async fn invalidate_workspace(&self, tenant: TenantUuid) -> Result<u64, CacheError> {
        let pattern = format!("tenant:{tenant}:*");
        let keys = self.store.scan_keys(&pattern, self.scan_batch).await?;

        let stats = self.tenant_stats(tenant);
        let mut removed = 0;

        for chunk in keys.chunks(self.scan_batch) {
            removed += self.store.delete(chunk).await?;
        }

        stats.deletes.fetch_add(removed, Ordering::Relaxed);

        Ok(removed)
    }

    /// Rounded hit-rate percentage for the tenant.
    #[must_use]
    pub fn hit_rate(&self, tenant: TenantUuid) -> u8 {
        self.stats(tenant).hit_rate_percent()
    }

    /// Current counter snapshot for the tenant.
    #[must_use]
    pub fn stats(&self, tenant: TenantUuid) -> CacheStatsSnapshot {
        self.stats
            .get(&tenant)
            .map(|stats| stats.snapshot())
            .unwrap_or_default()
    }

    /// Clears the tenant's counters.
    pub fn reset_stats(&self, tenant: TenantUuid) {
        self.stats.remove(&tenant);
    }

    fn tenant_stats(&self, tenant: TenantUuid) -> Arc<CacheStats> {
        let entry = self.stats.entry(tenant).or_default();
        Arc::clone(entry.value())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::Mutex,
        time::{Duration, Instant},
    };

    use async_trait::async_trait;
    use testresult::TestResult;

    use super::*;
    use crate::domain::cache::{
        errors::CacheStoreError,
        store::{CacheStore, MockCacheStore},
    };

    /// Store fake with real TTL and pattern semantics.
    #[derive(Default)]
    struct InMemoryStore {
        entries: Mutex<HashMap<String, (String, Instant)>>,
    }

    impl InMemoryStore {
        fn prefix_of(pattern: &str) -> &str {
            pattern.strip_suffix('*').unwrap_or(pattern)
        }
    }

    #[async_trait]
    impl CacheStore for InMemoryStore {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
            let mut entries = self.entries.lock().unwrap();

            match entries.get(key) {
                Some((value, expires_at)) if *expires_at > Instant::now() => {
                    Ok(Some(value.clone()))
                }
                Some(_) => {
                    entries.remove(key);
                    Ok(None)
                }
                None => Ok(None),
            }
        }

        async fn set(
            &self,
            key: &str,
            value: &str,
            ttl: Duration,
        ) -> Result<(), CacheStoreError> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
            Ok(())
        }

        async fn delete(&self, keys: &[String]) -> Result<u64, CacheStoreError> {
            let mut entries = self.entries.lock().unwrap();
            Ok(keys
                .iter()
                .filter(|key| entries.remove(*key).is_some())
                .count() as u64)
        }

        async fn exists(&self, key: &str) -> Result<bool, CacheStoreError> {
            Ok(self.entries.lock().unwrap().contains_key(key))
        }

        async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheStoreError> {
            let mut entries = self.entries.lock().unwrap();
            match entries.get_mut(key) {
                Some(entry) => {
                    entry.1 = Instant::now() + ttl;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn scan_keys(
            &self,
            pattern: &str,
            _batch: usize,
        ) -> Result<Vec<String>, CacheStoreError> {
            let prefix = Self::prefix_of(pattern);
            Ok(self
                .entries
                .lock()
                .unwrap()
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect())
        }
    }

    fn cache_with_fake() -> TenantCache {
        TenantCache::new(Arc::new(InMemoryStore::default()), &CacheConfig::default())
    }

    #[test]
    fn keys_are_tenant_namespaced() {
        let tenant = TenantUuid::new();

        assert_eq!(
            TenantCache::tenant_key(tenant, None, "segments"),
            format!("tenant:{tenant}:segments")
        );
        assert_eq!(
            TenantCache::tenant_key(tenant, Some("metrics"), "snapshot"),
            format!("tenant:{tenant}:metrics:snapshot")
        );
    }

    #[tokio::test]
    async fn values_are_isolated_between_tenants() -> TestResult {
        let cache = cache_with_fake();
        let opts = CacheOptions::default();

        let tenant_a = TenantUuid::new();
        let tenant_b = TenantUuid::new();

        cache.set(tenant_a, "k", &"value-a".to_string(), &opts).await;
        cache.set(tenant_b, "k", &"value-b".to_string(), &opts).await;

        assert_eq!(
            cache.get::<String>(tenant_a, "k", &opts).await.as_deref(),
            Some("value-a")
        );
        assert_eq!(
            cache.get::<String>(tenant_b, "k", &opts).await.as_deref(),
            Some("value-b")
        );

        Ok(())
    }

    #[tokio::test]
    async fn round_trip_honours_ttl() -> TestResult {
        let cache = cache_with_fake();
        let tenant = TenantUuid::new();
        let opts = CacheOptions::default().with_ttl(Duration::from_millis(10));

        cache.set(tenant, "k", &42_u64, &opts).await;
        assert_eq!(cache.get::<u64>(tenant, "k", &opts).await, Some(42));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get::<u64>(tenant, "k", &opts).await, None);

        Ok(())
    }

    #[tokio::test]
    async fn invalidate_workspace_is_precise() -> TestResult {
        let cache = cache_with_fake();
        let opts = CacheOptions::default();

        let tenant_a = TenantUuid::new();
        let tenant_b = TenantUuid::new();

        for key in ["one", "two", "three"] {
            cache.set(tenant_a, key, &1_u8, &opts).await;
        }
        cache.set(tenant_b, "one", &2_u8, &opts).await;

        let removed = cache.invalidate_workspace(tenant_a).await?;
        assert_eq!(removed, 3);

        assert_eq!(cache.get::<u8>(tenant_a, "one", &opts).await, None);
        assert_eq!(cache.get::<u8>(tenant_b, "one", &opts).await, Some(2));

        Ok(())
    }

    #[tokio::test]
    async fn get_or_set_invokes_producer_only_on_miss() -> TestResult {
        let cache = cache_with_fake();
        let tenant = TenantUuid::new();
        let opts = CacheOptions::default();

        let value: Result<u64, CacheError> =
            cache.get_or_set(tenant, "expensive", &opts, || async { Ok(7) }).await;
        assert_eq!(value.unwrap(), 7);

        // second call must come from the cache, not the producer
        let value: Result<u64, CacheError> = cache
            .get_or_set(tenant, "expensive", &opts, || async {
                panic!("producer must not run on a hit")
            })
            .await;
        assert_eq!(value.unwrap(), 7);

        let stats = cache.stats(tenant);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);

        Ok(())
    }

    #[tokio::test]
    async fn store_failure_degrades_to_miss() -> TestResult {
        let mut store = MockCacheStore::new();
        store.expect_get().returning(|_| {
            Err(CacheStoreError::Transport(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "store offline",
            ))))
        });

        let cache = TenantCache::new(Arc::new(store), &CacheConfig::default());
        let tenant = TenantUuid::new();

        let value = cache
            .get::<String>(tenant, "k", &CacheOptions::default())
            .await;
        assert_eq!(value, None);

        let stats = cache.stats(tenant);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.hits, 0);

        Ok(())
    }

    #[tokio::test]
    async fn hit_rate_tracks_lookups_per_tenant() -> TestResult {
        let cache = cache_with_fake();
        let opts = CacheOptions::default();

        let tenant = TenantUuid::new();
        cache.set(tenant, "k", &1_u8, &opts).await;

        cache.get::<u8>(tenant, "k", &opts).await;
        cache.get::<u8>(tenant, "k", &opts).await;
        cache.get::<u8>(tenant, "missing", &opts).await;

        assert_eq!(cache.hit_rate(tenant), 67);

        cache.reset_stats(tenant);
        assert_eq!(cache.hit_rate(tenant), 0);

        Ok(())
    }
}

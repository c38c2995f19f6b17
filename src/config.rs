//! Governance layer configuration.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is absent.
    #[error("missing required environment variable `{0}`")]
    MissingVar(&'static str),

    /// A numeric override could not be parsed.
    #[error("invalid value for `{0}`")]
    InvalidVar(&'static str),
}

/// Top-level configuration for [`GovernanceContext`](crate::context::GovernanceContext).
#[derive(Debug, Clone, Deserialize)]
pub struct GovernanceConfig {
    /// PostgreSQL connection string.
    pub database_url: String,

    /// Redis connection string.
    pub redis_url: String,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub pools: PoolManagerConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl GovernanceConfig {
    /// Loads configuration from the environment (`.env` respected).
    ///
    /// `DATABASE_URL` and `REDIS_URL` are required; everything else falls
    /// back to defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for missing or unparseable variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _env = dotenvy::dotenv();

        let database_url = require_var("DATABASE_URL")?;
        let redis_url = require_var("REDIS_URL")?;

        let mut pools = PoolManagerConfig::default();
        if let Some(max) = optional_var("TENANCY_MAX_POOLS")? {
            pools.max_pools = max;
        }
        if let Some(max) = optional_var("TENANCY_MAX_CONNECTIONS_PER_POOL")? {
            pools.max_connections = max;
        }

        Ok(Self {
            database_url,
            redis_url,
            cache: CacheConfig::default(),
            pools,
            metrics: MetricsConfig::default(),
        })
    }
}

/// Tenant cache tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when a `set` does not specify one, in seconds.
    pub default_ttl_secs: u64,

    /// Keys fetched per SCAN round trip during workspace invalidation.
    pub scan_batch: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            scan_batch: 100,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

/// Per-tenant connection pool tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolManagerConfig {
    /// Maximum number of live tenant pools; the least recently used pool is
    /// evicted to make room past this point.
    pub max_pools: usize,

    /// Maximum connections per tenant pool.
    pub max_connections: u32,

    /// Per-acquire wait bound, in seconds.
    pub acquire_timeout_secs: u64,

    /// Idle bound for individual pooled connections, in seconds.
    pub connection_idle_timeout_secs: u64,

    /// Whole pools unused for this long are closed by the sweeper, in seconds.
    pub pool_idle_timeout_secs: u64,

    /// Sweeper wake-up interval, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for PoolManagerConfig {
    fn default() -> Self {
        Self {
            max_pools: 50,
            max_connections: 5,
            acquire_timeout_secs: 10,
            connection_idle_timeout_secs: 60,
            pool_idle_timeout_secs: 600,
            sweep_interval_secs: 60,
        }
    }
}

impl PoolManagerConfig {
    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    #[must_use]
    pub fn connection_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_idle_timeout_secs)
    }

    #[must_use]
    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Metrics collector tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// How long a collected snapshot stays cached, in seconds.
    pub snapshot_ttl_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl_secs: 60,
        }
    }
}

impl MetricsConfig {
    #[must_use]
    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }
}

fn require_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

fn optional_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar(name)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cache = CacheConfig::default();
        assert_eq!(cache.default_ttl(), Duration::from_secs(300));
        assert!(cache.scan_batch > 0);

        let pools = PoolManagerConfig::default();
        assert!(pools.max_pools > 0);
        assert!(pools.sweep_interval() < pools.pool_idle_timeout());
    }

    #[test]
    fn deserializes_with_partial_overrides() {
        let config: GovernanceConfig = serde_json::from_str(
            r#"{
                "database_url": "postgres://localhost/app",
                "redis_url": "redis://localhost",
                "pools": { "max_pools": 2 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.pools.max_pools, 2);
        // untouched fields keep their defaults
        assert_eq!(config.pools.max_connections, 5);
        assert_eq!(config.metrics.snapshot_ttl(), Duration::from_secs(60));
    }
}

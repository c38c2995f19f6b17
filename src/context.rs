//! Wiring for the whole governance layer.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::{
    config::GovernanceConfig,
    database::{self, Db, IsolationError},
    domain::{
        audit::{AuditLogger, TracingAuditSink},
        cache::{CacheStoreError, RedisCacheStore, TenantCache},
        metrics::{MetricsService, PgMetricsService},
        pools::{PoolError, TenantPoolManager},
        quota::{GOVERNED_TABLES, PgQuotaService, QuotaService},
    },
};

/// Startup failures. Isolation failures are deliberate hard stops: serving
/// traffic against a table without forced row security risks cross-tenant
/// reads.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("database connection failed")]
    Database(#[source] sqlx::Error),

    #[error(transparent)]
    Isolation(#[from] IsolationError),

    #[error("cache connection failed")]
    Cache(#[from] CacheStoreError),

    #[error(transparent)]
    Pools(#[from] PoolError),
}

/// One fully wired governance layer: quota governor, tenant cache, pool
/// manager, audit logger, and metrics collector sharing a database and a
/// cache store.
pub struct GovernanceContext {
    db: Db,
    audit: Arc<AuditLogger>,
    cache: Arc<TenantCache>,
    pools: TenantPoolManager,
    quota: Arc<dyn QuotaService>,
    metrics: Arc<dyn MetricsService>,
}

impl GovernanceContext {
    /// Connects to the database and cache, verifies that every governed
    /// table has forced row security, and wires the component graph.
    ///
    /// # Errors
    ///
    /// Fails when either backing store is unreachable or any governed
    /// table lacks enforced row security.
    pub async fn init(config: &GovernanceConfig) -> Result<Self, ContextError> {
        let pool = database::connect(&config.database_url)
            .await
            .map_err(ContextError::Database)?;
        let db = Db::new(pool);

        db.ensure_isolation(&GOVERNED_TABLES).await?;

        let store = RedisCacheStore::connect(&config.redis_url).await?;
        let cache = Arc::new(TenantCache::new(Arc::new(store), &config.cache));

        let audit = Arc::new(AuditLogger::new(Arc::new(TracingAuditSink)));

        let pools = TenantPoolManager::new(&config.database_url, config.pools.clone())?;
        pools.start_sweeper();

        let quota: Arc<dyn QuotaService> =
            Arc::new(PgQuotaService::new(db.clone(), Arc::clone(&audit)));

        let metrics: Arc<dyn MetricsService> = Arc::new(PgMetricsService::new(
            db.clone(),
            Arc::clone(&quota),
            Arc::clone(&cache),
            &config.metrics,
        ));

        info!("governance layer initialized");

        Ok(Self {
            db,
            audit,
            cache,
            pools,
            quota,
            metrics,
        })
    }

    #[must_use]
    pub fn db(&self) -> &Db {
        &self.db
    }

    #[must_use]
    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<TenantCache> {
        &self.cache
    }

    #[must_use]
    pub fn pools(&self) -> &TenantPoolManager {
        &self.pools
    }

    #[must_use]
    pub fn quota(&self) -> &Arc<dyn QuotaService> {
        &self.quota
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<dyn MetricsService> {
        &self.metrics
    }

    /// Drains every tenant pool and closes the shared database pool. Used
    /// at process shutdown.
    pub async fn close(&self) {
        self.pools.close_all().await;
        self.db.close().await;
    }
}

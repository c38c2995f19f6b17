//! Database connection management and tenant context propagation.
//!
//! Row-level security policies filter every row access by the
//! `app.current_tenant_uuid` session setting. This module is the only place
//! that setting is ever written: transaction-scoped for units of work
//! ([`Db::with_tenant_context`]) and session-scoped for tenant-dedicated
//! pooled connections ([`set_session_context`]).

use futures::future::BoxFuture;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction, query};
use thiserror::Error;
use tracing::warn;

use crate::tenants::TenantUuid;

/// SQL used to set tenant context for row-level security.
///
/// The third argument (`is_local = true`) scopes the setting to the current
/// transaction, so it is cleared on every exit path (commit, rollback, or
/// connection drop) without any cleanup code racing task cancellation.
pub const SET_TENANT_CONTEXT_SQL: &str = "SELECT set_config('app.current_tenant_uuid', $1, true)";

/// Session-scoped variant, used only on connections that are dedicated to a
/// single tenant for their whole lifetime (the per-tenant pool hook).
pub const SET_SESSION_CONTEXT_SQL: &str =
    "SELECT set_config('app.current_tenant_uuid', $1, false)";

/// Resets the session-scoped tenant context.
pub const CLEAR_SESSION_CONTEXT_SQL: &str =
    "SELECT set_config('app.current_tenant_uuid', '', false)";

// The scalar subquery always yields exactly one row; `enforced` is NULL
// when `to_regclass` does not resolve the table.
const ROW_SECURITY_SQL: &str = "SELECT (SELECT c.relrowsecurity AND c.relforcerowsecurity \
     FROM pg_class c WHERE c.oid = to_regclass($1)) AS enforced";

/// A table expected to carry row-level security does not, or cannot be
/// checked. The system fails closed on any of these.
#[derive(Debug, Error)]
pub enum IsolationError {
    /// The table name is not a plain identifier; refuse to even look it up.
    #[error("invalid table name `{0}`")]
    InvalidTableName(String),

    /// The table does not exist in the connected database.
    #[error("table `{0}` does not exist")]
    TableMissing(String),

    /// Row-level security is absent or not forced on the table.
    #[error("row-level security is not enforced on table `{0}`")]
    NotEnforced(String),

    /// The catalog lookup itself failed.
    #[error("isolation check failed for table `{table}`")]
    Lookup {
        table: String,
        #[source]
        source: sqlx::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a transaction and set tenant context for RLS policies.
    ///
    /// # Errors
    ///
    /// Returns an error when starting the transaction or setting tenant
    /// context fails.
    pub async fn begin_tenant_transaction(
        &self,
        tenant: TenantUuid,
    ) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        query(SET_TENANT_CONTEXT_SQL)
            .bind(tenant.into_uuid().to_string())
            .execute(&mut *tx)
            .await?;

        Ok(tx)
    }

    /// Runs `work` inside a tenant-scoped transaction.
    ///
    /// This is the sanctioned way to execute tenant-scoped SQL: the context
    /// is established before `work` sees the transaction, the transaction is
    /// committed only when `work` returns `Ok`, and because the setting is
    /// transaction-local it is gone after every exit path, including errors
    /// and cancellation.
    ///
    /// # Errors
    ///
    /// Returns `work`'s own error, or the transaction begin/commit error
    /// converted through `E`.
    pub async fn with_tenant_context<T, E, F>(&self, tenant: TenantUuid, work: F) -> Result<T, E>
    where
        T: Send,
        E: From<sqlx::Error> + Send,
        F: for<'t> FnOnce(&'t mut Transaction<'static, Postgres>) -> BoxFuture<'t, Result<T, E>>
            + Send,
    {
        let mut tx = self.begin_tenant_transaction(tenant).await.map_err(E::from)?;

        match work(&mut tx).await {
            Ok(value) => {
                tx.commit().await.map_err(E::from)?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(tenant_uuid = %tenant, error = %rollback, "rollback failed");
                }
                Err(error)
            }
        }
    }

    /// Checks that row-level security is present *and forced* on `table`.
    ///
    /// Forcing matters: without `FORCE ROW LEVEL SECURITY` the table owner
    /// bypasses every policy.
    ///
    /// # Errors
    ///
    /// Fails closed: a missing table, an unqueryable catalog, or unforced
    /// RLS are all [`IsolationError`]s.
    pub async fn validate_isolation(&self, table: &str) -> Result<(), IsolationError> {
        validate_table_name(table)?;

        let row = query(ROW_SECURITY_SQL)
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(|source| IsolationError::Lookup {
                table: table.to_string(),
                source,
            })?;

        // to_regclass returns NULL for unknown tables, which surfaces here
        // as a NULL `enforced` column.
        let enforced: Option<bool> =
            row.try_get("enforced")
                .map_err(|source| IsolationError::Lookup {
                    table: table.to_string(),
                    source,
                })?;

        match enforced {
            None => Err(IsolationError::TableMissing(table.to_string())),
            Some(false) => Err(IsolationError::NotEnforced(table.to_string())),
            Some(true) => Ok(()),
        }
    }

    /// Startup self-check over every governed table.
    ///
    /// # Errors
    ///
    /// Returns the first [`IsolationError`] encountered.
    pub async fn ensure_isolation(&self, tables: &[&str]) -> Result<(), IsolationError> {
        for table in tables {
            self.validate_isolation(table).await?;
        }
        Ok(())
    }

    /// Closes the underlying pool, waiting for connections to drain.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Sets the session-scoped tenant context on a raw connection.
///
/// Only the per-tenant pool's `after_connect` hook should call this; units
/// of work must use [`Db::with_tenant_context`] instead.
///
/// # Errors
///
/// Returns the underlying query error.
pub async fn set_session_context(
    conn: &mut PgConnection,
    tenant: TenantUuid,
) -> Result<(), sqlx::Error> {
    query(SET_SESSION_CONTEXT_SQL)
        .bind(tenant.into_uuid().to_string())
        .execute(conn)
        .await?;

    Ok(())
}

/// Clears the session-scoped tenant context on a raw connection.
///
/// # Errors
///
/// Returns the underlying query error.
pub async fn clear_session_context(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    query(CLEAR_SESSION_CONTEXT_SQL).execute(conn).await?;

    Ok(())
}

/// Validates that a table name is a plain SQL identifier.
///
/// `to_regclass` would treat its argument as a possibly-qualified,
/// possibly-quoted name, so anything fancier than `[a-z_][a-z0-9_]*` is
/// rejected before it reaches the catalog query.
fn validate_table_name(name: &str) -> Result<(), IsolationError> {
    let mut chars = name.chars();

    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');

    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if name.len() > 63 || !valid_start || !valid_rest {
        return Err(IsolationError::InvalidTableName(name.to_string()));
    }

    Ok(())
}

/// Connect to `PostgreSQL`.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPool::connect(database_url).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_validation_accepts_identifiers() {
        for name in ["segments", "workspace_quotas", "_shadow", "t2"] {
            assert!(validate_table_name(name).is_ok(), "should accept {name}");
        }
    }

    #[test]
    fn table_name_validation_rejects_everything_else() {
        for name in [
            "",
            "Segments",
            "public.segments",
            "segments; DROP TABLE x",
            "\"segments\"",
            "seg ments",
            "1segments",
        ] {
            assert!(
                matches!(
                    validate_table_name(name),
                    Err(IsolationError::InvalidTableName(_))
                ),
                "should reject {name:?}"
            );
        }
    }

    #[test]
    fn tenant_context_is_transaction_scoped() {
        // The guarantee that context never outlives a unit of work rests on
        // set_config's is_local flag; pin it so it cannot regress silently.
        assert!(SET_TENANT_CONTEXT_SQL.ends_with(", true)"));
        assert!(SET_SESSION_CONTEXT_SQL.ends_with(", false)"));
    }
}

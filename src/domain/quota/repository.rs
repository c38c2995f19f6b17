//! Quota Repository

use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as, query_scalar};

use crate::{
    domain::quota::records::{QuotaLimits, ResourceKind, WorkspaceQuotaRecord},
    tenants::TenantUuid,
};

const GET_LIMITS_SQL: &str = include_str!("sql/get_limits.sql");
const ENSURE_LIMITS_SQL: &str = include_str!("sql/ensure_limits.sql");
const UPSERT_LIMITS_SQL: &str = include_str!("sql/upsert_limits.sql");

const COUNT_USERS_SQL: &str = include_str!("sql/count_users.sql");
const COUNT_SEGMENTS_SQL: &str = include_str!("sql/count_segments.sql");
const COUNT_JOURNEYS_SQL: &str = include_str!("sql/count_journeys.sql");
const COUNT_TEMPLATES_SQL: &str = include_str!("sql/count_templates.sql");
const STORAGE_BYTES_SQL: &str = include_str!("sql/storage_bytes.sql");
const MESSAGES_THIS_MONTH_SQL: &str = include_str!("sql/messages_this_month.sql");

/// PostgreSQL-backed quota repository. Every operation runs inside a
/// tenant-scoped transaction supplied by the caller; the explicit
/// `workspace_uuid` binds are defense in depth on top of RLS.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PgQuotaRepository;

impl PgQuotaRepository {
    pub(crate) async fn get_limits(
        self,
        tx: &mut Transaction<'static, Postgres>,
        workspace: TenantUuid,
    ) -> Result<Option<WorkspaceQuotaRecord>, sqlx::Error> {
        query_as::<Postgres, WorkspaceQuotaRecord>(GET_LIMITS_SQL)
            .bind(workspace.into_uuid())
            .fetch_optional(&mut **tx)
            .await
    }

    /// Returns the workspace's quota row, inserting the documented defaults
    /// first if no row exists yet.
    pub(crate) async fn ensure_limits(
        self,
        tx: &mut Transaction<'static, Postgres>,
        workspace: TenantUuid,
    ) -> Result<WorkspaceQuotaRecord, sqlx::Error> {
        let defaults = QuotaLimits::default();

        query(ENSURE_LIMITS_SQL)
            .bind(workspace.into_uuid())
            .bind(defaults.max_users)
            .bind(defaults.max_segments)
            .bind(defaults.max_journeys)
            .bind(defaults.max_templates)
            .bind(defaults.max_storage_bytes)
            .bind(defaults.max_messages_per_month)
            .execute(&mut **tx)
            .await?;

        query_as::<Postgres, WorkspaceQuotaRecord>(GET_LIMITS_SQL)
            .bind(workspace.into_uuid())
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn upsert_limits(
        self,
        tx: &mut Transaction<'static, Postgres>,
        workspace: TenantUuid,
        limits: QuotaLimits,
    ) -> Result<WorkspaceQuotaRecord, sqlx::Error> {
        query_as::<Postgres, WorkspaceQuotaRecord>(UPSERT_LIMITS_SQL)
            .bind(workspace.into_uuid())
            .bind(limits.max_users)
            .bind(limits.max_segments)
            .bind(limits.max_journeys)
            .bind(limits.max_templates)
            .bind(limits.max_storage_bytes)
            .bind(limits.max_messages_per_month)
            .fetch_one(&mut **tx)
            .await
    }

    /// Counts the workspace's current usage of `kind`.
    pub(crate) async fn count(
        self,
        tx: &mut Transaction<'static, Postgres>,
        workspace: TenantUuid,
        kind: ResourceKind,
    ) -> Result<i64, sqlx::Error> {
        let sql = match kind {
            ResourceKind::Users => COUNT_USERS_SQL,
            ResourceKind::Segments => COUNT_SEGMENTS_SQL,
            ResourceKind::Journeys => COUNT_JOURNEYS_SQL,
            ResourceKind::Templates => COUNT_TEMPLATES_SQL,
            ResourceKind::Storage => STORAGE_BYTES_SQL,
            ResourceKind::Messages => MESSAGES_THIS_MONTH_SQL,
        };

        query_scalar::<Postgres, i64>(sql)
            .bind(workspace.into_uuid())
            .fetch_one(&mut **tx)
            .await
    }
}

impl<'r> FromRow<'r, PgRow> for WorkspaceQuotaRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            workspace: TenantUuid::from_uuid(row.try_get("workspace_uuid")?),
            limits: QuotaLimits {
                max_users: row.try_get("max_users")?,
                max_segments: row.try_get("max_segments")?,
                max_journeys: row.try_get("max_journeys")?,
                max_templates: row.try_get("max_templates")?,
                max_storage_bytes: row.try_get("max_storage_bytes")?,
                max_messages_per_month: row.try_get("max_messages_per_month")?,
            },
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        })
    }
}

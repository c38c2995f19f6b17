//! Metrics Repository

use jiff::Timestamp;
use jiff_sqlx::{Timestamp as SqlxTimestamp, ToSqlx};
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as};

use crate::{
    domain::metrics::records::{MetricsRecordUuid, TenantMetricsRecord},
    tenants::TenantUuid,
};

const INSERT_RECORD_SQL: &str = include_str!("sql/insert_record.sql");
const HISTORY_SQL: &str = include_str!("sql/history.sql");

/// PostgreSQL-backed metrics history. Runs inside a tenant-scoped
/// transaction supplied by the caller; the explicit `workspace_uuid` binds
/// are defense in depth on top of RLS.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PgMetricsRepository;

impl PgMetricsRepository {
    pub(crate) async fn insert(
        self,
        tx: &mut Transaction<'static, Postgres>,
        record: &TenantMetricsRecord,
    ) -> Result<(), sqlx::Error> {
        query(INSERT_RECORD_SQL)
            .bind(record.uuid.into_uuid())
            .bind(record.workspace.into_uuid())
            .bind(record.recorded_at.to_sqlx())
            .bind(record.users)
            .bind(record.segments)
            .bind(record.journeys)
            .bind(record.templates)
            .bind(record.storage_bytes)
            .bind(record.messages_this_month)
            .bind(record.cache_hit_rate_percent)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    pub(crate) async fn history(
        self,
        tx: &mut Transaction<'static, Postgres>,
        workspace: TenantUuid,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> Result<Vec<TenantMetricsRecord>, sqlx::Error> {
        query_as::<Postgres, TenantMetricsRecord>(HISTORY_SQL)
            .bind(workspace.into_uuid())
            .bind(start.map(ToSqlx::to_sqlx))
            .bind(end.map(ToSqlx::to_sqlx))
            .fetch_all(&mut **tx)
            .await
    }
}

impl<'r> FromRow<'r, PgRow> for TenantMetricsRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            uuid: MetricsRecordUuid::from_uuid(row.try_get("uuid")?),
            workspace: TenantUuid::from_uuid(row.try_get("workspace_uuid")?),
            recorded_at: row.try_get::<SqlxTimestamp, _>("recorded_at")?.to_jiff(),
            users: row.try_get("users")?,
            segments: row.try_get("segments")?,
            journeys: row.try_get("journeys")?,
            templates: row.try_get("templates")?,
            storage_bytes: row.try_get("storage_bytes")?,
            messages_this_month: row.try_get("messages_this_month")?,
            cache_hit_rate_percent: row.try_get("cache_hit_rate_percent")?,
        })
    }
}

use thiserror::Error;

use crate::domain::quota::QuotaServiceError;

#[derive(Debug, Error)]
pub enum MetricsServiceError {
    /// The requested history range ends before it starts.
    #[error("history range ends before it starts")]
    InvalidRange,

    /// Usage counting failed inside the quota governor.
    #[error(transparent)]
    Quota(#[from] QuotaServiceError),

    /// Snapshot persistence or history lookup failed.
    #[error("metrics store error")]
    Sql(#[source] sqlx::Error),
}

impl From<sqlx::Error> for MetricsServiceError {
    fn from(error: sqlx::Error) -> Self {
        Self::Sql(error)
    }
}

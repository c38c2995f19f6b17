//! Quota service errors.

use sqlx::{
    Error,
    error::{DatabaseError, ErrorKind},
};
use thiserror::Error as ThisError;

use crate::tenants::ValidationError;

/// Quota service error variants.
///
/// Note that an exceeded quota is *not* here: it is an expected business
/// outcome carried by
/// [`QuotaDecision`](crate::domain::quota::records::QuotaDecision).
#[derive(Debug, ThisError)]
pub enum QuotaServiceError {
    /// Input rejected before any I/O.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Provided data failed a database constraint.
    #[error("invalid data")]
    InvalidData,

    /// Underlying SQL/storage error.
    #[error("storage error")]
    Sql(#[source] Error),
}

impl From<Error> for QuotaServiceError {
    fn from(error: Error) -> Self {
        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::CheckViolation | ErrorKind::NotNullViolation) => Self::InvalidData,
            _ => Self::Sql(error),
        }
    }
}

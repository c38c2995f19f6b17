//! Tenant metrics collection and history.

pub mod errors;
pub mod records;
mod repository;
pub mod service;

pub use errors::MetricsServiceError;
pub use records::{
    CollectOptions, Granularity, HistoryQuery, MetricsExport, MetricsHistory, MetricsPoint,
    MetricsRecordUuid, MetricsSummary, TenantMetricsRecord, bucket_records, summarize,
};
pub use service::*;

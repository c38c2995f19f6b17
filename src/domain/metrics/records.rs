//! Metrics snapshot records and time bucketing.

use std::collections::BTreeMap;

use jiff::{Span, Timestamp, civil::DateTime, tz::TimeZone};
use serde::{Deserialize, Serialize};

use crate::{tenants::TenantUuid, uuids::TypedUuid};

/// Marker type for metrics snapshot UUIDs.
#[derive(Debug)]
pub enum MetricsRecordMarker {}

pub type MetricsRecordUuid = TypedUuid<MetricsRecordMarker>;

/// Immutable historical snapshot of one tenant's resource footprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantMetricsRecord {
    pub uuid: MetricsRecordUuid,
    pub workspace: TenantUuid,
    pub recorded_at: Timestamp,
    pub users: i64,
    pub segments: i64,
    pub journeys: i64,
    pub templates: i64,
    pub storage_bytes: i64,
    pub messages_this_month: i64,
    pub cache_hit_rate_percent: i16,
}

/// What a collection pass gathers. Storage and message counting hit the
/// heaviest queries, so callers can skip them.
#[derive(Debug, Clone, Copy)]
pub struct CollectOptions {
    pub include_storage: bool,
    pub include_messages: bool,
    /// Bypass the cached snapshot and recount from the source of truth.
    pub force_refresh: bool,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            include_storage: true,
            include_messages: true,
            force_refresh: false,
        }
    }
}

/// History range and aggregation shape. `granularity: None` returns raw
/// records.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryQuery {
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub granularity: Option<Granularity>,
}

/// Time-bucket width for history aggregation. Buckets are aligned to UTC
/// civil boundaries; weeks start on Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
}

impl Granularity {
    /// UTC civil start of the bucket containing `ts`.
    #[must_use]
    pub fn bucket_start(self, ts: Timestamp) -> Timestamp {
        let zdt = ts.to_zoned(TimeZone::UTC);
        let date = zdt.date();

        let start: DateTime = match self {
            Self::Hour => date.at(zdt.hour(), 0, 0, 0),
            Self::Day => date.at(0, 0, 0, 0),
            Self::Week => {
                let back = i64::from(date.weekday().to_monday_zero_offset());
                date.checked_sub(Span::new().days(back))
                    .unwrap_or(date)
                    .at(0, 0, 0, 0)
            }
            Self::Month => date.first_of_month().at(0, 0, 0, 0),
        };

        // UTC has no civil gaps, so the conversion cannot actually fail
        start
            .to_zoned(TimeZone::UTC)
            .map_or(ts, |zoned| zoned.timestamp())
    }
}

/// Averages over every record falling into one time bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsPoint {
    pub bucket: Timestamp,
    pub samples: u32,
    pub users: f64,
    pub segments: f64,
    pub journeys: f64,
    pub templates: f64,
    pub storage_bytes: f64,
    pub messages_this_month: f64,
    pub cache_hit_rate_percent: f64,
}

/// Whole-range averages attached to a compliance export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub samples: u32,
    pub users: f64,
    pub segments: f64,
    pub journeys: f64,
    pub templates: f64,
    pub storage_bytes: f64,
    pub messages_this_month: f64,
    pub cache_hit_rate_percent: f64,
}

/// Raw or bucket-averaged history, depending on the query's granularity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum MetricsHistory {
    Raw { records: Vec<TenantMetricsRecord> },
    Bucketed { points: Vec<MetricsPoint> },
}

/// Full history plus summary averages, for compliance reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsExport {
    pub records: Vec<TenantMetricsRecord>,
    pub summary: MetricsSummary,
}

/// Averages records into UTC-aligned buckets, ordered by bucket start.
#[must_use]
pub fn bucket_records(records: &[TenantMetricsRecord], granularity: Granularity) -> Vec<MetricsPoint> {
    let mut buckets: BTreeMap<Timestamp, Vec<&TenantMetricsRecord>> = BTreeMap::new();

    for record in records {
        buckets
            .entry(granularity.bucket_start(record.recorded_at))
            .or_default()
            .push(record);
    }

    buckets
        .into_iter()
        .map(|(bucket, members)| {
            let n = members.len() as f64;
            MetricsPoint {
                bucket,
                samples: members.len() as u32,
                users: members.iter().map(|r| r.users as f64).sum::<f64>() / n,
                segments: members.iter().map(|r| r.segments as f64).sum::<f64>() / n,
                journeys: members.iter().map(|r| r.journeys as f64).sum::<f64>() / n,
                templates: members.iter().map(|r| r.templates as f64).sum::<f64>() / n,
                storage_bytes: members.iter().map(|r| r.storage_bytes as f64).sum::<f64>() / n,
                messages_this_month: members
                    .iter()
                    .map(|r| r.messages_this_month as f64)
                    .sum::<f64>()
                    / n,
                cache_hit_rate_percent: members
                    .iter()
                    .map(|r| f64::from(r.cache_hit_rate_percent))
                    .sum::<f64>()
                    / n,
            }
        })
        .collect()
}

/// Whole-slice averages; zeroes when there are no records.
#[must_use]
pub fn summarize(records: &[TenantMetricsRecord]) -> MetricsSummary {
    if records.is_empty() {
        return MetricsSummary {
            samples: 0,
            users: 0.0,
            segments: 0.0,
            journeys: 0.0,
            templates: 0.0,
            storage_bytes: 0.0,
            messages_this_month: 0.0,
            cache_hit_rate_percent: 0.0,
        };
    }

    let n = records.len() as f64;

    MetricsSummary {
        samples: records.len() as u32,
        users: records.iter().map(|r| r.users as f64).sum::<f64>() / n,
        segments: records.iter().map(|r| r.segments as f64).sum::<f64>() / n,
        journeys: records.iter().map(|r| r.journeys as f64).sum::<f64>() / n,
        templates: records.iter().map(|r| r.templates as f64).sum::<f64>() / n,
        storage_bytes: records.iter().map(|r| r.storage_bytes as f64).sum::<f64>() / n,
        messages_this_month: records
            .iter()
            .map(|r| r.messages_this_month as f64)
            .sum::<f64>()
            / n,
        cache_hit_rate_percent: records
            .iter()
            .map(|r| f64::from(r.cache_hit_rate_percent))
            .sum::<f64>()
            / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(recorded_at: &str, segments: i64, hit_rate: i16) -> TenantMetricsRecord {
        TenantMetricsRecord {
            uuid: MetricsRecordUuid::new(),
            workspace: TenantUuid::new(),
            recorded_at: recorded_at.parse().unwrap(),
            users: 4,
            segments,
            journeys: 2,
            templates: 8,
            storage_bytes: 1_024,
            messages_this_month: 100,
            cache_hit_rate_percent: hit_rate,
        }
    }

    #[test]
    fn hour_buckets_truncate_minutes_and_seconds() {
        let ts: Timestamp = "2026-03-14T09:37:41Z".parse().unwrap();
        let expected: Timestamp = "2026-03-14T09:00:00Z".parse().unwrap();

        assert_eq!(Granularity::Hour.bucket_start(ts), expected);
    }

    #[test]
    fn day_buckets_start_at_midnight_utc() {
        let ts: Timestamp = "2026-03-14T23:59:59Z".parse().unwrap();
        let expected: Timestamp = "2026-03-14T00:00:00Z".parse().unwrap();

        assert_eq!(Granularity::Day.bucket_start(ts), expected);
    }

    #[test]
    fn week_buckets_start_on_monday() {
        // 2026-03-14 is a Saturday; the preceding Monday is 2026-03-09
        let ts: Timestamp = "2026-03-14T12:00:00Z".parse().unwrap();
        let expected: Timestamp = "2026-03-09T00:00:00Z".parse().unwrap();

        assert_eq!(Granularity::Week.bucket_start(ts), expected);

        // a Monday maps to itself
        let monday: Timestamp = "2026-03-09T08:00:00Z".parse().unwrap();
        let monday_start: Timestamp = "2026-03-09T00:00:00Z".parse().unwrap();
        assert_eq!(Granularity::Week.bucket_start(monday), monday_start);
    }

    #[test]
    fn month_buckets_start_on_the_first() {
        let ts: Timestamp = "2026-03-14T12:00:00Z".parse().unwrap();
        let expected: Timestamp = "2026-03-01T00:00:00Z".parse().unwrap();

        assert_eq!(Granularity::Month.bucket_start(ts), expected);
    }

    #[test]
    fn bucketing_averages_within_and_orders_across_buckets() {
        let records = vec![
            record("2026-03-14T09:05:00Z", 10, 40),
            record("2026-03-14T09:55:00Z", 20, 60),
            record("2026-03-14T10:05:00Z", 30, 80),
        ];

        let points = bucket_records(&records, Granularity::Hour);

        assert_eq!(points.len(), 2);

        assert_eq!(points[0].bucket, "2026-03-14T09:00:00Z".parse().unwrap());
        assert_eq!(points[0].samples, 2);
        assert!((points[0].segments - 15.0).abs() < f64::EPSILON);
        assert!((points[0].cache_hit_rate_percent - 50.0).abs() < f64::EPSILON);

        assert_eq!(points[1].bucket, "2026-03-14T10:00:00Z".parse().unwrap());
        assert_eq!(points[1].samples, 1);
        assert!((points[1].segments - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_of_nothing_is_all_zeroes() {
        let summary = summarize(&[]);

        assert_eq!(summary.samples, 0);
        assert!(summary.segments.abs() < f64::EPSILON);
    }

    #[test]
    fn summary_averages_the_whole_range() {
        let records = vec![
            record("2026-03-01T00:00:00Z", 10, 100),
            record("2026-04-01T00:00:00Z", 30, 0),
        ];

        let summary = summarize(&records);

        assert_eq!(summary.samples, 2);
        assert!((summary.segments - 20.0).abs() < f64::EPSILON);
        assert!((summary.cache_hit_rate_percent - 50.0).abs() < f64::EPSILON);
    }
}

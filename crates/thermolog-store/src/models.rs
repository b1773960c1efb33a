//! Data models for stored aggregates.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Mean of all readings within one calendar hour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyAverage {
    /// First second of the hour, UTC.
    #[serde(with = "time::serde::rfc3339")]
    pub hour_start: OffsetDateTime,
    /// Running mean of the readings in this hour.
    pub avg_value: f64,
    /// Number of readings folded into the mean.
    pub sample_count: u64,
}

/// Mean of all readings within one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyAverage {
    /// Midnight UTC starting the day.
    #[serde(with = "time::serde::rfc3339")]
    pub day_start: OffsetDateTime,
    /// Running mean of the readings in this day.
    pub avg_value: f64,
    /// Number of readings folded into the mean.
    pub sample_count: u64,
}

/// Summary of database contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Total raw readings.
    pub reading_count: u64,
    /// Number of hourly aggregate rows.
    pub hourly_buckets: u64,
    /// Number of daily aggregate rows.
    pub daily_buckets: u64,
    /// Earliest reading timestamp.
    #[serde(with = "time::serde::rfc3339::option")]
    pub first_reading: Option<OffsetDateTime>,
    /// Latest reading timestamp.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_reading: Option<OffsetDateTime>,
}

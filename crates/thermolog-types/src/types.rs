//! Core types for thermolog sensor data.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::error::{ParseError, ParseResult};

/// Wire and API timestamp layout: `YYYY-MM-DD HH:MM:SS`, always UTC.
pub const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Human-readable form of [`TIMESTAMP_FORMAT`], used in error messages.
pub const TIMESTAMP_PATTERN: &str = "YYYY-MM-DD HH:MM:SS";

/// A single sensor reading.
///
/// Readings are immutable once created. The timestamp is normalized to UTC
/// with second precision on construction, so two readings built from the same
/// wire line always compare equal.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Reading {
    /// When the reading was taken (UTC, whole seconds).
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Sensor value in degrees Celsius.
    pub value: f64,
}

impl Reading {
    /// Create a reading, truncating the timestamp to whole seconds in UTC.
    #[must_use]
    pub fn new(timestamp: OffsetDateTime, value: f64) -> Self {
        Self {
            timestamp: truncate_to_second(timestamp),
            value,
        }
    }

    /// Create a reading from a Unix timestamp in seconds.
    pub fn from_unix(unix: i64, value: f64) -> ParseResult<Self> {
        let timestamp = OffsetDateTime::from_unix_timestamp(unix).map_err(|_| {
            ParseError::InvalidTimestamp {
                value: unix.to_string(),
            }
        })?;
        Ok(Self { timestamp, value })
    }

    /// Unix timestamp in seconds.
    #[must_use]
    pub fn unix_timestamp(&self) -> i64 {
        self.timestamp.unix_timestamp()
    }

    /// Start of the hour bucket this reading falls into.
    #[must_use]
    pub fn hour_start(&self) -> OffsetDateTime {
        Bucket::Hour.start_of(self.timestamp)
    }

    /// Start of the day bucket this reading falls into.
    #[must_use]
    pub fn day_start(&self) -> OffsetDateTime {
        Bucket::Day.start_of(self.timestamp)
    }
}

/// Renders the reading in line protocol form, without the trailing newline.
impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "T:{:.2} @ {}",
            self.value,
            format_timestamp(self.timestamp)
        )
    }
}

/// Calendar-aligned aggregation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Bucket {
    /// One hour, starting at minute 0 second 0.
    Hour,
    /// One day, starting at 00:00:00 UTC.
    Day,
}

impl Bucket {
    /// Length of the bucket in seconds.
    #[must_use]
    pub fn span_secs(self) -> i64 {
        match self {
            Bucket::Hour => 3_600,
            Bucket::Day => 86_400,
        }
    }

    /// Start of the bucket containing the given Unix timestamp.
    ///
    /// Uses euclidean remainder so instants before the epoch round down too.
    #[must_use]
    pub fn start_of_unix(self, unix: i64) -> i64 {
        unix - unix.rem_euclid(self.span_secs())
    }

    /// Start of the bucket containing `ts`, in UTC.
    #[must_use]
    pub fn start_of(self, ts: OffsetDateTime) -> OffsetDateTime {
        let start = self.start_of_unix(ts.unix_timestamp());
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(start)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::Hour => write!(f, "hour"),
            Bucket::Day => write!(f, "day"),
        }
    }
}

/// Format a timestamp as `YYYY-MM-DD HH:MM:SS` in UTC.
#[must_use]
pub fn format_timestamp(ts: OffsetDateTime) -> String {
    let ts = ts.to_offset(UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        ts.year(),
        u8::from(ts.month()),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second()
    )
}

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp as a UTC instant.
///
/// The layout is checked character by character before the calendar check,
/// so inputs like `2026-1-9 3:57:15` or a trailing `Z` are rejected.
pub fn parse_timestamp(s: &str) -> ParseResult<OffsetDateTime> {
    let invalid = || ParseError::InvalidTimestamp {
        value: s.to_string(),
    };

    if !has_timestamp_shape(s) {
        return Err(invalid());
    }

    PrimitiveDateTime::parse(s, TIMESTAMP_FORMAT)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|_| invalid())
}

/// Check whether a string has the exact `YYYY-MM-DD HH:MM:SS` layout.
#[must_use]
pub fn has_timestamp_shape(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 19
        && bytes.iter().enumerate().all(|(i, c)| match i {
            4 | 7 => *c == b'-',
            10 => *c == b' ',
            13 | 16 => *c == b':',
            _ => c.is_ascii_digit(),
        })
}

fn truncate_to_second(ts: OffsetDateTime) -> OffsetDateTime {
    let ts = ts.to_offset(UtcOffset::UTC);
    ts - Duration::nanoseconds(i64::from(ts.nanosecond()))
}

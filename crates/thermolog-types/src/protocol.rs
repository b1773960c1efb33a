//! Line protocol decoding.
//!
//! A record is one text line of the form
//!
//! ```text
//! T:<value> @ <YYYY-MM-DD HH:MM:SS>
//! ```
//!
//! The parser expects exactly one complete record with the line terminator
//! already removed. Splitting a byte stream into lines is the listener's job.
//!
//! # Example
//!
//! ```
//! use thermolog_types::{LineParser, PlausibleRange};
//!
//! let parser = LineParser::new(PlausibleRange::new(-40.0, 85.0));
//! let reading = parser.parse("T:22.10 @ 2026-01-09 00:00:05")?;
//! assert_eq!(reading.value, 22.1);
//! assert_eq!(reading.to_string(), "T:22.10 @ 2026-01-09 00:00:05");
//! # Ok::<(), thermolog_types::ParseError>(())
//! ```

use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};
use crate::types::{Reading, parse_timestamp};

/// Record prefix identifying a temperature line.
pub const RECORD_PREFIX: &str = "T:";

/// Separator between value and timestamp.
pub const RECORD_DELIMITER: char = '@';

/// Inclusive range of values considered physically plausible.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlausibleRange {
    /// Lowest accepted value.
    pub min: f64,
    /// Highest accepted value.
    pub max: f64,
}

impl PlausibleRange {
    /// Create a new range.
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Check whether `value` lies within the range.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Operating range of common ambient temperature sensors.
impl Default for PlausibleRange {
    fn default() -> Self {
        Self::new(-40.0, 85.0)
    }
}

/// Decoder for line protocol records.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineParser {
    range: PlausibleRange,
}

impl LineParser {
    /// Create a parser that enforces the given plausibility range.
    #[must_use]
    pub fn new(range: PlausibleRange) -> Self {
        Self { range }
    }

    /// The plausibility range this parser enforces.
    #[must_use]
    pub fn range(&self) -> PlausibleRange {
        self.range
    }

    /// Decode one record into a [`Reading`].
    pub fn parse(&self, line: &str) -> ParseResult<Reading> {
        let line = line.trim();

        let body = line
            .strip_prefix(RECORD_PREFIX)
            .ok_or_else(|| ParseError::MissingPrefix {
                line: line.to_string(),
            })?;

        let (value_part, timestamp_part) = body.split_once(RECORD_DELIMITER).ok_or_else(|| {
            ParseError::MissingDelimiter {
                line: line.to_string(),
            }
        })?;

        let value = parse_value(value_part.trim())?;
        let timestamp = parse_timestamp(timestamp_part.trim())?;

        if !self.range.contains(value) {
            return Err(ParseError::OutOfRange {
                value,
                min: self.range.min,
                max: self.range.max,
            });
        }

        Ok(Reading::new(timestamp, value))
    }
}

/// Decode a record using the default plausibility range.
pub fn parse_line(line: &str) -> ParseResult<Reading> {
    LineParser::default().parse(line)
}

/// Encode a reading as a wire line, including the trailing newline.
#[must_use]
pub fn render_line(reading: &Reading) -> String {
    format!("{}\n", reading)
}

impl FromStr for Reading {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_line(s)
    }
}

fn parse_value(s: &str) -> ParseResult<f64> {
    let invalid = || ParseError::InvalidValue {
        value: s.to_string(),
    };

    // f64::from_str accepts "inf" and "NaN", which no sensor emits.
    let value: f64 = s.parse().map_err(|_| invalid())?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::format_timestamp;
    use proptest::prelude::*;
    use time::macros::datetime;

    #[test]
    fn test_parse_valid_line() {
        let reading = parse_line("T:22.10 @ 2026-01-09 00:00:05").unwrap();
        assert_eq!(reading.value, 22.1);
        assert_eq!(reading.timestamp, datetime!(2026-01-09 00:00:05 UTC));
    }

    #[test]
    fn test_parse_tolerates_surrounding_whitespace() {
        let reading = parse_line("  T: 21.90  @  2026-01-09 00:59:50 \r").unwrap();
        assert_eq!(reading.value, 21.9);
        assert_eq!(reading.timestamp, datetime!(2026-01-09 00:59:50 UTC));
    }

    #[test]
    fn test_parse_rejects_non_numeric_value() {
        let err = parse_line("T:abc @ 2026-01-09 00:00:00").unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidValue {
                value: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_non_finite_values() {
        for value in ["inf", "-inf", "NaN", "infinity"] {
            let line = format!("T:{} @ 2026-01-09 00:00:00", value);
            assert!(
                matches!(parse_line(&line), Err(ParseError::InvalidValue { .. })),
                "expected rejection for {}",
                value
            );
        }
    }

    #[test]
    fn test_parse_rejects_missing_delimiter() {
        let err = parse_line("T:22.10 2026-01-09 00:00:00").unwrap_err();
        assert!(matches!(err, ParseError::MissingDelimiter { .. }));
    }

    #[test]
    fn test_parse_rejects_missing_prefix() {
        let err = parse_line("22.10 @ 2026-01-09 00:00:00").unwrap_err();
        assert!(matches!(err, ParseError::MissingPrefix { .. }));

        let err = parse_line("H:45.00 @ 2026-01-09 00:00:00").unwrap_err();
        assert!(matches!(err, ParseError::MissingPrefix { .. }));
    }

    #[test]
    fn test_parse_rejects_bad_timestamp() {
        for line in [
            "T:22.10 @ 2026-01-09",
            "T:22.10 @ 09.01.2026 00:00:00",
            "T:22.10 @ 2026-01-09T00:00:00",
            "T:22.10 @ 2026-02-31 00:00:00",
            "T:22.10 @ ",
        ] {
            assert!(
                matches!(parse_line(line), Err(ParseError::InvalidTimestamp { .. })),
                "expected rejection for {:?}",
                line
            );
        }
    }

    #[test]
    fn test_parse_enforces_plausible_range() {
        let parser = LineParser::new(PlausibleRange::new(0.0, 50.0));

        assert!(parser.parse("T:0.00 @ 2026-01-09 00:00:00").is_ok());
        assert!(parser.parse("T:50.00 @ 2026-01-09 00:00:00").is_ok());

        let err = parser.parse("T:50.01 @ 2026-01-09 00:00:00").unwrap_err();
        assert_eq!(
            err,
            ParseError::OutOfRange {
                value: 50.01,
                min: 0.0,
                max: 50.0
            }
        );
        assert!(parser.parse("T:-0.01 @ 2026-01-09 00:00:00").is_err());
    }

    #[test]
    fn test_default_range() {
        let range = PlausibleRange::default();
        assert!(range.contains(-40.0));
        assert!(range.contains(85.0));
        assert!(!range.contains(85.5));
        assert!(parse_line("T:999.00 @ 2026-01-09 00:00:00").is_err());
    }

    #[test]
    fn test_from_str() {
        let reading: Reading = "T:23.45 @ 2026-01-09 12:00:00".parse().unwrap();
        assert_eq!(reading.value, 23.45);
    }

    #[test]
    fn test_render_line() {
        let reading = Reading::new(datetime!(2026-01-09 00:00:10 UTC), 22.4);
        assert_eq!(render_line(&reading), "T:22.40 @ 2026-01-09 00:00:10\n");
    }

    #[test]
    fn test_error_messages_name_the_input() {
        let err = parse_line("T:abc @ 2026-01-09 00:00:00").unwrap_err();
        assert!(err.to_string().contains("abc"));

        let err = parse_line("T:1.0 @ yesterday").unwrap_err();
        assert!(err.to_string().contains("yesterday"));
        assert!(err.to_string().contains("YYYY-MM-DD HH:MM:SS"));
    }

    fn timestamp_strategy() -> impl Strategy<Value = String> {
        (2000i32..2100, 1u8..=12, 1u8..=28, 0u8..24, 0u8..60, 0u8..60).prop_map(
            |(y, mo, d, h, mi, s)| format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, mo, d, h, mi, s),
        )
    }

    proptest! {
        #[test]
        fn prop_parse_then_render_is_identity(
            cents in -4000i64..=8500,
            timestamp in timestamp_strategy(),
        ) {
            let value = cents as f64 / 100.0;
            let line = format!("T:{:.2} @ {}", value, timestamp);

            let reading = parse_line(&line).unwrap();
            prop_assert_eq!(reading.to_string(), line);
            prop_assert_eq!(format_timestamp(reading.timestamp), timestamp);
            prop_assert!((reading.value - value).abs() < 1e-9);

            let again = parse_line(&reading.to_string()).unwrap();
            prop_assert_eq!(again, reading);
        }

        #[test]
        fn prop_garbage_never_panics(line in "\\PC{0,64}") {
            let _ = parse_line(&line);
        }
    }
}

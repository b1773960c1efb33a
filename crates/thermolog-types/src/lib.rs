//! Reading types and line protocol for thermolog.
//!
//! This crate holds the pieces shared by every other thermolog crate:
//!
//! - [`Reading`], the immutable `(timestamp, value)` pair
//! - [`Bucket`] helpers for calendar-aligned hour and day aggregation
//! - The `YYYY-MM-DD HH:MM:SS` timestamp format used on the wire and in the API
//! - [`LineParser`], the pure decoder for `T:<value> @ <timestamp>` records
//!
//! # Example
//!
//! ```
//! use thermolog_types::{Reading, parse_line};
//!
//! let reading: Reading = parse_line("T:22.40 @ 2026-01-09 00:00:10")?;
//! assert_eq!(reading.hour_start().hour(), 0);
//! # Ok::<(), thermolog_types::ParseError>(())
//! ```

pub mod error;
pub mod protocol;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use protocol::{LineParser, PlausibleRange, parse_line, render_line};
pub use types::{
    Bucket, Reading, TIMESTAMP_FORMAT, TIMESTAMP_PATTERN, format_timestamp, has_timestamp_shape,
    parse_timestamp,
};

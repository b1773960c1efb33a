//! Error types for line protocol parsing.

use thiserror::Error;

/// Errors that can occur when decoding a line protocol record.
///
/// Every variant carries the offending text so the listener can log it
/// before discarding the line.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The line does not start with the `T:` record prefix.
    #[error("missing 'T:' prefix in line {line:?}")]
    MissingPrefix { line: String },

    /// The `@` separating value and timestamp is absent.
    #[error("missing '@' delimiter in line {line:?}")]
    MissingDelimiter { line: String },

    /// The value is not a finite decimal number.
    #[error("invalid value {value:?}: expected a decimal number")]
    InvalidValue { value: String },

    /// The timestamp does not match `YYYY-MM-DD HH:MM:SS` or is not a real instant.
    #[error("invalid timestamp {value:?}: expected YYYY-MM-DD HH:MM:SS")]
    InvalidTimestamp { value: String },

    /// The value parsed but lies outside the configured plausibility range.
    #[error("value {value} outside plausible range [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
}

/// Result type alias using thermolog-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

//! Error types for thermolog-core.
//!
//! # Error Recovery Strategies
//!
//! | Error Type | Strategy | Rationale |
//! |------------|----------|-----------|
//! | [`Error::Io`] | Reopen with backoff | Serial links drop and come back |
//! | [`Error::StorageUnavailable`] | Retry with backoff | Database may be briefly locked |
//! | [`Error::ConnectionLost`] | Do not retry | Retries already exhausted, surface to the operator |
//! | [`Error::Cancelled`] | Do not retry | Shutdown was requested |
//! | [`Error::InvalidConfig`] | Do not retry | Fix configuration and restart |
//! | [`Error::InvalidSource`] | Do not retry | Fix the source address and restart |
//!
//! Malformed lines never surface here: the listener logs and discards them.

use std::io;

use thiserror::Error;

/// Errors that can occur while ingesting readings from a byte stream.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream stayed unusable through every permitted attempt.
    #[error("Connection to {source_name} lost after {attempts} consecutive failures: {last_error}")]
    ConnectionLost {
        /// Name of the stream source.
        source_name: String,
        /// Number of consecutive failures observed.
        attempts: u32,
        /// The last error encountered.
        #[source]
        last_error: io::Error,
    },

    /// The reading sink could not persist a reading.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A stream source address could not be understood.
    #[error("Invalid stream source: {0}")]
    InvalidSource(String),
}

/// Result type alias using thermolog-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_lost_display() {
        let error = Error::ConnectionLost {
            source_name: "/dev/ttyUSB0".to_string(),
            attempts: 5,
            last_error: io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"),
        };
        let display = error.to_string();
        assert!(display.contains("/dev/ttyUSB0"));
        assert!(display.contains("5 consecutive failures"));
        assert!(display.contains("device unplugged"));
    }

    #[test]
    fn test_connection_lost_exposes_source() {
        use std::error::Error as _;

        let error = Error::ConnectionLost {
            source_name: "mock".to_string(),
            attempts: 1,
            last_error: io::Error::new(io::ErrorKind::TimedOut, "late"),
        };
        assert!(error.source().is_some());
    }

    #[test]
    fn test_io_conversion() {
        let error: Error = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(error, Error::Io(_)));
    }

    #[test]
    fn test_storage_unavailable_display() {
        let error = Error::StorageUnavailable("database is locked".to_string());
        assert_eq!(error.to_string(), "Storage unavailable: database is locked");
    }
}

//! Error types for thermolog-store.

use std::path::PathBuf;

use time::OffsetDateTime;

use thermolog_types::format_timestamp;

/// Result type for thermolog-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in thermolog-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The database could not be read or written.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] rusqlite::Error),

    /// A range query was given a start after its end.
    #[error(
        "Invalid range: start {} is after end {}",
        format_timestamp(*.start),
        format_timestamp(*.end)
    )]
    InvalidRange {
        start: OffsetDateTime,
        end: OffsetDateTime,
    },

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The database was created by a newer schema than this build knows.
    #[error("Database schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: i32, supported: i32 },

    /// A stored timestamp is outside the representable range.
    #[error("Invalid timestamp in database: {0}")]
    InvalidTimestamp(i64),
}

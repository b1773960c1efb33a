//! Durable storage for thermolog sensor readings.
//!
//! This crate keeps raw readings in SQLite together with hourly and daily
//! running-mean aggregates. Every [`Store::append`] inserts the raw row and
//! updates both aggregate rows in a single transaction, so readers never see
//! one without the other.
//!
//! # Example
//!
//! ```
//! use thermolog_store::Store;
//! use thermolog_types::parse_line;
//!
//! let store = Store::open_in_memory()?;
//! for line in [
//!     "T:22.10 @ 2026-01-09 00:00:05",
//!     "T:22.40 @ 2026-01-09 00:00:10",
//!     "T:21.90 @ 2026-01-09 00:59:50",
//! ] {
//!     store.append(&parse_line(line).unwrap())?;
//! }
//!
//! let daily = store.query_daily()?;
//! assert_eq!(daily[0].sample_count, 3);
//! assert_eq!(format!("{:.2}", daily[0].avg_value), "22.13");
//! # Ok::<(), thermolog_store::Error>(())
//! ```

mod error;
mod models;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{DailyAverage, HourlyAverage, StoreStats};
pub use schema::SCHEMA_VERSION;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/thermolog/readings.db`
/// - macOS: `~/Library/Application Support/thermolog/readings.db`
/// - Windows: `C:\Users\<user>\AppData\Local\thermolog\readings.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("thermolog")
        .join("readings.db")
}

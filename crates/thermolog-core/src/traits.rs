//! Trait abstractions at the listener's storage boundary.
//!
//! The listener never talks to a database directly. It hands each parsed
//! [`Reading`] to a [`ReadingSink`], which lets the service plug in its SQLite
//! store while tests use [`MemorySink`](crate::mock::MemorySink).

use std::sync::Arc;

use async_trait::async_trait;

use thermolog_types::Reading;

use crate::error::Result;

/// Destination for successfully parsed readings.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use thermolog_core::{ReadingSink, Result};
/// use thermolog_types::Reading;
///
/// struct PrintSink;
///
/// #[async_trait]
/// impl ReadingSink for PrintSink {
///     async fn append(&self, reading: &Reading) -> Result<()> {
///         println!("{}", reading);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ReadingSink: Send + Sync {
    /// Persist one reading.
    ///
    /// Implementations report a transient or permanent storage problem as
    /// [`Error::StorageUnavailable`](crate::Error::StorageUnavailable); the
    /// listener retries those with backoff before giving up.
    async fn append(&self, reading: &Reading) -> Result<()>;
}

#[async_trait]
impl<S: ReadingSink + ?Sized> ReadingSink for Arc<S> {
    async fn append(&self, reading: &Reading) -> Result<()> {
        (**self).append(reading).await
    }
}

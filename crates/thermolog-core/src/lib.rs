//! Byte-stream ingestion for thermolog sensor readings.
//!
//! This crate owns the path from raw bytes on a serial link to parsed
//! readings handed to storage. It knows nothing about SQLite or HTTP; the
//! service crate plugs its store in through [`ReadingSink`].
//!
//! # Features
//!
//! - **Stream sources**: serial device nodes, FIFOs, and serial-over-TCP bridges
//! - **Line framing**: records split across reads are reassembled
//! - **Bounded reads**: a quiet line is "nothing yet", never an error
//! - **Auto-reconnection**: jittered exponential backoff with a failure cap
//! - **Storage retries**: a separate policy for transient sink failures
//! - **Cancellation**: cooperative shutdown with guaranteed stream release
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use thermolog_core::{Listener, MemorySink, SourceSpec};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = "/dev/ttyUSB0".parse::<SourceSpec>()?.into_source();
//!     let sink = Arc::new(MemorySink::new());
//!     let listener = Listener::new(source, Arc::clone(&sink));
//!
//!     let cancel = CancellationToken::new();
//!     let stop = cancel.clone();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         stop.cancel();
//!     });
//!
//!     let stats = listener.run(cancel).await?;
//!     println!("Stored {} readings", stats.stored);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod framing;
pub mod guard;
pub mod listener;
pub mod mock;
pub mod retry;
pub mod stream;
pub mod traits;

// Re-export the data model so callers need only one dependency
pub use thermolog_types::types;
pub use thermolog_types::{LineParser, ParseError, PlausibleRange, Reading};

pub use error::{Error, Result};
pub use framing::LineFramer;
pub use guard::StreamGuard;
pub use listener::{Listener, ListenerOptions, ListenerStats, ListenerStatsSnapshot};
pub use mock::{MemorySink, MockEvent, MockSource, MockStream};
pub use retry::{RetryConfig, with_retry};
pub use stream::{ByteStream, DeviceSource, SourceSpec, StreamSource, TcpSource};
pub use traits::ReadingSink;

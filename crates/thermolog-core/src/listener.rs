//! The ingestion loop.
//!
//! A [`Listener`] owns one [`StreamSource`] and one [`ReadingSink`]. It reads
//! bytes with a bounded timeout, reassembles lines, parses them, and appends
//! each valid reading to the sink. Stream failures are retried with jittered
//! exponential backoff; storage failures are retried under their own policy.
//!
//! | Event | Effect |
//! |-------|--------|
//! | Read timed out | Nothing yet, keep reading |
//! | Malformed line | Logged and counted, keep reading |
//! | I/O error, end-of-stream, failed reopen | Failure counted, back off, reopen |
//! | Too many consecutive failures | [`Error::ConnectionLost`] |
//! | Sink still failing after retries | [`Error::StorageUnavailable`] |
//! | Cancellation | Clean exit with final stats |
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use thermolog_core::{Listener, ListenerOptions, MemorySink, MockEvent, MockSource};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> thermolog_core::Result<()> {
//! let source = MockSource::new().session([
//!     MockEvent::data("T:22.10 @ 2026-01-09 00:00:05\n"),
//!     MockEvent::Eof,
//! ]);
//! let sink = Arc::new(MemorySink::new());
//! let options = ListenerOptions::default().read_timeout(Duration::from_millis(10));
//! let listener = Listener::new(Box::new(source), Arc::clone(&sink)).with_options(options);
//!
//! let cancel = CancellationToken::new();
//! cancel.cancel();
//! let stats = listener.run(cancel).await?;
//! assert_eq!(stats.stored, 0);
//! # Ok(())
//! # }
//! ```

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use thermolog_types::{LineParser, PlausibleRange};

use crate::error::{Error, Result};
use crate::framing::{DEFAULT_MAX_LINE_LENGTH, LineFramer};
use crate::guard::StreamGuard;
use crate::retry::{RetryConfig, with_retry};
use crate::stream::StreamSource;
use crate::traits::ReadingSink;

/// Tuning knobs for a [`Listener`].
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerOptions {
    /// Upper bound on a single read. Expiry is not an error.
    pub read_timeout: Duration,
    /// Consecutive stream failures tolerated before giving up.
    pub max_consecutive_failures: u32,
    /// Delays between reopen attempts. Only the delay settings are used; the
    /// attempt cap is `max_consecutive_failures`.
    pub backoff: RetryConfig,
    /// Retry policy for sink appends.
    pub storage_retry: RetryConfig,
    /// Lines longer than this are discarded.
    pub max_line_length: usize,
    /// Size of the read buffer in bytes.
    pub read_buffer_size: usize,
    /// Values outside this range are rejected as implausible.
    pub range: PlausibleRange,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(1),
            max_consecutive_failures: 5,
            backoff: RetryConfig::for_reconnect(),
            storage_retry: RetryConfig::for_storage(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            read_buffer_size: 256,
            range: PlausibleRange::default(),
        }
    }
}

impl ListenerOptions {
    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the consecutive failure cap.
    #[must_use]
    pub fn max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max;
        self
    }

    /// Set the reopen backoff.
    #[must_use]
    pub fn backoff(mut self, backoff: RetryConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the storage retry policy.
    #[must_use]
    pub fn storage_retry(mut self, retry: RetryConfig) -> Self {
        self.storage_retry = retry;
        self
    }

    /// Set the maximum line length.
    #[must_use]
    pub fn max_line_length(mut self, len: usize) -> Self {
        self.max_line_length = len;
        self
    }

    /// Set the plausibility range.
    #[must_use]
    pub fn range(mut self, range: PlausibleRange) -> Self {
        self.range = range;
        self
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.read_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "read_timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_line_length == 0 {
            return Err(Error::InvalidConfig(
                "max_line_length must be greater than zero".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(Error::InvalidConfig(
                "read_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.range.min.is_nan() || self.range.max.is_nan() || self.range.min > self.range.max {
            return Err(Error::InvalidConfig(format!(
                "invalid plausible range {}..={}",
                self.range.min, self.range.max
            )));
        }
        self.backoff.validate()?;
        self.storage_retry.validate()
    }
}

/// Live counters shared between the listener and observers.
#[derive(Debug, Default)]
pub struct ListenerStats {
    running: AtomicBool,
    lines: AtomicU64,
    stored: AtomicU64,
    parse_failures: AtomicU64,
    reconnects: AtomicU64,
}

impl ListenerStats {
    /// Create zeroed stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the listener loop is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Copy the current counters.
    pub fn snapshot(&self) -> ListenerStatsSnapshot {
        ListenerStatsSnapshot {
            running: self.running.load(Ordering::Relaxed),
            lines: self.lines.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`ListenerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerStatsSnapshot {
    /// Whether the loop was running.
    pub running: bool,
    /// Non-blank lines received.
    pub lines: u64,
    /// Readings accepted by the sink.
    pub stored: u64,
    /// Lines rejected by the parser.
    pub parse_failures: u64,
    /// Successful reopens after a failure.
    pub reconnects: u64,
}

/// Reads a byte stream and forwards parsed readings to a sink.
pub struct Listener<K> {
    source: Box<dyn StreamSource>,
    sink: K,
    parser: LineParser,
    options: ListenerOptions,
    stats: Arc<ListenerStats>,
}

impl<K> std::fmt::Debug for Listener<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("source", &self.source.name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<K: ReadingSink> Listener<K> {
    /// Create a listener with default options.
    pub fn new(source: Box<dyn StreamSource>, sink: K) -> Self {
        let options = ListenerOptions::default();
        Self {
            source,
            sink,
            parser: LineParser::new(options.range),
            options,
            stats: Arc::new(ListenerStats::new()),
        }
    }

    /// Replace the options.
    #[must_use]
    pub fn with_options(mut self, options: ListenerOptions) -> Self {
        self.parser = LineParser::new(options.range);
        self.options = options;
        self
    }

    /// Record counters into `stats` instead of a private instance.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<ListenerStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Shared handle to the live counters.
    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// The sink readings are written to.
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// The options in effect.
    pub fn options(&self) -> &ListenerOptions {
        &self.options
    }

    /// Run until cancelled or a fatal error occurs.
    ///
    /// Returns the final counters on cancellation. Returns
    /// [`Error::ConnectionLost`] when the stream cannot be recovered and
    /// [`Error::StorageUnavailable`] when the sink rejects a reading through
    /// every retry. The stream is released on every exit path.
    pub async fn run(&self, cancel: CancellationToken) -> Result<ListenerStatsSnapshot> {
        self.options.validate()?;

        info!("Listening on {}", self.source.name());
        self.stats.running.store(true, Ordering::Relaxed);
        let result = match self.run_loop(&cancel).await {
            Err(Error::Cancelled) => Ok(()),
            other => other,
        };
        self.stats.running.store(false, Ordering::Relaxed);

        match result {
            Ok(()) => {
                let stats = self.stats.snapshot();
                info!(
                    "Listener on {} stopped: {} lines, {} stored, {} rejected, {} reconnects",
                    self.source.name(),
                    stats.lines,
                    stats.stored,
                    stats.parse_failures,
                    stats.reconnects
                );
                Ok(stats)
            }
            Err(e) => {
                error!("Listener on {} failed: {}", self.source.name(), e);
                Err(e)
            }
        }
    }

    async fn run_loop(&self, cancel: &CancellationToken) -> Result<()> {
        let mut framer = LineFramer::new(self.options.max_line_length);
        let mut buf = vec![0u8; self.options.read_buffer_size];
        let mut guard: Option<StreamGuard> = None;
        let mut failures: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            if guard.is_none() {
                let opened = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    opened = self.source.open() => opened,
                };
                match opened {
                    Ok(stream) => {
                        if failures > 0 {
                            ListenerStats::bump(&self.stats.reconnects);
                            info!(
                                "Reopened {} after {} failure(s)",
                                self.source.name(),
                                failures
                            );
                        }
                        guard = Some(StreamGuard::new(stream, self.source.name()));
                    }
                    Err(e) => {
                        self.back_off(&mut failures, e, cancel).await?;
                        continue;
                    }
                }
            }

            let Some(stream) = guard.as_mut() else {
                continue;
            };

            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                read = timeout(self.options.read_timeout, stream.read(&mut buf)) => read,
            };

            let failure = match read {
                Err(_) => {
                    trace!("No data within {:?}", self.options.read_timeout);
                    continue;
                }
                Ok(Ok(0)) => io::Error::new(io::ErrorKind::UnexpectedEof, "stream closed"),
                Ok(Ok(n)) => {
                    failures = 0;
                    framer.push(&buf[..n]);
                    while let Some(line) = framer.next_line() {
                        self.handle_line(&line, cancel).await?;
                    }
                    continue;
                }
                Ok(Err(e)) => e,
            };

            guard = None;
            framer.clear();
            self.back_off(&mut failures, failure, cancel).await?;
        }
    }

    /// Record a stream failure and sleep before the next attempt.
    async fn back_off(
        &self,
        failures: &mut u32,
        last_error: io::Error,
        cancel: &CancellationToken,
    ) -> Result<()> {
        *failures += 1;
        if *failures > self.options.max_consecutive_failures {
            return Err(Error::ConnectionLost {
                source_name: self.source.name().to_string(),
                attempts: *failures,
                last_error,
            });
        }

        let delay = self.options.backoff.delay_for_attempt(*failures - 1);
        warn!(
            "Stream {} failed ({}/{}): {}, retrying in {:?}",
            self.source.name(),
            failures,
            self.options.max_consecutive_failures,
            last_error,
            delay
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = sleep(delay) => Ok(()),
        }
    }

    async fn handle_line(&self, line: &str, cancel: &CancellationToken) -> Result<()> {
        ListenerStats::bump(&self.stats.lines);

        let reading = match self.parser.parse(line) {
            Ok(reading) => reading,
            Err(e) => {
                ListenerStats::bump(&self.stats.parse_failures);
                warn!("Discarding line {:?}: {}", line, e);
                return Ok(());
            }
        };

        let appended = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            appended = with_retry(&self.options.storage_retry, "append reading", || {
                self.sink.append(&reading)
            }) => appended,
        };
        appended.map_err(|e| match e {
            Error::StorageUnavailable(_) => e,
            other => Error::StorageUnavailable(other.to_string()),
        })?;

        ListenerStats::bump(&self.stats.stored);
        debug!("Stored {}", reading);
        Ok(())
    }
}

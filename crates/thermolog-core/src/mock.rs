//! Scripted stream source and in-memory sink for testing.
//!
//! [`MockSource`] replays a script per call to `open()`, so a test can
//! describe a whole connection history: data arriving in fragments, silent
//! periods, I/O errors, end-of-stream, and sources that refuse to open.
//! [`MemorySink`] collects readings and can be told to fail.
//!
//! # Example
//!
//! ```
//! use thermolog_core::{MockEvent, MockSource};
//!
//! let source = MockSource::new()
//!     .session([
//!         MockEvent::data("T:22.10 @ 2026-01-09 00:00:05\n"),
//!         MockEvent::Stall,
//!         MockEvent::error(std::io::ErrorKind::BrokenPipe),
//!     ])
//!     .open_error(std::io::ErrorKind::NotFound)
//!     .session([MockEvent::data("T:22.40 @ 2026-01-09 00:00:10\n")]);
//! assert_eq!(source.remaining_sessions(), 3);
//! ```

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};

use thermolog_types::Reading;

use crate::error::{Error, Result};
use crate::stream::{ByteStream, StreamSource};
use crate::traits::ReadingSink;

/// One step in a scripted stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    /// Deliver these bytes, possibly over several reads.
    Data(Vec<u8>),
    /// Produce nothing on this read, as a quiet serial line does.
    Stall,
    /// Fail the read with the given error kind.
    Error(io::ErrorKind),
    /// Report end-of-stream.
    Eof,
}

impl MockEvent {
    /// Shorthand for [`MockEvent::Data`].
    pub fn data(bytes: impl AsRef<[u8]>) -> Self {
        MockEvent::Data(bytes.as_ref().to_vec())
    }

    /// Shorthand for [`MockEvent::Error`].
    pub fn error(kind: io::ErrorKind) -> Self {
        MockEvent::Error(kind)
    }
}

#[derive(Debug)]
enum Session {
    Stream(VecDeque<MockEvent>),
    OpenError(io::ErrorKind),
}

/// A stream source that replays scripted sessions.
///
/// Each call to [`open`](StreamSource::open) consumes the next session. Once
/// every session is used, `open` fails with `NotFound`. When a session's
/// events run out the stream stays silent forever, like an idle device.
#[derive(Debug, Default)]
pub struct MockSource {
    sessions: Mutex<VecDeque<Session>>,
    opens: AtomicU32,
    live: Arc<AtomicU32>,
}

impl MockSource {
    /// Create a source with no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a session that opens successfully and replays `events`.
    #[must_use]
    pub fn session(self, events: impl IntoIterator<Item = MockEvent>) -> Self {
        self.push(Session::Stream(events.into_iter().collect()));
        self
    }

    /// Append a session whose `open` call fails.
    #[must_use]
    pub fn open_error(self, kind: io::ErrorKind) -> Self {
        self.push(Session::OpenError(kind));
        self
    }

    /// Number of `open` calls made so far, including failed ones.
    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of streams opened and not yet dropped.
    pub fn open_streams(&self) -> u32 {
        self.live.load(Ordering::SeqCst)
    }

    /// Number of sessions not yet consumed.
    pub fn remaining_sessions(&self) -> usize {
        self.lock().len()
    }

    fn push(&self, session: Session) {
        self.lock().push_back(session);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Session>> {
        // A panic while holding the lock leaves the queue intact.
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl StreamSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn open(&self) -> io::Result<Box<dyn ByteStream>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let next = self.lock().pop_front();
        match next {
            Some(Session::Stream(events)) => {
                self.live.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(MockStream {
                    events,
                    live: Arc::clone(&self.live),
                }))
            }
            Some(Session::OpenError(kind)) => {
                Err(io::Error::new(kind, "mock source refused to open"))
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "mock source has no sessions left",
            )),
        }
    }
}

/// Stream handed out by [`MockSource`].
#[derive(Debug)]
pub struct MockStream {
    events: VecDeque<MockEvent>,
    live: Arc<AtomicU32>,
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        // Pending results never wake the task; the listener's read timeout
        // is what brings it back.
        match self.events.pop_front() {
            Some(MockEvent::Data(mut bytes)) => {
                let n = bytes.len().min(buf.remaining());
                buf.put_slice(&bytes[..n]);
                if n < bytes.len() {
                    let rest = bytes.split_off(n);
                    self.events.push_front(MockEvent::Data(rest));
                }
                Poll::Ready(Ok(()))
            }
            Some(MockEvent::Stall) | None => Poll::Pending,
            Some(MockEvent::Error(kind)) => {
                Poll::Ready(Err(io::Error::new(kind, "mock read failure")))
            }
            Some(MockEvent::Eof) => Poll::Ready(Ok(())),
        }
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Sink that keeps readings in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    readings: Mutex<Vec<Reading>>,
    remaining_failures: AtomicU32,
    always_fail: AtomicBool,
    attempts: AtomicU32,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` appends, then succeed.
    pub fn fail_next(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::SeqCst);
    }

    /// Fail every append until reset with `set_always_fail(false)`.
    pub fn set_always_fail(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }

    /// Number of append calls, including failed ones.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Readings stored so far, in arrival order.
    pub fn readings(&self) -> Vec<Reading> {
        self.readings
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ReadingSink for MemorySink {
    async fn append(&self, reading: &Reading) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.always_fail.load(Ordering::SeqCst) {
            return Err(Error::StorageUnavailable("injected failure".to_string()));
        }
        let consumed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if consumed.is_ok() {
            return Err(Error::StorageUnavailable("injected failure".to_string()));
        }

        self.readings
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(*reading);
        Ok(())
    }
}

//! Stream guard for automatic release on drop.
//!
//! The listener holds at most one open stream at a time. Wrapping it in a
//! [`StreamGuard`] means the handle is closed on every exit path: a read
//! error, cancellation, or a fatal storage failure.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tracing::debug;

use crate::stream::ByteStream;

/// Owns an open stream and logs its release when dropped.
pub struct StreamGuard {
    stream: Box<dyn ByteStream>,
    source_name: String,
}

impl StreamGuard {
    /// Wrap a freshly opened stream.
    pub fn new(stream: Box<dyn ByteStream>, source_name: impl Into<String>) -> Self {
        let source_name = source_name.into();
        debug!("Acquired stream {}", source_name);
        Self {
            stream,
            source_name,
        }
    }

    /// Name of the source this stream came from.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }
}

impl AsyncRead for StreamGuard {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.stream).poll_read(cx, buf)
    }
}

impl fmt::Debug for StreamGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamGuard")
            .field("source_name", &self.source_name)
            .finish_non_exhaustive()
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        debug!("Released stream {}", self.source_name);
    }
}

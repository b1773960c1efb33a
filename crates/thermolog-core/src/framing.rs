//! Reassembly of newline-delimited records from arbitrary byte chunks.

use bytes::BytesMut;
use tracing::warn;

/// Default maximum accepted line length in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 256;

/// Splits a byte stream into text lines.
///
/// Bytes are appended with [`push`](Self::push) as they arrive; complete
/// lines are taken with [`next_line`](Self::next_line). A record split across
/// several reads is held until its terminator arrives.
///
/// Lines are trimmed, `\r\n` endings are accepted, blank lines are skipped,
/// and invalid UTF-8 is replaced rather than rejected so the parser can report
/// it. A line longer than the configured maximum is dropped up to and
/// including its terminator, which bounds memory when a link spews noise.
#[derive(Debug)]
pub struct LineFramer {
    buf: BytesMut,
    max_line_length: usize,
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl LineFramer {
    /// Create a framer that rejects lines longer than `max_line_length`.
    pub fn new(max_line_length: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_line_length),
            max_line_length,
            discarding: false,
        }
    }

    /// Append freshly read bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Take the next complete line, if one is buffered.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let Some(pos) = self.buf.iter().position(|b| *b == b'\n') else {
                if self.buf.len() > self.max_line_length {
                    warn!(
                        "Discarding {} bytes without a line terminator",
                        self.buf.len()
                    );
                    self.buf.clear();
                    self.discarding = true;
                }
                return None;
            };

            let raw = self.buf.split_to(pos + 1);

            if self.discarding {
                // Tail of an oversized line
                self.discarding = false;
                continue;
            }

            let content = &raw[..pos];
            if content.len() > self.max_line_length {
                warn!(
                    "Discarding {}-byte line (limit {})",
                    content.len(),
                    self.max_line_length
                );
                continue;
            }

            let line = String::from_utf8_lossy(content).trim().to_string();
            if line.is_empty() {
                continue;
            }
            return Some(line);
        }
    }

    /// Drop any partial line, e.g. after the stream was reopened.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }

    /// Number of buffered bytes not yet returned as a line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

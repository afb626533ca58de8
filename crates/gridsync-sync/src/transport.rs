//! Line framing for protocol messages.
//!
//! Each frame is one JSON document followed by `\n`. Frames longer than
//! [`MAX_FRAME_BYTES`] are rejected and end the connection. Frames that are
//! not UTF-8 are logged and skipped.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{Result, SyncError};
use crate::protocol::{Message, encode};

/// Largest accepted frame, newline included.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Reads newline-delimited frames.
pub struct MessageReader<R> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
        }
    }

    /// Read the next non-blank UTF-8 frame without its line terminator.
    ///
    /// Returns `Ok(None)` on a clean end of stream. Not cancel safe: do not
    /// race this inside `select!`.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            let mut frame = Vec::new();
            let read = (&mut self.inner)
                .take(MAX_FRAME_BYTES as u64 + 1)
                .read_until(b'\n', &mut frame)
                .await?;
            if read == 0 {
                return Ok(None);
            }
            if read > MAX_FRAME_BYTES {
                return Err(SyncError::FrameTooLarge(MAX_FRAME_BYTES));
            }

            let line = match String::from_utf8(frame) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping frame that is not UTF-8");
                    continue;
                }
            };
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.trim().is_empty() {
                continue;
            }
            return Ok(Some(trimmed.to_string()));
        }
    }
}

/// Writes newline-delimited frames.
pub struct MessageWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }

    /// Write one pre-encoded frame.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.write_all(b"\n").await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let line = encode(message)?;
        self.send_line(&line).await
    }
}

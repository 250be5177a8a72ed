//! Line framer: turns a byte stream into text lines, one read at a time.

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::{AiStreamError, CoreResult};
use crate::transport::ByteStream;

/// Outcome of a single `next_line` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Line(String),
    Eof,
    Cancelled,
}

/// Splits on `\n`, `\r\n` and lone `\r`. Lines have no length cap.
///
/// Bytes are buffered undecoded so a multi-byte character split across
/// chunks is never mangled; each complete line is decoded lossily.
pub struct LineFramer {
    inner: ByteStream,
    buf: Vec<u8>,
    eof: bool,
}

impl LineFramer {
    pub fn new(inner: ByteStream) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            eof: false,
        }
    }

    /// Suspend until a full line, EOF, or cancellation. Transport failures are
    /// returned as `AiStreamError::Transport`; cancellation never is.
    pub async fn next_line(&mut self, cancel: &CancellationToken) -> CoreResult<Frame> {
        loop {
            if cancel.is_cancelled() {
                return Ok(Frame::Cancelled);
            }
            if let Some(line) = self.take_line() {
                return Ok(Frame::Line(line));
            }
            if self.eof {
                if self.buf.is_empty() {
                    return Ok(Frame::Eof);
                }
                let tail = std::mem::take(&mut self.buf);
                return Ok(Frame::Line(decode(&tail)));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Frame::Cancelled),
                chunk = self.inner.next() => match chunk {
                    Some(Ok(bytes)) => self.buf.extend_from_slice(&bytes),
                    Some(Err(e)) => return Err(AiStreamError::Transport(e.to_string())),
                    None => self.eof = true,
                },
            }
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let idx = self.buf.iter().position(|b| *b == b'\n' || *b == b'\r')?;
        let consumed = if self.buf[idx] == b'\r' {
            match self.buf.get(idx + 1) {
                Some(b'\n') => idx + 2,
                Some(_) => idx + 1,
                // A trailing CR may be the first half of CRLF.
                None if !self.eof => return None,
                None => idx + 1,
            }
        } else {
            idx + 1
        };
        let line = decode(&self.buf[..idx]);
        self.buf.drain(..consumed);
        Some(line)
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

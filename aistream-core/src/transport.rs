//! Byte-stream sources the line framer reads from.

use std::io;
use std::pin::Pin;
use std::process::Stdio;

use bytes::Bytes;
use futures_util::future;
use futures_util::stream::{self, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;

use crate::error::{AiStreamError, CoreResult};

/// A cancellable, provider-owned stream of body bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Wrap any async reader (a file, a pipe) as a byte stream.
pub fn from_reader<R>(reader: R) -> ByteStream
where
    R: AsyncRead + Send + 'static,
{
    Box::pin(ReaderStream::new(reader))
}

/// In-memory source, one item per chunk.
pub fn from_chunks<I, B>(chunks: I) -> ByteStream
where
    I: IntoIterator<Item = B>,
    B: Into<Bytes>,
{
    let items: Vec<io::Result<Bytes>> = chunks.into_iter().map(|c| Ok(c.into())).collect();
    Box::pin(stream::iter(items))
}

/// Keep this much of the child's stderr for the failure message.
const STDERR_TAIL_BYTES: usize = 2048;

/// Spawn `command` and stream its stdout. The child is killed when the stream
/// is dropped.
///
/// Once stdout closes the child is awaited; a non-zero exit is yielded as a
/// final `io::Error` carrying the tail of stderr, so a crashed or rejected run
/// never looks like a clean end of stream.
pub fn spawn_stdout(mut command: Command) -> CoreResult<ByteStream> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let mut child = command
        .spawn()
        .map_err(|e| AiStreamError::Transport(format!("spawn failed: {e}")))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AiStreamError::Transport("child stdout not captured".into()))?;
    // Drained concurrently so a chatty stderr cannot block the child.
    let stderr = child.stderr.take().map(|e| tokio::spawn(stderr_tail(e)));

    let exit = stream::once(exit_status(child, stderr)).filter_map(future::ready);
    Ok(Box::pin(ReaderStream::new(stdout).chain(exit)))
}

async fn stderr_tail(mut stderr: ChildStderr) -> String {
    let mut tail = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > STDERR_TAIL_BYTES {
                    tail.drain(..tail.len() - STDERR_TAIL_BYTES);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).trim().to_string()
}

async fn exit_status(mut child: Child, stderr: Option<JoinHandle<String>>) -> Option<io::Result<Bytes>> {
    let status = match child.wait().await {
        Ok(status) => status,
        Err(e) => return Some(Err(e)),
    };
    if status.success() {
        return None;
    }
    let tail = match stderr {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };
    let message = if tail.is_empty() {
        format!("process exited with {status}")
    } else {
        format!("process exited with {status}: {tail}")
    };
    Some(Err(io::Error::other(message)))
}

//! Input stream interface for the dispatch loop.
//!
//! The serial collaborator reads with a timeout and may legitimately return
//! no bytes without the stream having ended. [`ChunkSource`] keeps the two
//! apart: only [`ReadOutcome::EndOfStream`] triggers the splitter's
//! final-frame handling, while [`ReadOutcome::TimedOut`] just suspends the
//! loop until the device produces more bytes.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

/// Result of one chunk read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were appended to the buffer.
    Data(usize),
    /// The read timed out with no data; the stream has not ended.
    TimedOut,
    /// The stream reached end-of-input.
    EndOfStream,
}

/// Source of raw byte chunks feeding the frame splitter.
#[async_trait]
pub trait ChunkSource: Send {
    /// Read the next chunk of bytes into `buf`.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if the underlying stream fails; such a
    /// failure is fatal for the dispatch session.
    async fn read_chunk(&mut self, buf: &mut BytesMut) -> io::Result<ReadOutcome>;
}

/// [`ChunkSource`] adapter over any [`AsyncRead`], applying an optional
/// per-read timeout.
///
/// A reader returning zero bytes signals end-of-stream, matching
/// [`AsyncRead`] semantics; an elapsed timeout is reported as
/// [`ReadOutcome::TimedOut`] instead.
#[derive(Debug)]
pub struct TimedReader<R> {
    inner: R,
    read_timeout: Option<Duration>,
}

impl<R> TimedReader<R> {
    /// Wrap `inner`, timing out each read after `read_timeout` if set.
    #[must_use]
    pub const fn new(inner: R, read_timeout: Option<Duration>) -> Self {
        Self {
            inner,
            read_timeout,
        }
    }
}

#[async_trait]
impl<R> ChunkSource for TimedReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_chunk(&mut self, buf: &mut BytesMut) -> io::Result<ReadOutcome> {
        let read = self.inner.read_buf(buf);
        let n = match self.read_timeout {
            Some(limit) => match timeout(limit, read).await {
                Ok(result) => result?,
                Err(_) => return Ok(ReadOutcome::TimedOut),
            },
            None => read.await?,
        };
        Ok(if n == 0 {
            ReadOutcome::EndOfStream
        } else {
            ReadOutcome::Data(n)
        })
    }
}

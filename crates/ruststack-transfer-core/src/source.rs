//! Chunking of the caller's upload stream into part-sized buffers.

use std::fmt;
use std::io;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

/// Boxed byte stream accepted by the upload path.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Re-slices an arbitrary chunked stream into buffers of an exact size.
///
/// Reads are cancel-safe: bytes pulled from the stream are kept in the
/// internal buffer until a [`read_part`](Self::read_part) call returns them.
pub struct PartReader {
    stream: ByteStream,
    buffer: BytesMut,
    consumed: u64,
    exhausted: bool,
}

impl PartReader {
    /// Wrap a byte stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            stream: Box::pin(stream),
            buffer: BytesMut::new(),
            consumed: 0,
            exhausted: false,
        }
    }

    /// Buffer until at least `len` bytes are available or the stream ends,
    /// and report how many bytes are buffered.
    pub async fn fill(&mut self, len: usize) -> io::Result<usize> {
        while self.buffer.len() < len && !self.exhausted {
            match self.stream.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => return Err(err),
                None => self.exhausted = true,
            }
        }
        Ok(self.buffer.len())
    }

    /// Return the next `len` bytes, or fewer if the stream ends first.
    ///
    /// An empty buffer means the stream is drained.
    pub async fn read_part(&mut self, len: usize) -> io::Result<Bytes> {
        let available = self.fill(len).await?;
        let part = self.buffer.split_to(available.min(len)).freeze();
        self.consumed += part.len() as u64;
        Ok(part)
    }

    /// Whether every byte of the stream has been returned.
    pub async fn is_drained(&mut self) -> io::Result<bool> {
        Ok(self.fill(1).await? == 0)
    }

    /// Bytes returned by [`read_part`](Self::read_part) so far.
    #[must_use]
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Bytes pulled from the stream but not yet returned.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl fmt::Debug for PartReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartReader")
            .field("buffered", &self.buffer.len())
            .field("consumed", &self.consumed)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

//! Buffered, chunked binary emitter feeding an ordered byte stream.
//!
//! The writer owns a growable staging buffer. Writes append to it, and
//! whenever the buffer holds at least `chunk_size` bytes the full chunks
//! are forwarded downstream. `end_frame` flushes the partial remainder so
//! chunks become observable at frame boundaries; `stream_wait` is the
//! mid-frame checkpoint used by deep-tree and long-string encoders and
//! only forwards whole chunks. Multibyte integers and single-call strings
//! are appended atomically, so a suspension never splits a unit in the
//! staging buffer.

use bytes::{BufMut as _, Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::task::yield_now;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ProtocolError;
use crate::header::FileHeader;

/// Default chunk size used by recorders when none is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Ordered stream of byte chunks produced by a [`Writer`].
pub type ByteStream = ReceiverStream<Bytes>;

/// Single-producer chunked byte emitter.
pub struct Writer {
    staging: BytesMut,
    chunk_size: usize,
    sink: mpsc::Sender<Bytes>,
}

impl Writer {
    /// Create a writer and the byte stream it feeds.
    ///
    /// The stream is back-pressured: once its internal queue fills, the
    /// writer suspends in `send` until the consumer pulls.
    #[must_use]
    pub fn create(chunk_size: usize) -> (Self, ByteStream) {
        let chunk_size = chunk_size.max(1);
        let (sink, receiver) = mpsc::channel(16);
        let writer = Self {
            staging: BytesMut::with_capacity(chunk_size),
            chunk_size,
            sink,
        };
        (writer, ReceiverStream::new(receiver))
    }

    /// Configured chunk size in bytes.
    #[inline]
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    async fn forward(&mut self, chunk: Bytes) -> Result<(), ProtocolError> {
        self.sink
            .send(chunk)
            .await
            .map_err(|_| ProtocolError::SinkClosed)
    }

    /// Forward every full chunk currently staged.
    async fn drain_full(&mut self) -> Result<(), ProtocolError> {
        while self.staging.len() >= self.chunk_size {
            let chunk = self.staging.split_to(self.chunk_size).freeze();
            self.forward(chunk).await?;
        }
        Ok(())
    }

    /// Write one unsigned byte.
    ///
    /// # Errors
    /// `SinkClosed` if the consumer dropped the stream.
    pub async fn u8(&mut self, value: u8) -> Result<(), ProtocolError> {
        self.staging.put_u8(value);
        self.drain_full().await
    }

    /// Write a big-endian `u32`.
    ///
    /// # Errors
    /// `SinkClosed` if the consumer dropped the stream.
    pub async fn u32(&mut self, value: u32) -> Result<(), ProtocolError> {
        self.staging.put_u32(value);
        self.drain_full().await
    }

    /// Write a big-endian `u64`.
    ///
    /// # Errors
    /// `SinkClosed` if the consumer dropped the stream.
    pub async fn u64(&mut self, value: u64) -> Result<(), ProtocolError> {
        self.staging.put_u64(value);
        self.drain_full().await
    }

    /// Write a boolean as one byte, 1 for true and 0 for false.
    ///
    /// # Errors
    /// `SinkClosed` if the consumer dropped the stream.
    pub async fn bool(&mut self, value: bool) -> Result<(), ProtocolError> {
        self.u8(u8::from(value)).await
    }

    /// Write a `u64` length prefix for a sequence of `len` items.
    ///
    /// # Errors
    /// `SinkClosed` if the consumer dropped the stream.
    pub async fn seq_len(&mut self, len: usize) -> Result<(), ProtocolError> {
        self.u64(len as u64).await
    }

    /// Write a UTF-8 string with its `u64` byte-length prefix in one unit.
    ///
    /// # Errors
    /// `SinkClosed` if the consumer dropped the stream.
    pub async fn str_utf8(&mut self, value: &str) -> Result<(), ProtocolError> {
        self.staging.put_u64(value.len() as u64);
        self.staging.put_slice(value.as_bytes());
        self.drain_full().await
    }

    /// Write a UTF-8 string in chunk-sized slices, awaiting
    /// [`Writer::stream_wait`] between slices so a long string does not
    /// monopolize the task.
    ///
    /// # Errors
    /// `SinkClosed` if the consumer dropped the stream.
    pub async fn str_utf8_streaming(&mut self, value: &str) -> Result<(), ProtocolError> {
        self.u64(value.len() as u64).await?;
        for part in value.as_bytes().chunks(self.chunk_size) {
            self.staging.put_slice(part);
            self.stream_wait().await?;
        }
        Ok(())
    }

    /// Write a byte buffer with its `u64` length prefix, streaming the
    /// payload in chunk-sized slices.
    ///
    /// # Errors
    /// `SinkClosed` if the consumer dropped the stream.
    pub async fn bytes_u64(&mut self, value: &[u8]) -> Result<(), ProtocolError> {
        self.u64(value.len() as u64).await?;
        for part in value.chunks(self.chunk_size) {
            self.staging.put_slice(part);
            self.stream_wait().await?;
        }
        Ok(())
    }

    /// Write an optional string: presence byte, then the value if present.
    ///
    /// # Errors
    /// `SinkClosed` if the consumer dropped the stream.
    pub async fn optional_str(&mut self, value: Option<&str>) -> Result<(), ProtocolError> {
        match value {
            Some(inner) => {
                self.bool(true).await?;
                self.str_utf8(inner).await
            }
            None => self.bool(false).await,
        }
    }

    /// Mid-frame checkpoint: forward full chunks, then yield to the task
    /// queue. Never forwards a partial chunk.
    ///
    /// # Errors
    /// `SinkClosed` if the consumer dropped the stream.
    pub async fn stream_wait(&mut self) -> Result<(), ProtocolError> {
        self.drain_full().await?;
        yield_now().await;
        Ok(())
    }

    /// Frame boundary: flush everything staged, including a partial final
    /// chunk, then yield so the chunks are observable downstream.
    ///
    /// # Errors
    /// `SinkClosed` if the consumer dropped the stream.
    pub async fn end_frame(&mut self) -> Result<(), ProtocolError> {
        self.drain_full().await?;
        if !self.staging.is_empty() {
            let chunk = self.staging.split().freeze();
            self.forward(chunk).await?;
        }
        yield_now().await;
        Ok(())
    }

    /// Write the 32-byte file container header and flush it.
    ///
    /// # Errors
    /// `SinkClosed` if the consumer dropped the stream.
    pub async fn write_header(&mut self, created_at_ms: u64) -> Result<(), ProtocolError> {
        FileHeader::new(created_at_ms).encode(self).await?;
        self.end_frame().await
    }

    /// Close the writer. The byte stream ends once buffered chunks are
    /// drained; call [`Writer::end_frame`] first to flush pending bytes.
    pub fn close(self) {
        drop(self.sink);
    }
}

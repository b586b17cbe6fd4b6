//! Incremental frame decoder over a chunked byte stream.
//!
//! Chunk boundaries carry no meaning: the reader appends whatever
//! arrives to a growable buffer and repeatedly attempts to parse one
//! frame. A parse attempt that runs out of bytes restores the buffer
//! offset and waits for more input; any other decode failure is fatal
//! and poisons the frame stream.

use bytes::{Buf as _, Bytes, BytesMut};
use futures::StreamExt as _;
use futures::stream::BoxStream;
use log::debug;

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::header::FileHeader;
use crate::wire::Decoder;

/// Boxed transport stream feeding a [`Reader`].
pub type ByteSource = BoxStream<'static, Result<Bytes, ProtocolError>>;

/// Pull-based frame decoder.
pub struct Reader {
    source: ByteSource,
    buf: BytesMut,
    expect_header: bool,
    header: Option<FileHeader>,
    eof: bool,
    poisoned: bool,
}

impl Reader {
    /// Wrap a fallible byte stream. Pass `expect_header` for file input;
    /// wire input starts directly with the first frame.
    #[must_use]
    pub fn new(source: ByteSource, expect_header: bool) -> Self {
        Self {
            source,
            buf: BytesMut::new(),
            expect_header,
            header: None,
            eof: false,
            poisoned: false,
        }
    }

    /// Wrap an infallible chunk stream, such as the one produced by
    /// [`crate::writer::Writer::create`].
    #[must_use]
    pub fn from_chunks<S>(chunks: S, expect_header: bool) -> Self
    where
        S: futures::Stream<Item = Bytes> + Send + 'static,
    {
        Self::new(chunks.map(Ok).boxed(), expect_header)
    }

    /// The file header, once parsed. Always `None` for wire input.
    #[must_use]
    pub const fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    /// Decode the next frame, reading more chunks as needed.
    ///
    /// Returns `Ok(None)` on a clean end of stream (no buffered bytes
    /// left over).
    ///
    /// # Errors
    /// `UnexpectedEof` if the input ends mid-frame, `Transport` if the
    /// source fails, and any fatal decode error. After an error the
    /// reader stays poisoned and keeps returning `UnexpectedEof`.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        if self.poisoned {
            return Err(ProtocolError::UnexpectedEof);
        }
        match self.parse_loop().await {
            Ok(frame) => Ok(frame),
            Err(error) => {
                self.poisoned = true;
                Err(error)
            }
        }
    }

    async fn parse_loop(&mut self) -> Result<Option<Frame>, ProtocolError> {
        loop {
            if self.expect_header && self.header.is_none() {
                let mut decoder = Decoder::new(&self.buf);
                match FileHeader::decode(&mut decoder) {
                    Ok(header) => {
                        let consumed = decoder.pos();
                        self.buf.advance(consumed);
                        debug!(
                            "parsed file header: version={} created_at_ms={}",
                            header.version, header.created_at_ms
                        );
                        self.header = Some(header);
                    }
                    Err(error) if error.is_retryable() && !self.eof => {
                        self.fill().await?;
                        continue;
                    }
                    Err(error) if error.is_retryable() => {
                        return Err(ProtocolError::UnexpectedEof);
                    }
                    Err(error) => return Err(error),
                }
            }

            if !self.buf.is_empty() {
                let mut decoder = Decoder::new(&self.buf);
                match Frame::decode(&mut decoder) {
                    Ok(frame) => {
                        let consumed = decoder.pos();
                        self.buf.advance(consumed);
                        return Ok(Some(frame));
                    }
                    Err(error) if error.is_retryable() && !self.eof => {}
                    Err(error) if error.is_retryable() => {
                        return Err(ProtocolError::UnexpectedEof);
                    }
                    Err(error) => return Err(error),
                }
            } else if self.eof {
                return Ok(None);
            }

            self.fill().await?;
        }
    }

    /// Pull one more chunk from the source.
    async fn fill(&mut self) -> Result<(), ProtocolError> {
        if self.eof {
            return Ok(());
        }
        match self.source.next().await {
            Some(Ok(chunk)) => {
                self.buf.extend_from_slice(&chunk);
                Ok(())
            }
            Some(Err(error)) => Err(error),
            None => {
                self.eof = true;
                Ok(())
            }
        }
    }

    /// Adapt the reader into a frame stream. The stream ends after the
    /// first error.
    pub fn into_stream(self) -> impl futures::Stream<Item = Result<Frame, ProtocolError>> {
        futures::stream::unfold((self, false), |(mut reader, done)| async move {
            if done {
                return None;
            }
            match reader.next_frame().await {
                Ok(Some(frame)) => Some((Ok(frame), (reader, false))),
                Ok(None) => None,
                Err(error) => Some((Err(error), (reader, true))),
            }
        })
    }
}

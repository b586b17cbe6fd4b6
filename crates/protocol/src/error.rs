use thiserror::Error;

/// Errors raised while encoding or decoding the recording byte format.
///
/// `NeedMoreData` is the only retryable variant: it means the decode
/// buffer ends before the current value is complete, and the caller may
/// retry once more bytes have arrived. Every other variant is fatal for
/// the stream that produced it.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The buffer ended mid-value; retry after more bytes arrive.
    #[error("not enough data for {0}")]
    NeedMoreData(&'static str),

    /// The frame tag does not name any known frame variant.
    #[error("unknown frame tag {0}")]
    UnknownTag(u32),

    /// A tagged value carried a discriminant outside its closed set.
    #[error("unknown {what} discriminant {value}")]
    UnknownDiscriminant { what: &'static str, value: u32 },

    /// A declared length that cannot belong to a well-formed stream.
    #[error("declared length {0} exceeds the decode limit")]
    ImplausibleLength(u64),

    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),

    /// The file container did not start with the expected magic bytes.
    #[error("bad magic bytes in file header")]
    BadMagic,

    /// The file container version is newer than this decoder understands.
    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),

    /// The input ended while a frame (or the header) was still incomplete.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// The downstream byte sink was dropped before the writer finished.
    #[error("byte sink closed")]
    SinkClosed,

    /// The underlying transport reported an error.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ProtocolError {
    /// Whether the reader may retry this error once more bytes arrive.
    #[inline]
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NeedMoreData(_))
    }
}

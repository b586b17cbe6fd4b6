//! Fixed 32-byte file container header.

use crate::error::ProtocolError;
use crate::wire::Decoder;
use crate::writer::Writer;

/// Magic bytes opening every recording file.
pub const MAGIC: [u8; 4] = *b"DCRR";

/// Container version this implementation writes and understands.
pub const VERSION: u32 = 1;

/// Total header length in bytes: magic, version, creation time, and 16
/// reserved bytes written as zero.
pub const HEADER_LEN: usize = 32;

/// Parsed file container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u32,
    pub created_at_ms: u64,
}

impl FileHeader {
    /// Header for a file created at the given unix-millisecond timestamp.
    #[inline]
    #[must_use]
    pub const fn new(created_at_ms: u64) -> Self {
        Self {
            version: VERSION,
            created_at_ms,
        }
    }

    /// Serialize the header through a [`Writer`].
    ///
    /// # Errors
    /// Returns an error if the byte sink is closed.
    pub async fn encode(&self, writer: &mut Writer) -> Result<(), ProtocolError> {
        for byte in MAGIC {
            writer.u8(byte).await?;
        }
        writer.u32(self.version).await?;
        writer.u64(self.created_at_ms).await?;
        for _ in 0..16 {
            writer.u8(0).await?;
        }
        Ok(())
    }

    /// Parse a header from buffered bytes.
    ///
    /// Reserved bytes are not validated, so files written by a future
    /// minor revision that populates them still open. Bad magic and
    /// unknown versions are fatal.
    ///
    /// # Errors
    /// `NeedMoreData` until 32 bytes are available; `BadMagic` or
    /// `UnsupportedVersion` on malformed input.
    pub fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ProtocolError> {
        let mut magic = [0u8; 4];
        for slot in &mut magic {
            *slot = decoder.u8("file header")?;
        }
        if magic != MAGIC {
            return Err(ProtocolError::BadMagic);
        }
        let version = decoder.u32("file header")?;
        if version != VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
        let created_at_ms = decoder.u64("file header")?;
        for _ in 0..16 {
            decoder.u8("file header")?;
        }
        Ok(Self {
            version,
            created_at_ms,
        })
    }
}

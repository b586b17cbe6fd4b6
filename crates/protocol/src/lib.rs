//! Framed binary recording protocol: frame catalog, chunked writer,
//! incremental reader, and the `.dcrr` file container.
//!
//! The wire format is tag-driven with no inter-frame framing bytes.
//! Integers are unsigned big-endian, strings carry a `u64` byte-length
//! prefix, and optional values carry a one-byte presence tag. Frame
//! atomicity is a reader-side property: the writer is free to cut byte
//! chunks anywhere.

pub mod error;
pub mod frame;
pub mod header;
pub mod printing;
pub mod reader;
pub mod vdom;
pub mod wire;
pub mod writer;

pub use error::ProtocolError;
pub use frame::{CacheEntry, FetchError, Frame, TextOperation};
pub use header::FileHeader;
pub use reader::Reader;
pub use vdom::{VDocument, VElement, VNode, VStyleSheet};
pub use writer::{ByteStream, DEFAULT_CHUNK_SIZE, Writer};

//! The closed frame catalog.
//!
//! Every frame starts with a big-endian `u32` tag. The numbering is an
//! append-only contract: tags are never re-used and decoding an unknown
//! tag is fatal. Frames are immutable once emitted and own their payload
//! by value.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::vdom::{VDocument, VNode, VStyleSheet};
use crate::wire::Decoder;
use crate::writer::Writer;

/// Outcome of fetching one asset, carried in-band on [`Frame::Asset`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FetchError {
    #[default]
    None,
    /// The response was opaque or blocked by the origin policy.
    Cors,
    /// The request failed at the transport layer.
    Network,
    /// The server answered with a non-2xx status.
    Http,
    Unknown {
        message: String,
    },
}

impl FetchError {
    const fn discriminant(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Cors => 1,
            Self::Network => 2,
            Self::Http => 3,
            Self::Unknown { .. } => 4,
        }
    }

    async fn encode(&self, writer: &mut Writer) -> Result<(), ProtocolError> {
        writer.u32(self.discriminant()).await?;
        if let Self::Unknown { message } = self {
            writer.str_utf8(message).await?;
        }
        Ok(())
    }

    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ProtocolError> {
        match decoder.u32("fetch error")? {
            0 => Ok(Self::None),
            1 => Ok(Self::Cors),
            2 => Ok(Self::Network),
            3 => Ok(Self::Http),
            4 => Ok(Self::Unknown {
                message: decoder.str_utf8("fetch error message")?,
            }),
            value => Err(ProtocolError::UnknownDiscriminant {
                what: "fetch error",
                value,
            }),
        }
    }
}

/// One minimal text edit inside a `DomTextChanged` frame. Applying the
/// operations of a frame in order transforms the previous text into the
/// current text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextOperation {
    Insert { index: u32, text: String },
    Remove { index: u32, length: u32 },
}

impl TextOperation {
    async fn encode(&self, writer: &mut Writer) -> Result<(), ProtocolError> {
        match self {
            Self::Insert { index, text } => {
                writer.u32(0).await?;
                writer.u32(*index).await?;
                writer.str_utf8(text).await
            }
            Self::Remove { index, length } => {
                writer.u32(1).await?;
                writer.u32(*index).await?;
                writer.u32(*length).await
            }
        }
    }

    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ProtocolError> {
        match decoder.u32("text op code")? {
            0 => Ok(Self::Insert {
                index: decoder.u32("text op index")?,
                text: decoder.str_utf8("text op text")?,
            }),
            1 => Ok(Self::Remove {
                index: decoder.u32("text op index")?,
                length: decoder.u32("text op length")?,
            }),
            value => Err(ProtocolError::UnknownDiscriminant {
                what: "text op code",
                value,
            }),
        }
    }

    async fn encode_list(ops: &[Self], writer: &mut Writer) -> Result<(), ProtocolError> {
        writer.seq_len(ops.len()).await?;
        for op in ops {
            op.encode(writer).await?;
        }
        Ok(())
    }

    fn decode_list(decoder: &mut Decoder<'_>) -> Result<Vec<Self>, ProtocolError> {
        let count = decoder.len_u64("text op count")?;
        let mut ops = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            ops.push(Self::decode(decoder)?);
        }
        Ok(ops)
    }
}

/// One `(url, hash)` entry of a [`Frame::CacheManifest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub url: String,
    pub hash: String,
}

/// A recorded event. See the module docs for the tag contract.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Timestamp {
        timestamp: u64,
    },
    Keyframe {
        document: VDocument,
        asset_count: u32,
        viewport_width: u32,
        viewport_height: u32,
    },
    ViewportResized {
        width: u32,
        height: u32,
    },
    ScrollOffsetChanged {
        scroll_x: u32,
        scroll_y: u32,
    },
    MouseMoved {
        x: u32,
        y: u32,
    },
    MouseClicked {
        x: u32,
        y: u32,
    },
    KeyPressed {
        code: String,
        alt_key: bool,
        ctrl_key: bool,
        meta_key: bool,
        shift_key: bool,
    },
    ElementFocused {
        node_id: u32,
    },
    TextSelectionChanged {
        start_node_id: u32,
        start_offset: u32,
        end_node_id: u32,
        end_offset: u32,
    },
    DomNodeAdded {
        parent_node_id: u32,
        index: u32,
        node: VNode,
        asset_count: u32,
    },
    DomNodeRemoved {
        node_id: u32,
    },
    DomAttributeChanged {
        node_id: u32,
        name: String,
        value: String,
    },
    DomAttributeRemoved {
        node_id: u32,
        name: String,
    },
    DomTextChanged {
        node_id: u32,
        operations: Vec<TextOperation>,
    },
    DomNodeResized {
        node_id: u32,
        width: u32,
        height: u32,
    },
    DomNodePropertyChanged {
        node_id: u32,
        name: String,
        value: String,
    },
    Asset {
        asset_id: u32,
        url: String,
        mime: Option<String>,
        buf: Bytes,
        fetch_error: FetchError,
    },
    AdoptedStyleSheetsChanged {
        sheet_ids: Vec<u32>,
        added_count: u32,
    },
    NewAdoptedStyleSheet {
        sheet: VStyleSheet,
        asset_count: u32,
    },
    ElementScrolled {
        node_id: u32,
        scroll_x: u32,
        scroll_y: u32,
    },
    ElementBlurred {
        node_id: u32,
    },
    WindowFocused,
    WindowBlurred,
    StyleSheetRuleInserted {
        sheet_id: u32,
        rule_index: u32,
        content: String,
    },
    StyleSheetRuleDeleted {
        sheet_id: u32,
        rule_index: u32,
    },
    StyleSheetReplaced {
        sheet_id: u32,
        content: String,
    },
    CanvasChanged {
        node_id: u32,
        mime: String,
        data: Bytes,
    },
    DomNodePropertyTextChanged {
        node_id: u32,
        name: String,
        operations: Vec<TextOperation>,
    },
    RecordingMetadata {
        initial_url: String,
        heartbeat_interval_secs: u32,
    },
    Heartbeat,
    AssetReference {
        asset_id: u32,
        url: String,
        hash: String,
        mime: Option<String>,
    },
    CacheManifest {
        origin: String,
        entries: Vec<CacheEntry>,
    },
    PlaybackConfig {
        speed_percent: u32,
        start_paused: bool,
    },
}

impl Frame {
    /// Wire tag of this frame variant.
    #[must_use]
    pub const fn tag(&self) -> u32 {
        match self {
            Self::Timestamp { .. } => 0,
            Self::Keyframe { .. } => 1,
            Self::ViewportResized { .. } => 2,
            Self::ScrollOffsetChanged { .. } => 3,
            Self::MouseMoved { .. } => 4,
            Self::MouseClicked { .. } => 5,
            Self::KeyPressed { .. } => 6,
            Self::ElementFocused { .. } => 7,
            Self::TextSelectionChanged { .. } => 8,
            Self::DomNodeAdded { .. } => 9,
            Self::DomNodeRemoved { .. } => 10,
            Self::DomAttributeChanged { .. } => 11,
            Self::DomAttributeRemoved { .. } => 12,
            Self::DomTextChanged { .. } => 13,
            Self::DomNodeResized { .. } => 14,
            Self::DomNodePropertyChanged { .. } => 15,
            Self::Asset { .. } => 16,
            Self::AdoptedStyleSheetsChanged { .. } => 17,
            Self::NewAdoptedStyleSheet { .. } => 18,
            Self::ElementScrolled { .. } => 19,
            Self::ElementBlurred { .. } => 20,
            Self::WindowFocused => 21,
            Self::WindowBlurred => 22,
            Self::StyleSheetRuleInserted { .. } => 23,
            Self::StyleSheetRuleDeleted { .. } => 24,
            Self::StyleSheetReplaced { .. } => 25,
            Self::CanvasChanged { .. } => 26,
            Self::DomNodePropertyTextChanged { .. } => 27,
            Self::RecordingMetadata { .. } => 28,
            Self::Heartbeat => 29,
            Self::AssetReference { .. } => 30,
            Self::CacheManifest { .. } => 31,
            Self::PlaybackConfig { .. } => 32,
        }
    }

    /// Serialize this frame, finishing with the writer's frame boundary
    /// so buffered chunks become observable downstream.
    ///
    /// # Errors
    /// Returns an error if the byte sink is closed.
    pub async fn encode(&self, writer: &mut Writer) -> Result<(), ProtocolError> {
        writer.u32(self.tag()).await?;
        match self {
            Self::Timestamp { timestamp } => {
                writer.u64(*timestamp).await?;
            }
            Self::Keyframe {
                document,
                asset_count,
                viewport_width,
                viewport_height,
            } => {
                document.encode(writer).await?;
                writer.u32(*asset_count).await?;
                writer.u32(*viewport_width).await?;
                writer.u32(*viewport_height).await?;
            }
            Self::ViewportResized { width, height } => {
                writer.u32(*width).await?;
                writer.u32(*height).await?;
            }
            Self::ScrollOffsetChanged { scroll_x, scroll_y } => {
                writer.u32(*scroll_x).await?;
                writer.u32(*scroll_y).await?;
            }
            Self::MouseMoved { x, y } | Self::MouseClicked { x, y } => {
                writer.u32(*x).await?;
                writer.u32(*y).await?;
            }
            Self::KeyPressed {
                code,
                alt_key,
                ctrl_key,
                meta_key,
                shift_key,
            } => {
                writer.str_utf8(code).await?;
                writer.bool(*alt_key).await?;
                writer.bool(*ctrl_key).await?;
                writer.bool(*meta_key).await?;
                writer.bool(*shift_key).await?;
            }
            Self::ElementFocused { node_id } | Self::ElementBlurred { node_id } => {
                writer.u32(*node_id).await?;
            }
            Self::TextSelectionChanged {
                start_node_id,
                start_offset,
                end_node_id,
                end_offset,
            } => {
                writer.u32(*start_node_id).await?;
                writer.u32(*start_offset).await?;
                writer.u32(*end_node_id).await?;
                writer.u32(*end_offset).await?;
            }
            Self::DomNodeAdded {
                parent_node_id,
                index,
                node,
                asset_count,
            } => {
                writer.u32(*parent_node_id).await?;
                writer.u32(*index).await?;
                node.encode(writer).await?;
                writer.u32(*asset_count).await?;
            }
            Self::DomNodeRemoved { node_id } => {
                writer.u32(*node_id).await?;
            }
            Self::DomAttributeChanged {
                node_id,
                name,
                value,
            } => {
                writer.u32(*node_id).await?;
                writer.str_utf8(name).await?;
                writer.str_utf8(value).await?;
            }
            Self::DomAttributeRemoved { node_id, name } => {
                writer.u32(*node_id).await?;
                writer.str_utf8(name).await?;
            }
            Self::DomTextChanged {
                node_id,
                operations,
            } => {
                writer.u32(*node_id).await?;
                TextOperation::encode_list(operations, writer).await?;
            }
            Self::DomNodeResized {
                node_id,
                width,
                height,
            } => {
                writer.u32(*node_id).await?;
                writer.u32(*width).await?;
                writer.u32(*height).await?;
            }
            Self::DomNodePropertyChanged {
                node_id,
                name,
                value,
            } => {
                writer.u32(*node_id).await?;
                writer.str_utf8(name).await?;
                writer.str_utf8(value).await?;
            }
            Self::Asset {
                asset_id,
                url,
                mime,
                buf,
                fetch_error,
            } => {
                writer.u32(*asset_id).await?;
                writer.str_utf8(url).await?;
                writer.optional_str(mime.as_deref()).await?;
                writer.bytes_u64(buf).await?;
                fetch_error.encode(writer).await?;
            }
            Self::AdoptedStyleSheetsChanged {
                sheet_ids,
                added_count,
            } => {
                writer.seq_len(sheet_ids.len()).await?;
                for sheet_id in sheet_ids {
                    writer.u32(*sheet_id).await?;
                }
                writer.u32(*added_count).await?;
            }
            Self::NewAdoptedStyleSheet { sheet, asset_count } => {
                sheet.encode(writer).await?;
                writer.u32(*asset_count).await?;
            }
            Self::ElementScrolled {
                node_id,
                scroll_x,
                scroll_y,
            } => {
                writer.u32(*node_id).await?;
                writer.u32(*scroll_x).await?;
                writer.u32(*scroll_y).await?;
            }
            Self::WindowFocused | Self::WindowBlurred | Self::Heartbeat => {}
            Self::StyleSheetRuleInserted {
                sheet_id,
                rule_index,
                content,
            } => {
                writer.u32(*sheet_id).await?;
                writer.u32(*rule_index).await?;
                writer.str_utf8(content).await?;
            }
            Self::StyleSheetRuleDeleted {
                sheet_id,
                rule_index,
            } => {
                writer.u32(*sheet_id).await?;
                writer.u32(*rule_index).await?;
            }
            Self::StyleSheetReplaced { sheet_id, content } => {
                writer.u32(*sheet_id).await?;
                writer.str_utf8_streaming(content).await?;
            }
            Self::CanvasChanged {
                node_id,
                mime,
                data,
            } => {
                writer.u32(*node_id).await?;
                writer.str_utf8(mime).await?;
                writer.bytes_u64(data).await?;
            }
            Self::DomNodePropertyTextChanged {
                node_id,
                name,
                operations,
            } => {
                writer.u32(*node_id).await?;
                writer.str_utf8(name).await?;
                TextOperation::encode_list(operations, writer).await?;
            }
            Self::RecordingMetadata {
                initial_url,
                heartbeat_interval_secs,
            } => {
                writer.str_utf8(initial_url).await?;
                writer.u32(*heartbeat_interval_secs).await?;
            }
            Self::AssetReference {
                asset_id,
                url,
                hash,
                mime,
            } => {
                writer.u32(*asset_id).await?;
                writer.str_utf8(url).await?;
                writer.str_utf8(hash).await?;
                writer.optional_str(mime.as_deref()).await?;
            }
            Self::CacheManifest { origin, entries } => {
                writer.str_utf8(origin).await?;
                writer.seq_len(entries.len()).await?;
                for entry in entries {
                    writer.str_utf8(&entry.url).await?;
                    writer.str_utf8(&entry.hash).await?;
                }
            }
            Self::PlaybackConfig {
                speed_percent,
                start_paused,
            } => {
                writer.u32(*speed_percent).await?;
                writer.bool(*start_paused).await?;
            }
        }
        writer.end_frame().await
    }

    /// Parse one frame from buffered bytes.
    ///
    /// # Errors
    /// Soft `NeedMoreData` while the frame is incomplete; fatal on an
    /// unknown tag or malformed payload.
    pub fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ProtocolError> {
        let tag = decoder.u32("frame tag")?;
        match tag {
            0 => Ok(Self::Timestamp {
                timestamp: decoder.u64("timestamp")?,
            }),
            1 => Ok(Self::Keyframe {
                document: VDocument::decode(decoder)?,
                asset_count: decoder.u32("asset count")?,
                viewport_width: decoder.u32("viewport width")?,
                viewport_height: decoder.u32("viewport height")?,
            }),
            2 => Ok(Self::ViewportResized {
                width: decoder.u32("viewport width")?,
                height: decoder.u32("viewport height")?,
            }),
            3 => Ok(Self::ScrollOffsetChanged {
                scroll_x: decoder.u32("scroll x")?,
                scroll_y: decoder.u32("scroll y")?,
            }),
            4 => Ok(Self::MouseMoved {
                x: decoder.u32("mouse x")?,
                y: decoder.u32("mouse y")?,
            }),
            5 => Ok(Self::MouseClicked {
                x: decoder.u32("mouse x")?,
                y: decoder.u32("mouse y")?,
            }),
            6 => Ok(Self::KeyPressed {
                code: decoder.str_utf8("key code")?,
                alt_key: decoder.bool("alt key")?,
                ctrl_key: decoder.bool("ctrl key")?,
                meta_key: decoder.bool("meta key")?,
                shift_key: decoder.bool("shift key")?,
            }),
            7 => Ok(Self::ElementFocused {
                node_id: decoder.u32("node id")?,
            }),
            8 => Ok(Self::TextSelectionChanged {
                start_node_id: decoder.u32("selection start node")?,
                start_offset: decoder.u32("selection start offset")?,
                end_node_id: decoder.u32("selection end node")?,
                end_offset: decoder.u32("selection end offset")?,
            }),
            9 => Ok(Self::DomNodeAdded {
                parent_node_id: decoder.u32("parent node id")?,
                index: decoder.u32("child index")?,
                node: VNode::decode(decoder)?,
                asset_count: decoder.u32("asset count")?,
            }),
            10 => Ok(Self::DomNodeRemoved {
                node_id: decoder.u32("node id")?,
            }),
            11 => Ok(Self::DomAttributeChanged {
                node_id: decoder.u32("node id")?,
                name: decoder.str_utf8("attribute name")?,
                value: decoder.str_utf8("attribute value")?,
            }),
            12 => Ok(Self::DomAttributeRemoved {
                node_id: decoder.u32("node id")?,
                name: decoder.str_utf8("attribute name")?,
            }),
            13 => Ok(Self::DomTextChanged {
                node_id: decoder.u32("node id")?,
                operations: TextOperation::decode_list(decoder)?,
            }),
            14 => Ok(Self::DomNodeResized {
                node_id: decoder.u32("node id")?,
                width: decoder.u32("node width")?,
                height: decoder.u32("node height")?,
            }),
            15 => Ok(Self::DomNodePropertyChanged {
                node_id: decoder.u32("node id")?,
                name: decoder.str_utf8("property name")?,
                value: decoder.str_utf8("property value")?,
            }),
            16 => Ok(Self::Asset {
                asset_id: decoder.u32("asset id")?,
                url: decoder.str_utf8("asset url")?,
                mime: decoder.optional_str("asset mime")?,
                buf: decoder.bytes_u64("asset bytes")?,
                fetch_error: FetchError::decode(decoder)?,
            }),
            17 => {
                let count = decoder.len_u64("sheet id count")?;
                let mut sheet_ids = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    sheet_ids.push(decoder.u32("sheet id")?);
                }
                Ok(Self::AdoptedStyleSheetsChanged {
                    sheet_ids,
                    added_count: decoder.u32("added count")?,
                })
            }
            18 => Ok(Self::NewAdoptedStyleSheet {
                sheet: VStyleSheet::decode(decoder)?,
                asset_count: decoder.u32("asset count")?,
            }),
            19 => Ok(Self::ElementScrolled {
                node_id: decoder.u32("node id")?,
                scroll_x: decoder.u32("scroll x")?,
                scroll_y: decoder.u32("scroll y")?,
            }),
            20 => Ok(Self::ElementBlurred {
                node_id: decoder.u32("node id")?,
            }),
            21 => Ok(Self::WindowFocused),
            22 => Ok(Self::WindowBlurred),
            23 => Ok(Self::StyleSheetRuleInserted {
                sheet_id: decoder.u32("sheet id")?,
                rule_index: decoder.u32("rule index")?,
                content: decoder.str_utf8("rule content")?,
            }),
            24 => Ok(Self::StyleSheetRuleDeleted {
                sheet_id: decoder.u32("sheet id")?,
                rule_index: decoder.u32("rule index")?,
            }),
            25 => Ok(Self::StyleSheetReplaced {
                sheet_id: decoder.u32("sheet id")?,
                content: decoder.str_utf8("sheet content")?,
            }),
            26 => Ok(Self::CanvasChanged {
                node_id: decoder.u32("node id")?,
                mime: decoder.str_utf8("canvas mime")?,
                data: decoder.bytes_u64("canvas data")?,
            }),
            27 => Ok(Self::DomNodePropertyTextChanged {
                node_id: decoder.u32("node id")?,
                name: decoder.str_utf8("property name")?,
                operations: TextOperation::decode_list(decoder)?,
            }),
            28 => Ok(Self::RecordingMetadata {
                initial_url: decoder.str_utf8("initial url")?,
                heartbeat_interval_secs: decoder.u32("heartbeat interval")?,
            }),
            29 => Ok(Self::Heartbeat),
            30 => Ok(Self::AssetReference {
                asset_id: decoder.u32("asset id")?,
                url: decoder.str_utf8("asset url")?,
                hash: decoder.str_utf8("asset hash")?,
                mime: decoder.optional_str("asset mime")?,
            }),
            31 => {
                let origin = decoder.str_utf8("manifest origin")?;
                let count = decoder.len_u64("manifest entry count")?;
                let mut entries = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    entries.push(CacheEntry {
                        url: decoder.str_utf8("manifest url")?,
                        hash: decoder.str_utf8("manifest hash")?,
                    });
                }
                Ok(Self::CacheManifest { origin, entries })
            }
            32 => Ok(Self::PlaybackConfig {
                speed_percent: decoder.u32("playback speed")?,
                start_paused: decoder.bool("start paused")?,
            }),
            unknown => Err(ProtocolError::UnknownTag(unknown)),
        }
    }
}

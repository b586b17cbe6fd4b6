//! Virtual DOM value types carried by keyframe and insert frames.
//!
//! Every node carries the recorder-assigned node id (0 for synthetic
//! nodes) and, for elements, fully rewritten `asset:<id>` resource
//! references. Attribute order is insertion order and is preserved on
//! the wire so encoded documents compare byte-for-byte.

use futures::future::BoxFuture;

use crate::error::ProtocolError;
use crate::wire::Decoder;
use crate::writer::Writer;

const KIND_ELEMENT: u32 = 0;
const KIND_TEXT: u32 = 1;
const KIND_CDATA: u32 = 2;
const KIND_COMMENT: u32 = 3;
const KIND_PROCESSING_INSTRUCTION: u32 = 4;
const KIND_DOCUMENT_TYPE: u32 = 5;

/// Element node snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VElement {
    pub id: u32,
    /// Lowercased tag name.
    pub tag: String,
    pub namespace: Option<String>,
    /// Attributes in insertion order.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<VNode>,
    /// Children of an open shadow root, empty when the element has none.
    pub shadow_children: Vec<VNode>,
}

/// Snapshot of one node in the recorded tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VNode {
    Element(VElement),
    Text {
        id: u32,
        text: String,
    },
    CData {
        id: u32,
        text: String,
    },
    Comment {
        id: u32,
        text: String,
    },
    ProcessingInstruction {
        id: u32,
        target: String,
        data: String,
    },
    DocumentType {
        id: u32,
        name: String,
        public_id: String,
        system_id: String,
    },
}

/// Adopted stylesheet snapshot: stable sheet id, optional media text,
/// and the serialized CSS with rewritten `url()` references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VStyleSheet {
    pub id: u32,
    pub media: Option<String>,
    pub css_text: String,
}

/// Snapshot of a whole document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VDocument {
    pub id: u32,
    pub adopted_style_sheets: Vec<VStyleSheet>,
    pub children: Vec<VNode>,
}

impl VNode {
    /// The node id this snapshot was taken under.
    #[must_use]
    pub const fn id(&self) -> u32 {
        match self {
            Self::Element(element) => element.id,
            Self::Text { id, .. }
            | Self::CData { id, .. }
            | Self::Comment { id, .. }
            | Self::ProcessingInstruction { id, .. }
            | Self::DocumentType { id, .. } => *id,
        }
    }

    /// Serialize this node, recursing through children. Deep trees yield
    /// at child boundaries via the writer's mid-frame checkpoint.
    pub fn encode<'fut>(
        &'fut self,
        writer: &'fut mut Writer,
    ) -> BoxFuture<'fut, Result<(), ProtocolError>> {
        Box::pin(async move {
            match self {
                Self::Element(element) => {
                    writer.u32(KIND_ELEMENT).await?;
                    writer.u32(element.id).await?;
                    writer.str_utf8(&element.tag).await?;
                    writer.optional_str(element.namespace.as_deref()).await?;
                    writer.seq_len(element.attributes.len()).await?;
                    for (name, value) in &element.attributes {
                        writer.str_utf8(name).await?;
                        writer.str_utf8(value).await?;
                    }
                    writer.seq_len(element.children.len()).await?;
                    for child in &element.children {
                        child.encode(writer).await?;
                        writer.stream_wait().await?;
                    }
                    writer.seq_len(element.shadow_children.len()).await?;
                    for child in &element.shadow_children {
                        child.encode(writer).await?;
                        writer.stream_wait().await?;
                    }
                }
                Self::Text { id, text } => {
                    writer.u32(KIND_TEXT).await?;
                    writer.u32(*id).await?;
                    writer.str_utf8_streaming(text).await?;
                }
                Self::CData { id, text } => {
                    writer.u32(KIND_CDATA).await?;
                    writer.u32(*id).await?;
                    writer.str_utf8_streaming(text).await?;
                }
                Self::Comment { id, text } => {
                    writer.u32(KIND_COMMENT).await?;
                    writer.u32(*id).await?;
                    writer.str_utf8_streaming(text).await?;
                }
                Self::ProcessingInstruction { id, target, data } => {
                    writer.u32(KIND_PROCESSING_INSTRUCTION).await?;
                    writer.u32(*id).await?;
                    writer.str_utf8(target).await?;
                    writer.str_utf8(data).await?;
                }
                Self::DocumentType {
                    id,
                    name,
                    public_id,
                    system_id,
                } => {
                    writer.u32(KIND_DOCUMENT_TYPE).await?;
                    writer.u32(*id).await?;
                    writer.str_utf8(name).await?;
                    writer.str_utf8(public_id).await?;
                    writer.str_utf8(system_id).await?;
                }
            }
            Ok(())
        })
    }

    /// Parse one node from buffered bytes.
    ///
    /// # Errors
    /// Soft `NeedMoreData` while incomplete; fatal on unknown node kinds.
    pub fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ProtocolError> {
        let kind = decoder.u32("node kind")?;
        let id = decoder.u32("node id")?;
        match kind {
            KIND_ELEMENT => {
                let tag = decoder.str_utf8("element tag")?;
                let namespace = decoder.optional_str("element namespace")?;
                let attr_count = decoder.len_u64("attribute count")?;
                let mut attributes = Vec::with_capacity(attr_count.min(64));
                for _ in 0..attr_count {
                    let name = decoder.str_utf8("attribute name")?;
                    let value = decoder.str_utf8("attribute value")?;
                    attributes.push((name, value));
                }
                let children = Self::decode_list(decoder, "child count")?;
                let shadow_children = Self::decode_list(decoder, "shadow child count")?;
                Ok(Self::Element(VElement {
                    id,
                    tag,
                    namespace,
                    attributes,
                    children,
                    shadow_children,
                }))
            }
            KIND_TEXT => Ok(Self::Text {
                id,
                text: decoder.str_utf8("text content")?,
            }),
            KIND_CDATA => Ok(Self::CData {
                id,
                text: decoder.str_utf8("cdata content")?,
            }),
            KIND_COMMENT => Ok(Self::Comment {
                id,
                text: decoder.str_utf8("comment content")?,
            }),
            KIND_PROCESSING_INSTRUCTION => Ok(Self::ProcessingInstruction {
                id,
                target: decoder.str_utf8("pi target")?,
                data: decoder.str_utf8("pi data")?,
            }),
            KIND_DOCUMENT_TYPE => Ok(Self::DocumentType {
                id,
                name: decoder.str_utf8("doctype name")?,
                public_id: decoder.str_utf8("doctype public id")?,
                system_id: decoder.str_utf8("doctype system id")?,
            }),
            value => Err(ProtocolError::UnknownDiscriminant {
                what: "node kind",
                value,
            }),
        }
    }

    fn decode_list(
        decoder: &mut Decoder<'_>,
        what: &'static str,
    ) -> Result<Vec<Self>, ProtocolError> {
        let count = decoder.len_u64(what)?;
        let mut nodes = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            nodes.push(Self::decode(decoder)?);
        }
        Ok(nodes)
    }
}

impl VStyleSheet {
    /// Serialize the sheet snapshot.
    pub async fn encode(&self, writer: &mut Writer) -> Result<(), ProtocolError> {
        writer.u32(self.id).await?;
        writer.optional_str(self.media.as_deref()).await?;
        writer.str_utf8_streaming(&self.css_text).await
    }

    /// Parse a sheet snapshot from buffered bytes.
    ///
    /// # Errors
    /// Soft `NeedMoreData` while incomplete.
    pub fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: decoder.u32("sheet id")?,
            media: decoder.optional_str("sheet media")?,
            css_text: decoder.str_utf8("sheet css")?,
        })
    }
}

impl VDocument {
    /// Serialize the document snapshot.
    pub async fn encode(&self, writer: &mut Writer) -> Result<(), ProtocolError> {
        writer.u32(self.id).await?;
        writer.seq_len(self.adopted_style_sheets.len()).await?;
        for sheet in &self.adopted_style_sheets {
            sheet.encode(writer).await?;
            writer.stream_wait().await?;
        }
        writer.seq_len(self.children.len()).await?;
        for child in &self.children {
            child.encode(writer).await?;
            writer.stream_wait().await?;
        }
        Ok(())
    }

    /// Parse a document snapshot from buffered bytes.
    ///
    /// # Errors
    /// Soft `NeedMoreData` while incomplete.
    pub fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ProtocolError> {
        let id = decoder.u32("document id")?;
        let sheet_count = decoder.len_u64("adopted sheet count")?;
        let mut adopted_style_sheets = Vec::with_capacity(sheet_count.min(64));
        for _ in 0..sheet_count {
            adopted_style_sheets.push(VStyleSheet::decode(decoder)?);
        }
        let child_count = decoder.len_u64("document child count")?;
        let mut children = Vec::with_capacity(child_count.min(64));
        for _ in 0..child_count {
            children.push(VNode::decode(decoder)?);
        }
        Ok(Self {
            id,
            adopted_style_sheets,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kind_tags_are_stable() {
        // The wire numbering is append-only; these values must never move.
        assert_eq!(KIND_ELEMENT, 0);
        assert_eq!(KIND_TEXT, 1);
        assert_eq!(KIND_CDATA, 2);
        assert_eq!(KIND_COMMENT, 3);
        assert_eq!(KIND_PROCESSING_INSTRUCTION, 4);
        assert_eq!(KIND_DOCUMENT_TYPE, 5);
    }

    #[test]
    fn unknown_node_kind_is_fatal() {
        let mut buf = 99u32.to_be_bytes().to_vec();
        buf.extend_from_slice(&1u32.to_be_bytes());
        let mut decoder = Decoder::new(&buf);
        assert!(matches!(
            VNode::decode(&mut decoder),
            Err(ProtocolError::UnknownDiscriminant { what: "node kind", value: 99 })
        ));
    }
}

//! Encode/decode symmetry across the whole frame catalog.

mod common;

use bytes::Bytes;
use common::roundtrip;
use protocol::frame::{CacheEntry, FetchError, Frame, TextOperation};
use protocol::vdom::{VDocument, VElement, VNode, VStyleSheet};

fn sample_document() -> VDocument {
    VDocument {
        id: 1,
        adopted_style_sheets: vec![VStyleSheet {
            id: 1,
            media: Some("screen".to_owned()),
            css_text: "body { background: url(\"asset:1\") }".to_owned(),
        }],
        children: vec![
            VNode::DocumentType {
                id: 2,
                name: "html".to_owned(),
                public_id: String::new(),
                system_id: String::new(),
            },
            VNode::Element(VElement {
                id: 3,
                tag: "html".to_owned(),
                namespace: Some("http://www.w3.org/1999/xhtml".to_owned()),
                attributes: vec![("lang".to_owned(), "en".to_owned())],
                children: vec![
                    VNode::Element(VElement {
                        id: 4,
                        tag: "img".to_owned(),
                        attributes: vec![
                            ("src".to_owned(), "asset:2".to_owned()),
                            ("data-original-src".to_owned(), "https://x.test/a.png".to_owned()),
                        ],
                        ..VElement::default()
                    }),
                    VNode::Text {
                        id: 5,
                        text: "hello".to_owned(),
                    },
                    VNode::Comment {
                        id: 6,
                        text: " note ".to_owned(),
                    },
                ],
                shadow_children: vec![VNode::Element(VElement {
                    id: 7,
                    tag: "slot".to_owned(),
                    ..VElement::default()
                })],
            }),
        ],
    }
}

#[tokio::test]
async fn every_variant_roundtrips() {
    let frames = vec![
        Frame::Timestamp { timestamp: 1_234_567_890 },
        Frame::Keyframe {
            document: sample_document(),
            asset_count: 2,
            viewport_width: 1280,
            viewport_height: 720,
        },
        Frame::ViewportResized { width: 800, height: 600 },
        Frame::ScrollOffsetChanged { scroll_x: 0, scroll_y: 140 },
        Frame::MouseMoved { x: 10, y: 20 },
        Frame::MouseClicked { x: 11, y: 21 },
        Frame::KeyPressed {
            code: "KeyA".to_owned(),
            alt_key: false,
            ctrl_key: true,
            meta_key: false,
            shift_key: true,
        },
        Frame::ElementFocused { node_id: 4 },
        Frame::TextSelectionChanged {
            start_node_id: 5,
            start_offset: 0,
            end_node_id: 5,
            end_offset: 3,
        },
        Frame::DomNodeAdded {
            parent_node_id: 3,
            index: 1,
            node: VNode::Text { id: 9, text: "inserted".to_owned() },
            asset_count: 0,
        },
        Frame::DomNodeRemoved { node_id: 6 },
        Frame::DomAttributeChanged {
            node_id: 3,
            name: "lang".to_owned(),
            value: "de".to_owned(),
        },
        Frame::DomAttributeRemoved { node_id: 3, name: "lang".to_owned() },
        Frame::DomTextChanged {
            node_id: 5,
            operations: vec![
                TextOperation::Remove { index: 0, length: 5 },
                TextOperation::Insert { index: 0, text: "bye".to_owned() },
            ],
        },
        Frame::DomNodeResized { node_id: 4, width: 320, height: 240 },
        Frame::DomNodePropertyChanged {
            node_id: 4,
            name: "value".to_owned(),
            value: "x".to_owned(),
        },
        Frame::Asset {
            asset_id: 2,
            url: "https://x.test/a.png".to_owned(),
            mime: Some("image/png".to_owned()),
            buf: Bytes::from_static(&[1, 2, 3, 4]),
            fetch_error: FetchError::None,
        },
        Frame::AdoptedStyleSheetsChanged { sheet_ids: vec![1, 2], added_count: 1 },
        Frame::NewAdoptedStyleSheet {
            sheet: VStyleSheet {
                id: 2,
                media: None,
                css_text: ".a { color: red }".to_owned(),
            },
            asset_count: 0,
        },
        Frame::ElementScrolled { node_id: 4, scroll_x: 5, scroll_y: 6 },
        Frame::ElementBlurred { node_id: 4 },
        Frame::WindowFocused,
        Frame::WindowBlurred,
        Frame::StyleSheetRuleInserted {
            sheet_id: 1,
            rule_index: 0,
            content: ".b { color: blue }".to_owned(),
        },
        Frame::StyleSheetRuleDeleted { sheet_id: 1, rule_index: 0 },
        Frame::StyleSheetReplaced { sheet_id: 1, content: "* { margin: 0 }".to_owned() },
        Frame::CanvasChanged {
            node_id: 8,
            mime: "image/png".to_owned(),
            data: Bytes::from_static(&[9, 9, 9]),
        },
        Frame::DomNodePropertyTextChanged {
            node_id: 8,
            name: "value".to_owned(),
            operations: vec![TextOperation::Insert { index: 0, text: "v".to_owned() }],
        },
        Frame::RecordingMetadata {
            initial_url: "https://x.test/".to_owned(),
            heartbeat_interval_secs: 30,
        },
        Frame::Heartbeat,
        Frame::AssetReference {
            asset_id: 2,
            url: "https://x.test/a.png".to_owned(),
            hash: "deadbeef".to_owned(),
            mime: Some("image/png".to_owned()),
        },
        Frame::CacheManifest {
            origin: "https://x.test".to_owned(),
            entries: vec![CacheEntry {
                url: "https://x.test/a.png".to_owned(),
                hash: "deadbeef".to_owned(),
            }],
        },
        Frame::PlaybackConfig { speed_percent: 100, start_paused: false },
    ];

    let decoded = roundtrip(frames.clone()).await;
    assert_eq!(decoded, frames);
}

#[tokio::test]
async fn boundary_payloads_roundtrip() {
    let frames = vec![
        Frame::ViewportResized { width: 0, height: 0 },
        Frame::KeyPressed {
            code: String::new(),
            alt_key: false,
            ctrl_key: false,
            meta_key: false,
            shift_key: false,
        },
        Frame::Asset {
            asset_id: 1,
            url: String::new(),
            mime: None,
            buf: Bytes::new(),
            fetch_error: FetchError::Unknown { message: String::new() },
        },
        Frame::DomTextChanged { node_id: 1, operations: Vec::new() },
        Frame::Keyframe {
            document: VDocument::default(),
            asset_count: 0,
            viewport_width: 0,
            viewport_height: 0,
        },
        Frame::AdoptedStyleSheetsChanged { sheet_ids: Vec::new(), added_count: 0 },
        Frame::CacheManifest { origin: String::new(), entries: Vec::new() },
    ];
    let decoded = roundtrip(frames.clone()).await;
    assert_eq!(decoded, frames);
}

#[tokio::test]
async fn fetch_error_variants_roundtrip() {
    let frames: Vec<Frame> = [
        FetchError::None,
        FetchError::Cors,
        FetchError::Network,
        FetchError::Http,
        FetchError::Unknown { message: "boom".to_owned() },
    ]
    .into_iter()
    .map(|fetch_error| Frame::Asset {
        asset_id: 7,
        url: "https://x.test/y".to_owned(),
        mime: None,
        buf: Bytes::new(),
        fetch_error,
    })
    .collect();
    let decoded = roundtrip(frames.clone()).await;
    assert_eq!(decoded, frames);
}

#[tokio::test]
async fn large_text_payload_roundtrips() {
    let long = "x".repeat(300_000);
    let frames = vec![Frame::DomNodeAdded {
        parent_node_id: 1,
        index: 0,
        node: VNode::Text { id: 2, text: long },
        asset_count: 0,
    }];
    let decoded = roundtrip(frames.clone()).await;
    assert_eq!(decoded, frames);
}

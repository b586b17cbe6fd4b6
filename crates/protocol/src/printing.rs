//! Deterministic JSON rendering of virtual-DOM snapshots.
//!
//! Used by tests and debugging tools to compare decoded documents
//! without caring about wire details.

use serde_json::{Map, Value, json};

use crate::vdom::{VDocument, VNode};

/// Convert a snapshot node to a JSON value.
#[must_use]
pub fn node_to_json(node: &VNode) -> Value {
    match node {
        VNode::Element(element) => {
            // Attributes sort by name for determinism; wire order is
            // insertion order, but JSON output is for comparisons.
            let mut pairs: Vec<(String, String)> = element.attributes.clone();
            pairs.sort_by(|left, right| left.0.cmp(&right.0));
            let mut attrs = Map::new();
            for (name, value) in pairs {
                attrs.insert(name, Value::String(value));
            }
            let children: Vec<Value> = element.children.iter().map(node_to_json).collect();
            let mut object = json!({
                "type": "element",
                "id": element.id,
                "tag": element.tag,
                "attrs": Value::Object(attrs),
                "children": children,
            });
            if let Some(namespace) = &element.namespace
                && let Some(map) = object.as_object_mut()
            {
                map.insert("namespace".to_owned(), Value::String(namespace.clone()));
            }
            if !element.shadow_children.is_empty()
                && let Some(map) = object.as_object_mut()
            {
                let shadow: Vec<Value> =
                    element.shadow_children.iter().map(node_to_json).collect();
                map.insert("shadow".to_owned(), Value::Array(shadow));
            }
            object
        }
        VNode::Text { id, text } => json!({ "type": "text", "id": id, "text": text }),
        VNode::CData { id, text } => json!({ "type": "cdata", "id": id, "text": text }),
        VNode::Comment { id, text } => json!({ "type": "comment", "id": id, "text": text }),
        VNode::ProcessingInstruction { id, target, data } => {
            json!({ "type": "pi", "id": id, "target": target, "data": data })
        }
        VNode::DocumentType {
            id,
            name,
            public_id,
            system_id,
        } => json!({
            "type": "doctype",
            "id": id,
            "name": name,
            "publicId": public_id,
            "systemId": system_id,
        }),
    }
}

/// Convert a document snapshot to a JSON value.
#[must_use]
pub fn document_to_json(document: &VDocument) -> Value {
    let sheets: Vec<Value> = document
        .adopted_style_sheets
        .iter()
        .map(|sheet| {
            json!({
                "id": sheet.id,
                "media": sheet.media,
                "cssText": sheet.css_text,
            })
        })
        .collect();
    json!({
        "type": "document",
        "id": document.id,
        "adoptedStyleSheets": sheets,
        "children": document.children.iter().map(node_to_json).collect::<Vec<_>>(),
    })
}

/// Pretty JSON string for snapshots and test comparisons.
#[must_use]
pub fn document_to_json_string(document: &VDocument) -> String {
    serde_json::to_string_pretty(&document_to_json(document))
        .unwrap_or_else(|_| String::from("{}"))
}

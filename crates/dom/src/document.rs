//! The live document tree the recorder observes.
//!
//! Nodes live in an `indextree` arena. Shadow roots are arena trees of
//! their own, linked from their host element rather than parented under
//! it, so ordinary child traversal never crosses a shadow boundary.
//! Every mutating method appends a [`MutationRecord`] to each registered
//! observer channel; observers read current tree state when they drain
//! their channel, exactly like a browser `MutationObserver` batch.

use anyhow::{Error, anyhow, bail};
use indextree::{Arena, NodeId};
use log::debug;
use smallvec::SmallVec;
use std::collections::HashMap;
use tokio::sync::mpsc;
use url::Url;

use crate::mutation::{AdoptTarget, MutationRecord, SheetRuleOp};
use crate::sheet::{SheetKey, StyleSheet};

/// Shadow root visibility mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowMode {
    Open,
    Closed,
}

#[derive(Debug, Clone, Default)]
pub enum NodeKind {
    #[default]
    Document,
    DocumentType {
        name: String,
        public_id: String,
        system_id: String,
    },
    Element {
        tag: String,
        namespace: Option<String>,
    },
    Text {
        text: String,
    },
    CData {
        text: String,
    },
    Comment {
        text: String,
    },
    ProcessingInstruction {
        target: String,
        data: String,
    },
    /// Root of a shadow tree. Never appears in light-tree traversal.
    ShadowRoot {
        mode: ShadowMode,
    },
}

#[derive(Debug, Clone, Default)]
pub struct DomNode {
    pub kind: NodeKind,
    /// Attributes in insertion order.
    pub attrs: SmallVec<(String, String), 4>,
    /// Stylesheet owned by this `<style>` or `<link>` element.
    pub sheet: Option<SheetKey>,
    /// Shadow root hosted by this element.
    pub shadow: Option<NodeId>,
}

pub struct Document {
    arena: Arena<DomNode>,
    root: NodeId,
    base_url: Url,
    viewport: (u32, u32),
    sheets: Vec<StyleSheet>,
    adopted: Vec<SheetKey>,
    shadow_adopted: HashMap<NodeId, Vec<SheetKey>>,
    observers: Vec<mpsc::UnboundedSender<MutationRecord>>,
}

impl Document {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(DomNode::default());
        Self {
            arena,
            root,
            base_url,
            viewport: (1280, 720),
            sheets: Vec::new(),
            adopted: Vec::new(),
            shadow_adopted: HashMap::new(),
            observers: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[inline]
    #[must_use]
    pub const fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    /// Register an observer. Dropping the receiver disconnects it.
    pub fn observe(&mut self) -> mpsc::UnboundedReceiver<MutationRecord> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.observers.push(sender);
        receiver
    }

    fn emit(&mut self, record: MutationRecord) {
        self.observers
            .retain(|observer| observer.send(record.clone()).is_ok());
    }

    // ---- node accessors ----

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&DomNode> {
        self.arena.get(id).map(indextree::Node::get)
    }

    #[must_use]
    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.node(id).map(|node| &node.kind)
    }

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id).and_then(indextree::Node::parent)
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.children(&self.arena)
    }

    #[must_use]
    pub fn child_index(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        parent.children(&self.arena).position(|node| node == child)
    }

    /// Whether `id` is attached under the document root.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        id == self.root || id.ancestors(&self.arena).any(|ancestor| ancestor == self.root)
    }

    /// Tag name of an element node, `None` otherwise.
    #[must_use]
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.kind(id)? {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)?
            .attrs
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }

    /// Character data of a text-like node.
    #[must_use]
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id)? {
            NodeKind::Text { text } | NodeKind::CData { text } | NodeKind::Comment { text } => {
                Some(text)
            }
            NodeKind::ProcessingInstruction { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Concatenated text content of a subtree, light children only.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in id.descendants(&self.arena) {
            if let Some(NodeKind::Text { text } | NodeKind::CData { text }) = self.kind(node) {
                out.push_str(text);
            }
        }
        out
    }

    /// Depth-first walk of a subtree, descending into open shadow roots
    /// after the host's light children. Closed shadow trees stay out.
    #[must_use]
    pub fn depth_first(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk(root, &mut out);
        out
    }

    fn walk(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        for child in id.children(&self.arena).collect::<Vec<_>>() {
            self.walk(child, out);
        }
        if let Some(shadow) = self.open_shadow_root(id) {
            self.walk(shadow, out);
        }
    }

    /// The shadow root of an element, only if its mode is open.
    #[must_use]
    pub fn open_shadow_root(&self, id: NodeId) -> Option<NodeId> {
        let shadow = self.node(id)?.shadow?;
        match self.kind(shadow)? {
            NodeKind::ShadowRoot {
                mode: ShadowMode::Open,
            } => Some(shadow),
            _ => None,
        }
    }

    // ---- node construction (detached, unobserved) ----

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.create_element_ns(tag, None)
    }

    pub fn create_element_ns(&mut self, tag: &str, namespace: Option<&str>) -> NodeId {
        self.arena.new_node(DomNode {
            kind: NodeKind::Element {
                tag: tag.to_ascii_lowercase(),
                namespace: namespace.map(str::to_owned),
            },
            ..DomNode::default()
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.arena.new_node(DomNode {
            kind: NodeKind::Text {
                text: text.to_owned(),
            },
            ..DomNode::default()
        })
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.arena.new_node(DomNode {
            kind: NodeKind::Comment {
                text: text.to_owned(),
            },
            ..DomNode::default()
        })
    }

    pub fn create_cdata(&mut self, text: &str) -> NodeId {
        self.arena.new_node(DomNode {
            kind: NodeKind::CData {
                text: text.to_owned(),
            },
            ..DomNode::default()
        })
    }

    pub fn create_processing_instruction(&mut self, target: &str, data: &str) -> NodeId {
        self.arena.new_node(DomNode {
            kind: NodeKind::ProcessingInstruction {
                target: target.to_owned(),
                data: data.to_owned(),
            },
            ..DomNode::default()
        })
    }

    pub fn create_doctype(&mut self, name: &str, public_id: &str, system_id: &str) -> NodeId {
        self.arena.new_node(DomNode {
            kind: NodeKind::DocumentType {
                name: name.to_owned(),
                public_id: public_id.to_owned(),
                system_id: system_id.to_owned(),
            },
            ..DomNode::default()
        })
    }

    /// Host a shadow root on an element. Not observable, matching
    /// `attachShadow`.
    ///
    /// # Errors
    /// Returns an error if the element already hosts a shadow root.
    pub fn attach_shadow(&mut self, host: NodeId, mode: ShadowMode) -> Result<NodeId, Error> {
        if self.node(host).is_none_or(|node| node.shadow.is_some()) {
            bail!("element already hosts a shadow root");
        }
        let shadow = self.arena.new_node(DomNode {
            kind: NodeKind::ShadowRoot { mode },
            ..DomNode::default()
        });
        if let Some(node) = self.arena.get_mut(host) {
            node.get_mut().shadow = Some(shadow);
        }
        Ok(shadow)
    }

    // ---- tree mutation (observed) ----

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        parent.append(child, &mut self.arena);
        self.emit(MutationRecord::ChildList { target: parent });
    }

    /// Insert `child` among `parent`'s children at `index`, clamping to
    /// the end.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        let count = parent.children(&self.arena).count();
        if index >= count {
            parent.append(child, &mut self.arena);
        } else if let Some(sibling) = parent.children(&self.arena).nth(index) {
            sibling.insert_before(child, &mut self.arena);
        } else {
            parent.append(child, &mut self.arena);
        }
        self.emit(MutationRecord::ChildList { target: parent });
    }

    /// Detach a node from its parent. The subtree stays intact and may
    /// be re-inserted.
    pub fn remove_node(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            debug!("remove of a node with no parent");
            return;
        };
        id.detach(&mut self.arena);
        self.emit(MutationRecord::ChildList { target: parent });
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(node) = self.arena.get_mut(id) {
            let attrs = &mut node.get_mut().attrs;
            if let Some((_, slot)) = attrs.iter_mut().find(|(attr, _)| attr == name) {
                value.clone_into(slot);
            } else {
                attrs.push((name.to_owned(), value.to_owned()));
            }
            self.emit(MutationRecord::Attribute {
                target: id,
                name: name.to_owned(),
            });
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        if let Some(node) = self.arena.get_mut(id) {
            let attrs = &mut node.get_mut().attrs;
            if let Some(position) = attrs.iter().position(|(attr, _)| attr == name) {
                attrs.remove(position);
                self.emit(MutationRecord::Attribute {
                    target: id,
                    name: name.to_owned(),
                });
            }
        }
    }

    /// Replace the character data of a text-like node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let Some(node) = self.arena.get_mut(id) {
            match &mut node.get_mut().kind {
                NodeKind::Text { text: slot }
                | NodeKind::CData { text: slot }
                | NodeKind::Comment { text: slot } => {
                    text.clone_into(slot);
                }
                NodeKind::ProcessingInstruction { data, .. } => {
                    text.clone_into(data);
                }
                _ => return,
            }
            self.emit(MutationRecord::CharacterData { target: id });
        }
    }

    // ---- stylesheets ----

    /// Create a sheet object. Construction alone is not observable.
    pub fn create_sheet(&mut self, media: Option<&str>, rules: Vec<String>) -> SheetKey {
        let key = SheetKey(self.sheets.len() as u32);
        self.sheets
            .push(StyleSheet::new(media.map(str::to_owned), rules));
        key
    }

    #[must_use]
    pub fn sheet(&self, key: SheetKey) -> Option<&StyleSheet> {
        self.sheets.get(key.0 as usize)
    }

    /// Associate a sheet with its owning `<style>` or `<link>` element,
    /// as happens when a style element is parsed or a link finishes
    /// loading. Observers re-check the document sheet list on the
    /// resulting record.
    pub fn set_element_sheet(&mut self, element: NodeId, key: SheetKey) {
        if let Some(sheet) = self.sheets.get_mut(key.0 as usize) {
            sheet.owner = Some(element);
        }
        if let Some(node) = self.arena.get_mut(element) {
            node.get_mut().sheet = Some(key);
        }
        self.emit(MutationRecord::ChildList { target: element });
    }

    /// The ordered `document.styleSheets` list: sheets of attached
    /// `<style>` and `<link>` elements in document order.
    #[must_use]
    pub fn style_sheets(&self) -> Vec<SheetKey> {
        self.root
            .descendants(&self.arena)
            .filter_map(|id| self.node(id).and_then(|node| node.sheet))
            .collect()
    }

    #[must_use]
    pub fn adopted_sheets(&self, target: AdoptTarget) -> &[SheetKey] {
        match target {
            AdoptTarget::Document => &self.adopted,
            AdoptTarget::ShadowRoot(shadow) => self
                .shadow_adopted
                .get(&shadow)
                .map_or(&[], Vec::as_slice),
        }
    }

    /// Replace an adopted-stylesheet list, as assigning
    /// `adoptedStyleSheets` does.
    pub fn set_adopted_sheets(&mut self, target: AdoptTarget, keys: Vec<SheetKey>) {
        match target {
            AdoptTarget::Document => self.adopted = keys,
            AdoptTarget::ShadowRoot(shadow) => {
                self.shadow_adopted.insert(shadow, keys);
            }
        }
        self.emit(MutationRecord::AdoptedSheets { target });
    }

    /// Insert a rule at `index`, like `CSSStyleSheet.insertRule`.
    ///
    /// # Errors
    /// Returns an error if the key is stale or the index is out of
    /// bounds.
    pub fn sheet_insert_rule(
        &mut self,
        key: SheetKey,
        index: u32,
        rule: &str,
    ) -> Result<(), Error> {
        let sheet = self
            .sheets
            .get_mut(key.0 as usize)
            .ok_or_else(|| anyhow!("unknown sheet key {key:?}"))?;
        let rules = sheet.rules_mut();
        if index as usize > rules.len() {
            bail!("rule index {index} out of bounds ({})", rules.len());
        }
        rules.insert(index as usize, rule.to_owned());
        self.emit(MutationRecord::SheetRule {
            sheet: key,
            op: SheetRuleOp::Insert {
                index,
                rule: rule.to_owned(),
            },
        });
        Ok(())
    }

    /// Delete the rule at `index`, like `CSSStyleSheet.deleteRule`.
    ///
    /// # Errors
    /// Returns an error if the key is stale or the index is out of
    /// bounds.
    pub fn sheet_delete_rule(&mut self, key: SheetKey, index: u32) -> Result<(), Error> {
        let sheet = self
            .sheets
            .get_mut(key.0 as usize)
            .ok_or_else(|| anyhow!("unknown sheet key {key:?}"))?;
        let rules = sheet.rules_mut();
        if index as usize >= rules.len() {
            bail!("rule index {index} out of bounds ({})", rules.len());
        }
        rules.remove(index as usize);
        self.emit(MutationRecord::SheetRule {
            sheet: key,
            op: SheetRuleOp::Delete { index },
        });
        Ok(())
    }

    /// Replace the whole rule list, like `CSSStyleSheet.replace`.
    ///
    /// # Errors
    /// Returns an error if the key is stale.
    pub fn sheet_replace(&mut self, key: SheetKey, css_text: &str) -> Result<(), Error> {
        let sheet = self
            .sheets
            .get_mut(key.0 as usize)
            .ok_or_else(|| anyhow!("unknown sheet key {key:?}"))?;
        *sheet.rules_mut() = css_text
            .split_inclusive('}')
            .map(str::trim)
            .filter(|rule| !rule.is_empty())
            .map(str::to_owned)
            .collect();
        self.emit(MutationRecord::SheetRule {
            sheet: key,
            op: SheetRuleOp::Replace {
                css_text: css_text.to_owned(),
            },
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new(Url::parse("https://example.test/page").unwrap())
    }

    #[test]
    fn tree_mutations_emit_records() {
        let mut document = doc();
        let mut records = document.observe();

        let body = document.create_element("body");
        document.append_child(document.root(), body);
        document.set_attribute(body, "class", "main");
        let text = document.create_text("hi");
        document.append_child(body, text);
        document.set_text(text, "bye");
        document.remove_node(text);

        let mut kinds = Vec::new();
        while let Ok(record) = records.try_recv() {
            kinds.push(record);
        }
        assert_eq!(kinds.len(), 5);
        assert!(matches!(kinds[0], MutationRecord::ChildList { target } if target == document.root()));
        assert!(matches!(&kinds[1], MutationRecord::Attribute { name, .. } if name == "class"));
        assert!(matches!(kinds[4], MutationRecord::ChildList { target } if target == body));
    }

    #[test]
    fn insert_child_clamps_index() {
        let mut document = doc();
        let parent = document.create_element("div");
        document.append_child(document.root(), parent);
        let first = document.create_element("a");
        let second = document.create_element("b");
        document.insert_child(parent, 0, first);
        document.insert_child(parent, 99, second);
        let children: Vec<_> = document.children(parent).collect();
        assert_eq!(children, vec![first, second]);
    }

    #[test]
    fn open_shadow_roots_join_depth_first_walk() {
        let mut document = doc();
        let host = document.create_element("x-host");
        document.append_child(document.root(), host);
        let shadow = document.attach_shadow(host, ShadowMode::Open).unwrap();
        let inner = document.create_element("span");
        document.append_child(shadow, inner);

        let walk = document.depth_first(document.root());
        assert!(walk.contains(&shadow));
        assert!(walk.contains(&inner));
        // But light-tree children never include the shadow root.
        assert!(document.children(host).next().is_none());
    }

    #[test]
    fn closed_shadow_roots_stay_invisible() {
        let mut document = doc();
        let host = document.create_element("x-host");
        document.append_child(document.root(), host);
        let shadow = document.attach_shadow(host, ShadowMode::Closed).unwrap();
        let inner = document.create_element("span");
        document.append_child(shadow, inner);

        assert!(document.open_shadow_root(host).is_none());
        let walk = document.depth_first(document.root());
        assert!(!walk.contains(&inner));
    }

    #[test]
    fn style_sheet_list_follows_document_order() {
        let mut document = doc();
        let head = document.create_element("head");
        document.append_child(document.root(), head);
        let style_a = document.create_element("style");
        let style_b = document.create_element("style");
        document.append_child(head, style_a);
        document.append_child(head, style_b);
        let sheet_a = document.create_sheet(None, vec!["a{}".to_owned()]);
        let sheet_b = document.create_sheet(None, vec!["b{}".to_owned()]);
        // Attach in reverse to prove order comes from the tree.
        document.set_element_sheet(style_b, sheet_b);
        document.set_element_sheet(style_a, sheet_a);
        assert_eq!(document.style_sheets(), vec![sheet_a, sheet_b]);
    }

    #[test]
    fn sheet_rule_methods_emit_and_bounds_check() {
        let mut document = doc();
        let key = document.create_sheet(None, vec![".a{}".to_owned()]);
        let mut records = document.observe();

        document.sheet_insert_rule(key, 1, ".b{}").unwrap();
        document.sheet_delete_rule(key, 0).unwrap();
        document.sheet_replace(key, ".c{color:red} .d{}").unwrap();
        assert!(document.sheet_insert_rule(key, 9, ".x{}").is_err());
        assert!(document.sheet_delete_rule(key, 9).is_err());

        assert_eq!(document.sheet(key).unwrap().rules().len(), 2);
        let mut count = 0;
        while let Ok(record) = records.try_recv() {
            assert!(matches!(record, MutationRecord::SheetRule { .. }));
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn adopted_sheets_replace_and_record() {
        let mut document = doc();
        let key = document.create_sheet(Some("screen"), Vec::new());
        let mut records = document.observe();
        document.set_adopted_sheets(AdoptTarget::Document, vec![key]);
        assert_eq!(document.adopted_sheets(AdoptTarget::Document), &[key]);
        assert!(matches!(
            records.try_recv().unwrap(),
            MutationRecord::AdoptedSheets { target: AdoptTarget::Document }
        ));
    }
}

//! Mutation-driven DOM diffing against a mirror tree.
//!
//! The detector owns a passive deep clone of the recorded light tree.
//! Mutation records only mark dirty regions; at flush time each dirty
//! root is reconciled against its mirror counterpart by node id, and the
//! resulting operations are applied to the mirror before they are handed
//! out, so the mirror is always consistent for the next batch.

use std::collections::{HashMap, HashSet};

use anyhow::{Error, anyhow};
use dom::{Document, MutationRecord, NodeId, NodeKind};
use indextree::Arena;
use log::debug;
use protocol::TextOperation;

use crate::id_map::IdMap;
use crate::text_diff;

/// Semantic DOM operation derived from a mutation batch. Operations
/// apply in order; an insert carries the live subtree root so the
/// recorder can snapshot it with its freshly assigned ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomOperation {
    Insert {
        parent_id: u32,
        index: u32,
        root: NodeId,
    },
    Remove {
        node_id: u32,
    },
    UpdateAttribute {
        node_id: u32,
        name: String,
        value: String,
    },
    RemoveAttribute {
        node_id: u32,
        name: String,
    },
    UpdateText {
        node_id: u32,
        operations: Vec<TextOperation>,
    },
}

#[derive(Debug, Clone)]
enum MirrorKind {
    Document,
    DocumentType,
    Element {
        tag: String,
        namespace: Option<String>,
        attrs: Vec<(String, String)>,
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
        data: String,
    },
}

#[derive(Debug)]
struct MirrorNode {
    id: u32,
    kind: MirrorKind,
}

/// Maintains the mirror tree and derives minimal operation batches.
pub struct DomChangeDetector {
    mirror: Arena<MirrorNode>,
    by_id: HashMap<u32, NodeId>,
    dirty: Vec<NodeId>,
    dirty_set: HashSet<NodeId>,
}

impl DomChangeDetector {
    /// Clone the live light tree into a fresh mirror. Every node must
    /// already carry an id.
    ///
    /// # Errors
    /// Returns an error if a live node is missing from the id map.
    pub fn new(document: &Document, ids: &IdMap) -> Result<Self, Error> {
        let mut detector = Self {
            mirror: Arena::new(),
            by_id: HashMap::new(),
            dirty: Vec::new(),
            dirty_set: HashSet::new(),
        };
        detector.build_mirror(document, ids, document.root())?;
        Ok(detector)
    }

    /// Whether any dirty region awaits reconciliation.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Accumulate dirty regions from a batch of mutation records.
    ///
    /// Each record target is walked up to the nearest ancestor still
    /// contained in the live root; targets whose whole chain has been
    /// detached are discarded.
    pub fn note_records(&mut self, document: &Document, records: &[MutationRecord]) {
        for record in records {
            let target = match record {
                MutationRecord::ChildList { target }
                | MutationRecord::Attribute { target, .. }
                | MutationRecord::CharacterData { target } => *target,
                MutationRecord::AdoptedSheets { .. } | MutationRecord::SheetRule { .. } => {
                    continue;
                }
            };
            let Some(anchor) = Self::surviving_ancestor(document, target) else {
                debug!("discarding mutation on detached target");
                continue;
            };
            if self.dirty_set.insert(anchor) {
                self.dirty.push(anchor);
            }
        }
    }

    fn surviving_ancestor(document: &Document, target: NodeId) -> Option<NodeId> {
        let mut current = Some(target);
        while let Some(node) = current {
            if document.contains(node) {
                return Some(node);
            }
            current = document.parent(node);
        }
        None
    }

    /// Reconcile every dirty region and return the operation batch. The
    /// mirror is updated as a side effect.
    ///
    /// # Errors
    /// Returns an error on a broken mirror invariant.
    pub fn flush(&mut self, document: &Document, ids: &mut IdMap) -> Result<Vec<DomOperation>, Error> {
        let dirty = std::mem::take(&mut self.dirty);
        self.dirty_set.clear();
        if dirty.is_empty() {
            return Ok(Vec::new());
        }

        // Keep only roots without a dirty strict ancestor; the ancestor
        // reconcile covers them.
        let dirty_lookup: HashSet<NodeId> = dirty.iter().copied().collect();
        let mut roots: Vec<NodeId> = dirty
            .into_iter()
            .filter(|node| {
                let mut parent = document.parent(*node);
                while let Some(ancestor) = parent {
                    if dirty_lookup.contains(&ancestor) {
                        return false;
                    }
                    parent = document.parent(ancestor);
                }
                true
            })
            .collect();

        // Process in document order so ancestors reconcile first.
        let order: HashMap<NodeId, usize> = document
            .depth_first(document.root())
            .into_iter()
            .enumerate()
            .map(|(position, node)| (node, position))
            .collect();
        roots.retain(|node| order.contains_key(node));
        roots.sort_by_key(|node| order[node]);

        let mut operations = Vec::new();
        for root in roots {
            let Some(id) = ids.get(root) else {
                debug!("dirty node has no id yet, covered by an ancestor insert");
                continue;
            };
            let Some(mirror_id) = self.by_id.get(&id).copied() else {
                debug!("dirty node {id} has no mirror counterpart");
                continue;
            };
            let live_kind = document
                .kind(root)
                .ok_or_else(|| anyhow!("invariant violation: dirty node vanished from arena"))?;
            if Self::kind_matches(live_kind, &self.mirror_kind(mirror_id)?) {
                self.reconcile(document, ids, root, mirror_id, &mut operations)?;
            } else if let Some(parent) = document.parent(root) {
                // A node whose type changed in place reads as a
                // remove-plus-insert on its parent.
                let parent_id = ids
                    .get(parent)
                    .ok_or_else(|| anyhow!("invariant violation: parent without id"))?;
                let parent_mirror = self
                    .by_id
                    .get(&parent_id)
                    .copied()
                    .ok_or_else(|| anyhow!("invariant violation: parent without mirror"))?;
                self.reconcile(document, ids, parent, parent_mirror, &mut operations)?;
            }
        }
        Ok(operations)
    }

    // ---- mirror construction ----

    fn build_mirror(
        &mut self,
        document: &Document,
        ids: &IdMap,
        live: NodeId,
    ) -> Result<NodeId, Error> {
        let id = ids
            .get(live)
            .ok_or_else(|| anyhow!("invariant violation: live node without id"))?;
        let kind = Self::mirror_kind_of(document, live)?;
        let mirror_id = self.mirror.new_node(MirrorNode { id, kind });
        self.by_id.insert(id, mirror_id);
        for child in document.children(live).collect::<Vec<_>>() {
            let child_mirror = self.build_mirror(document, ids, child)?;
            mirror_id.append(child_mirror, &mut self.mirror);
        }
        Ok(mirror_id)
    }

    fn mirror_kind_of(document: &Document, live: NodeId) -> Result<MirrorKind, Error> {
        let kind = document
            .kind(live)
            .ok_or_else(|| anyhow!("invariant violation: node vanished from arena"))?;
        Ok(match kind {
            NodeKind::Document => MirrorKind::Document,
            NodeKind::DocumentType { .. } => MirrorKind::DocumentType,
            NodeKind::Element { tag, namespace } => MirrorKind::Element {
                tag: tag.clone(),
                namespace: namespace.clone(),
                attrs: document
                    .node(live)
                    .map(|node| node.attrs.iter().cloned().collect())
                    .unwrap_or_default(),
            },
            NodeKind::Text { text } => MirrorKind::Text { text: text.clone() },
            NodeKind::CData { text } => MirrorKind::CData { text: text.clone() },
            NodeKind::Comment { text } => MirrorKind::Comment { text: text.clone() },
            NodeKind::ProcessingInstruction { data, .. } => MirrorKind::ProcessingInstruction {
                data: data.clone(),
            },
            NodeKind::ShadowRoot { .. } => {
                return Err(anyhow!("invariant violation: shadow root in light tree"));
            }
        })
    }

    fn mirror_kind(&self, mirror_id: NodeId) -> Result<MirrorKind, Error> {
        self.mirror
            .get(mirror_id)
            .map(|node| node.get().kind.clone())
            .ok_or_else(|| anyhow!("invariant violation: stale mirror node"))
    }

    fn mirror_node_id(&self, mirror_id: NodeId) -> u32 {
        self.mirror
            .get(mirror_id)
            .map_or(0, |node| node.get().id)
    }

    fn kind_matches(live: &NodeKind, mirror: &MirrorKind) -> bool {
        match (live, mirror) {
            (NodeKind::Document, MirrorKind::Document)
            | (NodeKind::DocumentType { .. }, MirrorKind::DocumentType)
            | (NodeKind::Text { .. }, MirrorKind::Text { .. })
            | (NodeKind::CData { .. }, MirrorKind::CData { .. })
            | (NodeKind::Comment { .. }, MirrorKind::Comment { .. })
            | (
                NodeKind::ProcessingInstruction { .. },
                MirrorKind::ProcessingInstruction { .. },
            ) => true,
            (NodeKind::Element { .. }, MirrorKind::Element { .. }) => true,
            _ => false,
        }
    }

    fn element_matches(live: &NodeKind, mirror: &MirrorKind) -> bool {
        match (live, mirror) {
            (
                NodeKind::Element { tag, namespace },
                MirrorKind::Element {
                    tag: mirror_tag,
                    namespace: mirror_namespace,
                    ..
                },
            ) => tag == mirror_tag && namespace == mirror_namespace,
            _ => Self::kind_matches(live, mirror),
        }
    }

    // ---- reconciliation ----

    fn reconcile(
        &mut self,
        document: &Document,
        ids: &mut IdMap,
        live: NodeId,
        mirror_id: NodeId,
        operations: &mut Vec<DomOperation>,
    ) -> Result<(), Error> {
        let live_kind = document
            .kind(live)
            .ok_or_else(|| anyhow!("invariant violation: node vanished mid-reconcile"))?
            .clone();
        match live_kind {
            NodeKind::Document => {
                self.reconcile_children(document, ids, live, mirror_id, operations)
            }
            NodeKind::Element { .. } => {
                self.reconcile_attributes(document, live, mirror_id, operations)?;
                self.reconcile_children(document, ids, live, mirror_id, operations)
            }
            NodeKind::Text { text }
            | NodeKind::CData { text }
            | NodeKind::Comment { text } => self.reconcile_text(&text, mirror_id, operations),
            NodeKind::ProcessingInstruction { data, .. } => {
                self.reconcile_text(&data, mirror_id, operations)
            }
            NodeKind::DocumentType { .. } | NodeKind::ShadowRoot { .. } => Ok(()),
        }
    }

    fn reconcile_text(
        &mut self,
        live_text: &str,
        mirror_id: NodeId,
        operations: &mut Vec<DomOperation>,
    ) -> Result<(), Error> {
        let node_id = self.mirror_node_id(mirror_id);
        let Some(node) = self.mirror.get_mut(mirror_id) else {
            return Err(anyhow!("invariant violation: stale mirror node"));
        };
        let slot = match &mut node.get_mut().kind {
            MirrorKind::Text { text }
            | MirrorKind::CData { text }
            | MirrorKind::Comment { text } => text,
            MirrorKind::ProcessingInstruction { data } => data,
            _ => return Ok(()),
        };
        let edits = text_diff::diff(slot, live_text);
        if edits.is_empty() {
            return Ok(());
        }
        live_text.clone_into(slot);
        operations.push(DomOperation::UpdateText {
            node_id,
            operations: edits,
        });
        Ok(())
    }

    fn reconcile_attributes(
        &mut self,
        document: &Document,
        live: NodeId,
        mirror_id: NodeId,
        operations: &mut Vec<DomOperation>,
    ) -> Result<(), Error> {
        let live_attrs: Vec<(String, String)> = document
            .node(live)
            .map(|node| node.attrs.iter().cloned().collect())
            .unwrap_or_default();
        let node_id = self.mirror_node_id(mirror_id);
        let Some(node) = self.mirror.get_mut(mirror_id) else {
            return Err(anyhow!("invariant violation: stale mirror node"));
        };
        let MirrorKind::Element { attrs, .. } = &mut node.get_mut().kind else {
            return Ok(());
        };

        for (name, value) in &live_attrs {
            match attrs.iter_mut().find(|(attr, _)| attr == name) {
                Some((_, slot)) if slot == value => {}
                Some((_, slot)) => {
                    value.clone_into(slot);
                    operations.push(DomOperation::UpdateAttribute {
                        node_id,
                        name: name.clone(),
                        value: value.clone(),
                    });
                }
                None => {
                    attrs.push((name.clone(), value.clone()));
                    operations.push(DomOperation::UpdateAttribute {
                        node_id,
                        name: name.clone(),
                        value: value.clone(),
                    });
                }
            }
        }

        let removed: Vec<String> = attrs
            .iter()
            .map(|(name, _)| name.clone())
            .filter(|name| !live_attrs.iter().any(|(live_name, _)| live_name == name))
            .collect();
        attrs.retain(|(name, _)| !removed.contains(name));
        for name in removed {
            operations.push(DomOperation::RemoveAttribute { node_id, name });
        }
        Ok(())
    }

    fn reconcile_children(
        &mut self,
        document: &Document,
        ids: &mut IdMap,
        live: NodeId,
        mirror_id: NodeId,
        operations: &mut Vec<DomOperation>,
    ) -> Result<(), Error> {
        let parent_id = self.mirror_node_id(mirror_id);
        let live_children: Vec<NodeId> = document.children(live).collect();
        let live_id_set: HashSet<u32> = live_children
            .iter()
            .filter_map(|child| ids.get(*child))
            .collect();

        // First pass: mirror children that no longer appear among the
        // live children are removals.
        let mut remaining: Vec<NodeId> = mirror_id.children(&self.mirror).collect();
        let mut index = 0;
        while index < remaining.len() {
            let child = remaining[index];
            let child_id = self.mirror_node_id(child);
            if live_id_set.contains(&child_id) {
                index += 1;
            } else {
                operations.push(DomOperation::Remove { node_id: child_id });
                self.release_mirror_subtree(ids, child);
                remaining.remove(index);
            }
        }

        // Second pass: a single ordered walk matching ids. Anything out
        // of place reads as a removal plus a fresh insert with new ids.
        let mut cursor = 0;
        for (position, live_child) in live_children.iter().enumerate() {
            let live_id = ids.get(*live_child);
            let at_cursor = remaining
                .get(cursor)
                .map(|mirror_child| self.mirror_node_id(*mirror_child));

            if let Some(id) = live_id
                && at_cursor == Some(id)
            {
                let mirror_child = remaining[cursor];
                let live_kind = document
                    .kind(*live_child)
                    .ok_or_else(|| anyhow!("invariant violation: child vanished"))?;
                if Self::element_matches(live_kind, &self.mirror_kind(mirror_child)?) {
                    self.reconcile(document, ids, *live_child, mirror_child, operations)?;
                    cursor += 1;
                    continue;
                }
                // Same id, different shape: replace in place.
                operations.push(DomOperation::Remove { node_id: id });
                self.release_mirror_subtree(ids, mirror_child);
                remaining.remove(cursor);
            } else if let Some(id) = live_id {
                if let Some(found) = remaining
                    .iter()
                    .skip(cursor)
                    .position(|mirror_child| self.mirror_node_id(*mirror_child) == id)
                    .map(|offset| cursor + offset)
                {
                    // Moved within this parent: replayed as remove plus
                    // insert, with new ids for the whole subtree.
                    operations.push(DomOperation::Remove { node_id: id });
                    self.release_mirror_subtree(ids, remaining[found]);
                    remaining.remove(found);
                } else if let Some(stale_mirror) = self.by_id.get(&id).copied() {
                    // Moved in from another parent; the id still names
                    // the old mirror location.
                    operations.push(DomOperation::Remove { node_id: id });
                    self.release_mirror_subtree(ids, stale_mirror);
                }
            }

            let inserted = self.insert_fresh(
                document,
                ids,
                mirror_id,
                *live_child,
                remaining.get(cursor).copied(),
            )?;
            remaining.insert(cursor, inserted);
            cursor += 1;
            operations.push(DomOperation::Insert {
                parent_id,
                index: position as u32,
                root: *live_child,
            });
        }
        Ok(())
    }

    fn insert_fresh(
        &mut self,
        document: &Document,
        ids: &mut IdMap,
        parent_mirror: NodeId,
        live_child: NodeId,
        before: Option<NodeId>,
    ) -> Result<NodeId, Error> {
        // A subtree moved in from elsewhere may still hold ids that name
        // its old position (including shadow nodes the mirror never
        // sees). Fresh inserts always get fresh ids.
        ids.release_subtree(document, live_child);
        ids.assign_subtree(document, live_child);
        let mirror_child = self.build_mirror(document, ids, live_child)?;
        match before {
            Some(sibling) => sibling.insert_before(mirror_child, &mut self.mirror),
            None => parent_mirror.append(mirror_child, &mut self.mirror),
        }
        Ok(mirror_child)
    }

    fn release_mirror_subtree(&mut self, ids: &mut IdMap, mirror_id: NodeId) {
        let released: Vec<u32> = mirror_id
            .descendants(&self.mirror)
            .filter_map(|node| self.mirror.get(node).map(|entry| entry.get().id))
            .collect();
        for id in released {
            self.by_id.remove(&id);
            ids.release_id(id);
        }
        mirror_id.remove_subtree(&mut self.mirror);
    }
}

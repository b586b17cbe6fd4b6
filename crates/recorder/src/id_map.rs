//! Stable node identity: a bijection between live arena nodes and the
//! monotonic `u32` ids carried on the wire.

use std::collections::HashMap;

use dom::{Document, NodeId};
use log::debug;

/// Bijective map from live nodes to monotonic `u32` ids. Id 0 is
/// reserved for "none"; released ids are never reused.
#[derive(Debug, Default)]
pub struct IdMap {
    counter: u32,
    by_node: HashMap<NodeId, u32>,
    by_id: HashMap<u32, NodeId>,
}

impl IdMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The id of a node, if it has one.
    #[must_use]
    pub fn get(&self, node: NodeId) -> Option<u32> {
        self.by_node.get(&node).copied()
    }

    /// The live node an id refers to, if it is still mapped.
    #[must_use]
    pub fn node_for(&self, id: u32) -> Option<NodeId> {
        self.by_id.get(&id).copied()
    }

    /// Number of nodes currently mapped.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }

    /// Assign an id to a single node. A node that already has one keeps
    /// it; assigning twice is not an error, it is idempotent.
    pub fn assign(&mut self, node: NodeId) -> u32 {
        if let Some(existing) = self.by_node.get(&node) {
            return *existing;
        }
        self.counter += 1;
        self.by_node.insert(node, self.counter);
        self.by_id.insert(self.counter, node);
        self.counter
    }

    /// Assign ids depth-first across a subtree, descending into open
    /// shadow roots.
    pub fn assign_subtree(&mut self, document: &Document, root: NodeId) {
        for node in document.depth_first(root) {
            self.assign(node);
        }
    }

    /// Release the ids of a whole subtree, typically after removal.
    pub fn release_subtree(&mut self, document: &Document, root: NodeId) {
        for node in document.depth_first(root) {
            if let Some(id) = self.by_node.remove(&node) {
                self.by_id.remove(&id);
            }
        }
    }

    /// Release a single id by value. Used when the live node is no
    /// longer reachable and only the id is known.
    pub fn release_id(&mut self, id: u32) {
        if let Some(node) = self.by_id.remove(&id) {
            self.by_node.remove(&node);
        } else {
            debug!("release of unmapped id {id}");
        }
    }
}

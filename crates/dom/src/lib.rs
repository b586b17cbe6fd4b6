//! Recorder-side DOM facade: an owned document tree with browser-shaped
//! observability (mutation records, stylesheet objects, shadow roots).

pub mod document;
pub mod mutation;
pub mod sheet;

pub use document::{Document, DomNode, NodeKind, ShadowMode};
pub use indextree::NodeId;
pub use mutation::{AdoptTarget, MutationRecord, SheetRuleOp};
pub use sheet::{SheetKey, StyleSheet};

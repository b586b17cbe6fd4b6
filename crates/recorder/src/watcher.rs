//! Stylesheet list observation.
//!
//! Tracks the ordered `document.styleSheets` list, the adopted lists of
//! the document and watched shadow roots, and rule-level mutations.
//! Mutation records only trigger a re-check; deltas are computed against
//! the last list seen per target, so coalesced record batches collapse
//! into one event.

use std::collections::HashMap;

use dom::{AdoptTarget, Document, MutationRecord, NodeId, SheetKey, SheetRuleOp};
use log::debug;

/// A stylesheet change derived from one record batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleSheetEvent {
    /// The ordered `document.styleSheets` list changed.
    DocumentSheets {
        now: Vec<SheetKey>,
        added: Vec<SheetKey>,
        removed: Vec<SheetKey>,
        order_changed: bool,
    },
    /// An adopted-stylesheet list was replaced.
    AdoptedSheets {
        target: AdoptTarget,
        now: Vec<SheetKey>,
        added: Vec<SheetKey>,
        removed: Vec<SheetKey>,
    },
    /// A sheet was mutated through its rule methods.
    SheetRule { sheet: SheetKey, op: SheetRuleOp },
}

/// Watches sheet lists across record batches.
pub struct StyleSheetWatcher {
    document_list: Vec<SheetKey>,
    adopted: HashMap<AdoptTarget, Vec<SheetKey>>,
    watched_shadows: Vec<NodeId>,
}

impl StyleSheetWatcher {
    /// Capture the baseline state of the document.
    #[must_use]
    pub fn new(document: &Document) -> Self {
        let mut adopted = HashMap::new();
        adopted.insert(
            AdoptTarget::Document,
            document.adopted_sheets(AdoptTarget::Document).to_vec(),
        );
        Self {
            document_list: document.style_sheets(),
            adopted,
            watched_shadows: Vec::new(),
        }
    }

    /// Also watch a shadow root's adopted list.
    pub fn watch_shadow_root(&mut self, document: &Document, shadow: NodeId) {
        self.watched_shadows.push(shadow);
        self.adopted.insert(
            AdoptTarget::ShadowRoot(shadow),
            document
                .adopted_sheets(AdoptTarget::ShadowRoot(shadow))
                .to_vec(),
        );
    }

    /// Process one record batch against current document state.
    pub fn on_records(
        &mut self,
        document: &Document,
        records: &[MutationRecord],
    ) -> Vec<StyleSheetEvent> {
        let mut events = Vec::new();
        let mut document_check = false;
        let mut adopted_checks: Vec<AdoptTarget> = Vec::new();

        for record in records {
            match record {
                MutationRecord::ChildList { .. }
                | MutationRecord::Attribute { .. }
                | MutationRecord::CharacterData { .. } => document_check = true,
                MutationRecord::AdoptedSheets { target } => {
                    let target = *target;
                    let watched = match target {
                        AdoptTarget::Document => true,
                        AdoptTarget::ShadowRoot(shadow) => {
                            self.watched_shadows.contains(&shadow)
                        }
                    };
                    if !watched {
                        debug!("ignoring adopted-sheet change on unwatched shadow root");
                        continue;
                    }
                    if !adopted_checks.contains(&target) {
                        adopted_checks.push(target);
                    }
                }
                MutationRecord::SheetRule { sheet, op } => {
                    events.push(StyleSheetEvent::SheetRule {
                        sheet: *sheet,
                        op: op.clone(),
                    });
                }
            }
        }

        if document_check
            && let Some(event) = self.check_document_list(document)
        {
            events.push(event);
        }
        for target in adopted_checks {
            if let Some(event) = self.check_adopted(document, target) {
                events.push(event);
            }
        }
        events
    }

    fn check_document_list(&mut self, document: &Document) -> Option<StyleSheetEvent> {
        let now = document.style_sheets();
        if now == self.document_list {
            return None;
        }
        let added: Vec<SheetKey> = now
            .iter()
            .filter(|key| !self.document_list.contains(key))
            .copied()
            .collect();
        let removed: Vec<SheetKey> = self
            .document_list
            .iter()
            .filter(|key| !now.contains(key))
            .copied()
            .collect();
        let order_changed = added.is_empty() && removed.is_empty();
        self.document_list = now.clone();
        Some(StyleSheetEvent::DocumentSheets {
            now,
            added,
            removed,
            order_changed,
        })
    }

    fn check_adopted(
        &mut self,
        document: &Document,
        target: AdoptTarget,
    ) -> Option<StyleSheetEvent> {
        let now = document.adopted_sheets(target).to_vec();
        let before = self.adopted.entry(target).or_default();
        if now == *before {
            return None;
        }
        let added: Vec<SheetKey> = now
            .iter()
            .filter(|key| !before.contains(key))
            .copied()
            .collect();
        let removed: Vec<SheetKey> = before
            .iter()
            .filter(|key| !now.contains(key))
            .copied()
            .collect();
        *before = now.clone();
        Some(StyleSheetEvent::AdoptedSheets {
            target,
            now,
            added,
            removed,
        })
    }
}

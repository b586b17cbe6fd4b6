//! Translation of user input events into protocol frames.

use core::time::Duration;
use std::time::Instant;

use dom::NodeId;
use log::debug;
use protocol::Frame;

use crate::id_map::IdMap;

/// Minimum spacing between emitted mouse-move frames. Moves arriving
/// faster than this are coalesced by dropping the extras.
const MOUSE_MOVE_INTERVAL: Duration = Duration::from_millis(50);

/// A user interaction observed on the recorded page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    MouseMoved { x: u32, y: u32 },
    MouseClicked { x: u32, y: u32 },
    KeyPressed {
        code: String,
        alt: bool,
        ctrl: bool,
        meta: bool,
        shift: bool,
    },
    ViewportResized { width: u32, height: u32 },
    ScrollOffsetChanged { x: u32, y: u32 },
    WindowFocused,
    WindowBlurred,
    ElementScrolled { node: NodeId, x: u32, y: u32 },
    ElementFocused { node: NodeId },
    ElementBlurred { node: NodeId },
    TextSelectionChanged {
        start: NodeId,
        start_offset: u32,
        end: NodeId,
        end_offset: u32,
    },
}

/// Maps input events to frames, resolving nodes through the id map.
/// Events for nodes the map does not know are dropped.
#[derive(Debug, Default)]
pub struct UserInteractionTracker {
    last_mouse_move: Option<Instant>,
}

impl UserInteractionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one event. Returns `None` for dropped events.
    pub fn translate(&mut self, ids: &IdMap, event: InputEvent) -> Option<Frame> {
        match event {
            InputEvent::MouseMoved { x, y } => {
                let now = Instant::now();
                if let Some(last) = self.last_mouse_move
                    && now.duration_since(last) < MOUSE_MOVE_INTERVAL
                {
                    return None;
                }
                self.last_mouse_move = Some(now);
                Some(Frame::MouseMoved { x, y })
            }
            InputEvent::MouseClicked { x, y } => Some(Frame::MouseClicked { x, y }),
            InputEvent::KeyPressed {
                code,
                alt,
                ctrl,
                meta,
                shift,
            } => Some(Frame::KeyPressed {
                code,
                alt_key: alt,
                ctrl_key: ctrl,
                meta_key: meta,
                shift_key: shift,
            }),
            InputEvent::ViewportResized { width, height } => {
                Some(Frame::ViewportResized { width, height })
            }
            InputEvent::ScrollOffsetChanged { x, y } => Some(Frame::ScrollOffsetChanged {
                scroll_x: x,
                scroll_y: y,
            }),
            InputEvent::WindowFocused => Some(Frame::WindowFocused),
            InputEvent::WindowBlurred => Some(Frame::WindowBlurred),
            InputEvent::ElementScrolled { node, x, y } => {
                Some(Frame::ElementScrolled {
                    node_id: self.known(ids, node)?,
                    scroll_x: x,
                    scroll_y: y,
                })
            }
            InputEvent::ElementFocused { node } => Some(Frame::ElementFocused {
                node_id: self.known(ids, node)?,
            }),
            InputEvent::ElementBlurred { node } => Some(Frame::ElementBlurred {
                node_id: self.known(ids, node)?,
            }),
            InputEvent::TextSelectionChanged {
                start,
                start_offset,
                end,
                end_offset,
            } => Some(Frame::TextSelectionChanged {
                start_node_id: self.known(ids, start)?,
                start_offset,
                end_node_id: self.known(ids, end)?,
                end_offset,
            }),
        }
    }

    fn known(&self, ids: &IdMap, node: NodeId) -> Option<u32> {
        let id = ids.get(node);
        if id.is_none() {
            debug!("dropping interaction for untracked node");
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dom::Document;
    use url::Url;

    #[test]
    fn unknown_nodes_are_dropped() {
        let mut document = Document::new(Url::parse("https://example.test/").unwrap());
        let tracked = document.create_element("div");
        let untracked = document.create_element("div");
        let mut ids = IdMap::new();
        let id = ids.assign(tracked);

        let mut tracker = UserInteractionTracker::new();
        let frame = tracker.translate(&ids, InputEvent::ElementFocused { node: tracked });
        assert_eq!(frame, Some(Frame::ElementFocused { node_id: id }));
        assert_eq!(
            tracker.translate(&ids, InputEvent::ElementFocused { node: untracked }),
            None
        );
        assert_eq!(
            tracker.translate(
                &ids,
                InputEvent::TextSelectionChanged {
                    start: tracked,
                    start_offset: 0,
                    end: untracked,
                    end_offset: 1,
                }
            ),
            None
        );
    }

    #[test]
    fn rapid_mouse_moves_coalesce() {
        let ids = IdMap::new();
        let mut tracker = UserInteractionTracker::new();
        let first = tracker.translate(&ids, InputEvent::MouseMoved { x: 1, y: 1 });
        let second = tracker.translate(&ids, InputEvent::MouseMoved { x: 2, y: 2 });
        assert!(first.is_some());
        assert!(second.is_none());
        // Clicks are never coalesced.
        assert!(tracker
            .translate(&ids, InputEvent::MouseClicked { x: 2, y: 2 })
            .is_some());
    }
}

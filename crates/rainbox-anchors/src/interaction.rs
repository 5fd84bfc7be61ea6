//! Pointer hit-testing over painted highlights.
//!
//! Instead of relying on event bubbling, a pointer-up is classified by
//! walking the target's ancestors from the innermost outwards and stopping
//! at the first interactive region: overlay, then indicator, then wrapper.

use crate::dom::{Dom, NodeId};
use crate::geometry::Rect;
use crate::model::AnchorId;
use crate::paint::{self, OVERLAY_ATTR};

pub const DEFAULT_CLICK_THRESHOLD: f32 = 5.0;

/// What a pointer-up means for the anchor engine
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    /// Indicator clicked: open the annotation editor next to the wrapper
    AnnotationRequested { id: AnchorId, rect: Rect },
    /// Highlight clicked: show its contextual popup
    Activated { id: AnchorId, rect: Rect },
    /// Possibly the end of a text selection
    Capture,
    /// Outside the container or on an overlay
    Ignored,
}

/// Remembers where the pointer went down so a release can be told apart
/// from the end of a drag
#[derive(Debug, Clone, PartialEq)]
pub struct PointerTracker {
    threshold: f32,
    down: Option<(f32, f32)>,
}

impl Default for PointerTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CLICK_THRESHOLD)
    }
}

impl PointerTracker {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            down: None,
        }
    }

    pub fn pointer_down(&mut self, x: f32, y: f32) {
        self.down = Some((x, y));
    }

    /// True when the pointer moved less than the threshold on both axes.
    /// A release without a recorded press is not a click.
    pub fn is_click(&self, x: f32, y: f32) -> bool {
        self.down.is_some_and(|(down_x, down_y)| {
            (x - down_x).abs() < self.threshold && (y - down_y).abs() < self.threshold
        })
    }

    pub fn pointer_up(&mut self, dom: &Dom, container: NodeId, target: NodeId, x: f32, y: f32) -> Interaction {
        let click = self.is_click(x, y);
        self.down = None;
        classify(dom, container, target, click)
    }
}

/// Hit-test `target` against the painted highlights in `container`
pub fn classify(dom: &Dom, container: NodeId, target: NodeId, click: bool) -> Interaction {
    if !dom.is_inclusive_ancestor(container, target) {
        // Overlays usually live outside the container
        return Interaction::Ignored;
    }
    for node in dom.inclusive_ancestors(target) {
        if node == container {
            break;
        }
        if dom.has_attr(node, OVERLAY_ATTR) {
            return Interaction::Ignored;
        }
        if let Some(id) = paint::indicator_anchor_id(dom, node) {
            if !click {
                return Interaction::Ignored;
            }
            let rect = dom
                .parent(node)
                .map(|wrapper| dom.bounding_rect(wrapper))
                .unwrap_or_default();
            return Interaction::AnnotationRequested { id, rect };
        }
        if click && let Some(id) = paint::wrapper_anchor_id(dom, node) {
            let rect = paint::wrappers_of(dom, container, &id)
                .into_iter()
                .map(|wrapper| dom.bounding_rect(wrapper))
                .fold(Rect::default(), |acc, rect| acc.union(&rect));
            return Interaction::Activated { id, rect };
        }
    }
    Interaction::Capture
}

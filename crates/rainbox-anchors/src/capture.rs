use chrono::Utc;
use log::debug;

use crate::address;
use crate::dom::{Dom, NodeId, Range};
use crate::geometry::Rect;
use crate::model::{Anchor, AnchorId, DocumentId};
use crate::paint;

/// A pending anchor made from the user's selection, plus where to show the
/// confirmation popup
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub anchor: Anchor,
    pub rect: Rect,
}

/// Turn the document selection into a pending anchor.
///
/// Returns `None` when there is nothing to capture: no selection, a
/// collapsed or whitespace-only one, one reaching outside `container`, or
/// one that just re-selects an existing highlight (that is an activation,
/// not a new anchor).
///
/// The address is taken against the unpainted text, so existing highlights
/// are stripped first. On success the container is left unpainted and the
/// selection cleared; the caller re-renders with the new anchor included.
/// When `None` is returned the tree is unchanged.
pub fn capture_selection(
    dom: &mut Dom,
    container: NodeId,
    document_id: &DocumentId,
) -> Option<Capture> {
    let selection = dom.selection()?;
    if dom.is_collapsed(&selection) {
        return None;
    }
    let common = dom.range_common_ancestor(&selection)?;
    if !dom.is_inclusive_ancestor(container, common) {
        return None;
    }
    let text = dom.range_text(&selection).trim().to_string();
    if text.is_empty() {
        return None;
    }
    if let Some(existing) = reselected_highlight(dom, container, &selection, &text) {
        debug!("selection matches highlight {existing}, not capturing");
        return None;
    }

    let rect = dom.range_rect(&selection);
    // Strip a copy so a failed capture leaves the painting in place
    let mut unpainted = dom.clone();
    paint::strip_highlights(&mut unpainted, container);
    let selection = unpainted.selection()?;
    let address = match address::serialize(&unpainted, &selection, container) {
        Ok(address) => address,
        Err(err) => {
            debug!("selection cannot be addressed: {err}");
            return None;
        }
    };
    *dom = unpainted;
    dom.clear_selection();

    Some(Capture {
        anchor: Anchor::pending(document_id.clone(), text, address, Utc::now()),
        rect,
    })
}

/// Highlight whose full text equals `text` and which the selection touches
fn reselected_highlight(
    dom: &Dom,
    container: NodeId,
    selection: &Range,
    text: &str,
) -> Option<AnchorId> {
    let mut seen: Vec<AnchorId> = Vec::new();
    for node in dom.descendants(container) {
        let Some(id) = paint::wrapper_anchor_id(dom, node) else {
            continue;
        };
        if seen.contains(&id) {
            continue;
        }
        let wrappers = paint::wrappers_of(dom, container, &id);
        let full_text: String = wrappers
            .iter()
            .map(|&wrapper| own_text(dom, wrapper, &id))
            .collect();
        let touches = wrappers
            .iter()
            .any(|&wrapper| dom.range_intersects_node(selection, wrapper));
        if touches && full_text.trim() == text {
            return Some(id);
        }
        seen.push(id);
    }
    None
}

/// Text of a wrapper piece, leaving out pieces of the same anchor nested
/// inside it so nothing is counted twice
fn own_text(dom: &Dom, wrapper: NodeId, id: &AnchorId) -> String {
    let mut out = String::new();
    for &child in dom.children(wrapper) {
        if let Some(text) = dom.text(child) {
            out.push_str(text);
        } else if paint::wrapper_anchor_id(dom, child).as_ref() != Some(id) {
            out.push_str(&own_text(dom, child, id));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Address, Endpoint};
    use crate::dom::Boundary;
    use crate::model::{AnchorState, Labels};
    use crate::paint::{PaintOptions, resolve_and_render};
    use pretty_assertions::assert_eq;

    fn container(html: &str) -> (Dom, NodeId) {
        let mut dom = Dom::new();
        let root = dom.create_element("div");
        dom.append_child(dom.document(), root);
        dom.set_inner_html(root, html);
        (dom, root)
    }

    fn select(dom: &mut Dom, start: (NodeId, usize), end: (NodeId, usize)) {
        dom.set_selection(Range::new(
            Boundary::new(start.0, start.1),
            Boundary::new(end.0, end.1),
        ));
    }

    fn doc() -> DocumentId {
        DocumentId::new("mail-1")
    }

    #[test]
    fn test_capture_hello_world() {
        let (mut dom, root) = container("<p>Hello world</p>");
        let text = dom.children(dom.children(root)[0])[0];
        select(&mut dom, (text, 6), (text, 11));

        let capture = capture_selection(&mut dom, root, &doc()).unwrap();

        assert_eq!(capture.anchor.text, "world");
        assert_eq!(
            capture.anchor.address,
            Address::new(Endpoint::text(vec![0, 0], 6), Endpoint::text(vec![0, 0], 11))
        );
        assert_eq!(capture.anchor.state, AnchorState::Pending);
        assert_eq!(capture.anchor.document_id, doc());
        assert!(dom.selection().is_none());
    }

    #[test]
    fn test_snapshot_text_is_trimmed() {
        let (mut dom, root) = container("<p>Hello world </p>");
        let text = dom.children(dom.children(root)[0])[0];
        select(&mut dom, (text, 5), (text, 12));

        let capture = capture_selection(&mut dom, root, &doc()).unwrap();

        assert_eq!(capture.anchor.text, "world");
        assert_eq!(capture.anchor.address.start.offset, 5);
    }

    #[test]
    fn test_rejects_empty_collapsed_and_outside_selections() {
        let (mut dom, root) = container("<p>a   b</p>");
        let text = dom.children(dom.children(root)[0])[0];

        assert!(capture_selection(&mut dom, root, &doc()).is_none());

        select(&mut dom, (text, 1), (text, 1));
        assert!(capture_selection(&mut dom, root, &doc()).is_none());

        select(&mut dom, (text, 1), (text, 4));
        assert!(capture_selection(&mut dom, root, &doc()).is_none());

        let outside = dom.create_element("aside");
        dom.append_child(dom.document(), outside);
        dom.set_inner_html(outside, "elsewhere");
        let other = dom.children(outside)[0];
        select(&mut dom, (other, 0), (other, 4));
        assert!(capture_selection(&mut dom, root, &doc()).is_none());
    }

    #[test]
    fn test_address_ignores_painted_highlights() {
        let (mut dom, root) = container("<p>Hello big world</p>");
        let existing = Anchor {
            id: AnchorId::new("a-1"),
            document_id: doc(),
            text: "Hello".to_string(),
            address: Address::new(Endpoint::text(vec![0, 0], 0), Endpoint::text(vec![0, 0], 5)),
            annotation: Some("hi".to_string()),
            labels: Labels::new(),
            created_at: Utc::now(),
            state: AnchorState::Confirmed,
        };
        resolve_and_render(&mut dom, root, &[existing], &PaintOptions::default());
        // <p><mark>Hello<span/></mark> big world</p>
        let tail = dom.children(dom.children(root)[0])[1];
        select(&mut dom, (tail, 5), (tail, 10));

        let capture = capture_selection(&mut dom, root, &doc()).unwrap();

        assert_eq!(capture.anchor.text, "world");
        assert_eq!(
            capture.anchor.address,
            Address::new(Endpoint::text(vec![0, 0], 10), Endpoint::text(vec![0, 0], 15))
        );
    }

    #[test]
    fn test_reselecting_highlight_is_not_a_capture() {
        let (mut dom, root) = container("<p>Hello world</p>");
        let existing = Anchor::pending(
            doc(),
            "world",
            Address::new(Endpoint::text(vec![0, 0], 6), Endpoint::text(vec![0, 0], 11)),
            Utc::now(),
        );
        resolve_and_render(&mut dom, root, &[existing], &PaintOptions::default());
        let mark = dom.children(dom.children(root)[0])[1];
        let inner = dom.children(mark)[0];
        select(&mut dom, (inner, 0), (inner, 5));

        assert!(capture_selection(&mut dom, root, &doc()).is_none());
        assert!(dom.selection().is_some());
    }

    #[test]
    fn test_rejected_capture_leaves_painting_in_place() {
        let (mut dom, root) = container("<p>Hello   world</p>");
        let existing = Anchor::pending(
            doc(),
            "world",
            Address::new(Endpoint::text(vec![0, 0], 8), Endpoint::text(vec![0, 0], 13)),
            Utc::now(),
        );
        resolve_and_render(&mut dom, root, &[existing], &PaintOptions::default());
        let painted = dom.inner_html(root);
        let gap = dom.children(dom.children(root)[0])[0];
        select(&mut dom, (gap, 5), (gap, 8));

        assert!(capture_selection(&mut dom, root, &doc()).is_none());

        assert_eq!(dom.inner_html(root), painted);
        assert!(dom.selection().is_some());
    }

    #[test]
    fn test_successful_capture_leaves_container_unpainted() {
        let (mut dom, root) = container("<p>Hello world</p>");
        let existing = Anchor::pending(
            doc(),
            "Hello",
            Address::new(Endpoint::text(vec![0, 0], 0), Endpoint::text(vec![0, 0], 5)),
            Utc::now(),
        );
        resolve_and_render(&mut dom, root, &[existing], &PaintOptions::default());
        let tail = dom.children(dom.children(root)[0])[1];
        select(&mut dom, (tail, 1), (tail, 6));

        let capture = capture_selection(&mut dom, root, &doc()).unwrap();

        assert_eq!(capture.anchor.text, "world");
        assert_eq!(dom.inner_html(root), "<p>Hello world</p>");
        assert!(dom.selection().is_none());
    }
}

//! # Resolution and rendering
//!
//! Turns the stored addresses of a document's anchors back into live ranges
//! and paints each one as wrapper elements around the covered text.
//!
//! All anchors are resolved before anything is painted and the resulting
//! ranges are tracked by the [`Dom`], so the splits and moves made while
//! wrapping one anchor keep every later anchor's range pointing at the same
//! text. Anchors are painted in document order of their start boundary; an
//! equal start is broken by `created_at`, then by id.
//!
//! A range is wrapped one text segment at a time: each covered piece of a
//! text node gets its own wrapper, so painting never splits or clones the
//! email's own elements and [`strip_highlights`] is an exact inverse.

use std::cmp::Ordering;

use log::debug;

use crate::address::{self, AddressError};
use crate::dom::{Boundary, Dom, Element, NodeId, Range, RangeId};
use crate::model::{Anchor, AnchorId};

/// Carries the anchor id on every wrapper piece
pub const ANCHOR_ID_ATTR: &str = "data-anchor-id";
/// `pending` or `confirmed`
pub const ANCHOR_STATE_ATTR: &str = "data-anchor-state";
/// Space separated labels, only present when the anchor has any
pub const ANCHOR_LABELS_ATTR: &str = "data-anchor-labels";
/// Marks an annotation indicator; the value is the anchor id
pub const INDICATOR_ATTR: &str = "data-anchor-indicator";
/// Marks popups and modals layered over the container
pub const OVERLAY_ATTR: &str = "data-anchor-overlay";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaintOptions {
    pub wrapper_tag: String,
    pub wrapper_class: String,
    pub indicator_class: String,
}

impl Default for PaintOptions {
    fn default() -> Self {
        Self {
            wrapper_tag: "mark".to_string(),
            wrapper_class: "rainbox-highlight".to_string(),
            indicator_class: "rainbox-annotation-indicator".to_string(),
        }
    }
}

/// The painted form of one anchor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub anchor_id: AnchorId,
    /// Wrapper pieces in document order
    pub wrappers: Vec<NodeId>,
    /// Present when the anchor has a non-empty annotation
    pub indicator: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveFailure {
    pub id: AnchorId,
    pub reason: AddressError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub painted: Vec<Highlight>,
    pub failed: Vec<ResolveFailure>,
    /// Anchors painted over text that no longer matches their snapshot
    pub drifted: Vec<AnchorId>,
}

impl RenderReport {
    /// Anchors to evict
    pub fn failed_ids(&self) -> Vec<AnchorId> {
        self.failed.iter().map(|failure| failure.id.clone()).collect()
    }

    pub fn highlight(&self, id: &AnchorId) -> Option<&Highlight> {
        self.painted.iter().find(|highlight| &highlight.anchor_id == id)
    }
}

/// Paint every resolvable anchor into `container` and report the rest.
///
/// Highlights left by an earlier pass are stripped first, so calling this
/// twice with the same anchors gives the same markup. Failures are collected,
/// never returned as errors. Clears the document selection.
pub fn resolve_and_render(
    dom: &mut Dom,
    container: NodeId,
    anchors: &[Anchor],
    options: &PaintOptions,
) -> RenderReport {
    strip_highlights(dom, container);

    let mut report = RenderReport::default();
    let mut resolved: Vec<(&Anchor, RangeId)> = Vec::new();
    for anchor in anchors {
        match address::deserialize(dom, &anchor.address, container) {
            Ok(range) => resolved.push((anchor, dom.track_range(range))),
            Err(reason) => {
                debug!("anchor {} does not resolve: {reason}", anchor.id);
                report.failed.push(ResolveFailure {
                    id: anchor.id.clone(),
                    reason,
                });
            }
        }
    }

    resolved.sort_by(|(a, a_range), (b, b_range)| {
        let by_start = match (dom.range(*a_range), dom.range(*b_range)) {
            (Some(x), Some(y)) => dom.compare_boundaries(x.start, y.start),
            _ => Ordering::Equal,
        };
        by_start
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    for (anchor, range_id) in resolved {
        let range = dom.range(range_id);
        dom.untrack_range(range_id);
        let Some(range) = range.filter(|range| !dom.is_collapsed(range)) else {
            debug!("anchor {} collapsed while painting", anchor.id);
            report.failed.push(ResolveFailure {
                id: anchor.id.clone(),
                reason: AddressError::Collapsed,
            });
            continue;
        };

        let live_text = dom.range_text(&range);
        if squash_whitespace(&live_text) != squash_whitespace(&anchor.text) {
            debug!(
                "anchor {} text drifted: stored {:?}, found {:?}",
                anchor.id, anchor.text, live_text
            );
            report.drifted.push(anchor.id.clone());
        }

        let wrappers = wrap_segments(dom, &range, anchor, options);
        let Some(&last) = wrappers.last() else {
            report.failed.push(ResolveFailure {
                id: anchor.id.clone(),
                reason: AddressError::Collapsed,
            });
            continue;
        };
        let indicator = anchor.note().map(|_| {
            let indicator = create_indicator(dom, anchor, options);
            dom.append_child(last, indicator);
            indicator
        });
        report.painted.push(Highlight {
            anchor_id: anchor.id.clone(),
            wrappers,
            indicator,
        });
    }

    dom.clear_selection();
    report
}

/// Remove every indicator and wrapper below `container`, leaving the text
/// exactly as it was before painting. Live ranges (the selection included)
/// keep pointing at the same text. Document markup that merely carries the
/// highlight attributes is left alone.
pub fn strip_highlights(dom: &mut Dom, container: NodeId) {
    let descendants = dom.descendants(container);
    let mut touched = false;
    for &node in &descendants {
        if indicator_anchor_id(dom, node).is_some() && dom.parent(node).is_some() {
            dom.remove(node);
            touched = true;
        }
    }
    for &node in &descendants {
        if wrapper_anchor_id(dom, node).is_some() && dom.parent(node).is_some() {
            dom.unwrap(node);
            touched = true;
        }
    }
    if touched {
        dom.normalize(container);
    }
}

/// Anchor id of the wrapper piece `node`, if it is one
pub fn wrapper_anchor_id(dom: &Dom, node: NodeId) -> Option<AnchorId> {
    if !dom.is_painted(node) {
        return None;
    }
    dom.attr(node, ANCHOR_ID_ATTR).map(AnchorId::new)
}

/// Anchor id carried by the indicator `node`, if it is one
pub fn indicator_anchor_id(dom: &Dom, node: NodeId) -> Option<AnchorId> {
    if !dom.is_painted(node) {
        return None;
    }
    dom.attr(node, INDICATOR_ATTR).map(AnchorId::new)
}

/// Wrapper pieces currently painted for `id`, in document order
pub fn wrappers_of(dom: &Dom, container: NodeId, id: &AnchorId) -> Vec<NodeId> {
    dom.descendants(container)
        .into_iter()
        .filter(|&node| wrapper_anchor_id(dom, node).as_ref() == Some(id))
        .collect()
}

fn wrap_segments(dom: &mut Dom, range: &Range, anchor: &Anchor, options: &PaintOptions) -> Vec<NodeId> {
    let segments: Vec<RangeId> = text_segments(dom, range)
        .into_iter()
        .map(|segment| dom.track_range(segment))
        .collect();

    let mut wrappers = Vec::new();
    for segment in segments {
        let wrapper = create_wrapper(dom, anchor, options);
        if let Some(wrapper) = dom.wrap_range(segment, wrapper) {
            wrappers.push(wrapper);
        }
        dom.untrack_range(segment);
    }
    wrappers
}

/// Non-empty pieces of text nodes covered by `range`, in document order
fn text_segments(dom: &Dom, range: &Range) -> Vec<Range> {
    if range.start.node == range.end.node && dom.is_text(range.start.node) {
        return vec![*range];
    }
    let Some(common) = dom.range_common_ancestor(range) else {
        return Vec::new();
    };
    dom.descendants(common)
        .into_iter()
        .filter(|&node| dom.is_text(node) && dom.range_intersects_node(range, node))
        .filter(|&node| !dom.parent(node).is_some_and(|parent| dom.is_rawtext(parent)))
        .filter_map(|node| {
            let from = if node == range.start.node {
                range.start.offset
            } else {
                0
            };
            let to = if node == range.end.node {
                range.end.offset
            } else {
                dom.node_length(node)
            };
            (to > from).then(|| Range::new(Boundary::new(node, from), Boundary::new(node, to)))
        })
        .collect()
}

fn create_wrapper(dom: &mut Dom, anchor: &Anchor, options: &PaintOptions) -> NodeId {
    let mut element = Element::new(&options.wrapper_tag);
    element.set_attr(ANCHOR_ID_ATTR, anchor.id.as_str());
    element.set_attr(ANCHOR_STATE_ATTR, anchor.state.as_str());
    element.set_attr("class", &options.wrapper_class);
    if !anchor.labels.is_empty() {
        element.set_attr(ANCHOR_LABELS_ATTR, &anchor.labels.to_string());
    }
    let wrapper = dom.create_element_with(element);
    dom.mark_painted(wrapper);
    wrapper
}

fn create_indicator(dom: &mut Dom, anchor: &Anchor, options: &PaintOptions) -> NodeId {
    let mut element = Element::new("span");
    element.set_attr(INDICATOR_ATTR, anchor.id.as_str());
    element.set_attr("class", &options.indicator_class);
    let indicator = dom.create_element_with(element);
    dom.mark_painted(indicator);
    indicator
}

fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

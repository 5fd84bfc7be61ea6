use std::cmp::Ordering;

use super::{Dom, NodeId};
use crate::geometry::Rect;

/// A position inside the tree: a character offset in text/comment nodes,
/// a child offset in every other node
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Boundary {
    pub node: NodeId,
    pub offset: usize,
}

impl Boundary {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: Boundary,
    pub end: Boundary,
}

impl Range {
    pub fn new(start: Boundary, end: Boundary) -> Self {
        Self { start, end }
    }

    pub fn collapsed(at: Boundary) -> Self {
        Self { start: at, end: at }
    }
}

/// Handle to a live range registered with a [`Dom`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RangeId(pub(super) usize);

impl Dom {
    /// Position of boundary `a` relative to boundary `b` in document order
    pub fn compare_boundaries(&self, a: Boundary, b: Boundary) -> Ordering {
        if a.node == b.node {
            return a.offset.cmp(&b.offset);
        }
        if self.tree_order(a.node, b.node) == Ordering::Greater {
            return self.compare_boundaries(b, a).reverse();
        }
        // a.node precedes b.node; it may still contain it
        if self.is_inclusive_ancestor(a.node, b.node)
            && let Some(child) = self.child_toward(a.node, b.node)
            && let Some(index) = self.child_index(child)
            && index < a.offset
        {
            return Ordering::Greater;
        }
        Ordering::Less
    }

    /// Empty ranges, and ranges whose end sits before their start
    pub fn is_collapsed(&self, range: &Range) -> bool {
        self.compare_boundaries(range.start, range.end) != Ordering::Less
    }

    pub fn range_common_ancestor(&self, range: &Range) -> Option<NodeId> {
        self.common_ancestor(range.start.node, range.end.node)
    }

    /// Range covering every child of `node`
    pub fn select_node_contents(&self, node: NodeId) -> Range {
        Range::new(
            Boundary::new(node, 0),
            Boundary::new(node, self.node_length(node)),
        )
    }

    /// True when part of `node` lies inside the range
    pub fn range_intersects_node(&self, range: &Range, node: NodeId) -> bool {
        let Some(parent) = self.parent(node) else {
            return true;
        };
        let Some(index) = self.child_index(node) else {
            return false;
        };
        self.compare_boundaries(Boundary::new(parent, index), range.end) == Ordering::Less
            && self.compare_boundaries(Boundary::new(parent, index + 1), range.start)
                == Ordering::Greater
    }

    /// Concatenated text of every text node the range covers
    pub fn range_text(&self, range: &Range) -> String {
        let mut out = String::new();
        if self.is_collapsed(range) {
            return out;
        }
        if range.start.node == range.end.node
            && let Some(text) = self.text(range.start.node)
        {
            out.extend(
                text.chars()
                    .skip(range.start.offset)
                    .take(range.end.offset.saturating_sub(range.start.offset)),
            );
            return out;
        }
        let Some(common) = self.range_common_ancestor(range) else {
            return out;
        };
        for node in self.descendants(common) {
            let Some(text) = self.text(node) else {
                continue;
            };
            let len = text.chars().count();
            let from = if node == range.start.node {
                range.start.offset
            } else {
                0
            };
            let to = if node == range.end.node {
                range.end.offset
            } else {
                len
            };
            let inside = self.compare_boundaries(Boundary::new(node, from), range.start)
                != Ordering::Less
                && self.compare_boundaries(Boundary::new(node, to), range.end) != Ordering::Greater;
            if inside && to > from {
                out.extend(text.chars().skip(from).take(to - from));
            }
        }
        out
    }

    /// Union of the host-assigned boxes of every leaf node the range touches
    pub fn range_rect(&self, range: &Range) -> Rect {
        let Some(common) = self.range_common_ancestor(range) else {
            return Rect::default();
        };
        let leaves = if self.children(common).is_empty() {
            vec![common]
        } else {
            self.descendants(common)
                .into_iter()
                .filter(|&node| {
                    self.children(node).is_empty() && self.range_intersects_node(range, node)
                })
                .collect()
        };
        leaves
            .into_iter()
            .filter_map(|node| self.rect(node))
            .fold(Rect::default(), |acc, rect| acc.union(&rect))
    }

    /// Wrap the text a tracked range selects inside one text node with the
    /// detached `wrapper`, leaving the range selecting the wrapper's
    /// contents.
    ///
    /// The text node is split in place, so boundaries right after the
    /// wrapped text end up after the wrapper. Collapsed ranges and ranges
    /// spanning more than one node are refused; callers cut those into
    /// per-text-node segments first.
    pub fn wrap_range(&mut self, id: RangeId, wrapper: NodeId) -> Option<NodeId> {
        let range = self.range(id)?;
        if range.start.node != range.end.node
            || !self.is_text(range.start.node)
            || self.is_collapsed(&range)
        {
            return None;
        }
        let node = range.start.node;
        let parent = self.parent(node)?;
        if range.end.offset < self.node_length(node) {
            self.split_text(node, range.end.offset);
        }
        let middle = if range.start.offset > 0 {
            self.split_text(node, range.start.offset)?
        } else {
            node
        };
        let index = self.child_index(middle)?;
        self.wrap_children(parent, index, index + 1, wrapper);
        let contents = self.select_node_contents(wrapper);
        self.set_range(id, contents);
        Some(wrapper)
    }
}

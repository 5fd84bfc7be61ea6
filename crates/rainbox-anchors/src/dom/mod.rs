//! # Document tree
//!
//! A small, arena-backed stand-in for the browser DOM that the anchor engine
//! runs against. Nodes live in a `Vec` and are addressed by [`NodeId`]; a node
//! keeps its id for the lifetime of the [`Dom`], even while detached, so
//! moving a subtree never invalidates handles into it.
//!
//! ## Live ranges
//!
//! Ranges registered with [`Dom::track_range`] are *live*: every mutation
//! below updates their boundary points following the DOM Standard rules for
//! insertion, removal, splitting and character-data replacement. One
//! deliberate difference: moving a node (re-inserting an attached node
//! somewhere else) keeps boundaries located inside the moved subtree attached
//! to it, instead of collapsing them onto the old parent.
//!
//! ## Offsets
//!
//! Character offsets inside text and comment nodes count Unicode scalar
//! values (`char`s), not bytes.

mod parse;
mod range;
mod serialize;

pub use parse::parse_fragment;
pub use range::{Boundary, Range, RangeId};

use std::cmp::Ordering;

use crate::geometry::Rect;

/// Handle to a node inside a [`Dom`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            attrs: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|(key, _)| key == name)
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.attrs.push((name.to_string(), value.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Fragment,
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Clone, Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    rect: Option<Rect>,
    /// Created by the painter rather than parsed from the document
    painted: bool,
}

/// Mutable node tree with live ranges and a single document selection
#[derive(Clone, Debug)]
pub struct Dom {
    nodes: Vec<NodeData>,
    document: NodeId,
    ranges: Vec<Option<Range>>,
    selection: Option<RangeId>,
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom {
    pub fn new() -> Self {
        let mut dom = Self {
            nodes: Vec::new(),
            document: NodeId(0),
            ranges: Vec::new(),
            selection: None,
        };
        dom.document = dom.push_node(NodeKind::Document);
        dom
    }

    /// The document node every attached node descends from
    pub fn document(&self) -> NodeId {
        self.document
    }

    // ============ Node access ============

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.0].kind
    }

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        match &self.nodes[node.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, node: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[node.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Text(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_text(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].kind, NodeKind::Text(_))
    }

    /// Text and comment nodes: boundaries inside them are character offsets
    pub fn is_character_data(&self, node: NodeId) -> bool {
        matches!(
            self.nodes[node.0].kind,
            NodeKind::Text(_) | NodeKind::Comment(_)
        )
    }

    pub fn has_attr(&self, node: NodeId, name: &str) -> bool {
        self.element(node).is_some_and(|element| element.has_attr(name))
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node).and_then(|element| element.attr(name))
    }

    /// Flag `node` as highlight markup made by the painter. Parsed markup is
    /// never flagged, whatever attributes it carries.
    pub fn mark_painted(&mut self, node: NodeId) {
        self.nodes[node.0].painted = true;
    }

    pub fn is_painted(&self, node: NodeId) -> bool {
        self.nodes[node.0].painted
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// Position of `node` among its parent's children
    pub fn child_index(&self, node: NodeId) -> Option<usize> {
        let parent = self.parent(node)?;
        self.children(parent).iter().position(|&child| child == node)
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let index = self.child_index(node)?;
        self.children(parent).get(index + 1).copied()
    }

    /// Character count for text/comment nodes, child count otherwise
    pub fn node_length(&self, node: NodeId) -> usize {
        match &self.nodes[node.0].kind {
            NodeKind::Text(data) | NodeKind::Comment(data) => data.chars().count(),
            _ => self.nodes[node.0].children.len(),
        }
    }

    pub fn text_content(&self, node: NodeId) -> String {
        match &self.nodes[node.0].kind {
            NodeKind::Text(data) | NodeKind::Comment(data) => data.clone(),
            _ => {
                let mut out = String::new();
                for descendant in self.descendants(node) {
                    if let Some(data) = self.text(descendant) {
                        out.push_str(data);
                    }
                }
                out
            }
        }
    }

    /// `node` followed by each of its ancestors up to the tree root
    pub fn inclusive_ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(node), move |&current| self.parent(current))
    }

    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.inclusive_ancestors(node).any(|n| n == ancestor)
    }

    pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        self.inclusive_ancestors(a)
            .find(|&candidate| self.is_inclusive_ancestor(candidate, b))
    }

    /// The child of `ancestor` on the path down to `node`
    pub fn child_toward(&self, ancestor: NodeId, node: NodeId) -> Option<NodeId> {
        self.inclusive_ancestors(node)
            .find(|&n| self.parent(n) == Some(ancestor))
    }

    /// Descendants of `node` in tree order, excluding `node` itself
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// Compare two nodes by tree order (preorder, depth-first)
    pub fn tree_order(&self, a: NodeId, b: NodeId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let chain_a = self.path_from_root(a);
        let chain_b = self.path_from_root(b);
        if chain_a[0] != chain_b[0] {
            // Disconnected trees: any stable answer will do
            return chain_a[0].cmp(&chain_b[0]);
        }
        for (x, y) in chain_a.iter().zip(chain_b.iter()) {
            if x != y {
                let ix = self.child_index(*x).unwrap_or(0);
                let iy = self.child_index(*y).unwrap_or(0);
                return ix.cmp(&iy);
            }
        }
        // One chain is a prefix of the other: the ancestor comes first
        chain_a.len().cmp(&chain_b.len())
    }

    fn path_from_root(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain: Vec<NodeId> = self.inclusive_ancestors(node).collect();
        chain.reverse();
        chain
    }

    // ============ Node creation ============

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
            rect: None,
            painted: false,
        });
        id
    }

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push_node(NodeKind::Element(Element::new(name)))
    }

    pub fn create_element_with(&mut self, element: Element) -> NodeId {
        self.push_node(NodeKind::Element(element))
    }

    pub fn create_text(&mut self, data: &str) -> NodeId {
        self.push_node(NodeKind::Text(data.to_string()))
    }

    pub fn create_comment(&mut self, data: &str) -> NodeId {
        self.push_node(NodeKind::Comment(data.to_string()))
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.push_node(NodeKind::Fragment)
    }

    // ============ Mutation ============

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let index = self.children(parent).len();
        self.insert_child(parent, index, child);
    }

    /// Insert `child` at `index` among `parent`'s children.
    ///
    /// An attached `child` is moved; boundaries inside it travel with it.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        debug_assert!(
            !self.is_inclusive_ancestor(child, parent),
            "cannot insert a node into its own subtree"
        );
        let mut index = index;
        if let Some(old_parent) = self.parent(child) {
            if old_parent == parent
                && let Some(old_index) = self.child_index(child)
                && old_index < index
            {
                index -= 1;
            }
            self.detach_keeping_ranges(child);
        }
        let index = index.min(self.nodes[parent.0].children.len());
        self.nodes[parent.0].children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
        self.adjust_boundaries(|_, boundary| {
            if boundary.node == parent && boundary.offset > index {
                boundary.offset += 1;
            }
        });
    }

    /// Remove `node` from its parent; boundaries inside it collapse onto
    /// the position it occupied.
    pub fn remove(&mut self, node: NodeId) {
        let (Some(parent), Some(index)) = (self.parent(node), self.child_index(node)) else {
            return;
        };
        self.adjust_boundaries(|dom, boundary| {
            if dom.is_inclusive_ancestor(node, boundary.node) {
                *boundary = Boundary {
                    node: parent,
                    offset: index,
                };
            } else if boundary.node == parent && boundary.offset > index {
                boundary.offset -= 1;
            }
        });
        self.unlink(node, parent, index);
    }

    fn detach_keeping_ranges(&mut self, node: NodeId) {
        let (Some(parent), Some(index)) = (self.parent(node), self.child_index(node)) else {
            return;
        };
        self.adjust_boundaries(|_, boundary| {
            if boundary.node == parent && boundary.offset > index {
                boundary.offset -= 1;
            }
        });
        self.unlink(node, parent, index);
    }

    fn unlink(&mut self, node: NodeId, parent: NodeId, index: usize) {
        self.nodes[parent.0].children.remove(index);
        self.nodes[node.0].parent = None;
    }

    /// Replace `node` with its own children
    pub fn unwrap(&mut self, node: NodeId) {
        let (Some(parent), Some(index)) = (self.parent(node), self.child_index(node)) else {
            return;
        };
        let children = std::mem::take(&mut self.nodes[node.0].children);
        let count = children.len();
        for &child in &children {
            self.nodes[child.0].parent = Some(parent);
        }
        let siblings = &mut self.nodes[parent.0].children;
        siblings.remove(index);
        for (offset, child) in children.into_iter().enumerate() {
            siblings.insert(index + offset, child);
        }
        self.nodes[node.0].parent = None;
        self.adjust_boundaries(|_, boundary| {
            if boundary.node == node {
                *boundary = Boundary {
                    node: parent,
                    offset: index + boundary.offset,
                };
            } else if boundary.node == parent && boundary.offset > index {
                boundary.offset = boundary.offset + count - 1;
            }
        });
    }

    /// Move children `from..to` of `parent` into the detached `wrapper`,
    /// which takes their place. Inverse of [`Dom::unwrap`]: boundaries
    /// before or after the moved children stay outside the wrapper.
    pub fn wrap_children(&mut self, parent: NodeId, from: usize, to: usize, wrapper: NodeId) {
        debug_assert!(self.parent(wrapper).is_none(), "wrapper must be detached");
        let to = to.min(self.children(parent).len());
        let from = from.min(to);
        let base = self.children(wrapper).len();
        let moved: Vec<NodeId> = self.nodes[parent.0].children.drain(from..to).collect();
        for &child in &moved {
            self.nodes[child.0].parent = Some(wrapper);
        }
        let count = moved.len();
        self.nodes[wrapper.0].children.extend(moved);
        self.nodes[parent.0].children.insert(from, wrapper);
        self.nodes[wrapper.0].parent = Some(parent);
        self.adjust_boundaries(|_, boundary| {
            if boundary.node != parent {
                return;
            }
            if boundary.offset > from && boundary.offset < to {
                *boundary = Boundary {
                    node: wrapper,
                    offset: base + boundary.offset - from,
                };
            } else if boundary.offset >= to && boundary.offset > from {
                boundary.offset = boundary.offset + 1 - count;
            }
        });
    }

    /// Replace `count` characters at `offset` in a text/comment node
    pub fn replace_data(&mut self, node: NodeId, offset: usize, count: usize, data: &str) {
        let (offset, count) = match &mut self.nodes[node.0].kind {
            NodeKind::Text(text) | NodeKind::Comment(text) => {
                let len = text.chars().count();
                let offset = offset.min(len);
                let count = count.min(len - offset);
                let start = byte_index(text, offset);
                let end = byte_index(text, offset + count);
                text.replace_range(start..end, data);
                (offset, count)
            }
            _ => return,
        };
        let added = data.chars().count();
        self.adjust_boundaries(|_, boundary| {
            if boundary.node != node {
                return;
            }
            if boundary.offset > offset && boundary.offset <= offset + count {
                boundary.offset = offset;
            } else if boundary.offset > offset + count {
                boundary.offset = boundary.offset + added - count;
            }
        });
    }

    /// Split a text node at `offset`, returning the new node holding the tail
    pub fn split_text(&mut self, node: NodeId, offset: usize) -> Option<NodeId> {
        let data = self.text(node)?;
        let len = data.chars().count();
        let offset = offset.min(len);
        let tail: String = data.chars().skip(offset).collect();
        let new_node = self.create_text(&tail);

        let position = self.parent(node).zip(self.child_index(node));
        if let Some((parent, index)) = position {
            self.insert_child(parent, index + 1, new_node);
        }
        self.adjust_boundaries(|_, boundary| {
            if boundary.node == node && boundary.offset > offset {
                *boundary = Boundary {
                    node: new_node,
                    offset: boundary.offset - offset,
                };
            }
        });
        if let Some((parent, index)) = position {
            self.adjust_boundaries(|_, boundary| {
                if boundary.node == parent && boundary.offset == index + 1 {
                    boundary.offset += 1;
                }
            });
        }
        self.replace_data(node, offset, len - offset, "");
        Some(new_node)
    }

    /// Merge adjacent text nodes and drop empty ones below `root`
    pub fn normalize(&mut self, root: NodeId) {
        let mut stack = vec![root];
        while let Some(parent) = stack.pop() {
            let mut index = 0;
            while let Some(&child) = self.children(parent).get(index) {
                let (is_text, is_empty) = match &self.nodes[child.0].kind {
                    NodeKind::Text(data) => (true, data.is_empty()),
                    _ => (false, false),
                };
                if is_empty {
                    self.remove(child);
                    continue;
                }
                if is_text {
                    self.merge_following_text(child);
                } else if !self.children(child).is_empty() {
                    stack.push(child);
                }
                index += 1;
            }
        }
    }

    fn merge_following_text(&mut self, node: NodeId) {
        while let Some(next) = self.next_sibling(node) {
            let Some(next_data) = self.text(next).map(str::to_string) else {
                break;
            };
            let length = self.node_length(node);
            let next_index = self.child_index(next);
            let parent = self.parent(node);
            self.replace_data(node, length, 0, &next_data);
            self.adjust_boundaries(|_, boundary| {
                if boundary.node == next {
                    *boundary = Boundary {
                        node,
                        offset: boundary.offset + length,
                    };
                } else if Some(boundary.node) == parent && Some(boundary.offset) == next_index {
                    *boundary = Boundary {
                        node,
                        offset: length,
                    };
                }
            });
            self.remove(next);
        }
    }

    /// Replace the children of `parent` with nodes parsed from `html`
    pub fn set_inner_html(&mut self, parent: NodeId, html: &str) {
        while let Some(&child) = self.children(parent).last() {
            self.remove(child);
        }
        parse_fragment(self, parent, html);
    }

    // ============ Geometry ============

    /// Layout box assigned by the host, if any
    pub fn rect(&self, node: NodeId) -> Option<Rect> {
        self.nodes[node.0].rect
    }

    pub fn set_rect(&mut self, node: NodeId, rect: Rect) {
        self.nodes[node.0].rect = Some(rect);
    }

    /// Union of the node's own box and every descendant box
    pub fn bounding_rect(&self, node: NodeId) -> Rect {
        std::iter::once(node)
            .chain(self.descendants(node))
            .filter_map(|n| self.rect(n))
            .fold(Rect::default(), |acc, rect| acc.union(&rect))
    }

    // ============ Live ranges & selection ============

    pub fn track_range(&mut self, range: Range) -> RangeId {
        if let Some(slot) = self.ranges.iter().position(Option::is_none) {
            self.ranges[slot] = Some(range);
            return RangeId(slot);
        }
        self.ranges.push(Some(range));
        RangeId(self.ranges.len() - 1)
    }

    pub fn range(&self, id: RangeId) -> Option<Range> {
        self.ranges.get(id.0).copied().flatten()
    }

    pub fn set_range(&mut self, id: RangeId, range: Range) {
        if let Some(slot) = self.ranges.get_mut(id.0) {
            *slot = Some(range);
        }
    }

    pub fn untrack_range(&mut self, id: RangeId) {
        if let Some(slot) = self.ranges.get_mut(id.0) {
            *slot = None;
        }
    }

    pub fn set_selection(&mut self, range: Range) {
        self.clear_selection();
        self.selection = Some(self.track_range(range));
    }

    /// Current selection, kept up to date across mutations
    pub fn selection(&self) -> Option<Range> {
        self.selection.and_then(|id| self.range(id))
    }

    pub(crate) fn selection_id(&self) -> Option<RangeId> {
        self.selection
    }

    pub fn clear_selection(&mut self) {
        if let Some(id) = self.selection.take() {
            self.untrack_range(id);
        }
    }

    fn adjust_boundaries(&mut self, mut adjust: impl FnMut(&Dom, &mut Boundary)) {
        let mut ranges = std::mem::take(&mut self.ranges);
        for range in ranges.iter_mut().flatten() {
            adjust(self, &mut range.start);
            adjust(self, &mut range.end);
        }
        self.ranges = ranges;
    }
}

/// Byte index of the `offset`-th char, clamped to the end of `text`
pub(crate) fn byte_index(text: &str, offset: usize) -> usize {
    text.char_indices()
        .nth(offset)
        .map(|(index, _)| index)
        .unwrap_or(text.len())
}

//! Path addressing: a boundary point expressed as child indices from a
//! container root, so it survives the container being rebuilt from the same
//! HTML in another process.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::dom::{Boundary, Dom, NodeId, Range};

/// Why an address does not describe a usable range in the current container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressError {
    #[error("range is collapsed")]
    Collapsed,
    #[error("range lies outside the container")]
    OutOfContainer,
    #[error("addressed node no longer exists")]
    NodeNotFound,
}

impl AddressError {
    pub fn as_str(self) -> &'static str {
        match self {
            AddressError::Collapsed => "collapsed",
            AddressError::OutOfContainer => "out-of-container",
            AddressError::NodeNotFound => "node-not-found",
        }
    }
}

/// Kind of node an endpoint pointed into when it was captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeHint {
    Text,
    Element,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Child indices from the container down to the node; empty for the
    /// container itself
    pub path: Vec<usize>,
    pub offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeHint>,
}

impl Endpoint {
    pub fn new(path: Vec<usize>, offset: usize) -> Self {
        Self {
            path,
            offset,
            node: None,
        }
    }

    pub fn text(path: Vec<usize>, offset: usize) -> Self {
        Self {
            path,
            offset,
            node: Some(NodeHint::Text),
        }
    }

    pub fn element(path: Vec<usize>, offset: usize) -> Self {
        Self {
            path,
            offset,
            node: Some(NodeHint::Element),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub start: Endpoint,
    pub end: Endpoint,
}

impl Address {
    pub fn new(start: Endpoint, end: Endpoint) -> Self {
        Self { start, end }
    }
}

/// Express `range` relative to `root`.
///
/// Both boundaries must sit inside `root`; anything else is a caller bug and
/// gets logged.
pub fn serialize(dom: &Dom, range: &Range, root: NodeId) -> Result<Address, AddressError> {
    if dom.is_collapsed(range) {
        return Err(AddressError::Collapsed);
    }
    let start = serialize_boundary(dom, range.start, root)?;
    let end = serialize_boundary(dom, range.end, root)?;
    Ok(Address { start, end })
}

fn serialize_boundary(dom: &Dom, boundary: Boundary, root: NodeId) -> Result<Endpoint, AddressError> {
    let mut path = Vec::new();
    let mut node = boundary.node;
    while node != root {
        let (Some(parent), Some(index)) = (dom.parent(node), dom.child_index(node)) else {
            warn!(
                "boundary node {} is not inside container {}",
                boundary.node.index(),
                root.index()
            );
            return Err(AddressError::OutOfContainer);
        };
        path.push(index);
        node = parent;
    }
    path.reverse();

    let hint = if dom.is_text(boundary.node) {
        Some(NodeHint::Text)
    } else if dom.element(boundary.node).is_some() {
        Some(NodeHint::Element)
    } else {
        None
    };
    Ok(Endpoint {
        path,
        offset: boundary.offset,
        node: hint,
    })
}

/// Find the range `address` describes inside `root`.
///
/// Paths are re-validated step by step; offsets past the end of the
/// resolved node are clamped to its length.
pub fn deserialize(dom: &Dom, address: &Address, root: NodeId) -> Result<Range, AddressError> {
    let start = resolve_endpoint(dom, &address.start, root)?;
    let end = resolve_endpoint(dom, &address.end, root)?;
    let range = Range::new(start, end);

    let inside = dom
        .range_common_ancestor(&range)
        .is_some_and(|common| dom.is_inclusive_ancestor(root, common));
    if !inside {
        return Err(AddressError::OutOfContainer);
    }
    if dom.is_collapsed(&range) {
        return Err(AddressError::Collapsed);
    }
    Ok(range)
}

fn resolve_endpoint(dom: &Dom, endpoint: &Endpoint, root: NodeId) -> Result<Boundary, AddressError> {
    let mut node = root;
    for &index in &endpoint.path {
        node = *dom
            .children(node)
            .get(index)
            .ok_or(AddressError::NodeNotFound)?;
    }

    let matches_hint = match endpoint.node {
        None => true,
        Some(NodeHint::Text) => dom.is_text(node),
        Some(NodeHint::Element) => !dom.is_character_data(node),
    };
    if !matches_hint {
        return Err(AddressError::NodeNotFound);
    }

    let offset = endpoint.offset.min(dom.node_length(node));
    Ok(Boundary::new(node, offset))
}

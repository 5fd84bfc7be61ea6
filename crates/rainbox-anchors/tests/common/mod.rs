#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use rainbox_anchors::dom::{Dom, NodeId};
use rainbox_anchors::{Address, Anchor, AnchorId, AnchorState, DocumentId, Endpoint, Labels};

pub fn container(html: &str) -> (Dom, NodeId) {
    let mut dom = Dom::new();
    let root = dom.create_element("div");
    dom.append_child(dom.document(), root);
    dom.set_inner_html(root, html);
    (dom, root)
}

pub fn node_at(dom: &Dom, root: NodeId, path: &[usize]) -> NodeId {
    path.iter()
        .fold(root, |node, &index| dom.children(node)[index])
}

pub fn confirmed(id: &str, text: &str, start: (&[usize], usize), end: (&[usize], usize)) -> Anchor {
    Anchor {
        id: AnchorId::new(id),
        document_id: DocumentId::new("mail-1"),
        text: text.to_string(),
        address: Address::new(
            Endpoint::new(start.0.to_vec(), start.1),
            Endpoint::new(end.0.to_vec(), end.1),
        ),
        annotation: None,
        labels: Labels::new(),
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        state: AnchorState::Confirmed,
    }
}

mod common;

use std::collections::BTreeSet;

use common::{confirmed, container, node_at};
use pretty_assertions::assert_eq;
use rainbox_anchors::dom::{Boundary, Range};
use rainbox_anchors::paint::strip_highlights;
use rainbox_anchors::{
    AddressError, AnchorId, DocumentId, NodeHint, PaintOptions, RenderReport, capture_selection,
    resolve_and_render,
};

#[test]
fn test_capture_then_render_hello_world() {
    let (mut dom, root) = container("<p>Hello world</p>");
    let text = node_at(&dom, root, &[0, 0]);
    dom.set_selection(Range::new(Boundary::new(text, 6), Boundary::new(text, 11)));

    let capture = capture_selection(&mut dom, root, &DocumentId::new("mail-1")).unwrap();
    let json = serde_json::to_value(&capture.anchor.address).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "start": {"path": [0, 0], "offset": 6, "node": "text"},
            "end": {"path": [0, 0], "offset": 11, "node": "text"}
        })
    );

    let report = resolve_and_render(&mut dom, root, &[capture.anchor.clone()], &PaintOptions::default());

    assert!(report.failed.is_empty());
    let wrapper = report.painted[0].wrappers[0];
    assert_eq!(dom.text_content(wrapper), "world");
}

#[test]
fn test_extra_whitespace_rerender_never_throws() {
    let anchor = confirmed("a-1", "world", (&[0, 0], 6), (&[0, 0], 11));
    let (mut dom, root) = container("<p>Hello  world</p>");

    let report = resolve_and_render(&mut dom, root, &[anchor], &PaintOptions::default());

    // Either painted over nearby text or evicted; here the path still holds
    assert!(report.failed.is_empty());
    assert_eq!(report.drifted, vec![AnchorId::new("a-1")]);
    insta::assert_snapshot!(
        dom.inner_html(root),
        @r#"<p>Hello <mark data-anchor-id="a-1" data-anchor-state="confirmed" class="rainbox-highlight"> worl</mark>d</p>"#
    );
}

#[test]
fn test_overlapping_anchors_both_paint() {
    let (mut dom, root) = container("<p>The quick brown fox</p>");
    let first = confirmed("a-1", "quick brown", (&[0, 0], 4), (&[0, 0], 15));
    let second = confirmed("a-2", "brown fox", (&[0, 0], 10), (&[0, 0], 19));

    let report = resolve_and_render(&mut dom, root, &[second, first], &PaintOptions::default());

    assert!(report.failed.is_empty());
    assert!(report.drifted.is_empty());
    insta::assert_snapshot!(
        dom.inner_html(root),
        @r#"<p>The <mark data-anchor-id="a-1" data-anchor-state="confirmed" class="rainbox-highlight">quick <mark data-anchor-id="a-2" data-anchor-state="confirmed" class="rainbox-highlight">brown</mark></mark><mark data-anchor-id="a-2" data-anchor-state="confirmed" class="rainbox-highlight"> fox</mark></p>"#
    );
    let second = report.highlight(&AnchorId::new("a-2")).unwrap();
    let painted: String = second
        .wrappers
        .iter()
        .map(|&wrapper| dom.text_content(wrapper))
        .collect();
    assert_eq!(painted, "brown fox");
}

#[test]
fn test_rendering_is_idempotent() {
    let (mut dom, root) = container("<p>alpha <b>beta</b> gamma</p><p>delta</p>");
    let mut noted = confirmed("a-1", "pha beta", (&[0, 0], 2), (&[0, 1, 0], 4));
    noted.annotation = Some("greek".to_string());
    let anchors = vec![
        noted,
        confirmed("a-2", "gamma delta", (&[0, 2], 1), (&[1, 0], 5)),
        confirmed("a-3", "gone", (&[7], 0), (&[7], 1)),
    ];
    let options = PaintOptions::default();

    let first = resolve_and_render(&mut dom, root, &anchors, &options);
    let first_html = dom.inner_html(root);
    let second = resolve_and_render(&mut dom, root, &anchors, &options);

    assert_eq!(dom.inner_html(root), first_html);
    assert_eq!(second.failed_ids(), first.failed_ids());
    assert_eq!(second.failed_ids(), vec![AnchorId::new("a-3")]);
    assert_eq!(second.painted.len(), first.painted.len());

    strip_highlights(&mut dom, root);
    assert_eq!(
        dom.inner_html(root),
        "<p>alpha <b>beta</b> gamma</p><p>delta</p>"
    );
}

#[test]
fn test_input_order_does_not_change_the_outcome() {
    let html = "<p>alpha <b>beta</b> gamma</p>";
    let mut outer = confirmed("outer", "alpha beta ga", (&[0, 0], 0), (&[0, 2], 3));
    outer.address.start.node = Some(NodeHint::Text);
    outer.address.end.node = Some(NodeHint::Text);
    // painting this first splits the text node the outer anchor starts in
    let inner = confirmed("inner", "pha", (&[0, 0], 2), (&[0, 0], 6));
    let options = PaintOptions::default();

    let (mut forward_dom, forward_root) = container(html);
    let forward = resolve_and_render(
        &mut forward_dom,
        forward_root,
        &[outer.clone(), inner.clone()],
        &options,
    );
    let (mut reverse_dom, reverse_root) = container(html);
    let reverse = resolve_and_render(&mut reverse_dom, reverse_root, &[inner, outer], &options);

    assert!(forward.failed.is_empty());
    assert!(reverse.failed.is_empty());
    let painted = |report: &RenderReport| -> BTreeSet<AnchorId> {
        report.painted.iter().map(|h| h.anchor_id.clone()).collect()
    };
    assert_eq!(painted(&reverse), painted(&forward));
    assert_eq!(
        reverse_dom.inner_html(reverse_root),
        forward_dom.inner_html(forward_root)
    );
}

#[test]
fn test_adding_anchors_between_renders_matches_a_fresh_render() {
    let html = "<p>alpha <b>beta</b> gamma</p>";
    let mut outer = confirmed("outer", "alpha beta ga", (&[0, 0], 0), (&[0, 2], 3));
    outer.address.start.node = Some(NodeHint::Text);
    outer.address.end.node = Some(NodeHint::Text);
    let inner = confirmed("inner", "pha", (&[0, 0], 2), (&[0, 0], 6));
    let options = PaintOptions::default();

    let (mut dom, root) = container(html);
    resolve_and_render(&mut dom, root, std::slice::from_ref(&inner), &options);
    let grown = resolve_and_render(&mut dom, root, &[inner.clone(), outer.clone()], &options);

    let (mut fresh_dom, fresh_root) = container(html);
    resolve_and_render(&mut fresh_dom, fresh_root, &[inner, outer], &options);

    assert!(grown.failed.is_empty());
    assert_eq!(dom.inner_html(root), fresh_dom.inner_html(fresh_root));
}

#[test]
fn test_range_without_text_is_reported_collapsed() {
    let (mut dom, root) = container("<p>abc<!--tracking--></p>");
    let anchors = vec![
        confirmed("a-1", "abc", (&[0, 0], 0), (&[0, 0], 3)),
        confirmed("a-2", "", (&[0], 1), (&[0], 2)),
        confirmed("a-3", "", (&[0, 0], 2), (&[0, 0], 2)),
    ];

    let report = resolve_and_render(&mut dom, root, &anchors, &PaintOptions::default());

    let reasons: Vec<(&str, AddressError)> = report
        .failed
        .iter()
        .map(|failure| (failure.id.as_str(), failure.reason))
        .collect();
    assert_eq!(
        reasons,
        vec![("a-3", AddressError::Collapsed), ("a-2", AddressError::Collapsed)]
    );
    assert_eq!(report.painted.len(), 1);
}

#[test]
fn test_selection_of_existing_highlight_is_not_captured() {
    let (mut dom, root) = container("<p>Hello world</p>");
    let existing = confirmed("a-1", "world", (&[0, 0], 6), (&[0, 0], 11));
    resolve_and_render(&mut dom, root, &[existing], &PaintOptions::default());
    let highlighted = node_at(&dom, root, &[0, 1, 0]);
    dom.set_selection(Range::new(
        Boundary::new(highlighted, 0),
        Boundary::new(highlighted, 5),
    ));

    assert!(capture_selection(&mut dom, root, &DocumentId::new("mail-1")).is_none());
}

#[test]
fn test_partial_selection_of_highlight_is_captured() {
    let (mut dom, root) = container("<p>Hello world</p>");
    let existing = confirmed("a-1", "world", (&[0, 0], 6), (&[0, 0], 11));
    resolve_and_render(&mut dom, root, &[existing], &PaintOptions::default());
    let highlighted = node_at(&dom, root, &[0, 1, 0]);
    dom.set_selection(Range::new(
        Boundary::new(highlighted, 1),
        Boundary::new(highlighted, 4),
    ));

    let capture = capture_selection(&mut dom, root, &DocumentId::new("mail-1")).unwrap();

    assert_eq!(capture.anchor.text, "orl");
    assert_eq!(capture.anchor.address.start.offset, 7);
    assert_eq!(capture.anchor.address.end.offset, 10);
}

mod common;

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{confirmed, node_at};
use pretty_assertions::assert_eq;
use rainbox_anchors::dom::{Boundary, Range};
use rainbox_anchors::{
    Anchor, AnchorEngine, AnchorId, AnchorPatch, AnchorState, AnchorStore, Command, CommandError,
    DocumentId, EngineEvent, JsonFileStore, Labels, MemoryStore, Rect, StoreError,
};
use tempfile::TempDir;

const EMAIL: &str = "<h1>Weekly digest</h1><p>Rust 2024 is out. Read the <a href=\"#\">release notes</a> today.</p>";

/// Memory store whose writes can be switched off
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    offline: AtomicBool,
}

impl FlakyStore {
    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AnchorStore for FlakyStore {
    async fn list(&self, document_id: &DocumentId) -> Result<Vec<Anchor>, StoreError> {
        self.inner.list(document_id).await
    }

    async fn create(&self, anchor: Anchor) -> Result<Anchor, StoreError> {
        self.check()?;
        self.inner.create(anchor).await
    }

    async fn update(&self, id: &AnchorId, patch: &AnchorPatch) -> Result<Anchor, StoreError> {
        self.check()?;
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: &AnchorId) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(id).await
    }
}

fn engine() -> AnchorEngine {
    let mut engine = AnchorEngine::new(DocumentId::new("mail-1"));
    engine.load(EMAIL);
    engine
}

/// Select "Rust 2024" in the paragraph
fn select_rust(engine: &mut AnchorEngine) {
    let root = engine.container();
    let text = node_at(engine.dom(), root, &[1, 0]);
    engine
        .dom_mut()
        .set_selection(Range::new(Boundary::new(text, 0), Boundary::new(text, 9)));
}

#[tokio::test]
async fn test_capture_confirm_and_reload_in_new_engine() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path().join("anchors.json"));

    let mut first = engine();
    select_rust(&mut first);
    let capture = first.capture_selection().unwrap();
    assert_eq!(capture.anchor.text, "Rust 2024");
    first
        .dispatch(&store, Command::Confirm(capture.anchor.id.clone()))
        .await
        .unwrap();
    let stored_id = first.book().anchors()[0].id.clone();
    assert_ne!(stored_id, capture.anchor.id);

    let mut second = AnchorEngine::new(DocumentId::new("mail-1"));
    second.load(EMAIL);
    let report = second.hydrate(&store).await.unwrap().clone();

    assert!(report.failed.is_empty());
    let highlight = report.highlight(&stored_id).unwrap();
    let text: String = highlight
        .wrappers
        .iter()
        .map(|&wrapper| second.dom().text_content(wrapper))
        .collect();
    assert_eq!(text, "Rust 2024");
    assert_eq!(second.html(), first.html());
}

#[tokio::test]
async fn test_failed_confirm_keeps_anchor_pending() {
    let store = FlakyStore::default();
    store.set_offline(true);
    let mut engine = engine();
    select_rust(&mut engine);
    let id = engine.capture_selection().unwrap().anchor.id;

    let err = engine.dispatch(&store, Command::Confirm(id.clone())).await.unwrap_err();

    assert!(matches!(err, CommandError::Rejected { .. }));
    assert_eq!(engine.book().get(&id).unwrap().state, AnchorState::Pending);
    assert!(engine.html().contains("data-anchor-state=\"pending\""));

    store.set_offline(false);
    engine.dispatch(&store, Command::Confirm(id)).await.unwrap();
    assert_eq!(engine.book().anchors()[0].id.as_str(), "a-1");
}

#[tokio::test]
async fn test_failed_edit_and_delete_roll_back() {
    let store = FlakyStore::default();
    let mut engine = engine();
    select_rust(&mut engine);
    let local = engine.capture_selection().unwrap().anchor.id;
    engine.dispatch(&store, Command::Confirm(local)).await.unwrap();
    let id = AnchorId::new("a-1");
    let labels: Labels = ["Release", "rust"].into_iter().collect();
    engine
        .dispatch(&store, Command::Edit(id.clone(), AnchorPatch::labels(labels.clone())))
        .await
        .unwrap();

    store.set_offline(true);
    let edit = engine
        .dispatch(&store, Command::Edit(id.clone(), AnchorPatch::annotation("read later")))
        .await;
    let delete = engine.dispatch(&store, Command::Delete(id.clone())).await;

    assert!(edit.is_err());
    assert!(delete.is_err());
    let anchor = engine.book().get(&id).unwrap();
    assert_eq!(anchor.annotation, None);
    assert_eq!(anchor.labels, labels);
    assert!(engine.html().contains("data-anchor-labels=\"release rust\""));
    assert!(!engine.html().contains("data-anchor-indicator"));
}

#[tokio::test]
async fn test_annotation_indicator_click_requests_editor() {
    let store = MemoryStore::new();
    let mut engine = engine();
    select_rust(&mut engine);
    let local = engine.capture_selection().unwrap().anchor.id;
    engine
        .dispatch(&store, Command::Edit(local, AnchorPatch::annotation("check the notes")))
        .await
        .unwrap();

    let indicator = engine.report().painted[0].indicator.unwrap();
    let wrapper = engine.report().painted[0].wrappers[0];
    let text = engine.dom().children(wrapper)[0];
    engine.dom_mut().set_rect(text, Rect::new(8.0, 30.0, 70.0, 18.0));
    engine.dom_mut().set_rect(indicator, Rect::new(78.0, 30.0, 12.0, 18.0));

    engine.pointer_down(80.0, 35.0);
    let event = engine.pointer_up(indicator, 81.0, 36.0);

    assert_eq!(
        event,
        Some(EngineEvent::AnnotationRequested {
            id: AnchorId::new("a-1"),
            rect: Rect::new(8.0, 30.0, 82.0, 18.0),
        })
    );
}

#[tokio::test]
async fn test_evict_failed_removes_stale_anchors_from_store() {
    let store = MemoryStore::new();
    let live = store
        .create(confirmed("x", "Weekly", (&[0, 0], 0), (&[0, 0], 6)))
        .await
        .unwrap();
    let stale = store
        .create(confirmed("y", "gone", (&[5, 0], 0), (&[5, 0], 4)))
        .await
        .unwrap();

    let mut engine = engine();
    let report = engine.hydrate(&store).await.unwrap();
    assert_eq!(report.failed_ids(), vec![stale.id.clone()]);

    let evicted = engine.evict_failed(&store).await.unwrap();

    assert_eq!(evicted, vec![stale.id]);
    let remaining = store.list(&DocumentId::new("mail-1")).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, live.id);
    assert!(engine.report().failed.is_empty());
}

#[tokio::test]
async fn test_removing_pending_anchor_never_touches_store() {
    let store = FlakyStore::default();
    store.set_offline(true);
    let mut engine = engine();
    select_rust(&mut engine);
    let id = engine.capture_selection().unwrap().anchor.id;

    engine.dispatch(&store, Command::Discard(id)).await.unwrap();

    assert!(engine.book().is_empty());
    assert!(!engine.html().contains("<mark"));
}

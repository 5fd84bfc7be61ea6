use std::collections::VecDeque;

use log::{debug, warn};

use crate::book::{AnchorBook, Command, CommandError};
use crate::capture::{self, Capture};
use crate::dom::{Dom, NodeId};
use crate::geometry::Rect;
use crate::interaction::{Interaction, PointerTracker};
use crate::model::{AnchorId, DocumentId};
use crate::paint::{self, PaintOptions, RenderReport};
use crate::store::{self, AnchorStore, StoreError};

/// Something the host UI should react to after a pointer-up
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Show the contextual popup for a highlight
    Activated { id: AnchorId, rect: Rect },
    /// Open the annotation editor for a highlight
    AnnotationRequested { id: AnchorId, rect: Rect },
    /// A new pending anchor was captured and painted; show the confirm popup
    Captured(Capture),
}

/// Facade over one rendered document: owns its tree, container and anchors
#[derive(Debug, Clone)]
pub struct AnchorEngine {
    dom: Dom,
    container: NodeId,
    book: AnchorBook,
    options: PaintOptions,
    pointer: PointerTracker,
    report: RenderReport,
}

impl AnchorEngine {
    pub fn new(document_id: DocumentId) -> Self {
        Self::with_options(document_id, PaintOptions::default(), PointerTracker::default())
    }

    pub fn with_options(document_id: DocumentId, options: PaintOptions, pointer: PointerTracker) -> Self {
        let mut dom = Dom::new();
        let container = dom.create_element("div");
        dom.append_child(dom.document(), container);
        Self {
            dom,
            container,
            book: AnchorBook::new(document_id),
            options,
            pointer,
            report: RenderReport::default(),
        }
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    /// For the host: selection and layout boxes are set through here
    pub fn dom_mut(&mut self) -> &mut Dom {
        &mut self.dom
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    pub fn book(&self) -> &AnchorBook {
        &self.book
    }

    pub fn document_id(&self) -> &DocumentId {
        self.book.document_id()
    }

    /// Outcome of the latest render pass
    pub fn report(&self) -> &RenderReport {
        &self.report
    }

    /// Current container markup, highlights included
    pub fn html(&self) -> String {
        self.dom.inner_html(self.container)
    }

    /// Replace the container contents with `html` and paint the anchors
    pub fn load(&mut self, html: &str) -> &RenderReport {
        self.dom.set_inner_html(self.container, html);
        self.render()
    }

    pub fn render(&mut self) -> &RenderReport {
        self.report = paint::resolve_and_render(
            &mut self.dom,
            self.container,
            self.book.anchors(),
            &self.options,
        );
        if !self.report.failed.is_empty() {
            debug!(
                "{} anchors of {} failed to resolve",
                self.report.failed.len(),
                self.book.document_id()
            );
        }
        &self.report
    }

    /// Capture the current selection as a pending anchor and paint it
    pub fn capture_selection(&mut self) -> Option<Capture> {
        let capture = capture::capture_selection(&mut self.dom, self.container, self.book.document_id())?;
        for id in self.book.insert_pending(capture.anchor.clone()) {
            debug!("pending anchor {id} replaced by a new selection");
        }
        self.render();
        Some(capture)
    }

    pub fn pointer_down(&mut self, x: f32, y: f32) {
        self.pointer.pointer_down(x, y);
    }

    pub fn pointer_up(&mut self, target: NodeId, x: f32, y: f32) -> Option<EngineEvent> {
        match self.pointer.pointer_up(&self.dom, self.container, target, x, y) {
            Interaction::AnnotationRequested { id, rect } => {
                Some(EngineEvent::AnnotationRequested { id, rect })
            }
            Interaction::Activated { id, rect } => Some(EngineEvent::Activated { id, rect }),
            Interaction::Capture => self.capture_selection().map(EngineEvent::Captured),
            Interaction::Ignored => None,
        }
    }

    /// Apply `command`, perform the resulting store requests one by one and
    /// repaint.
    ///
    /// Every request is completed even when an earlier one fails; the first
    /// failure is returned after its change has been rolled back.
    pub async fn dispatch(&mut self, store: &dyn AnchorStore, command: Command) -> Result<(), CommandError> {
        let mut queue: VecDeque<_> = self.book.apply(command)?.into();
        let mut first_error = None;
        while let Some(request) = queue.pop_front() {
            let outcome = store::perform(store, &request).await;
            match self.book.complete(request.op(), outcome) {
                Ok(follow_ups) => queue.extend(follow_ups),
                Err(err) => {
                    warn!("store request {} failed: {err}", request.op());
                    first_error.get_or_insert(err);
                }
            }
        }
        self.render();
        first_error.map_or(Ok(()), Err)
    }

    /// Load the document's confirmed anchors from `store` and repaint
    pub async fn hydrate(&mut self, store: &dyn AnchorStore) -> Result<&RenderReport, StoreError> {
        let stored = store.list(self.book.document_id()).await?;
        debug!("hydrated {} anchors for {}", stored.len(), self.book.document_id());
        self.book.hydrate(stored);
        Ok(self.render())
    }

    /// Remove every anchor the latest render could not resolve
    pub async fn evict_failed(&mut self, store: &dyn AnchorStore) -> Result<Vec<AnchorId>, CommandError> {
        let failed = self.report.failed_ids();
        if failed.is_empty() {
            return Ok(failed);
        }
        debug!("evicting {} unresolvable anchors", failed.len());
        self.dispatch(store, Command::Evict(failed.clone())).await?;
        Ok(failed)
    }
}

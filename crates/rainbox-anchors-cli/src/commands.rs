use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use log::{info, warn};
use rainbox_anchors::address::deserialize;
use rainbox_anchors::{
    Address, AnchorEngine, AnchorId, AnchorPatch, AnchorStore, Command, DocumentId, PaintOptions,
    PointerTracker,
};
use rainbox_anchors_config::HighlightConfig;

use crate::endpoint::{format_endpoint, parse_endpoint};
use crate::{AnnotateCmd, CaptureCmd, LabelCmd, ListCmd, RemoveCmd, RenderCmd};

/// Runs subcommands against one store with the configured highlight style
pub struct Shell<'a> {
    highlight: &'a HighlightConfig,
    store: &'a dyn AnchorStore,
}

impl<'a> Shell<'a> {
    pub fn new(highlight: &'a HighlightConfig, store: &'a dyn AnchorStore) -> Self {
        Self { highlight, store }
    }

    fn engine(&self, document: &str) -> AnchorEngine {
        let options = PaintOptions {
            wrapper_tag: self.highlight.tag.clone(),
            wrapper_class: self.highlight.class.clone(),
            indicator_class: self.highlight.indicator_class.clone(),
        };
        AnchorEngine::with_options(
            DocumentId::new(document),
            options,
            PointerTracker::new(self.highlight.click_threshold as f32),
        )
    }

    /// Engine holding the document's stored anchors but no email
    async fn hydrated(&self, document: &str) -> Result<AnchorEngine> {
        let mut engine = self.engine(document);
        engine.hydrate(self.store).await?;
        Ok(engine)
    }

    pub async fn render(&self, cmd: &RenderCmd, out: &mut dyn Write) -> Result<()> {
        let html = read_email(&cmd.email)?;
        let mut engine = self.engine(&cmd.document);
        engine.load(&html);
        let report = engine.hydrate(self.store).await?;
        info!(
            "Painted {} anchors for {}",
            report.painted.len(),
            cmd.document
        );
        for failure in &report.failed {
            warn!("Anchor {} no longer resolves: {}", failure.id, failure.reason);
        }

        if cmd.evict {
            let evicted = engine.evict_failed(self.store).await?;
            if !evicted.is_empty() {
                info!("Evicted {} anchors", evicted.len());
            }
        }

        let painted = engine.html();
        match &cmd.output {
            Some(path) => std::fs::write(path, painted)
                .with_context(|| format!("Failed to write {}", path.display()))?,
            None => writeln!(out, "{painted}")?,
        }
        Ok(())
    }

    /// Capture against the bare email so the address is independent of any
    /// existing highlights, then refuse to store the same address twice
    pub async fn capture(&self, cmd: &CaptureCmd, out: &mut dyn Write) -> Result<()> {
        let html = read_email(&cmd.email)?;
        let mut engine = self.engine(&cmd.document);
        engine.load(&html);

        let address = Address::new(parse_endpoint(&cmd.start)?, parse_endpoint(&cmd.end)?);
        let range = deserialize(engine.dom(), &address, engine.container())
            .with_context(|| format!("Selection {}..{} does not resolve", cmd.start, cmd.end))?;
        engine.dom_mut().set_selection(range);
        let Some(capture) = engine.capture_selection() else {
            bail!("Nothing to capture between {} and {}", cmd.start, cmd.end);
        };

        let stored = self.store.list(engine.document_id()).await?;
        if let Some(existing) = stored
            .iter()
            .find(|anchor| anchor.address == capture.anchor.address)
        {
            info!("Selection is already anchored as {}", existing.id);
            writeln!(out, "{}", existing.id)?;
            return Ok(());
        }

        let mut patch = match &cmd.annotation {
            Some(annotation) => AnchorPatch::annotation(annotation.clone()),
            None => AnchorPatch::default(),
        };
        if !cmd.labels.is_empty() {
            patch.labels = Some(cmd.labels.iter().collect());
        }
        let local_id = capture.anchor.id.clone();
        let command = if patch.is_empty() {
            Command::Confirm(local_id)
        } else {
            Command::Edit(local_id, patch)
        };
        engine.dispatch(self.store, command).await?;

        let anchor = engine
            .book()
            .anchors()
            .first()
            .context("Captured anchor vanished after confirming")?;
        info!("Anchored {:?} as {}", anchor.text, anchor.id);
        writeln!(out, "{}", anchor.id)?;
        Ok(())
    }

    pub async fn list(&self, cmd: &ListCmd, out: &mut dyn Write) -> Result<()> {
        let anchors = self.store.list(&DocumentId::new(&cmd.document)).await?;
        if cmd.json {
            writeln!(out, "{}", serde_json::to_string_pretty(&anchors)?)?;
            return Ok(());
        }
        for anchor in &anchors {
            write!(
                out,
                "{}\t{}..{}\t{:?}",
                anchor.id,
                format_endpoint(&anchor.address.start),
                format_endpoint(&anchor.address.end),
                anchor.text
            )?;
            if !anchor.labels.is_empty() {
                write!(out, "\t[{}]", anchor.labels)?;
            }
            if let Some(note) = anchor.note() {
                write!(out, "\t{note}")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    pub async fn annotate(&self, cmd: &AnnotateCmd) -> Result<()> {
        let mut engine = self.hydrated(&cmd.document).await?;
        let patch = match &cmd.text {
            Some(text) => AnchorPatch::annotation(text.clone()),
            None => AnchorPatch::clear_annotation(),
        };
        engine
            .dispatch(self.store, Command::Edit(AnchorId::new(&cmd.id), patch))
            .await?;
        info!("Updated annotation of {}", cmd.id);
        Ok(())
    }

    pub async fn label(&self, cmd: &LabelCmd) -> Result<()> {
        let mut engine = self.hydrated(&cmd.document).await?;
        let id = AnchorId::new(&cmd.id);
        let mut labels = engine
            .book()
            .get(&id)
            .with_context(|| format!("No anchor {} in {}", cmd.id, cmd.document))?
            .labels
            .clone();
        for label in &cmd.add {
            labels.insert(label);
        }
        for label in &cmd.remove {
            labels.remove(label);
        }
        engine
            .dispatch(self.store, Command::Edit(id, AnchorPatch::labels(labels)))
            .await?;
        info!("Updated labels of {}", cmd.id);
        Ok(())
    }

    pub async fn remove(&self, cmd: &RemoveCmd) -> Result<()> {
        let mut engine = self.hydrated(&cmd.document).await?;
        engine
            .dispatch(self.store, Command::Delete(AnchorId::new(&cmd.id)))
            .await?;
        info!("Removed {}", cmd.id);
        Ok(())
    }
}

fn read_email(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read email {}", path.display()))
}

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use log::debug;

use crate::book::{StoreAck, StoreRequest};
use crate::model::{Anchor, AnchorId, AnchorPatch, AnchorState, DocumentId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("anchor not found: {0}")]
    NotFound(AnchorId),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid anchor data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Persistence for confirmed anchors. Opaque to the engine: it only relies
/// on these four calls.
#[async_trait]
pub trait AnchorStore: Send + Sync {
    async fn list(&self, document_id: &DocumentId) -> Result<Vec<Anchor>, StoreError>;
    /// Stores the anchor under a new id and returns the stored record
    async fn create(&self, anchor: Anchor) -> Result<Anchor, StoreError>;
    async fn update(&self, id: &AnchorId, patch: &AnchorPatch) -> Result<Anchor, StoreError>;
    async fn delete(&self, id: &AnchorId) -> Result<(), StoreError>;
}

/// Run one request produced by the anchor book against `store`
pub async fn perform(
    store: &dyn AnchorStore,
    request: &StoreRequest,
) -> Result<StoreAck, StoreError> {
    match request {
        StoreRequest::Create { anchor, .. } => store.create(anchor.clone()).await.map(StoreAck::Created),
        StoreRequest::Update { id, patch, .. } => store.update(id, patch).await.map(StoreAck::Updated),
        StoreRequest::Delete { id, .. } => store.delete(id).await.map(|()| StoreAck::Deleted),
    }
}

/// In-process store assigning ids `a-1`, `a-2`, ...
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    anchors: Vec<Anchor>,
    last_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored anchor, across documents
    pub fn snapshot(&self) -> Vec<Anchor> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .anchors
            .clone()
    }
}

#[async_trait]
impl AnchorStore for MemoryStore {
    async fn list(&self, document_id: &DocumentId) -> Result<Vec<Anchor>, StoreError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records_for(&inner.anchors, document_id))
    }

    async fn create(&self, anchor: Anchor) -> Result<Anchor, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.last_id += 1;
        let id = AnchorId::new(format!("a-{}", inner.last_id));
        let stored = as_record(anchor, id);
        inner.anchors.push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: &AnchorId, patch: &AnchorPatch) -> Result<Anchor, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        patch_record(&mut inner.anchors, id, patch)
    }

    async fn delete(&self, id: &AnchorId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        remove_record(&mut inner.anchors, id)
    }
}

/// Anchors kept as a pretty-printed JSON array in one file. A missing file
/// is an empty store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<Anchor>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, anchors: &[Anchor]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(anchors)?;
        fs::write(&self.path, content)?;
        debug!("wrote {} anchors to {}", anchors.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl AnchorStore for JsonFileStore {
    async fn list(&self, document_id: &DocumentId) -> Result<Vec<Anchor>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records_for(&self.load()?, document_id))
    }

    async fn create(&self, anchor: Anchor) -> Result<Anchor, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut anchors = self.load()?;
        let stored = as_record(anchor, AnchorId::generate());
        anchors.push(stored.clone());
        self.save(&anchors)?;
        Ok(stored)
    }

    async fn update(&self, id: &AnchorId, patch: &AnchorPatch) -> Result<Anchor, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut anchors = self.load()?;
        let updated = patch_record(&mut anchors, id, patch)?;
        self.save(&anchors)?;
        Ok(updated)
    }

    async fn delete(&self, id: &AnchorId) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut anchors = self.load()?;
        remove_record(&mut anchors, id)?;
        self.save(&anchors)
    }
}

fn as_record(mut anchor: Anchor, id: AnchorId) -> Anchor {
    anchor.id = id;
    anchor.state = AnchorState::Confirmed;
    anchor
}

fn records_for(anchors: &[Anchor], document_id: &DocumentId) -> Vec<Anchor> {
    anchors
        .iter()
        .filter(|anchor| &anchor.document_id == document_id)
        .cloned()
        .collect()
}

fn patch_record(anchors: &mut [Anchor], id: &AnchorId, patch: &AnchorPatch) -> Result<Anchor, StoreError> {
    let anchor = anchors
        .iter_mut()
        .find(|anchor| &anchor.id == id)
        .ok_or_else(|| StoreError::NotFound(id.clone()))?;
    anchor.apply_patch(patch);
    Ok(anchor.clone())
}

fn remove_record(anchors: &mut Vec<Anchor>, id: &AnchorId) -> Result<(), StoreError> {
    let index = anchors
        .iter()
        .position(|anchor| &anchor.id == id)
        .ok_or_else(|| StoreError::NotFound(id.clone()))?;
    anchors.remove(index);
    Ok(())
}

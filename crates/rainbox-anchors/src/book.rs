//! # Anchor book
//!
//! The per-document anchor set and its lifecycle:
//!
//! ```text
//! pending ──confirm / edit──▶ confirmed ──delete / evict──▶ removed
//!    └──────────discard / delete / evict───────────────────────┘
//! ```
//!
//! Commands are applied optimistically: local state changes at once and the
//! store calls needed to persist the change come back as [`StoreRequest`]s,
//! each tagged with an [`OpId`]. The caller performs them in any order and
//! reports each outcome through [`AnchorBook::complete`]. Every in-flight
//! operation keeps enough of the prior state to undo itself, so a failure
//! rolls back exactly that operation without touching later edits.

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::{debug, warn};

use crate::model::{Anchor, AnchorId, AnchorPatch, AnchorState, DocumentId};
use crate::store::StoreError;

/// Tag of one store request
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(u64);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Persist a pending anchor
    Confirm(AnchorId),
    /// Change annotation and/or labels; confirms a pending anchor
    Edit(AnchorId, AnchorPatch),
    /// Remove an anchor locally and from the store
    Delete(AnchorId),
    /// Drop a pending anchor without telling the store
    Discard(AnchorId),
    /// Remove anchors that no longer resolve; unknown ids are skipped
    Evict(Vec<AnchorId>),
}

/// A store call the caller must perform and then report back
#[derive(Debug, Clone, PartialEq)]
pub enum StoreRequest {
    Create { op: OpId, anchor: Anchor },
    Update { op: OpId, id: AnchorId, patch: AnchorPatch },
    Delete { op: OpId, id: AnchorId },
}

impl StoreRequest {
    pub fn op(&self) -> OpId {
        match self {
            StoreRequest::Create { op, .. }
            | StoreRequest::Update { op, .. }
            | StoreRequest::Delete { op, .. } => *op,
        }
    }
}

/// Successful store outcome of a [`StoreRequest`]
#[derive(Debug, Clone, PartialEq)]
pub enum StoreAck {
    /// The anchor as stored, carrying its store-assigned id
    Created(Anchor),
    Updated(Anchor),
    Deleted,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("no anchor with id {0}")]
    UnknownAnchor(AnchorId),
    #[error("anchor {0} is not pending")]
    NotPending(AnchorId),
    #[error("no operation {0} in flight")]
    UnknownOp(OpId),
    #[error("store rejected the change to anchor {id}: {source}")]
    Rejected {
        id: AnchorId,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone)]
enum InFlight {
    Create {
        local_id: AnchorId,
        /// Edit sent along with the create, if any
        applied: AnchorPatch,
        prior: AnchorPatch,
    },
    Update {
        id: AnchorId,
        applied: AnchorPatch,
    },
    Delete {
        anchor: Anchor,
        index: usize,
    },
}

#[derive(Debug, Clone)]
pub struct AnchorBook {
    document_id: DocumentId,
    anchors: Vec<Anchor>,
    next_op: u64,
    in_flight: HashMap<OpId, InFlight>,
    /// Local ids whose create has not been acknowledged yet
    awaiting_create: HashSet<AnchorId>,
    /// Awaiting anchors the user removed; deleted from the store on ack
    orphaned: HashMap<AnchorId, Anchor>,
    /// Editable fields as the store last acknowledged them
    acknowledged: HashMap<AnchorId, AnchorPatch>,
}

impl AnchorBook {
    pub fn new(document_id: DocumentId) -> Self {
        Self {
            document_id,
            anchors: Vec::new(),
            next_op: 0,
            in_flight: HashMap::new(),
            awaiting_create: HashSet::new(),
            orphaned: HashMap::new(),
            acknowledged: HashMap::new(),
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    /// Every anchor to paint, pending ones included
    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    pub fn get(&self, id: &AnchorId) -> Option<&Anchor> {
        self.anchors.iter().find(|anchor| &anchor.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// True while any store request is unacknowledged
    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Replace the settled anchors with what the store holds for this
    /// document. Pending anchors and anchors with a create in flight are
    /// kept. Records this book is still creating or deleting are skipped.
    pub fn hydrate(&mut self, stored: Vec<Anchor>) {
        let awaiting = &self.awaiting_create;
        self.anchors
            .retain(|anchor| anchor.state == AnchorState::Pending || awaiting.contains(&anchor.id));
        let deleting: HashSet<AnchorId> = self
            .in_flight
            .values()
            .filter_map(|op| match op {
                InFlight::Delete { anchor, .. } => Some(anchor.id.clone()),
                _ => None,
            })
            .collect();
        self.acknowledged.retain(|id, _| deleting.contains(id));
        for mut anchor in stored {
            if anchor.document_id != self.document_id
                || deleting.contains(&anchor.id)
                || self.get(&anchor.id).is_some()
                || self.is_being_created(&anchor)
            {
                continue;
            }
            anchor.state = AnchorState::Confirmed;
            self.acknowledged.insert(anchor.id.clone(), settled(&anchor));
            self.anchors.push(anchor);
        }
    }

    /// Add a freshly captured anchor. Only one anchor waits for the user's
    /// decision at a time; any previous pending anchor is discarded and its
    /// id returned.
    pub fn insert_pending(&mut self, mut anchor: Anchor) -> Vec<AnchorId> {
        let awaiting = &self.awaiting_create;
        let discarded: Vec<AnchorId> = self
            .anchors
            .iter()
            .filter(|a| a.state == AnchorState::Pending && !awaiting.contains(&a.id))
            .map(|a| a.id.clone())
            .collect();
        self.anchors
            .retain(|a| !discarded.contains(&a.id));
        anchor.state = AnchorState::Pending;
        self.anchors.push(anchor);
        discarded
    }

    pub fn apply(&mut self, command: Command) -> Result<Vec<StoreRequest>, CommandError> {
        match command {
            Command::Confirm(id) => {
                let anchor = self.find(&id)?;
                if self.anchors[anchor].state != AnchorState::Pending || self.awaiting_create.contains(&id) {
                    return Err(CommandError::NotPending(id));
                }
                Ok(vec![self.confirm(anchor, AnchorPatch::default(), AnchorPatch::default())])
            }
            Command::Edit(id, patch) => self.edit(id, patch),
            Command::Delete(id) => self.delete(id),
            Command::Discard(id) => {
                let index = self.find(&id)?;
                if self.anchors[index].state != AnchorState::Pending {
                    return Err(CommandError::NotPending(id));
                }
                debug!("discarding pending anchor {id}");
                self.anchors.remove(index);
                Ok(Vec::new())
            }
            Command::Evict(ids) => {
                let mut requests = Vec::new();
                for id in ids {
                    match self.delete(id) {
                        Ok(mut more) => requests.append(&mut more),
                        Err(CommandError::UnknownAnchor(id)) => debug!("evicting unknown anchor {id}"),
                        Err(other) => return Err(other),
                    }
                }
                Ok(requests)
            }
        }
    }

    /// Record the outcome of a request returned by [`AnchorBook::apply`].
    ///
    /// Returns follow-up requests to perform. On failure the optimistic
    /// change is undone and the store error comes back as
    /// [`CommandError::Rejected`]. A failed update puts its fields back to
    /// the last values the store acknowledged, unless a later edit has
    /// changed them since.
    pub fn complete(
        &mut self,
        op: OpId,
        outcome: Result<StoreAck, StoreError>,
    ) -> Result<Vec<StoreRequest>, CommandError> {
        let in_flight = self
            .in_flight
            .remove(&op)
            .ok_or(CommandError::UnknownOp(op))?;
        match in_flight {
            InFlight::Create {
                local_id,
                applied,
                prior,
            } => self.complete_create(local_id, applied, prior, outcome),
            InFlight::Update { id, applied } => match outcome {
                Ok(_) => {
                    if let Some(acknowledged) = self.acknowledged.get_mut(&id) {
                        if applied.annotation.is_some() {
                            acknowledged.annotation = applied.annotation;
                        }
                        if applied.labels.is_some() {
                            acknowledged.labels = applied.labels;
                        }
                    }
                    Ok(Vec::new())
                }
                Err(source) => {
                    warn!("update of anchor {id} failed, rolling back: {source}");
                    let prior = self.acknowledged.get(&id).cloned().unwrap_or_default();
                    if let Some(anchor) = self.anchors.iter_mut().find(|a| a.id == id) {
                        roll_back(anchor, applied, prior);
                    }
                    Err(CommandError::Rejected { id, source })
                }
            },
            InFlight::Delete { anchor, index } => match outcome {
                Ok(_) | Err(StoreError::NotFound(_)) => {
                    self.acknowledged.remove(&anchor.id);
                    Ok(Vec::new())
                }
                Err(source) => {
                    warn!("delete of anchor {} failed, restoring it: {source}", anchor.id);
                    let id = anchor.id.clone();
                    if self.get(&id).is_none() {
                        let index = index.min(self.anchors.len());
                        self.anchors.insert(index, anchor);
                    }
                    Err(CommandError::Rejected { id, source })
                }
            },
        }
    }

    fn complete_create(
        &mut self,
        local_id: AnchorId,
        applied: AnchorPatch,
        prior: AnchorPatch,
        outcome: Result<StoreAck, StoreError>,
    ) -> Result<Vec<StoreRequest>, CommandError> {
        self.awaiting_create.remove(&local_id);
        let orphaned = self.orphaned.remove(&local_id).is_some();
        match outcome {
            Ok(StoreAck::Created(stored)) if orphaned => {
                debug!("anchor {local_id} was removed before the store created it as {}", stored.id);
                let index = self.anchors.len();
                Ok(vec![self.request_delete(stored, index)])
            }
            Err(source) if orphaned => {
                debug!("create of removed anchor {local_id} failed, nothing to undo: {source}");
                Ok(Vec::new())
            }
            Ok(ack) => {
                let Some(index) = self.anchors.iter().position(|a| a.id == local_id) else {
                    return Ok(Vec::new());
                };
                let StoreAck::Created(stored) = ack else {
                    warn!("store acknowledged create of {local_id} without returning the anchor");
                    return Ok(Vec::new());
                };
                self.acknowledged.insert(stored.id.clone(), settled(&stored));
                let local = &mut self.anchors[index];
                local.id = stored.id.clone();
                local.state = AnchorState::Confirmed;
                let unsynced = settled(local).diff_against(&stored);
                if unsynced.is_empty() {
                    return Ok(Vec::new());
                }
                debug!("syncing edits made to {} while its create was in flight", stored.id);
                let op = self.next_op();
                self.in_flight.insert(
                    op,
                    InFlight::Update {
                        id: stored.id.clone(),
                        applied: unsynced.clone(),
                    },
                );
                Ok(vec![StoreRequest::Update {
                    op,
                    id: stored.id,
                    patch: unsynced,
                }])
            }
            Err(source) => {
                warn!("create of anchor {local_id} failed: {source}");
                if let Some(anchor) = self.anchors.iter_mut().find(|a| a.id == local_id) {
                    anchor.state = AnchorState::Pending;
                    roll_back(anchor, applied, prior);
                }
                Err(CommandError::Rejected {
                    id: local_id,
                    source,
                })
            }
        }
    }

    fn edit(&mut self, id: AnchorId, patch: AnchorPatch) -> Result<Vec<StoreRequest>, CommandError> {
        let index = self.find(&id)?;
        if patch.is_empty() {
            return Ok(Vec::new());
        }
        if self.awaiting_create.contains(&id) {
            // Reconciled when the create is acknowledged
            self.anchors[index].apply_patch(&patch);
            return Ok(Vec::new());
        }
        let anchor = &mut self.anchors[index];
        let prior = anchor.inverse_of(&patch);
        anchor.apply_patch(&patch);
        // Store the normalized values so rollback compares like with like
        let applied = AnchorPatch {
            annotation: patch.annotation.as_ref().map(|_| anchor.annotation.clone()),
            labels: patch.labels,
        };
        if anchor.state == AnchorState::Pending {
            return Ok(vec![self.confirm(index, applied, prior)]);
        }

        let op = self.next_op();
        self.in_flight.insert(
            op,
            InFlight::Update {
                id: id.clone(),
                applied: applied.clone(),
            },
        );
        Ok(vec![StoreRequest::Update {
            op,
            id,
            patch: applied,
        }])
    }

    fn delete(&mut self, id: AnchorId) -> Result<Vec<StoreRequest>, CommandError> {
        let index = self.find(&id)?;
        let anchor = self.anchors.remove(index);
        if self.awaiting_create.contains(&id) {
            self.orphaned.insert(id, anchor);
            return Ok(Vec::new());
        }
        if anchor.state == AnchorState::Pending {
            debug!("discarding pending anchor {id}");
            return Ok(Vec::new());
        }
        Ok(vec![self.request_delete(anchor, index)])
    }

    fn confirm(&mut self, index: usize, applied: AnchorPatch, prior: AnchorPatch) -> StoreRequest {
        let anchor = &mut self.anchors[index];
        anchor.state = AnchorState::Confirmed;
        let anchor = anchor.clone();
        self.awaiting_create.insert(anchor.id.clone());
        let op = self.next_op();
        self.in_flight.insert(
            op,
            InFlight::Create {
                local_id: anchor.id.clone(),
                applied,
                prior,
            },
        );
        StoreRequest::Create { op, anchor }
    }

    fn request_delete(&mut self, anchor: Anchor, index: usize) -> StoreRequest {
        let op = self.next_op();
        let id = anchor.id.clone();
        self.in_flight.insert(op, InFlight::Delete { anchor, index });
        StoreRequest::Delete { op, id }
    }

    /// Whether `record` is the store's copy of an anchor whose create is
    /// still unacknowledged
    fn is_being_created(&self, record: &Anchor) -> bool {
        let same_capture = |local: &Anchor| {
            local.address == record.address
                && local.created_at == record.created_at
                && local.text == record.text
        };
        self.orphaned.values().any(same_capture)
            || self
                .anchors
                .iter()
                .any(|local| self.awaiting_create.contains(&local.id) && same_capture(local))
    }

    fn find(&self, id: &AnchorId) -> Result<usize, CommandError> {
        self.anchors
            .iter()
            .position(|anchor| &anchor.id == id)
            .ok_or_else(|| CommandError::UnknownAnchor(id.clone()))
    }

    fn next_op(&mut self) -> OpId {
        self.next_op += 1;
        OpId(self.next_op)
    }
}

/// Patch holding every editable field of `anchor`
fn settled(anchor: &Anchor) -> AnchorPatch {
    AnchorPatch {
        annotation: Some(anchor.annotation.clone()),
        labels: Some(anchor.labels.clone()),
    }
}

/// Put the fields of `applied` back to `prior`, skipping any field a later
/// edit has already changed
fn roll_back(anchor: &mut Anchor, applied: AnchorPatch, prior: AnchorPatch) {
    let still_applied = AnchorPatch {
        annotation: applied
            .annotation
            .filter(|value| anchor.annotation == *value)
            .and(prior.annotation),
        labels: applied
            .labels
            .filter(|value| anchor.labels == *value)
            .and(prior.labels),
    };
    anchor.apply_patch(&still_applied);
}

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;

/// Identifier of an anchor: a local UUID until the store assigns its own
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(pub String);

impl AnchorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh local id for an anchor the store has not seen yet
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the rendered document (an email) an anchor belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical label set: trimmed, lower-cased, no duplicates, no empties
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Labels(BTreeSet<String>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the label was empty or already present
    pub fn insert(&mut self, label: &str) -> bool {
        let label = label.trim().to_lowercase();
        if label.is_empty() {
            return false;
        }
        self.0.insert(label)
    }

    pub fn remove(&mut self, label: &str) -> bool {
        self.0.remove(&label.trim().to_lowercase())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(&label.trim().to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for Labels {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut labels = Labels::new();
        for label in iter {
            labels.insert(label.as_ref());
        }
        labels
    }
}

impl From<Vec<String>> for Labels {
    fn from(labels: Vec<String>) -> Self {
        labels.into_iter().collect()
    }
}

impl From<Labels> for Vec<String> {
    fn from(labels: Labels) -> Self {
        labels.0.into_iter().collect()
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(" "))
    }
}

/// Where an anchor is in its lifecycle. Removal is not a state: removed
/// anchors leave the book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnchorState {
    /// Captured but not yet accepted by the store
    Pending,
    #[default]
    Confirmed,
}

impl AnchorState {
    pub fn as_str(self) -> &'static str {
        match self {
            AnchorState::Pending => "pending",
            AnchorState::Confirmed => "confirmed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchor {
    pub id: AnchorId,
    pub document_id: DocumentId,
    /// Selected text at capture time; informational only
    pub text: String,
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    pub created_at: DateTime<Utc>,
    /// Store records are always confirmed
    #[serde(skip)]
    pub state: AnchorState,
}

impl Anchor {
    /// A freshly captured anchor, not yet persisted
    pub fn pending(
        document_id: DocumentId,
        text: impl Into<String>,
        address: Address,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AnchorId::generate(),
            document_id,
            text: text.into(),
            address,
            annotation: None,
            labels: Labels::new(),
            created_at,
            state: AnchorState::Pending,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == AnchorState::Confirmed
    }

    /// Annotation, if it holds anything besides whitespace
    pub fn note(&self) -> Option<&str> {
        self.annotation
            .as_deref()
            .filter(|note| !note.trim().is_empty())
    }

    pub fn apply_patch(&mut self, patch: &AnchorPatch) {
        if let Some(annotation) = &patch.annotation {
            self.annotation = normalize_annotation(annotation.clone());
        }
        if let Some(labels) = &patch.labels {
            self.labels = labels.clone();
        }
    }

    /// Patch that restores the fields `patch` touches to their current values
    pub fn inverse_of(&self, patch: &AnchorPatch) -> AnchorPatch {
        AnchorPatch {
            annotation: patch.annotation.as_ref().map(|_| self.annotation.clone()),
            labels: patch.labels.as_ref().map(|_| self.labels.clone()),
        }
    }
}

/// Partial update of an anchor's editable fields; `None` leaves a field alone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorPatch {
    /// `Some(None)` clears the annotation
    pub annotation: Option<Option<String>>,
    pub labels: Option<Labels>,
}

impl AnchorPatch {
    pub fn annotation(note: impl Into<String>) -> Self {
        Self {
            annotation: Some(normalize_annotation(Some(note.into()))),
            labels: None,
        }
    }

    pub fn clear_annotation() -> Self {
        Self {
            annotation: Some(None),
            labels: None,
        }
    }

    pub fn labels(labels: Labels) -> Self {
        Self {
            annotation: None,
            labels: Some(labels),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.annotation.is_none() && self.labels.is_none()
    }

    /// Fields of `self` that `anchor` does not already hold
    pub fn diff_against(&self, anchor: &Anchor) -> AnchorPatch {
        AnchorPatch {
            annotation: self
                .annotation
                .clone()
                .filter(|annotation| normalize_annotation(annotation.clone()) != anchor.annotation),
            labels: self.labels.clone().filter(|labels| *labels != anchor.labels),
        }
    }
}

fn normalize_annotation(annotation: Option<String>) -> Option<String> {
    annotation.filter(|note| !note.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Endpoint;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn sample() -> Anchor {
        Anchor {
            id: AnchorId::new("a-1"),
            document_id: DocumentId::new("mail-7"),
            text: "world".to_string(),
            address: Address::new(Endpoint::text(vec![0, 0], 6), Endpoint::text(vec![0, 0], 11)),
            annotation: Some("remember".to_string()),
            labels: ["Work", "later"].into_iter().collect(),
            created_at: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            state: AnchorState::Confirmed,
        }
    }

    #[rstest]
    #[case(&["Work", "work", " WORK "], &["work"])]
    #[case(&["b", "a", ""], &["a", "b"])]
    #[case(&["  ", "Inbox Zero"], &["inbox zero"])]
    fn test_labels_are_canonical(#[case] input: &[&str], #[case] expected: &[&str]) {
        let labels: Labels = input.iter().collect();
        assert_eq!(labels.iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_labels_compare_case_insensitively() {
        let labels: Labels = ["News"].into_iter().collect();
        assert!(labels.contains("NEWS"));
    }

    #[test]
    fn test_anchor_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "a-1",
                "documentId": "mail-7",
                "text": "world",
                "address": {
                    "start": {"path": [0, 0], "offset": 6, "node": "text"},
                    "end": {"path": [0, 0], "offset": 11, "node": "text"}
                },
                "annotation": "remember",
                "labels": ["later", "work"],
                "createdAt": "2024-05-01T10:00:00Z"
            })
        );
    }

    #[test]
    fn test_deserialized_anchor_is_confirmed_with_canonical_labels() {
        let anchor: Anchor = serde_json::from_str(
            r#"{
                "id": "x",
                "documentId": "d",
                "text": "t",
                "address": {"start": {"path": [], "offset": 0}, "end": {"path": [], "offset": 1}},
                "labels": ["A", "a", " b "],
                "createdAt": "2024-01-01T00:00:00Z"
            }"#,
        )
        .unwrap();

        assert!(anchor.is_confirmed());
        assert_eq!(anchor.labels.iter().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(anchor.annotation, None);
    }

    #[test]
    fn test_empty_annotation_is_stored_as_none() {
        let mut anchor = sample();
        anchor.apply_patch(&AnchorPatch::annotation("   "));
        assert_eq!(anchor.annotation, None);
        assert_eq!(anchor.note(), None);
    }

    #[test]
    fn test_inverse_patch_restores_touched_fields_only() {
        let mut anchor = sample();
        let patch = AnchorPatch::labels(Labels::new());
        let inverse = anchor.inverse_of(&patch);

        anchor.apply_patch(&patch);
        assert!(anchor.labels.is_empty());
        anchor.apply_patch(&inverse);

        assert_eq!(anchor, sample());
        assert_eq!(inverse.annotation, None);
    }

    #[test]
    fn test_diff_against_drops_fields_already_held() {
        let anchor = sample();
        let patch = AnchorPatch {
            annotation: Some(Some("remember".to_string())),
            labels: Some(["urgent"].into_iter().collect()),
        };

        let diff = patch.diff_against(&anchor);

        assert_eq!(diff.annotation, None);
        assert_eq!(diff.labels, patch.labels);
    }
}

//! Tracker trait definitions

use crate::graph::RelationKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors reported by a remote tracker
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The tracker could not be reached at all
    #[error("Tracker unreachable: {0}")]
    Connectivity(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation is not offered by this tracker
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The tracker refused the request (permissions, validation, ownership)
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Numeric id of a work item (an issue number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Id of an annotation (an issue comment)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(pub u64);

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Active,
    Retired,
}

/// Status filter for `list_items`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    Any,
    Active,
    Retired,
}

impl StatusFilter {
    pub fn matches(self, status: ItemStatus) -> bool {
        match self {
            Self::Any => true,
            Self::Active => status == ItemStatus::Active,
            Self::Retired => status == ItemStatus::Retired,
        }
    }
}

/// A tracked unit in the remote tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: ItemId,
    pub title: String,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn is_active(&self) -> bool {
        self.status == ItemStatus::Active
    }
}

/// A timestamped text record on a work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub item_id: ItemId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// The remote tracker contract the reconciler consumes.
///
/// Every call is request/response; the reconciler awaits them one at a time.
/// Implementations must be Send + Sync so a tracker can be shared behind
/// an `Arc` by the binary.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Items whose title contains `title_filter` (implementations may
    /// over-match; callers compare titles exactly).
    async fn list_items(&self, title_filter: &str, status: StatusFilter) -> TrackerResult<Vec<WorkItem>>;

    async fn create_item(&self, title: &str, body: &str, labels: &[String]) -> TrackerResult<ItemId>;

    /// Transition an item to `retired`. Returns `false` if it already was.
    async fn retire_item(&self, id: ItemId) -> TrackerResult<bool>;

    async fn create_annotation(&self, item: ItemId, body: &str) -> TrackerResult<AnnotationId>;

    /// Replace an annotation's body.
    ///
    /// Fails with `Rejected` when the caller does not own the annotation or
    /// the tracker does not allow the edit.
    async fn edit_annotation(&self, id: AnnotationId, body: &str) -> TrackerResult<bool>;

    async fn list_annotations(&self, item: ItemId) -> TrackerResult<Vec<Annotation>>;

    /// Write a native relation link. Fails with `Unsupported` when the
    /// tracker has no structured representation for `kind`.
    async fn write_structured_relation(&self, from: ItemId, to: ItemId, kind: RelationKind) -> TrackerResult<bool>;

    /// One-time capability probe for native relation links.
    async fn probe_structured_relations(&self) -> TrackerResult<bool>;
}

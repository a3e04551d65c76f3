//! In-process tracker with fault injection
//!
//! Behaves like a small issue tracker: numeric ids, creation timestamps that
//! strictly increase, comment ownership (edits can be rejected per
//! annotation), optional native relation support, and an offline switch.
//! Every mutating call is logged so callers can assert on what reached
//! the store.

use super::traits::{
    Annotation, AnnotationId, ItemId, ItemStatus, StatusFilter, Tracker, TrackerError,
    TrackerResult, WorkItem,
};
use crate::graph::RelationKind;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard};

/// A mutating call that reached the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCall {
    CreateItem { title: String },
    RetireItem { id: ItemId },
    CreateAnnotation { item: ItemId, body: String },
    EditAnnotation { id: AnnotationId, body: String },
    WriteRelation { from: ItemId, to: ItemId, kind: RelationKind },
}

#[derive(Debug)]
struct State {
    items: BTreeMap<ItemId, WorkItem>,
    labels: BTreeMap<ItemId, Vec<String>>,
    annotations: BTreeMap<AnnotationId, Annotation>,
    relations: BTreeSet<(ItemId, ItemId, RelationKind)>,
    locked: HashSet<AnnotationId>,
    native_kinds: BTreeSet<RelationKind>,
    offline: bool,
    /// Title filters whose next lookup is refused
    failing_lookups: BTreeSet<String>,
    next_item: u64,
    next_annotation: u64,
    tick: i64,
    calls: Vec<TrackerCall>,
}

/// Tracker held entirely in memory
#[derive(Debug)]
pub struct InMemoryTracker {
    base: DateTime<Utc>,
    state: Mutex<State>,
}

impl Default for InMemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTracker {
    /// A tracker without native relation support.
    pub fn new() -> Self {
        Self {
            base: Utc::now(),
            state: Mutex::new(State {
                items: BTreeMap::new(),
                labels: BTreeMap::new(),
                annotations: BTreeMap::new(),
                relations: BTreeSet::new(),
                locked: HashSet::new(),
                native_kinds: BTreeSet::new(),
                offline: false,
                failing_lookups: BTreeSet::new(),
                next_item: 1,
                next_annotation: 1000,
                tick: 0,
                calls: Vec::new(),
            }),
        }
    }

    /// Support native links for every relation kind.
    pub fn with_native_relations(self) -> Self {
        self.with_native_kinds(&[
            RelationKind::DependsOn,
            RelationKind::Blocks,
            RelationKind::RelatesTo,
        ])
    }

    /// Support native links only for the given kinds.
    pub fn with_native_kinds(self, kinds: &[RelationKind]) -> Self {
        self.state().native_kinds = kinds.iter().copied().collect();
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn online(&self) -> TrackerResult<MutexGuard<'_, State>> {
        let state = self.state();
        if state.offline {
            return Err(TrackerError::Connectivity("in-memory tracker is offline".into()));
        }
        Ok(state)
    }

    fn stamp(&self, state: &mut State) -> DateTime<Utc> {
        state.tick += 1;
        self.base + Duration::seconds(state.tick)
    }

    /// Insert an item directly, bypassing the call log.
    pub fn seed_item(&self, title: &str, status: ItemStatus) -> ItemId {
        let mut state = self.state();
        let id = ItemId(state.next_item);
        state.next_item += 1;
        let created_at = self.stamp(&mut state);
        state.items.insert(
            id,
            WorkItem {
                id,
                title: title.to_string(),
                status,
                created_at,
            },
        );
        id
    }

    /// Insert an annotation directly, bypassing the call log.
    pub fn seed_annotation(&self, item: ItemId, body: &str) -> AnnotationId {
        let mut state = self.state();
        let annotation_id = AnnotationId(state.next_annotation);
        state.next_annotation += 1;
        let created_at = self.stamp(&mut state);
        state.annotations.insert(
            annotation_id,
            Annotation {
                id: annotation_id,
                item_id: item,
                body: body.to_string(),
                created_at,
            },
        );
        annotation_id
    }

    /// Reject future edits of this annotation (as if another user owned it).
    pub fn lock_annotation(&self, id: AnnotationId) {
        self.state().locked.insert(id);
    }

    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Refuse the next `list_items` call for exactly `title_filter`, the way
    /// a rate-limited tracker would.
    pub fn reject_next_lookup(&self, title_filter: &str) {
        self.state().failing_lookups.insert(title_filter.to_string());
    }

    pub fn items(&self) -> Vec<WorkItem> {
        self.state().items.values().cloned().collect()
    }

    pub fn item(&self, id: ItemId) -> Option<WorkItem> {
        self.state().items.get(&id).cloned()
    }

    pub fn labels(&self, id: ItemId) -> Vec<String> {
        self.state().labels.get(&id).cloned().unwrap_or_default()
    }

    pub fn annotations(&self, item: ItemId) -> Vec<Annotation> {
        self.state()
            .annotations
            .values()
            .filter(|a| a.item_id == item)
            .cloned()
            .collect()
    }

    pub fn relations(&self) -> Vec<(ItemId, ItemId, RelationKind)> {
        self.state().relations.iter().copied().collect()
    }

    /// Mutating calls received since construction or the last `clear_calls`.
    pub fn mutations(&self) -> Vec<TrackerCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

#[async_trait]
impl Tracker for InMemoryTracker {
    async fn list_items(&self, title_filter: &str, status: StatusFilter) -> TrackerResult<Vec<WorkItem>> {
        let mut state = self.online()?;
        if state.failing_lookups.remove(title_filter) {
            return Err(TrackerError::Rejected("API rate limit exceeded (HTTP 403)".into()));
        }
        let needle = title_filter.to_lowercase();
        Ok(state
            .items
            .values()
            .filter(|item| status.matches(item.status))
            .filter(|item| item.title.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn create_item(&self, title: &str, _body: &str, labels: &[String]) -> TrackerResult<ItemId> {
        let mut state = self.online()?;
        state.calls.push(TrackerCall::CreateItem { title: title.to_string() });
        let id = ItemId(state.next_item);
        state.next_item += 1;
        let created_at = self.stamp(&mut state);
        state.items.insert(
            id,
            WorkItem {
                id,
                title: title.to_string(),
                status: ItemStatus::Active,
                created_at,
            },
        );
        state.labels.insert(id, labels.to_vec());
        Ok(id)
    }

    async fn retire_item(&self, id: ItemId) -> TrackerResult<bool> {
        let mut state = self.online()?;
        state.calls.push(TrackerCall::RetireItem { id });
        let item = state
            .items
            .get_mut(&id)
            .ok_or_else(|| TrackerError::NotFound(format!("item {}", id)))?;
        if item.status == ItemStatus::Retired {
            return Ok(false);
        }
        item.status = ItemStatus::Retired;
        Ok(true)
    }

    async fn create_annotation(&self, item: ItemId, body: &str) -> TrackerResult<AnnotationId> {
        let mut state = self.online()?;
        state.calls.push(TrackerCall::CreateAnnotation {
            item,
            body: body.to_string(),
        });
        if !state.items.contains_key(&item) {
            return Err(TrackerError::NotFound(format!("item {}", item)));
        }
        let id = AnnotationId(state.next_annotation);
        state.next_annotation += 1;
        let created_at = self.stamp(&mut state);
        state.annotations.insert(
            id,
            Annotation {
                id,
                item_id: item,
                body: body.to_string(),
                created_at,
            },
        );
        Ok(id)
    }

    async fn edit_annotation(&self, id: AnnotationId, body: &str) -> TrackerResult<bool> {
        let mut state = self.online()?;
        state.calls.push(TrackerCall::EditAnnotation {
            id,
            body: body.to_string(),
        });
        if state.locked.contains(&id) {
            return Err(TrackerError::Rejected(format!("annotation {} is not owned by caller", id)));
        }
        let annotation = state
            .annotations
            .get_mut(&id)
            .ok_or_else(|| TrackerError::NotFound(format!("annotation {}", id)))?;
        annotation.body = body.to_string();
        Ok(true)
    }

    async fn list_annotations(&self, item: ItemId) -> TrackerResult<Vec<Annotation>> {
        let state = self.online()?;
        Ok(state
            .annotations
            .values()
            .filter(|a| a.item_id == item)
            .cloned()
            .collect())
    }

    async fn write_structured_relation(&self, from: ItemId, to: ItemId, kind: RelationKind) -> TrackerResult<bool> {
        let mut state = self.online()?;
        state.calls.push(TrackerCall::WriteRelation { from, to, kind });
        if !state.native_kinds.contains(&kind) {
            return Err(TrackerError::Unsupported(format!("native {} links", kind)));
        }
        state.relations.insert((from, to, kind));
        Ok(true)
    }

    async fn probe_structured_relations(&self) -> TrackerResult<bool> {
        let state = self.online()?;
        Ok(!state.native_kinds.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn created_items_get_increasing_ids_and_timestamps() {
        let tracker = InMemoryTracker::new();
        let a = tracker.create_item("A", "", &[]).await.unwrap();
        let b = tracker.create_item("B", "", &["deps".to_string()]).await.unwrap();

        assert!(b > a);
        let (ia, ib) = (tracker.item(a).unwrap(), tracker.item(b).unwrap());
        assert!(ib.created_at > ia.created_at);
        assert_eq!(tracker.labels(b), vec!["deps".to_string()]);
    }

    #[tokio::test]
    async fn list_items_filters_by_status() {
        let tracker = InMemoryTracker::new();
        tracker.seed_item("Payments", ItemStatus::Active);
        tracker.seed_item("Payments", ItemStatus::Retired);

        let all = tracker.list_items("Payments", StatusFilter::Any).await.unwrap();
        let active = tracker.list_items("payments", StatusFilter::Active).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn locked_annotations_reject_edits() {
        let tracker = InMemoryTracker::new();
        let item = tracker.seed_item("A", ItemStatus::Active);
        let note = tracker.seed_annotation(item, "hello");
        tracker.lock_annotation(note);

        let err = tracker.edit_annotation(note, "changed").await.unwrap_err();
        assert!(matches!(err, TrackerError::Rejected(_)));
        assert_eq!(tracker.annotations(item)[0].body, "hello");
    }

    #[tokio::test]
    async fn relations_unsupported_by_default() {
        let tracker = InMemoryTracker::new();
        let a = tracker.seed_item("A", ItemStatus::Active);
        let b = tracker.seed_item("B", ItemStatus::Active);

        assert!(!tracker.probe_structured_relations().await.unwrap());
        let err = tracker
            .write_structured_relation(a, b, RelationKind::Blocks)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Unsupported(_)));
    }

    #[tokio::test]
    async fn offline_tracker_reports_connectivity() {
        let tracker = InMemoryTracker::new();
        tracker.set_offline(true);
        let err = tracker.list_items("A", StatusFilter::Any).await.unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn seeding_is_not_logged() {
        let tracker = InMemoryTracker::new();
        let item = tracker.seed_item("A", ItemStatus::Active);
        tracker.seed_annotation(item, "note");
        assert!(tracker.mutations().is_empty());

        tracker.create_annotation(item, "second").await.unwrap();
        assert_eq!(tracker.mutations().len(), 1);
    }
}

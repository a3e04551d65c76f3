//! Common test utilities for reconciliation runs
//!
//! Builds source workspaces, runs the reconciler against an
//! `InMemoryTracker`, and inspects the tracker afterwards.

pub mod workspace;

pub use workspace::{item_source, Workspace};

use depweave::reconcile::summary::current_summaries;
use depweave::tracker::{Annotation, TrackerCall};
use depweave::{Config, InMemoryTracker, ItemId, ItemStatus, ReconcileResult, Reconciler, RunReport, Tracker};
use std::sync::Arc;

/// Run one reconciliation against `tracker`.
pub async fn run(tracker: &Arc<InMemoryTracker>, config: &Config) -> ReconcileResult<RunReport> {
    let tracker: Arc<dyn Tracker> = tracker.clone();
    Reconciler::new(tracker, config.clone()).run().await
}

/// Active items with exactly `title`.
pub fn active_ids(tracker: &InMemoryTracker, title: &str) -> Vec<ItemId> {
    tracker
        .items()
        .into_iter()
        .filter(|i| i.title == title && i.status == ItemStatus::Active)
        .map(|i| i.id)
        .collect()
}

/// The single active id for `title`, panicking otherwise.
pub fn only_active(tracker: &InMemoryTracker, title: &str) -> ItemId {
    let ids = active_ids(tracker, title);
    assert_eq!(ids.len(), 1, "expected one active '{}', found {:?}", title, ids);
    ids[0]
}

/// Current summaries on `item`.
pub fn summaries(tracker: &InMemoryTracker, item: ItemId) -> Vec<Annotation> {
    let annotations = tracker.annotations(item);
    current_summaries(&annotations).into_iter().cloned().collect()
}

/// Whether any annotation on `item` has exactly `text` as its body.
pub fn has_annotation(tracker: &InMemoryTracker, item: ItemId, text: &str) -> bool {
    tracker.annotations(item).iter().any(|a| a.body == text)
}

pub fn count_calls(tracker: &InMemoryTracker, pred: impl Fn(&TrackerCall) -> bool) -> usize {
    tracker.mutations().iter().filter(|c| pred(c)).count()
}

//! Canonicalization: exactly one active item per title
//!
//! Missing titles get a new item. Extra active items sharing a title are
//! pointed at the canonical one and retired.

use super::context::ReconciliationContext;
use super::dry_run::{MutationGate, Outcome};
use super::identity::{resolve_title, Resolution};
use crate::error::ReconcileError;
use crate::graph::Title;
use crate::tracker::{ItemId, ItemStatus};
use std::collections::BTreeSet;
use tracing::{info, warn};

const DUPLICATE_MARKER_PREFIX: &str = "<!-- depweave:duplicate-of:";

/// Machine marker identifying a duplicate notice for `canonical`.
pub fn duplicate_marker(canonical: ItemId) -> String {
    format!("{}{} -->", DUPLICATE_MARKER_PREFIX, canonical.0)
}

/// Body of the annotation posted on a duplicate before it is retired.
pub fn duplicate_notice(canonical: ItemId) -> String {
    format!("{}\nDuplicate of {}", duplicate_marker(canonical), canonical)
}

/// Settings for items the reconciler creates
#[derive(Debug, Clone, Copy)]
pub struct NewItemTemplate<'a> {
    pub body: &'a str,
    pub labels: &'a [String],
}

/// Create an item for every title lacking an active canonical id that a
/// relation or the static configuration refers to.
///
/// Titles whose lookup failed are left alone.
pub async fn create_missing(
    ctx: &mut ReconciliationContext,
    gate: &mut MutationGate<'_>,
    template: NewItemTemplate<'_>,
    static_titles: &[Title],
) {
    let referenced: BTreeSet<&Title> = ctx.graph.titles().into_iter().chain(static_titles).collect();
    let mut missing = Vec::new();
    let mut skipped = 0;
    for title in referenced {
        if ctx.identity.active_id(title).is_some() {
            continue;
        }
        if ctx.lookup_failed.contains(title) {
            info!(%title, "lookup failed earlier, not creating");
            skipped += 1;
            continue;
        }
        missing.push(title.clone());
    }
    ctx.report.items_skipped += skipped;

    for title in missing {
        match gate.create_item(&title, template.body, template.labels).await {
            Ok(Outcome::Applied(created)) => {
                ctx.report.items_created += 1;
                let resolution = match resolve_title(gate.tracker(), &title).await {
                    Ok(Some(found)) if found.status == ItemStatus::Active => found,
                    Ok(_) => {
                        info!(%title, id = %created, "new item not yet searchable, using created id");
                        Resolution::active(created)
                    }
                    Err(e) => {
                        warn!(%title, error = %e, "re-query after create failed, using created id");
                        Resolution::active(created)
                    }
                };
                ctx.identity.insert(title, resolution);
            }
            Ok(Outcome::Skipped) => {}
            Err(e) => ctx
                .report
                .warn(&ReconcileError::NotFound(format!("'{}' could not be created: {}", title, e))),
        }
    }
}

/// Annotate and retire every active duplicate of a canonical item.
pub async fn retire_duplicates(ctx: &mut ReconciliationContext, gate: &mut MutationGate<'_>) {
    let work: Vec<(Title, ItemId, Vec<ItemId>)> = ctx
        .identity
        .iter()
        .filter(|(_, r)| !r.duplicates.is_empty())
        .map(|(t, r)| (t.clone(), r.canonical, r.duplicates.clone()))
        .collect();

    for (title, canonical, duplicates) in work {
        for duplicate in duplicates {
            if let Err(e) = redirect_duplicate(ctx, gate, canonical, duplicate).await {
                ctx.report.warn(&e);
                continue;
            }
            match gate.retire_item(duplicate).await {
                Ok(Outcome::Applied(_)) => {
                    ctx.report.duplicates_retired += 1;
                    info!(%title, %duplicate, %canonical, "retired duplicate");
                }
                Ok(Outcome::Skipped) => {}
                Err(e) => ctx.report.warn(&ReconcileError::Tracker(e)),
            }
        }
        if let Some(resolution) = ctx.identity.get_mut(&title) {
            resolution.duplicates.clear();
        }
    }
}

/// Post the "Duplicate of" notice on `duplicate` unless it already has one.
async fn redirect_duplicate(
    ctx: &mut ReconciliationContext,
    gate: &mut MutationGate<'_>,
    canonical: ItemId,
    duplicate: ItemId,
) -> Result<(), ReconcileError> {
    let marker = duplicate_marker(canonical);
    let existing = ctx.annotations.get(gate.tracker(), duplicate).await?;
    if existing.iter().any(|a| a.body.contains(&marker)) {
        return Ok(());
    }
    let notice = duplicate_notice(canonical);
    if let Outcome::Applied(id) = gate.create_annotation(duplicate, &notice).await? {
        ctx.annotations.record(duplicate, id, &notice, ctx.started_at);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkMode;
    use crate::graph::Origin;
    use crate::reconcile::identity::resolve_identities;
    use crate::tracker::{InMemoryTracker, TrackerCall};

    const NO_LABELS: &[String] = &[];

    fn template() -> NewItemTemplate<'static> {
        NewItemTemplate {
            body: "created",
            labels: NO_LABELS,
        }
    }

    async fn context_for(tracker: &InMemoryTracker, titles: &[&str]) -> ReconciliationContext {
        let mut ctx = ReconciliationContext::new(LinkMode::Auto, false);
        ctx.titles.extend(titles.iter().map(Title::new));
        resolve_identities(&mut ctx, tracker).await.unwrap();
        ctx
    }

    #[tokio::test]
    async fn creates_missing_and_retired_titles() {
        let tracker = InMemoryTracker::new();
        let old = tracker.seed_item("Retired", ItemStatus::Retired);
        let live = tracker.seed_item("Live", ItemStatus::Active);
        let mut ctx = context_for(&tracker, &["Live", "Missing", "Retired", "Unlinked"]).await;
        ctx.graph.depends_on("Live", "Missing", Origin::Extracted);
        let mut gate = MutationGate::new(&tracker, false);

        create_missing(&mut ctx, &mut gate, template(), &[Title::new("Retired")]).await;

        assert_eq!(ctx.report.items_created, 2);
        assert_eq!(ctx.identity.id(&Title::new("Unlinked")), None);
        assert_eq!(ctx.identity.active_id(&Title::new("Live")), Some(live));
        let missing = ctx.identity.active_id(&Title::new("Missing")).unwrap();
        let revived = ctx.identity.active_id(&Title::new("Retired")).unwrap();
        assert_ne!(revived, old);
        assert_eq!(tracker.item(missing).unwrap().title, "Missing");
    }

    #[tokio::test]
    async fn failed_lookup_is_not_treated_as_missing() {
        let tracker = InMemoryTracker::new();
        let checkout = tracker.seed_item("Checkout", ItemStatus::Active);
        tracker.seed_item("Payments", ItemStatus::Active);
        tracker.reject_next_lookup("Payments");
        let mut ctx = context_for(&tracker, &["Checkout", "Payments"]).await;
        ctx.graph.depends_on("Checkout", "Payments", Origin::Extracted);
        let mut gate = MutationGate::new(&tracker, false);

        create_missing(&mut ctx, &mut gate, template(), &[]).await;

        assert!(ctx.lookup_failed.contains(&Title::new("Payments")));
        assert_eq!(ctx.report.items_created, 0);
        assert_eq!(ctx.report.items_skipped, 1);
        assert_eq!(ctx.identity.active_id(&Title::new("Checkout")), Some(checkout));
        assert!(tracker.mutations().is_empty());
        assert_eq!(tracker.items().len(), 2);
    }

    #[tokio::test]
    async fn duplicates_are_annotated_then_retired_once() {
        let tracker = InMemoryTracker::new();
        let canonical = tracker.seed_item("Payments", ItemStatus::Active);
        let dup = tracker.seed_item("Payments", ItemStatus::Active);
        let mut ctx = context_for(&tracker, &["Payments"]).await;
        let mut gate = MutationGate::new(&tracker, false);

        retire_duplicates(&mut ctx, &mut gate).await;

        assert_eq!(ctx.report.duplicates_retired, 1);
        assert_eq!(tracker.item(dup).unwrap().status, ItemStatus::Retired);
        let notes = tracker.annotations(dup);
        assert_eq!(notes.len(), 1);
        assert!(notes[0].body.contains(&format!("Duplicate of {}", canonical)));

        // Second run: the duplicate is retired, nothing left to do
        tracker.clear_calls();
        let mut ctx = context_for(&tracker, &["Payments"]).await;
        let mut gate = MutationGate::new(&tracker, false);
        retire_duplicates(&mut ctx, &mut gate).await;
        assert!(tracker.mutations().is_empty());
    }

    #[tokio::test]
    async fn existing_notice_is_not_reposted() {
        let tracker = InMemoryTracker::new();
        let canonical = tracker.seed_item("Payments", ItemStatus::Active);
        let dup = tracker.seed_item("Payments", ItemStatus::Active);
        tracker.seed_annotation(dup, &duplicate_notice(canonical));
        let mut ctx = context_for(&tracker, &["Payments"]).await;
        let mut gate = MutationGate::new(&tracker, false);

        retire_duplicates(&mut ctx, &mut gate).await;

        assert_eq!(tracker.mutations(), vec![TrackerCall::RetireItem { id: dup }]);
    }

    #[tokio::test]
    async fn dry_run_plans_creation_without_ids() {
        let tracker = InMemoryTracker::new();
        let mut ctx = context_for(&tracker, &["Missing"]).await;
        let mut gate = MutationGate::new(&tracker, true);

        create_missing(&mut ctx, &mut gate, template(), &[Title::new("Missing")]).await;

        assert!(tracker.mutations().is_empty());
        assert_eq!(ctx.identity.id(&Title::new("Missing")), None);
        assert_eq!(gate.planned().len(), 1);
    }
}

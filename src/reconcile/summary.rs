//! Summary Synchronizer: one current relationship summary per item
//!
//! A summary is an annotation that starts with [`SUMMARY_MARKER`]. Older
//! copies are demoted, either by rewriting their marker to
//! [`SUPERSEDED_MARKER`] or, when the tracker refuses the edit, by replying
//! with a supersession note naming the old annotation. Demoted copies never
//! count as current again.

use super::context::ReconciliationContext;
use super::dry_run::{MutationGate, Outcome};
use super::identity::IdentityMap;
use crate::error::ReconcileError;
use crate::graph::{RelationGraph, RelationKind, Title};
use crate::tracker::{Annotation, AnnotationId, ItemId};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;
use tracing::{debug, info};

pub const SUMMARY_MARKER: &str = "<!-- depweave:summary:current -->";
pub const SUPERSEDED_MARKER: &str = "<!-- depweave:summary:superseded -->";
const NOTE_PREFIX: &str = "<!-- depweave:superseded:";

const ROWS: [(&str, RelationKind); 3] = [
    ("Depends on", RelationKind::DependsOn),
    ("Blocks", RelationKind::Blocks),
    ("Related to", RelationKind::RelatesTo),
];

/// Marker of the note posted when `old` could not be demoted in place.
pub fn supersession_marker(old: AnnotationId) -> String {
    format!("{}{} -->", NOTE_PREFIX, old.0)
}

pub fn supersession_note(old: AnnotationId) -> String {
    format!(
        "{}\nRelationship summary {} is superseded by a newer one.",
        supersession_marker(old),
        old
    )
}

/// Build the summary body for `title`.
///
/// Targets are listed as `#id title`, or just the title when the target has
/// no active item yet.
pub fn compose_summary(title: &Title, graph: &RelationGraph, identity: &IdentityMap, generated_at: DateTime<Utc>) -> String {
    let mut body = format!("{}\n**Relationship summary**\n", SUMMARY_MARKER);
    for (label, kind) in ROWS {
        let targets: Vec<String> = graph
            .targets(title, kind)
            .into_iter()
            .map(|t| match identity.active_id(t) {
                Some(id) => format!("{} {}", id, t),
                None => t.to_string(),
            })
            .collect();
        let list = if targets.is_empty() {
            "None".to_string()
        } else {
            targets.join(", ")
        };
        body.push_str(&format!("- {}: {}\n", label, list));
    }
    body.push_str(&format!(
        "_Generated at {}_",
        generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    body
}

/// Ids named by supersession notes in `annotations`.
fn superseded_ids(annotations: &[Annotation]) -> HashSet<AnnotationId> {
    annotations
        .iter()
        .flat_map(|a| a.body.match_indices(NOTE_PREFIX).map(move |(i, _)| &a.body[i + NOTE_PREFIX.len()..]))
        .filter_map(|rest| {
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok().map(AnnotationId)
        })
        .collect()
}

/// Current summaries, oldest first.
pub fn current_summaries(annotations: &[Annotation]) -> Vec<&Annotation> {
    let demoted = superseded_ids(annotations);
    let mut current: Vec<&Annotation> = annotations
        .iter()
        .filter(|a| a.body.contains(SUMMARY_MARKER) && !demoted.contains(&a.id))
        .collect();
    current.sort_by_key(|a| (a.created_at, a.id));
    current
}

/// Result of refreshing an existing summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// Rewritten in place
    Edited,
    /// The edit was refused; a new summary replaced the old one
    FallbackCreated(AnnotationId),
    /// Neither the edit nor the replacement worked
    Failed(String),
}

/// Edit `old` to `body`; if the tracker refuses, post `body` as a new
/// annotation and demote `old`.
pub async fn edit_or_replace(
    ctx: &mut ReconciliationContext,
    gate: &mut MutationGate<'_>,
    item: ItemId,
    old: AnnotationId,
    body: &str,
) -> EditOutcome {
    let reason = match gate.edit_annotation(old, body).await {
        Ok(Outcome::Applied(true)) => {
            ctx.annotations.update(item, old, body);
            return EditOutcome::Edited;
        }
        Ok(Outcome::Skipped) => return EditOutcome::Edited,
        Ok(Outcome::Applied(false)) => "tracker left the annotation unchanged".to_string(),
        Err(e) => e.to_string(),
    };
    ctx.report.warn(&ReconcileError::MutationConflict {
        annotation: old,
        reason: reason.clone(),
    });

    match gate.create_annotation(item, body).await {
        Ok(Outcome::Applied(id)) => {
            ctx.annotations.record(item, id, body, ctx.started_at);
            if let Err(e) = demote(ctx, gate, item, old).await {
                ctx.report.warn(&e);
            }
            EditOutcome::FallbackCreated(id)
        }
        Ok(Outcome::Skipped) => EditOutcome::Edited,
        Err(e) => EditOutcome::Failed(format!("{}; replacement failed: {}", reason, e)),
    }
}

/// Mark `old` as no longer current.
async fn demote(
    ctx: &mut ReconciliationContext,
    gate: &mut MutationGate<'_>,
    item: ItemId,
    old: AnnotationId,
) -> Result<(), ReconcileError> {
    let annotations = ctx.annotations.get(gate.tracker(), item).await?;
    let body = annotations
        .iter()
        .find(|a| a.id == old)
        .map(|a| a.body.replacen(SUMMARY_MARKER, SUPERSEDED_MARKER, 1))
        .unwrap_or_else(|| SUPERSEDED_MARKER.to_string());

    match gate.edit_annotation(old, &body).await {
        Ok(Outcome::Applied(true)) => {
            ctx.annotations.update(item, old, &body);
            debug!(annotation = %old, "summary demoted in place");
            return Ok(());
        }
        Ok(Outcome::Skipped) => return Ok(()),
        Ok(Outcome::Applied(false)) => {}
        Err(e) => debug!(annotation = %old, error = %e, "in-place demotion refused, posting note"),
    }

    let marker = supersession_marker(old);
    let annotations = ctx.annotations.get(gate.tracker(), item).await?;
    if annotations.iter().any(|a| a.body.contains(&marker)) {
        return Ok(());
    }
    let note = supersession_note(old);
    if let Outcome::Applied(id) = gate.create_annotation(item, &note).await? {
        ctx.annotations.record(item, id, &note, ctx.started_at);
    }
    Ok(())
}

/// Bring one item's summaries to exactly one current copy.
pub async fn sync_item(
    ctx: &mut ReconciliationContext,
    gate: &mut MutationGate<'_>,
    title: &Title,
    item: ItemId,
) -> Result<(), ReconcileError> {
    let body = compose_summary(title, &ctx.graph, &ctx.identity, ctx.started_at);
    let existing: Vec<AnnotationId> = current_summaries(ctx.annotations.get(gate.tracker(), item).await?)
        .into_iter()
        .map(|a| a.id)
        .collect();
    let live = !gate.is_dry_run();

    let Some((&keep, older)) = existing.split_last() else {
        if let Outcome::Applied(id) = gate.create_annotation(item, &body).await? {
            ctx.annotations.record(item, id, &body, ctx.started_at);
            ctx.report.summaries_created += 1;
            info!(%title, %item, annotation = %id, "summary created");
        }
        return Ok(());
    };

    match edit_or_replace(ctx, gate, item, keep, &body).await {
        EditOutcome::Edited => {
            if live {
                ctx.report.summaries_edited += 1;
            }
        }
        EditOutcome::FallbackCreated(id) => {
            ctx.report.summaries_replaced += 1;
            info!(%title, %item, old = %keep, new = %id, "summary replaced");
        }
        EditOutcome::Failed(reason) => {
            ctx.report.warn(&ReconcileError::MutationConflict {
                annotation: keep,
                reason,
            });
        }
    }

    for &old in older {
        demote(ctx, gate, item, old).await?;
        if live {
            ctx.report.summaries_demoted += 1;
        }
        info!(%title, %item, annotation = %old, "extra summary demoted");
    }
    Ok(())
}

/// Sync the summary of every related item that has an active id.
pub async fn sync_summaries(ctx: &mut ReconciliationContext, gate: &mut MutationGate<'_>) {
    let titles: Vec<Title> = ctx.graph.titles().into_iter().cloned().collect();
    for title in titles {
        let Some(item) = ctx.identity.active_id(&title) else {
            if !ctx.lookup_failed.contains(&title) {
                gate.defer(format!("publish summary for '{}'", title));
            }
            continue;
        };
        if let Err(e) = sync_item(ctx, gate, &title, item).await {
            ctx.report.warn(&e);
        }
    }
}

//! MutationGate: the dry-run controller
//!
//! Every call that changes tracker state goes through the gate. With dry-run
//! off it forwards to the tracker. With dry-run on it logs the exact action,
//! records it as a `PlannedAction`, and answers `Outcome::Skipped` so later
//! stages carry on with the ids they already have.

use crate::graph::{RelationKind, Title};
use crate::tracker::{AnnotationId, ItemId, Tracker, TrackerResult};
use serde::Serialize;
use std::fmt;
use tracing::info;

/// Result of a gated mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The tracker performed the mutation
    Applied(T),
    /// Dry run: nothing was sent
    Skipped,
}

/// An action a dry run would have performed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedAction {
    CreateItem { title: Title, labels: Vec<String> },
    RetireItem { id: ItemId },
    CreateAnnotation { item: ItemId, body: String },
    EditAnnotation { id: AnnotationId, body: String },
    WriteRelation { from: ItemId, to: ItemId, kind: RelationKind },
    /// Needs an id that only exists after an earlier planned action
    Deferred { description: String },
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateItem { title, labels } if labels.is_empty() => write!(f, "create item '{}'", title),
            Self::CreateItem { title, labels } => {
                write!(f, "create item '{}' [{}]", title, labels.join(", "))
            }
            Self::RetireItem { id } => write!(f, "retire item {}", id),
            Self::CreateAnnotation { item, body } => {
                write!(f, "annotate {}: {}", item, first_line(body))
            }
            Self::EditAnnotation { id, body } => {
                write!(f, "edit annotation {}: {}", id, first_line(body))
            }
            Self::WriteRelation { from, to, kind } => write!(f, "link {} {} {}", from, kind, to),
            Self::Deferred { description } => write!(f, "after creation: {}", description),
        }
    }
}

fn first_line(body: &str) -> &str {
    body.lines().find(|l| !l.trim().is_empty()).unwrap_or("")
}

/// Wraps a tracker so mutations respect the run's dry-run flag
pub struct MutationGate<'a> {
    tracker: &'a dyn Tracker,
    dry_run: bool,
    planned: Vec<PlannedAction>,
}

impl<'a> MutationGate<'a> {
    pub fn new(tracker: &'a dyn Tracker, dry_run: bool) -> Self {
        Self {
            tracker,
            dry_run,
            planned: Vec::new(),
        }
    }

    /// Read access, never gated.
    pub fn tracker(&self) -> &'a dyn Tracker {
        self.tracker
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn planned(&self) -> &[PlannedAction] {
        &self.planned
    }

    pub fn into_planned(self) -> Vec<PlannedAction> {
        self.planned
    }

    fn plan(&mut self, action: PlannedAction) {
        info!("dry-run: would {}", action);
        self.planned.push(action);
    }

    /// Record an action that cannot be stated precisely yet.
    pub fn defer(&mut self, description: impl Into<String>) {
        if self.dry_run {
            self.plan(PlannedAction::Deferred {
                description: description.into(),
            });
        }
    }

    pub async fn create_item(&mut self, title: &Title, body: &str, labels: &[String]) -> TrackerResult<Outcome<ItemId>> {
        if self.dry_run {
            self.plan(PlannedAction::CreateItem {
                title: title.clone(),
                labels: labels.to_vec(),
            });
            return Ok(Outcome::Skipped);
        }
        let id = self.tracker.create_item(title.as_str(), body, labels).await?;
        info!(%title, %id, "created item");
        Ok(Outcome::Applied(id))
    }

    pub async fn retire_item(&mut self, id: ItemId) -> TrackerResult<Outcome<bool>> {
        if self.dry_run {
            self.plan(PlannedAction::RetireItem { id });
            return Ok(Outcome::Skipped);
        }
        let changed = self.tracker.retire_item(id).await?;
        info!(%id, changed, "retired item");
        Ok(Outcome::Applied(changed))
    }

    pub async fn create_annotation(&mut self, item: ItemId, body: &str) -> TrackerResult<Outcome<AnnotationId>> {
        if self.dry_run {
            self.plan(PlannedAction::CreateAnnotation {
                item,
                body: body.to_string(),
            });
            return Ok(Outcome::Skipped);
        }
        let id = self.tracker.create_annotation(item, body).await?;
        info!(%item, annotation = %id, "created annotation");
        Ok(Outcome::Applied(id))
    }

    pub async fn edit_annotation(&mut self, id: AnnotationId, body: &str) -> TrackerResult<Outcome<bool>> {
        if self.dry_run {
            self.plan(PlannedAction::EditAnnotation {
                id,
                body: body.to_string(),
            });
            return Ok(Outcome::Skipped);
        }
        let edited = self.tracker.edit_annotation(id, body).await?;
        info!(annotation = %id, "edited annotation");
        Ok(Outcome::Applied(edited))
    }

    pub async fn write_relation(&mut self, from: ItemId, to: ItemId, kind: RelationKind) -> TrackerResult<Outcome<bool>> {
        if self.dry_run {
            self.plan(PlannedAction::WriteRelation { from, to, kind });
            return Ok(Outcome::Skipped);
        }
        let written = self.tracker.write_structured_relation(from, to, kind).await?;
        info!(%from, %to, %kind, "wrote native relation");
        Ok(Outcome::Applied(written))
    }
}

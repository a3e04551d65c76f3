//! Link Applier: writes every graph edge to the tracker
//!
//! The strategy is picked once per run from a single capability probe.
//! Native links are tried first when available; the first native failure
//! switches the rest of the run to annotation markers, and the failed edge
//! is retried with markers straight away.

use super::context::ReconciliationContext;
use super::dry_run::{MutationGate, Outcome};
use crate::config::LinkMode;
use crate::error::{ReconcileError, ReconcileResult};
use crate::graph::{Relation, RelationKind};
use crate::tracker::{ItemId, Tracker};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// How relations can be written for this run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Native,
    AnnotationOnly,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str("native"),
            Self::AnnotationOnly => f.write_str("annotation-only"),
        }
    }
}

/// Marker text posted on `from` for an edge of `kind` to `to`.
pub fn marker_text(kind: RelationKind, to: ItemId) -> String {
    match kind {
        RelationKind::DependsOn => format!("blocked by {}", to),
        RelationKind::Blocks => format!("blocks {}", to),
        RelationKind::RelatesTo => format!("related to {}", to),
    }
}

/// Whether `body` contains `marker` as a whole reference: `#12` must not
/// match inside `#123`, and `blocks #4` must not match `unblocks #4`.
pub fn contains_marker(body: &str, marker: &str) -> bool {
    let body = body.to_lowercase();
    let marker = marker.to_lowercase();
    body.match_indices(&marker).any(|(start, _)| {
        let before_ok = body[..start].chars().next_back().map_or(true, |c| !c.is_alphanumeric());
        let after_ok = body[start + marker.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_ascii_digit());
        before_ok && after_ok
    })
}

/// What applying one edge did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Native relation written
    Written,
    /// Marker annotation posted
    Posted,
    /// The tracker already had this link or marker
    AlreadyPresent,
    /// Dry run: recorded as a planned action
    Planned,
}

/// One way of writing an edge to the tracker
#[async_trait]
pub trait LinkStrategy: Send + Sync {
    fn capability(&self) -> Capability;

    async fn apply<'g>(
        &self,
        ctx: &mut ReconciliationContext,
        gate: &mut MutationGate<'g>,
        from: ItemId,
        to: ItemId,
        kind: RelationKind,
    ) -> ReconcileResult<LinkOutcome>;
}

/// Structured relations through the tracker's own link API
pub struct NativeLinks;

#[async_trait]
impl LinkStrategy for NativeLinks {
    fn capability(&self) -> Capability {
        Capability::Native
    }

    async fn apply<'g>(
        &self,
        _ctx: &mut ReconciliationContext,
        gate: &mut MutationGate<'g>,
        from: ItemId,
        to: ItemId,
        kind: RelationKind,
    ) -> ReconcileResult<LinkOutcome> {
        match gate.write_relation(from, to, kind).await {
            Ok(Outcome::Applied(true)) => Ok(LinkOutcome::Written),
            Ok(Outcome::Applied(false)) => Ok(LinkOutcome::AlreadyPresent),
            Ok(Outcome::Skipped) => Ok(LinkOutcome::Planned),
            Err(e) => Err(ReconcileError::CapabilityUnavailable(format!(
                "native {} link {} -> {} failed: {}",
                kind, from, to, e
            ))),
        }
    }
}

/// Plain-text markers posted as annotations on the `from` item
pub struct AnnotationLinks;

#[async_trait]
impl LinkStrategy for AnnotationLinks {
    fn capability(&self) -> Capability {
        Capability::AnnotationOnly
    }

    async fn apply<'g>(
        &self,
        ctx: &mut ReconciliationContext,
        gate: &mut MutationGate<'g>,
        from: ItemId,
        to: ItemId,
        kind: RelationKind,
    ) -> ReconcileResult<LinkOutcome> {
        let marker = marker_text(kind, to);
        let existing = ctx.annotations.get(gate.tracker(), from).await?;
        if existing.iter().any(|a| contains_marker(&a.body, &marker)) {
            debug!(%from, %marker, "marker already present");
            return Ok(LinkOutcome::AlreadyPresent);
        }
        match gate.create_annotation(from, &marker).await? {
            Outcome::Applied(id) => {
                ctx.annotations.record(from, id, &marker, ctx.started_at);
                Ok(LinkOutcome::Posted)
            }
            Outcome::Skipped => Ok(LinkOutcome::Planned),
        }
    }
}

/// Applies the relation graph with the run's chosen strategy
pub struct LinkApplier {
    strategy: Box<dyn LinkStrategy>,
}

impl LinkApplier {
    pub fn new(capability: Capability) -> Self {
        let strategy: Box<dyn LinkStrategy> = match capability {
            Capability::Native => Box::new(NativeLinks),
            Capability::AnnotationOnly => Box::new(AnnotationLinks),
        };
        Self { strategy }
    }

    /// Probe once and build the applier. The result is cached in `ctx`.
    pub async fn for_run(ctx: &mut ReconciliationContext, tracker: &dyn Tracker) -> Self {
        let capability = match ctx.link_mode {
            LinkMode::AnnotationOnly => Capability::AnnotationOnly,
            LinkMode::Auto => match tracker.probe_structured_relations().await {
                Ok(true) => Capability::Native,
                Ok(false) => {
                    info!("tracker has no native relation links; using annotation markers");
                    Capability::AnnotationOnly
                }
                Err(e) => {
                    ctx.report.warn(&ReconcileError::CapabilityUnavailable(format!("probe failed: {}", e)));
                    Capability::AnnotationOnly
                }
            },
        };
        info!(%capability, "link capability");
        ctx.capability = Some(capability);
        Self::new(capability)
    }

    pub fn capability(&self) -> Capability {
        self.strategy.capability()
    }

    fn fall_back(&mut self, ctx: &mut ReconciliationContext) {
        warn!("switching to annotation markers for the rest of the run");
        self.strategy = Box::new(AnnotationLinks);
        ctx.capability = Some(Capability::AnnotationOnly);
    }

    /// Apply every edge whose endpoints both have an active id.
    pub async fn apply_all(&mut self, ctx: &mut ReconciliationContext, gate: &mut MutationGate<'_>) {
        let edges: Vec<Relation> = ctx.graph.edges().cloned().collect();
        for edge in edges {
            let (Some(from), Some(to)) = (ctx.identity.active_id(&edge.from), ctx.identity.active_id(&edge.to)) else {
                let awaits_creation =
                    !ctx.lookup_failed.contains(&edge.from) && !ctx.lookup_failed.contains(&edge.to);
                if gate.is_dry_run() && awaits_creation {
                    gate.defer(format!("link '{}' {} '{}'", edge.from, edge.kind, edge.to));
                } else {
                    debug!(%edge, "endpoint unresolved, skipped");
                }
                continue;
            };

            let result = match self.strategy.apply(ctx, gate, from, to, edge.kind).await {
                Err(e @ ReconcileError::CapabilityUnavailable(_)) => {
                    ctx.report.warn(&e);
                    self.fall_back(ctx);
                    self.strategy.apply(ctx, gate, from, to, edge.kind).await
                }
                other => other,
            };

            match result {
                Ok(outcome) => {
                    debug!(%edge, ?outcome, "edge applied");
                    record(ctx, outcome);
                }
                Err(e) => ctx.report.warn(&e),
            }
        }
    }
}

fn record(ctx: &mut ReconciliationContext, outcome: LinkOutcome) {
    match outcome {
        LinkOutcome::Written => ctx.report.links_native += 1,
        LinkOutcome::Posted => ctx.report.links_fallback += 1,
        LinkOutcome::AlreadyPresent => ctx.report.links_present += 1,
        LinkOutcome::Planned => {}
    }
}

//! Per-run state threaded through every stage
//!
//! A `ReconciliationContext` is built when a run starts and dropped when it
//! ends. Nothing in it is persisted: the next run re-derives everything from
//! the tracker.

use super::dry_run::PlannedAction;
use super::identity::{AliasTable, IdentityMap};
use super::link::Capability;
use crate::config::LinkMode;
use crate::error::ReconcileError;
use crate::graph::{RelationGraph, Title};
use crate::tracker::{Annotation, AnnotationId, ItemId, Tracker, TrackerResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tracing::warn;

/// Annotations fetched during the run, keyed by item.
///
/// Annotations the run itself creates or edits are folded in, so later
/// stages see the run's own writes without re-listing.
#[derive(Debug, Default)]
pub struct AnnotationCache {
    by_item: HashMap<ItemId, Vec<Annotation>>,
}

impl AnnotationCache {
    pub async fn get(&mut self, tracker: &dyn Tracker, item: ItemId) -> TrackerResult<&[Annotation]> {
        if !self.by_item.contains_key(&item) {
            let fetched = tracker.list_annotations(item).await?;
            self.by_item.insert(item, fetched);
        }
        Ok(self.by_item.get(&item).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// Record an annotation created by this run.
    pub fn record(&mut self, item: ItemId, id: AnnotationId, body: &str, at: DateTime<Utc>) {
        self.by_item.entry(item).or_default().push(Annotation {
            id,
            item_id: item,
            body: body.to_string(),
            created_at: at,
        });
    }

    /// Record an in-place edit made by this run.
    pub fn update(&mut self, item: ItemId, id: AnnotationId, body: &str) {
        if let Some(annotation) = self
            .by_item
            .get_mut(&item)
            .and_then(|list| list.iter_mut().find(|a| a.id == id))
        {
            annotation.body = body.to_string();
        }
    }
}

/// What a run did, and in dry-run mode what it would have done
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub capability: Option<Capability>,
    pub titles: usize,
    pub relations: usize,
    pub items_created: usize,
    /// Titles left alone because their lookup failed
    pub items_skipped: usize,
    pub duplicates_retired: usize,
    pub links_native: usize,
    pub links_fallback: usize,
    pub links_present: usize,
    pub summaries_created: usize,
    pub summaries_edited: usize,
    pub summaries_replaced: usize,
    pub summaries_demoted: usize,
    /// Recovered errors by kind
    pub warnings: BTreeMap<&'static str, usize>,
    pub planned: Vec<PlannedAction>,
}

impl RunReport {
    /// Log a recovered error and count it.
    pub fn warn(&mut self, err: &ReconcileError) {
        warn!(kind = err.kind(), "{}", err);
        *self.warnings.entry(err.kind()).or_default() += 1;
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.values().sum()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        writeln!(f, "Reconciliation report{}", mode)?;
        writeln!(f, "{}", "-".repeat(40))?;
        if let Some(capability) = self.capability {
            writeln!(f, "{:<24}{}", "link capability", capability)?;
        }
        let rows = [
            ("titles", self.titles),
            ("relations", self.relations),
            ("items created", self.items_created),
            ("items skipped", self.items_skipped),
            ("duplicates retired", self.duplicates_retired),
            ("links (native)", self.links_native),
            ("links (fallback)", self.links_fallback),
            ("links already present", self.links_present),
            ("summaries created", self.summaries_created),
            ("summaries edited", self.summaries_edited),
            ("summaries replaced", self.summaries_replaced),
            ("summaries demoted", self.summaries_demoted),
        ];
        for (label, value) in rows {
            writeln!(f, "{:<24}{}", label, value)?;
        }
        for (kind, count) in &self.warnings {
            writeln!(f, "{:<24}{}", format!("warnings: {}", kind), count)?;
        }
        if !self.planned.is_empty() {
            writeln!(f, "\nPlanned actions:")?;
            for action in &self.planned {
                writeln!(f, "  {}", action)?;
            }
        }
        Ok(())
    }
}

/// In-memory state for one reconciliation run
#[derive(Debug)]
pub struct ReconciliationContext {
    pub link_mode: LinkMode,
    pub dry_run: bool,
    /// One timestamp per run, stamped into every summary
    pub started_at: DateTime<Utc>,
    pub aliases: AliasTable,
    pub graph: RelationGraph,
    /// Every title the run must resolve
    pub titles: BTreeSet<Title>,
    pub identity: IdentityMap,
    /// Titles whose lookup failed; never treated as missing
    pub lookup_failed: BTreeSet<Title>,
    /// Probe result, cached for the rest of the run
    pub capability: Option<Capability>,
    pub annotations: AnnotationCache,
    pub report: RunReport,
}

impl ReconciliationContext {
    pub fn new(link_mode: LinkMode, dry_run: bool) -> Self {
        Self {
            link_mode,
            dry_run,
            started_at: Utc::now(),
            aliases: AliasTable::default(),
            graph: RelationGraph::new(),
            titles: BTreeSet::new(),
            identity: IdentityMap::default(),
            lookup_failed: BTreeSet::new(),
            capability: None,
            annotations: AnnotationCache::default(),
            report: RunReport {
                dry_run,
                ..Default::default()
            },
        }
    }

    /// Finish the run, handing back the report.
    pub fn into_report(mut self) -> RunReport {
        self.report.capability = self.capability;
        self.report.titles = self.titles.len();
        self.report.relations = self.graph.len();
        self.report
    }
}

//! Reconciliation pipeline
//!
//! One run reads the sources, folds every relation into a title graph,
//! resolves titles to tracker items, makes each title canonical, writes the
//! links and refreshes the summaries. Every stage shares one
//! [`ReconciliationContext`]; every mutation goes through one
//! [`MutationGate`] so a dry run touches nothing.

pub mod canonical;
pub mod context;
pub mod cooccurrence;
pub mod dry_run;
pub mod extract;
pub mod identity;
pub mod link;
pub mod sources;
pub mod summary;

pub use canonical::NewItemTemplate;
pub use context::{ReconciliationContext, RunReport};
pub use dry_run::{MutationGate, Outcome, PlannedAction};
pub use identity::{resolve_alias, AliasKey, AliasTable, IdentityMap, Resolution};
pub use link::{Capability, LinkApplier, LinkStrategy};
pub use summary::EditOutcome;

use crate::config::Config;
use crate::error::ReconcileResult;
use crate::graph::{Origin, RelationGraph, Title};
use crate::tracker::Tracker;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info};

/// The title graph and alias table derived from sources and configuration
#[derive(Debug, Default)]
pub struct GraphBuild {
    pub graph: RelationGraph,
    pub aliases: AliasTable,
    /// Titles of the item source files
    pub source_titles: Vec<Title>,
    /// Titles named by static configuration
    pub static_titles: Vec<Title>,
}

impl GraphBuild {
    /// Every title the run has to know about.
    pub fn all_titles(&self) -> BTreeSet<Title> {
        self.source_titles
            .iter()
            .chain(&self.static_titles)
            .chain(self.graph.titles())
            .cloned()
            .collect()
    }
}

/// Build the title graph offline. Recovered problems land in `report`.
pub fn build_graph(config: &Config, report: &mut RunReport) -> GraphBuild {
    let documents = config
        .items_dir
        .as_deref()
        .map(|dir| sources::load_item_sources(dir, report))
        .unwrap_or_default();
    let aggregate = config
        .aggregate
        .as_deref()
        .and_then(|path| sources::load_aggregate(path, report));

    let source_titles: Vec<Title> = documents.iter().map(|d| d.title.clone()).collect();
    let static_titles = config.relations.titles();

    let mut aliases = AliasTable::from_titles(source_titles.iter().chain(&static_titles));
    for (alias, title) in &config.aliases {
        aliases.insert(AliasKey::literal(alias), Title::new(title));
    }

    let mut graph = RelationGraph::new();
    for document in &documents {
        let relations = extract::extract_relations(document, &aliases, report);
        graph.extend(relations, Origin::Extracted);
    }
    let static_edges = config.relations.apply(&mut graph);
    let soft_edges = aggregate
        .map(|doc| {
            let relations = cooccurrence::cooccurrence_relations(&doc.text, &aliases, config.cooccurrence);
            graph.extend(relations, Origin::CoOccurrence)
        })
        .unwrap_or(0);

    info!(
        sources = documents.len(),
        aliases = aliases.len(),
        edges = graph.len(),
        static_edges,
        soft_edges,
        "relation graph built"
    );
    GraphBuild {
        graph,
        aliases,
        source_titles,
        static_titles,
    }
}

/// Runs reconciliation against one tracker
pub struct Reconciler {
    tracker: Arc<dyn Tracker>,
    config: Config,
}

impl Reconciler {
    pub fn new(tracker: Arc<dyn Tracker>, config: Config) -> Self {
        Self { tracker, config }
    }

    /// One full run. Only lost connectivity during identity resolution
    /// fails the run; everything else is recovered and reported.
    pub async fn run(&self) -> ReconcileResult<RunReport> {
        let tracker = self.tracker.as_ref();
        let mut ctx = ReconciliationContext::new(self.config.link_mode, self.config.dry_run);
        info!(link_mode = %ctx.link_mode, dry_run = ctx.dry_run, "reconciliation started");

        let build = build_graph(&self.config, &mut ctx.report);
        ctx.titles = build.all_titles();
        ctx.aliases = build.aliases;
        ctx.graph = build.graph;

        if let Err(e) = identity::resolve_identities(&mut ctx, tracker).await {
            error!(error = %e, "identity resolution aborted");
            return Err(e);
        }

        let mut gate = MutationGate::new(tracker, self.config.dry_run);
        let template = NewItemTemplate {
            body: &self.config.new_item_body,
            labels: &self.config.labels,
        };
        canonical::create_missing(&mut ctx, &mut gate, template, &build.static_titles).await;
        canonical::retire_duplicates(&mut ctx, &mut gate).await;

        let mut applier = LinkApplier::for_run(&mut ctx, tracker).await;
        applier.apply_all(&mut ctx, &mut gate).await;

        summary::sync_summaries(&mut ctx, &mut gate).await;

        ctx.report.planned = gate.into_planned();
        let report = ctx.into_report();
        info!(
            created = report.items_created,
            skipped = report.items_skipped,
            warnings = report.warning_count(),
            planned = report.planned.len(),
            "reconciliation finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticRelations;
    use crate::graph::{Relation, RelationKind};
    use std::fs;

    #[test]
    fn build_graph_folds_all_three_sources() {
        let dir = tempfile::tempdir().unwrap();
        let items = dir.path().join("items");
        fs::create_dir(&items).unwrap();
        fs::write(items.join("a.md"), "# Alpha\n\n## Dependencies\n\n- the beta service\n").unwrap();
        fs::write(items.join("b.md"), "# Beta\n").unwrap();
        let roadmap = dir.path().join("ROADMAP.md");
        fs::write(&roadmap, "Beta ships with Gamma.\n").unwrap();

        let config = Config {
            items_dir: Some(items),
            aggregate: Some(roadmap),
            relations: StaticRelations {
                related: vec![["Alpha".into(), "Gamma".into()]],
                infrastructure: Vec::new(),
            },
            ..Config::default()
        };
        let mut report = RunReport::default();
        let build = build_graph(&config, &mut report);

        assert!(build
            .graph
            .contains(&Relation::new("Beta", "Alpha", RelationKind::Blocks)));
        assert!(build
            .graph
            .contains(&Relation::new("Gamma", "Alpha", RelationKind::RelatesTo)));
        assert_eq!(
            build.graph.origins(&Relation::new("Beta", "Gamma", RelationKind::RelatesTo)),
            Some(&BTreeSet::from([Origin::CoOccurrence]))
        );
        assert_eq!(build.all_titles().len(), 3);
        assert_eq!(report.warning_count(), 0);
    }

    #[test]
    fn config_aliases_resolve_prose() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "# Alpha\n\n## Related\n\n- see SSO work\n").unwrap();
        fs::write(dir.path().join("b.md"), "# 02 - Single Sign-On\n").unwrap();

        let mut config = Config {
            items_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        config
            .aliases
            .insert("SSO".into(), "02 - Single Sign-On".into());
        let mut report = RunReport::default();
        let build = build_graph(&config, &mut report);

        assert!(build.graph.contains(&Relation::new(
            "Alpha",
            "02 - Single Sign-On",
            RelationKind::RelatesTo
        )));
    }
}

//! RelationGraph: folds relation streams into a symmetric edge set
//!
//! Every insert also records the inverse edge, so the graph satisfies
//! `depends_on(A,B) ⇔ blocks(B,A)` and `relates_to(A,B) ⇔ relates_to(B,A)`
//! at all times. Edges are keyed by identity and iterate in sorted order.

use super::relation::{Origin, Relation, RelationKind, Title};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A deduplicated, inverse-consistent set of relations between titles
#[derive(Debug, Clone, Default)]
pub struct RelationGraph {
    edges: BTreeMap<Relation, BTreeSet<Origin>>,
}

/// Serializable view of one edge for the `graph` report
#[derive(Debug, Clone, Serialize)]
pub struct EdgeView<'a> {
    pub from: &'a Title,
    pub to: &'a Title,
    pub kind: RelationKind,
    pub origins: Vec<Origin>,
}

impl RelationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a relation and its inverse.
    ///
    /// Returns `true` if the relation was not present before. Self loops are
    /// dropped. Re-inserting an existing edge only adds the origin.
    pub fn insert(&mut self, relation: Relation, origin: Origin) -> bool {
        if relation.is_self_loop() || relation.from.is_empty() || relation.to.is_empty() {
            return false;
        }
        let inverse = relation.inverse();
        let is_new = !self.edges.contains_key(&relation);
        self.edges.entry(relation).or_default().insert(origin);
        self.edges.entry(inverse).or_default().insert(origin);
        is_new
    }

    pub fn depends_on(&mut self, from: impl Into<Title>, to: impl Into<Title>, origin: Origin) -> bool {
        self.insert(Relation::new(from, to, RelationKind::DependsOn), origin)
    }

    pub fn blocks(&mut self, from: impl Into<Title>, to: impl Into<Title>, origin: Origin) -> bool {
        self.insert(Relation::new(from, to, RelationKind::Blocks), origin)
    }

    pub fn relates_to(&mut self, from: impl Into<Title>, to: impl Into<Title>, origin: Origin) -> bool {
        self.insert(Relation::new(from, to, RelationKind::RelatesTo), origin)
    }

    /// Fold a stream of relations sharing one origin.
    pub fn extend(&mut self, relations: impl IntoIterator<Item = Relation>, origin: Origin) -> usize {
        relations
            .into_iter()
            .filter(|r| self.insert(r.clone(), origin))
            .count()
    }

    pub fn contains(&self, relation: &Relation) -> bool {
        self.edges.contains_key(relation)
    }

    /// All edges in deterministic order.
    pub fn edges(&self) -> impl Iterator<Item = &Relation> {
        self.edges.keys()
    }

    pub fn origins(&self, relation: &Relation) -> Option<&BTreeSet<Origin>> {
        self.edges.get(relation)
    }

    /// Targets of `title`'s outgoing edges of one kind, sorted.
    pub fn targets(&self, title: &Title, kind: RelationKind) -> Vec<&Title> {
        self.edges
            .keys()
            .filter(|r| &r.from == title && r.kind == kind)
            .map(|r| &r.to)
            .collect()
    }

    /// Every title that appears as an edge endpoint.
    pub fn titles(&self) -> BTreeSet<&Title> {
        self.edges
            .keys()
            .flat_map(|r| [&r.from, &r.to])
            .collect()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn views(&self) -> Vec<EdgeView<'_>> {
        self.edges
            .iter()
            .map(|(r, origins)| EdgeView {
                from: &r.from,
                to: &r.to,
                kind: r.kind,
                origins: origins.iter().copied().collect(),
            })
            .collect()
    }
}

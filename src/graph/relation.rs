//! Relation representation between work-item titles

use serde::{Deserialize, Serialize};
use std::fmt;

/// Title of a work item, trimmed of surrounding whitespace.
///
/// Titles are the graph's node identity until canonicalization maps
/// each one to a tracker id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Title(String);

impl Title {
    pub fn new(title: impl AsRef<str>) -> Self {
        Self(title.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Title {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Title {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Kind of relationship between two work items
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// `from` cannot proceed until `to` is done
    DependsOn,
    /// `from` must be done before `to`
    Blocks,
    /// Loose, symmetric association
    RelatesTo,
}

impl RelationKind {
    /// The kind stored on the reverse edge.
    pub fn inverse(self) -> Self {
        match self {
            Self::DependsOn => Self::Blocks,
            Self::Blocks => Self::DependsOn,
            Self::RelatesTo => Self::RelatesTo,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DependsOn => "depends_on",
            Self::Blocks => "blocks",
            Self::RelatesTo => "relates_to",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a relation was asserted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// A bullet in an item's Dependencies/Related section
    Extracted,
    /// Statically configured pair
    Static,
    /// Co-occurrence in the aggregate document
    CoOccurrence,
}

/// A directed edge between two titles.
///
/// Identity is `(from, to, kind)`; the derived ordering sorts by source
/// title first so edges for one item are applied together.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub from: Title,
    pub to: Title,
    pub kind: RelationKind,
}

impl Relation {
    pub fn new(from: impl Into<Title>, to: impl Into<Title>, kind: RelationKind) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
        }
    }

    /// The edge that must accompany this one in the graph.
    pub fn inverse(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
            kind: self.kind.inverse(),
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.from, self.kind, self.to)
    }
}

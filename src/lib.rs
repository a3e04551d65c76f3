//! depweave: keeps tracker issues consistent with a declared dependency graph
//!
//! Relations are declared in markdown (a `Dependencies` and a `Related`
//! section per item, plus one aggregate roadmap) and in configuration. Each
//! run folds them into a symmetric title graph, maps titles to exactly one
//! active tracker item, writes every edge (natively when the tracker can,
//! as annotation markers when it cannot) and keeps one current relationship
//! summary on every related item.
//!
//! # Core Concepts
//!
//! - **Titles**: graph nodes until canonicalization maps them to item ids
//! - **Relations**: `depends_on`, `blocks`, `relates_to`, stored with inverses
//! - **Runs**: stateless; everything is re-derived from the tracker each time
//!
//! # Example
//!
//! ```
//! use depweave::{RelationGraph, RelationKind, Relation, Origin};
//!
//! let mut graph = RelationGraph::new();
//! graph.depends_on("Payments", "Authentication", Origin::Extracted);
//! assert!(graph.contains(&Relation::new("Authentication", "Payments", RelationKind::Blocks)));
//! ```

pub mod config;
pub mod error;
mod graph;
pub mod logger;
pub mod reconcile;
pub mod tracker;

pub use config::{CoOccurrenceScope, Config, ConfigError, LinkMode, StaticRelations};
pub use error::{ReconcileError, ReconcileResult};
pub use graph::{EdgeView, Origin, Relation, RelationGraph, RelationKind, Title};
pub use reconcile::{build_graph, GraphBuild, Reconciler, RunReport};
pub use tracker::{GhTracker, InMemoryTracker, ItemId, ItemStatus, Tracker, TrackerError, TrackerResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

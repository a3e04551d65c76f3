//! Remote tracker backends for depweave
//!
//! The reconciler talks to the tracker only through the `Tracker` trait.
//! `GhTracker` drives GitHub through the `gh` CLI; `InMemoryTracker` is a
//! deterministic in-process tracker for tests and offline runs.

mod gh;
mod memory;
mod traits;

pub use gh::GhTracker;
pub use memory::{InMemoryTracker, TrackerCall};
pub use traits::{
    Annotation, AnnotationId, ItemId, ItemStatus, StatusFilter, Tracker, TrackerError,
    TrackerResult, WorkItem,
};

//! Error taxonomy for a reconciliation run

use crate::config::ConfigError;
use crate::tracker::{AnnotationId, TrackerError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reconciling
///
/// Only `ConnectivityLost`, `Config` and `Tracker` escape a run; the other
/// variants are recovered where they occur and counted in the run report.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A referenced title never resolves to any item
    #[error("Title not found: {0}")]
    NotFound(String),

    /// Native relation writes are not available
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// The tracker refused an annotation edit
    #[error("Annotation {annotation} edit rejected: {reason}")]
    MutationConflict {
        annotation: AnnotationId,
        reason: String,
    },

    /// A source file could not be read or its sections could not be parsed
    #[error("Corrupt source {}: {reason}", path.display())]
    CorruptSource { path: PathBuf, reason: String },

    /// The tracker could not be reached during identity resolution
    #[error("Connectivity lost: {0}")]
    ConnectivityLost(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),
}

impl ReconcileError {
    /// Short name used to bucket recovered warnings in the run report.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::CapabilityUnavailable(_) => "capability_unavailable",
            Self::MutationConflict { .. } => "mutation_conflict",
            Self::CorruptSource { .. } => "corrupt_source",
            Self::ConnectivityLost(_) => "connectivity_lost",
            Self::Config(_) => "config",
            Self::Tracker(_) => "tracker",
        }
    }
}

/// Result type for reconciliation operations
pub type ReconcileResult<T> = Result<T, ReconcileError>;

//! YAML configuration for depweave
//!
//! A config file supplies the repository, source locations, the static
//! relation lists, extra aliases, and defaults for link mode and labels.
//! Command-line flags override whatever the file says.
//!
//! ```yaml
//! repository: owner/app
//! items_dir: docs/features
//! aggregate: docs/ROADMAP.md
//! labels: [dependency-tracking]
//! aliases:
//!   auth: "01 - User Authentication"
//! relations:
//!   related:
//!     - ["Payments", "Referrals"]
//!   infrastructure:
//!     - provider: "Shared Infrastructure"
//!       dependents: ["Payments", "Feed"]
//! ```

use crate::graph::{Origin, RelationGraph, Title};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// File looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "depweave.yaml";

const DEFAULT_ITEM_BODY: &str =
    "Created by depweave to track a declared dependency. Edit freely; the title is the link key.";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// How relations are written to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkMode {
    /// Probe for native links, fall back to annotations
    #[default]
    Auto,
    /// Never attempt native links
    AnnotationOnly,
}

impl FromStr for LinkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "annotation-only" | "annotation_only" | "annotations" => Ok(Self::AnnotationOnly),
            other => Err(format!("unknown link mode '{}' (expected auto|annotation-only)", other)),
        }
    }
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::AnnotationOnly => f.write_str("annotation-only"),
        }
    }
}

/// Granularity of the aggregate-document co-occurrence heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoOccurrenceScope {
    /// Any two items mentioned anywhere in the document
    #[default]
    Document,
    /// Only items mentioned in the same paragraph
    Paragraph,
}

/// "Depends on shared infrastructure": `provider` blocks every dependent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfrastructureDependency {
    pub provider: String,
    pub dependents: Vec<String>,
}

/// Relations declared in configuration rather than extracted from sources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticRelations {
    /// Explicit cross-feature `relates_to` pairs
    pub related: Vec<[String; 2]>,
    pub infrastructure: Vec<InfrastructureDependency>,
}

impl StaticRelations {
    /// Fold the static pairs into the graph, returning the number of new edges.
    pub fn apply(&self, graph: &mut RelationGraph) -> usize {
        let mut added = 0;
        for [a, b] in &self.related {
            added += usize::from(graph.relates_to(a.as_str(), b.as_str(), Origin::Static));
        }
        for infra in &self.infrastructure {
            for dependent in &infra.dependents {
                added += usize::from(graph.blocks(infra.provider.as_str(), dependent.as_str(), Origin::Static));
            }
        }
        added
    }

    /// Every title named by the static configuration.
    pub fn titles(&self) -> Vec<Title> {
        let pairs = self.related.iter().flat_map(|[a, b]| [a, b]);
        let infra = self
            .infrastructure
            .iter()
            .flat_map(|i| std::iter::once(&i.provider).chain(i.dependents.iter()));
        pairs.chain(infra).map(Title::new).filter(|t| !t.is_empty()).collect()
    }
}

/// Complete depweave configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Target collection, `owner/name` for GitHub
    pub repository: Option<String>,
    /// Directory of per-item markdown files
    pub items_dir: Option<PathBuf>,
    /// Aggregate document for co-occurrence relations
    pub aggregate: Option<PathBuf>,
    pub link_mode: LinkMode,
    pub dry_run: bool,
    /// Labels applied to items the reconciler creates
    pub labels: Vec<String>,
    /// Body of items the reconciler creates
    pub new_item_body: String,
    /// Extra alias → title entries for free-text matching
    pub aliases: BTreeMap<String, String>,
    pub relations: StaticRelations,
    pub cooccurrence: CoOccurrenceScope,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repository: None,
            items_dir: None,
            aggregate: None,
            link_mode: LinkMode::default(),
            dry_run: false,
            labels: Vec::new(),
            new_item_body: DEFAULT_ITEM_BODY.to_string(),
            aliases: BTreeMap::new(),
            relations: StaticRelations::default(),
            cooccurrence: CoOccurrenceScope::default(),
        }
    }
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        // An empty file deserializes to null, which means "all defaults"
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load a config file. Relative source paths are resolved against the
    /// file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&text)?;
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.items_dir = config.items_dir.map(|p| base.join(p));
            config.aggregate = config.aggregate.map(|p| base.join(p));
        }
        Ok(config)
    }

    /// Load `explicit` if given, else `depweave.yaml` from the working
    /// directory if it exists, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::load(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Check the settings a reconciliation run cannot do without.
    pub fn validate_for_run(&self) -> Result<(), ConfigError> {
        match self.repository.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(ConfigError::Invalid("repository is required (--repo or config)".into()))
            }
            Some(repo) if !repo.contains('/') => {
                return Err(ConfigError::Invalid(format!(
                    "repository '{}' must look like owner/name",
                    repo
                )))
            }
            Some(_) => {}
        }
        if self.items_dir.is_none() && self.aggregate.is_none() && self.relations == StaticRelations::default() {
            return Err(ConfigError::Invalid(
                "nothing to reconcile: set items_dir, aggregate or static relations".into(),
            ));
        }
        Ok(())
    }
}

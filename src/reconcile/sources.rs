//! Loading per-item source files and the aggregate document

use super::context::RunReport;
use crate::error::ReconcileError;
use crate::graph::Title;
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

const SOURCE_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// One item's source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub title: Title,
    pub text: String,
}

impl SourceDocument {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let path = path.into();
        let text = text.into();
        let title = document_title(&text, &path);
        Self { path, title, text }
    }
}

/// The aggregate document scanned for co-occurring titles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateDocument {
    pub path: PathBuf,
    pub text: String,
}

/// Title of an item file: first level-1 heading, else the file stem with
/// underscores turned into spaces.
pub fn document_title(text: &str, path: &Path) -> Title {
    let mut in_h1 = false;
    let mut heading = String::new();
    for event in Parser::new(text) {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) => {
                in_h1 = true;
                heading.clear();
            }
            Event::End(TagEnd::Heading(HeadingLevel::H1)) => {
                let title = Title::new(&heading);
                if !title.is_empty() {
                    return title;
                }
                in_h1 = false;
            }
            Event::Text(t) | Event::Code(t) if in_h1 => heading.push_str(&t),
            Event::SoftBreak | Event::HardBreak if in_h1 => heading.push(' '),
            _ => {}
        }
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().replace('_', " "))
        .unwrap_or_default();
    Title::new(stem)
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Read every source file under `dir`, sorted by file name.
///
/// Unreadable files are reported as `CorruptSource` and skipped.
pub fn load_item_sources(dir: &Path, report: &mut RunReport) -> Vec<SourceDocument> {
    if !dir.is_dir() {
        report.warn(&ReconcileError::CorruptSource {
            path: dir.to_path_buf(),
            reason: "items directory does not exist".into(),
        });
        return Vec::new();
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                report.warn(&ReconcileError::CorruptSource {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_source_file(entry.path()) {
            continue;
        }
        match std::fs::read_to_string(entry.path()) {
            Ok(text) => {
                let document = SourceDocument::new(entry.path(), text);
                debug!(path = %document.path.display(), title = %document.title, "loaded source");
                documents.push(document);
            }
            Err(e) => report.warn(&ReconcileError::CorruptSource {
                path: entry.path().to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }
    info!(dir = %dir.display(), count = documents.len(), "loaded item sources");
    documents
}

/// Read the aggregate document, reporting `CorruptSource` when unreadable.
pub fn load_aggregate(path: &Path, report: &mut RunReport) -> Option<AggregateDocument> {
    match std::fs::read_to_string(path) {
        Ok(text) => Some(AggregateDocument {
            path: path.to_path_buf(),
            text,
        }),
        Err(e) => {
            report.warn(&ReconcileError::CorruptSource {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
            None
        }
    }
}

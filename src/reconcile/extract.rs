//! Relation Extractor: Dependencies/Related bullets in item sources
//!
//! Sections are found by heading text, so `## Dependencies`, `### Depends on:`
//! and `# related items` all count. A section runs until
//! the next heading of the same or a higher level. Every list item inside it
//! is one declaration.

use super::context::RunReport;
use super::identity::{resolve_alias, AliasTable};
use super::sources::SourceDocument;
use crate::error::ReconcileError;
use crate::graph::{Relation, RelationKind, Title};
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use std::fmt;
use tracing::debug;

/// Which section a declaration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Dependencies,
    Related,
}

impl Section {
    fn from_heading(text: &str) -> Option<Self> {
        let normalized = text.trim().trim_end_matches(':').trim().to_lowercase();
        match normalized.as_str() {
            "dependencies" | "depends on" => Some(Self::Dependencies),
            "related" | "related to" | "related items" => Some(Self::Related),
            _ => None,
        }
    }

    /// Relation kind a bullet in this section asserts.
    pub fn kind(self) -> RelationKind {
        match self {
            Self::Dependencies => RelationKind::DependsOn,
            Self::Related => RelationKind::RelatesTo,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dependencies => f.write_str("Dependencies"),
            Self::Related => f.write_str("Related"),
        }
    }
}

/// One bullet line before alias resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub from: Title,
    pub text: String,
    pub section: Section,
}

struct OpenSection {
    section: Section,
    level: HeadingLevel,
    bullets: usize,
}

/// Collect the bullets of every Dependencies/Related section.
///
/// A section heading followed by no list items is an error: the file is
/// probably malformed and its declarations would be silently lost.
pub fn parse_declarations(document: &SourceDocument) -> Result<Vec<Declaration>, ReconcileError> {
    let corrupt = |reason: String| ReconcileError::CorruptSource {
        path: document.path.clone(),
        reason,
    };

    let mut declarations = Vec::new();
    let mut open: Option<OpenSection> = None;
    let mut heading: Option<(HeadingLevel, String)> = None;
    let mut items: Vec<String> = Vec::new();

    let close = |open: Option<OpenSection>| -> Result<(), ReconcileError> {
        match open {
            Some(s) if s.bullets == 0 => Err(corrupt(format!("'{}' section has no bullet items", s.section))),
            _ => Ok(()),
        }
    };

    for event in Parser::new(&document.text) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => heading = Some((level, String::new())),
            Event::End(TagEnd::Heading(_)) => {
                let Some((level, text)) = heading.take() else { continue };
                if open.as_ref().is_some_and(|s| level <= s.level) {
                    close(open.take())?;
                }
                if let Some(section) = Section::from_heading(&text) {
                    close(open.take())?;
                    open = Some(OpenSection {
                        section,
                        level,
                        bullets: 0,
                    });
                }
            }
            Event::Start(Tag::Item) => items.push(String::new()),
            Event::End(TagEnd::Item) => {
                let Some(text) = items.pop() else { continue };
                let Some(section) = open.as_mut() else { continue };
                let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if text.is_empty() {
                    continue;
                }
                section.bullets += 1;
                declarations.push(Declaration {
                    from: document.title.clone(),
                    text,
                    section: section.section,
                });
            }
            Event::Text(t) | Event::Code(t) => {
                if let Some((_, text)) = heading.as_mut() {
                    text.push_str(&t);
                } else if let Some(item) = items.last_mut() {
                    item.push_str(&t);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some(item) = items.last_mut() {
                    item.push(' ');
                }
            }
            _ => {}
        }
    }
    close(open)?;
    Ok(declarations)
}

/// Resolve declarations to relations.
///
/// The first alias found in a line names the target; a line naming only its
/// own item is dropped, and a line naming nothing is a `NotFound` warning.
pub fn resolve_declarations(declarations: &[Declaration], aliases: &AliasTable, report: &mut RunReport) -> Vec<Relation> {
    let mut relations = Vec::new();
    for declaration in declarations {
        match resolve_alias(&declaration.text, aliases) {
            Some(target) if target == &declaration.from => {
                debug!(item = %declaration.from, line = %declaration.text, "self reference dropped");
            }
            Some(target) => {
                debug!(
                    item = %declaration.from,
                    %target,
                    section = %declaration.section,
                    "declaration resolved"
                );
                relations.push(Relation::new(
                    declaration.from.clone(),
                    target.clone(),
                    declaration.section.kind(),
                ));
            }
            None => report.warn(&ReconcileError::NotFound(format!(
                "'{}' in {} of '{}'",
                declaration.text, declaration.section, declaration.from
            ))),
        }
    }
    relations
}

/// Extract one item's relations, reporting and skipping a corrupt file.
pub fn extract_relations(document: &SourceDocument, aliases: &AliasTable, report: &mut RunReport) -> Vec<Relation> {
    match parse_declarations(document) {
        Ok(declarations) => resolve_declarations(&declarations, aliases, report),
        Err(e) => {
            report.warn(&e);
            Vec::new()
        }
    }
}

//! Co-occurrence in the aggregate document
//!
//! Two items whose aliases appear in the same block of the aggregate text are
//! probably related. The pairs become soft `relates_to` edges, never hard
//! dependencies. Re-running on the same text yields the same pairs, and the
//! graph deduplicates them, so the heuristic is idempotent.

use super::identity::{find_aliases, AliasTable};
use crate::config::CoOccurrenceScope;
use crate::graph::{Relation, RelationKind, Title};
use std::collections::BTreeMap;
use tracing::debug;

/// Split the aggregate text into the blocks co-occurrence is counted over.
fn blocks(text: &str, scope: CoOccurrenceScope) -> Vec<&str> {
    match scope {
        CoOccurrenceScope::Document => vec![text],
        CoOccurrenceScope::Paragraph => {
            let mut blocks = Vec::new();
            let mut start: Option<usize> = None;
            let mut offset = 0;
            for line in text.split_inclusive('\n') {
                if line.trim().is_empty() {
                    if let Some(s) = start.take() {
                        blocks.push(&text[s..offset]);
                    }
                } else if start.is_none() {
                    start = Some(offset);
                }
                offset += line.len();
            }
            if let Some(s) = start {
                blocks.push(&text[s..]);
            }
            blocks
        }
    }
}

/// Count, for every canonical (sorted) pair of titles, the blocks both
/// appear in.
pub fn detect_cooccurrence_pairs<'t>(
    text: &str,
    aliases: &'t AliasTable,
    scope: CoOccurrenceScope,
) -> BTreeMap<(&'t Title, &'t Title), usize> {
    let mut pair_counts = BTreeMap::new();
    for block in blocks(text, scope) {
        let found: Vec<&Title> = find_aliases(block, aliases).into_iter().collect();
        for i in 0..found.len() {
            for j in (i + 1)..found.len() {
                *pair_counts.entry((found[i], found[j])).or_insert(0) += 1;
            }
        }
    }
    pair_counts
}

/// `relates_to` relations for every co-occurring pair, one direction each;
/// the graph adds the inverse.
pub fn cooccurrence_relations(text: &str, aliases: &AliasTable, scope: CoOccurrenceScope) -> Vec<Relation> {
    detect_cooccurrence_pairs(text, aliases, scope)
        .into_iter()
        .map(|((a, b), count)| {
            debug!(%a, %b, count, "co-occurring titles");
            Relation::new(a.clone(), b.clone(), RelationKind::RelatesTo)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROADMAP: &str = "\
# Roadmap

Q1 ships Payments together with Referrals.

Q2 focuses on Feed Ranking.
Feed ranking reuses referrals data.
";

    fn table() -> AliasTable {
        let titles = [
            Title::new("Payments"),
            Title::new("Referrals"),
            Title::new("Feed Ranking"),
            Title::new("Search"),
        ];
        AliasTable::from_titles(&titles)
    }

    #[test]
    fn document_scope_pairs_every_mentioned_title() {
        let table = table();
        let pairs = detect_cooccurrence_pairs(ROADMAP, &table, CoOccurrenceScope::Document);
        assert_eq!(pairs.len(), 3);
        assert!(pairs.keys().all(|(a, b)| a < b));
        assert!(pairs.keys().all(|(a, b)| a.as_str() != "Search" && b.as_str() != "Search"));
    }

    #[test]
    fn paragraph_scope_pairs_within_blocks() {
        let table = table();
        let pairs = detect_cooccurrence_pairs(ROADMAP, &table, CoOccurrenceScope::Paragraph);
        let names: Vec<(&str, &str)> = pairs.keys().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        assert_eq!(names, vec![("Feed Ranking", "Referrals"), ("Payments", "Referrals")]);
    }

    #[test]
    fn relations_are_soft_and_stable() {
        let table = table();
        let first = cooccurrence_relations(ROADMAP, &table, CoOccurrenceScope::Document);
        let second = cooccurrence_relations(ROADMAP, &table, CoOccurrenceScope::Document);
        assert_eq!(first, second);
        assert!(first.iter().all(|r| r.kind == RelationKind::RelatesTo));
    }

    #[test]
    fn nested_titles_do_not_pair_with_themselves() {
        let titles = [Title::new("Payments"), Title::new("Payments SDK"), Title::new("Referrals")];
        let table = AliasTable::from_titles(&titles);

        let pairs = detect_cooccurrence_pairs(
            "Referrals moves to the Payments SDK.",
            &table,
            CoOccurrenceScope::Document,
        );
        let names: Vec<(&str, &str)> = pairs.keys().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        assert_eq!(names, vec![("Payments SDK", "Referrals")]);
    }

    #[test]
    fn paragraph_blocks_split_on_blank_lines() {
        let parts = blocks("a\nb\n\n  \nc\n", CoOccurrenceScope::Paragraph);
        assert_eq!(parts, vec!["a\nb\n", "c\n"]);
    }
}

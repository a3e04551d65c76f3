//! Inverse-consistency and serialization tests for the relation graph

use super::*;
use serde_json::json;

fn title(s: &str) -> Title {
    Title::new(s)
}

#[test]
fn title_trims_whitespace() {
    assert_eq!(Title::new("  Payments \n").as_str(), "Payments");
}

#[test]
fn relation_kind_serializes_snake_case() {
    let v = serde_json::to_value(RelationKind::DependsOn).unwrap();
    assert_eq!(v, json!("depends_on"));
    let v = serde_json::to_value(RelationKind::RelatesTo).unwrap();
    assert_eq!(v, json!("relates_to"));
}

#[test]
fn inverse_kinds_pair_up() {
    assert_eq!(RelationKind::DependsOn.inverse(), RelationKind::Blocks);
    assert_eq!(RelationKind::Blocks.inverse(), RelationKind::DependsOn);
    assert_eq!(RelationKind::RelatesTo.inverse(), RelationKind::RelatesTo);
}

#[test]
fn depends_on_inserts_blocks_inverse() {
    let mut graph = RelationGraph::new();
    assert!(graph.depends_on("A", "B", Origin::Extracted));

    assert!(graph.contains(&Relation::new("A", "B", RelationKind::DependsOn)));
    assert!(graph.contains(&Relation::new("B", "A", RelationKind::Blocks)));
    assert_eq!(graph.len(), 2);
}

#[test]
fn blocks_inserts_depends_on_inverse() {
    let mut graph = RelationGraph::new();
    graph.blocks("Infra", "Feature", Origin::Static);

    assert!(graph.contains(&Relation::new("Feature", "Infra", RelationKind::DependsOn)));
}

#[test]
fn relates_to_is_symmetric() {
    let mut graph = RelationGraph::new();
    graph.relates_to("A", "B", Origin::CoOccurrence);

    assert!(graph.contains(&Relation::new("A", "B", RelationKind::RelatesTo)));
    assert!(graph.contains(&Relation::new("B", "A", RelationKind::RelatesTo)));
}

#[test]
fn every_edge_has_its_inverse() {
    let mut graph = RelationGraph::new();
    graph.depends_on("A", "B", Origin::Extracted);
    graph.blocks("C", "A", Origin::Static);
    graph.relates_to("B", "C", Origin::CoOccurrence);
    graph.relates_to("C", "D", Origin::Static);

    for edge in graph.edges() {
        assert!(graph.contains(&edge.inverse()), "missing inverse of {}", edge);
    }
}

#[test]
fn duplicates_collapse_and_merge_origins() {
    let mut graph = RelationGraph::new();
    assert!(graph.relates_to("A", "B", Origin::Extracted));
    assert!(!graph.relates_to("B", "A", Origin::CoOccurrence));
    assert_eq!(graph.len(), 2);

    let origins = graph
        .origins(&Relation::new("A", "B", RelationKind::RelatesTo))
        .unwrap();
    assert!(origins.contains(&Origin::Extracted));
    assert!(origins.contains(&Origin::CoOccurrence));
}

#[test]
fn self_loops_are_dropped() {
    let mut graph = RelationGraph::new();
    assert!(!graph.depends_on("A", " A ", Origin::Extracted));
    assert!(graph.is_empty());
}

#[test]
fn targets_are_sorted_per_kind() {
    let mut graph = RelationGraph::new();
    graph.depends_on("A", "Zeta", Origin::Extracted);
    graph.depends_on("A", "Beta", Origin::Extracted);
    graph.relates_to("A", "Gamma", Origin::Static);

    let deps = graph.targets(&title("A"), RelationKind::DependsOn);
    assert_eq!(deps, vec![&title("Beta"), &title("Zeta")]);
    assert!(graph.targets(&title("A"), RelationKind::Blocks).is_empty());
    assert_eq!(graph.targets(&title("Gamma"), RelationKind::RelatesTo), vec![&title("A")]);
}

#[test]
fn edge_views_serialize_with_origins() {
    let mut graph = RelationGraph::new();
    graph.depends_on("A", "B", Origin::Extracted);

    let json = serde_json::to_value(graph.views()).unwrap();
    assert_eq!(
        json[0],
        json!({"from": "A", "to": "B", "kind": "depends_on", "origins": ["extracted"]})
    );
}

//! Unit tests for the evidence graph.

use super::*;
use serde_json::json;

fn node(id: &str) -> EvidenceNode {
    EvidenceNode::new(id, "raw_text", json!({ "content": id }))
}

fn graph_with(ids: &[&str]) -> EvidenceGraph {
    let mut graph = EvidenceGraph::new();
    for id in ids {
        graph.add_evidence(node(id)).unwrap();
    }
    graph
}

// ============================================================================
// Insertion
// ============================================================================

#[test]
fn test_add_evidence_duplicate_fails() {
    let mut graph = EvidenceGraph::new();
    graph.add_evidence(node("e1")).unwrap();

    let err = graph.add_evidence(node("e1")).unwrap_err();
    assert_eq!(
        err,
        GraphError::AlreadyExists {
            id: "e1".to_string()
        }
    );
    assert_eq!(graph.node_count(), 1);
}

#[test]
fn test_add_relationship_requires_both_endpoints() {
    let mut graph = graph_with(&["a"]);

    let err = graph
        .add_relationship("a", "b", RelationshipKind::Supports, 0.8, json!({}))
        .unwrap_err();
    assert_eq!(err, GraphError::UnknownNode { id: "b".to_string() });

    let err = graph
        .add_relationship("z", "a", RelationshipKind::Supports, 0.8, json!({}))
        .unwrap_err();
    assert_eq!(err, GraphError::UnknownNode { id: "z".to_string() });
    assert_eq!(graph.edge_count(), 0);
}

#[test]
fn test_add_relationship_rejects_self_loop() {
    let mut graph = graph_with(&["a"]);
    let err = graph
        .add_relationship("a", "a", RelationshipKind::SimilarTo, 0.5, json!(null))
        .unwrap_err();
    assert!(matches!(err, GraphError::SelfLoop { .. }));
}

#[test]
fn test_add_relationship_str_rejects_unknown_kind() {
    let mut graph = graph_with(&["a", "b"]);
    let err = graph
        .add_relationship_str("a", "b", "befriends", 0.5, json!(null))
        .unwrap_err();
    assert_eq!(
        err,
        GraphError::InvalidRelationship {
            kind: "befriends".to_string()
        }
    );

    graph
        .add_relationship_str("a", "b", "connects_to", 0.5, json!(null))
        .unwrap();
    assert_eq!(graph.edges()[0].relationship_type, RelationshipKind::ConnectsTo);
}

#[test]
fn test_relationship_kind_round_trip_names() {
    for kind in RelationshipKind::ALL {
        let parsed: RelationshipKind = kind.as_str().parse().unwrap();
        assert_eq!(parsed, kind);
        let serialized = serde_json::to_string(&kind).unwrap();
        assert_eq!(serialized, format!("\"{}\"", kind.as_str()));
    }
}

#[test]
fn test_node_builders_clamp() {
    let n = node("x").with_confidence(1.7).with_quality(-0.2);
    assert!((n.confidence - 1.0).abs() < f64::EPSILON);
    assert!(n.quality_score.abs() < f64::EPSILON);
    assert!(n.weight().abs() < f64::EPSILON);
}

#[test]
fn test_adjacency_lookups() {
    let mut graph = graph_with(&["a", "b", "c"]);
    graph
        .add_relationship("a", "b", RelationshipKind::LeadsTo, 0.9, json!({}))
        .unwrap();
    graph
        .add_relationship("c", "b", RelationshipKind::References, 0.4, json!({}))
        .unwrap();

    assert_eq!(graph.outgoing("a").len(), 1);
    assert_eq!(graph.incoming("b").len(), 2);
    assert!(graph.outgoing("missing").is_empty());
}

// ============================================================================
// Algorithms
// ============================================================================

#[test]
fn test_find_clusters() {
    let mut graph = graph_with(&["a", "b", "c", "d"]);
    graph
        .add_relationship("b", "a", RelationshipKind::Contains, 1.0, json!({}))
        .unwrap();
    graph
        .add_relationship("c", "d", RelationshipKind::Supports, 1.0, json!({}))
        .unwrap();

    assert_eq!(
        graph.find_clusters(),
        vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string(), "d".to_string()],
        ]
    );
}

#[test]
fn test_importance_ranking_prefers_linked_high_quality() {
    let mut graph = EvidenceGraph::new();
    graph
        .add_evidence(node("hub").with_confidence(0.9).with_quality(0.9))
        .unwrap();
    graph
        .add_evidence(node("leaf1").with_confidence(0.5).with_quality(0.5))
        .unwrap();
    graph
        .add_evidence(node("leaf2").with_confidence(0.5).with_quality(0.5))
        .unwrap();
    graph
        .add_relationship("leaf1", "hub", RelationshipKind::Supports, 1.0, json!({}))
        .unwrap();
    graph
        .add_relationship("leaf2", "hub", RelationshipKind::Supports, 1.0, json!({}))
        .unwrap();

    let ranking = graph.importance_ranking();
    assert_eq!(ranking[0].id, "hub");
    let total: f64 = ranking.iter().map(|r| r.score).sum();
    assert!((total - 1.0).abs() < 1e-6);
}

#[test]
fn test_importance_ranking_ties_keep_insertion_order() {
    let graph = graph_with(&["first", "second", "third"]);
    let ids: Vec<String> = graph.importance_ranking().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["first", "second", "third"]);
}

#[test]
fn test_detect_inconsistencies_returns_contradictions_only() {
    let mut graph = graph_with(&["a", "b", "c"]);
    graph
        .add_relationship("a", "b", RelationshipKind::Contradicts, 0.7, json!({}))
        .unwrap();
    graph
        .add_relationship("b", "c", RelationshipKind::Supports, 0.7, json!({}))
        .unwrap();
    graph
        .add_relationship("c", "a", RelationshipKind::Contradicts, 0.2, json!({}))
        .unwrap();

    let contradictions = graph.detect_inconsistencies();
    assert_eq!(contradictions.len(), 2);
    assert!(contradictions
        .iter()
        .all(|e| e.relationship_type == RelationshipKind::Contradicts));
}

#[test]
fn test_density() {
    assert!(EvidenceGraph::new().density().abs() < f64::EPSILON);
    let mut graph = graph_with(&["a", "b"]);
    graph
        .add_relationship("a", "b", RelationshipKind::LeadsTo, 1.0, json!({}))
        .unwrap();
    assert!((graph.density() - 0.5).abs() < f64::EPSILON);
}

// ============================================================================
// Export
// ============================================================================

#[test]
fn test_export_schema_field_names() {
    let mut graph = graph_with(&["a", "b"]);
    graph
        .add_relationship("a", "b", RelationshipKind::OriginatedFrom, 0.6, json!({"k": 1}))
        .unwrap();

    let value = serde_json::to_value(graph.export()).unwrap();
    assert_eq!(value["version"], EXPORT_SCHEMA_VERSION);
    assert_eq!(value["metrics"]["node_count"], 2);
    assert_eq!(value["metrics"]["edge_count"], 1);
    assert!(value["metrics"]["density"].is_number());
    assert!(value["metrics"]["clusters"].is_array());
    let edge = &value["edges"][0];
    assert_eq!(edge["source"], "a");
    assert_eq!(edge["target"], "b");
    assert_eq!(edge["relationship_type"], "originated_from");
    assert_eq!(edge["metadata"]["k"], 1);
}

#[test]
fn test_import_rejects_dangling_edge() {
    let mut export = graph_with(&["a"]).export();
    export.edges.push(EvidenceEdge {
        source: "a".to_string(),
        target: "ghost".to_string(),
        relationship_type: RelationshipKind::Supports,
        confidence: 0.5,
        metadata: json!(null),
    });
    assert!(matches!(
        EvidenceGraph::import(export),
        Err(GraphError::UnknownNode { .. })
    ));
}

/// Deterministic values in [0, 1) with full mantissas.
fn unit_values(seed: u64) -> impl Iterator<Item = f64> {
    let mut state = seed;
    std::iter::repeat_with(move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state >> 11) as f64 / (1u64 << 53) as f64
    })
}

#[test]
fn test_export_survives_json_round_trip() {
    let mut values = unit_values(0x9e37_79b9_7f4a_7c15);
    let mut graph = EvidenceGraph::new();
    for i in 0..2000 {
        let score = values.next().unwrap();
        graph
            .add_evidence(
                EvidenceNode::new(format!("e{}", i), "analysis", json!({ "score": score }))
                    .with_confidence(values.next().unwrap())
                    .with_quality(values.next().unwrap()),
            )
            .unwrap();
    }
    for i in 1..2000 {
        graph
            .add_relationship(
                &format!("e{}", i),
                &format!("e{}", i / 2),
                RelationshipKind::OriginatedFrom,
                values.next().unwrap(),
                json!({ "weight": values.next().unwrap() }),
            )
            .unwrap();
    }

    let export = graph.export();
    let text = serde_json::to_string(&export).unwrap();
    let restored = EvidenceGraph::import(serde_json::from_str(&text).unwrap()).unwrap();

    assert_eq!(restored.nodes(), graph.nodes());
    assert_eq!(restored.edges(), graph.edges());
    assert_eq!(restored.export().metrics, export.metrics);
}

#[test]
fn test_shared_graph_mutations_visible_to_readers() {
    let shared = SharedGraph::new();
    let writer = shared.clone();
    writer.add_evidence(node("a")).unwrap();
    writer.add_evidence(node("b")).unwrap();
    writer
        .add_relationship("a", "b", RelationshipKind::Supports, 0.9, json!({}))
        .unwrap();

    assert!(shared.contains("a"));
    assert_eq!(shared.read(|g| g.edge_count()), 1);
    assert_eq!(shared.export().metrics.node_count, 2);
}

//! Evidence graph for a single investigation.
//!
//! The graph is an index-based arena: nodes live in insertion order in a
//! `Vec`, an id index maps evidence ids to slots, and outgoing/incoming
//! adjacency lists hold edge slots. Nodes are append-only and never mutated
//! once written, so the arena never needs compaction.
//!
//! Operations:
//! - [`EvidenceGraph::add_evidence`]: insert a node (fails on duplicate ids)
//! - [`EvidenceGraph::add_relationship`]: connect two existing nodes
//! - [`EvidenceGraph::find_clusters`]: weakly connected components
//! - [`EvidenceGraph::importance_ranking`]: quality-weighted PageRank
//! - [`EvidenceGraph::detect_inconsistencies`]: all `contradicts` edges
//! - [`EvidenceGraph::export`] / [`EvidenceGraph::import`]: stable export schema

mod algorithms;

#[cfg(test)]
#[path = "graph_tests.rs"]
mod graph_tests;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};

/// Version of the export schema consumed by report generators.
///
/// Bump only for additive changes; existing fields keep their names and meaning.
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

/// Default confidence for evidence without an explicit score.
const DEFAULT_EVIDENCE_CONFIDENCE: f64 = 0.5;

// ============================================================================
// Relationship Kinds
// ============================================================================

/// The fixed set of relationships between evidence nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// Source contains target (e.g. a message containing a URL).
    Contains,
    /// Source mentions or cites target.
    References,
    /// Source links to target at the network level.
    ConnectsTo,
    /// Source disagrees with target.
    Contradicts,
    /// Source corroborates target.
    Supports,
    /// Source was derived from target.
    OriginatedFrom,
    /// Following source led to discovering target.
    LeadsTo,
    /// Source resembles target.
    SimilarTo,
}

impl RelationshipKind {
    /// Every relationship kind, in declaration order.
    pub const ALL: [RelationshipKind; 8] = [
        RelationshipKind::Contains,
        RelationshipKind::References,
        RelationshipKind::ConnectsTo,
        RelationshipKind::Contradicts,
        RelationshipKind::Supports,
        RelationshipKind::OriginatedFrom,
        RelationshipKind::LeadsTo,
        RelationshipKind::SimilarTo,
    ];

    /// Get the relationship name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Contains => "contains",
            RelationshipKind::References => "references",
            RelationshipKind::ConnectsTo => "connects_to",
            RelationshipKind::Contradicts => "contradicts",
            RelationshipKind::Supports => "supports",
            RelationshipKind::OriginatedFrom => "originated_from",
            RelationshipKind::LeadsTo => "leads_to",
            RelationshipKind::SimilarTo => "similar_to",
        }
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelationshipKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        RelationshipKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| GraphError::InvalidRelationship {
                kind: s.to_string(),
            })
    }
}

// ============================================================================
// Nodes and Edges
// ============================================================================

/// A single piece of evidence discovered during an investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceNode {
    /// Unique evidence identifier.
    pub id: String,
    /// Evidence kind (e.g. "raw_url", "domain_analysis_result", "analysis").
    pub kind: String,
    /// Opaque payload produced by whatever discovered the evidence.
    pub payload: serde_json::Value,
    /// Confidence in the evidence (0.0-1.0).
    pub confidence: f64,
    /// Quality of the source that produced it (0.0-1.0).
    pub quality_score: f64,
    /// When the evidence was recorded.
    pub timestamp: DateTime<Utc>,
}

impl EvidenceNode {
    /// Create a new node with default confidence and quality.
    pub fn new(id: impl Into<String>, kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            payload,
            confidence: DEFAULT_EVIDENCE_CONFIDENCE,
            quality_score: DEFAULT_EVIDENCE_CONFIDENCE,
            timestamp: Utc::now(),
        }
    }

    /// Set the confidence, clamped to [0, 1].
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set the source quality score, clamped to [0, 1].
    pub fn with_quality(mut self, quality_score: f64) -> Self {
        self.quality_score = quality_score.clamp(0.0, 1.0);
        self
    }

    /// Weight used by importance ranking.
    pub fn weight(&self) -> f64 {
        self.quality_score * self.confidence
    }
}

/// A directed relationship between two evidence nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEdge {
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Kind of relationship.
    pub relationship_type: RelationshipKind,
    /// Confidence in the relationship (0.0-1.0).
    pub confidence: f64,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Importance score for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeImportance {
    /// Node id.
    pub id: String,
    /// PageRank score; all scores sum to 1.
    pub score: f64,
}

// ============================================================================
// Export Schema
// ============================================================================

/// Summary metrics attached to every export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    /// `edges / (n * (n - 1))`, zero below two nodes.
    pub density: f64,
    /// Weakly connected components, each a list of node ids.
    pub clusters: Vec<Vec<String>>,
}

/// Stable serialized form of the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphExport {
    #[serde(default = "default_export_version")]
    pub version: u32,
    pub nodes: Vec<EvidenceNode>,
    pub edges: Vec<EvidenceEdge>,
    pub metrics: GraphMetrics,
}

fn default_export_version() -> u32 {
    EXPORT_SCHEMA_VERSION
}

// ============================================================================
// Evidence Graph
// ============================================================================

/// Directed, append-only evidence graph.
#[derive(Debug, Clone, Default)]
pub struct EvidenceGraph {
    nodes: Vec<EvidenceNode>,
    index: HashMap<String, usize>,
    edges: Vec<EvidenceEdge>,
    /// `(source slot, target slot)` per edge, parallel to `edges`.
    endpoints: Vec<(usize, usize)>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl EvidenceGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Fails with `AlreadyExists` if the id is taken.
    pub fn add_evidence(&mut self, node: EvidenceNode) -> GraphResult<()> {
        if self.index.contains_key(&node.id) {
            return Err(GraphError::AlreadyExists { id: node.id });
        }

        let slot = self.nodes.len();
        self.index.insert(node.id.clone(), slot);
        self.nodes.push(node);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        Ok(())
    }

    /// Connect two existing nodes.
    pub fn add_relationship(
        &mut self,
        source: &str,
        target: &str,
        kind: RelationshipKind,
        confidence: f64,
        metadata: serde_json::Value,
    ) -> GraphResult<()> {
        let source_slot = self.slot(source)?;
        let target_slot = self.slot(target)?;
        if source_slot == target_slot {
            return Err(GraphError::SelfLoop {
                id: source.to_string(),
            });
        }

        let edge_slot = self.edges.len();
        self.edges.push(EvidenceEdge {
            source: source.to_string(),
            target: target.to_string(),
            relationship_type: kind,
            confidence: confidence.clamp(0.0, 1.0),
            metadata,
        });
        self.endpoints.push((source_slot, target_slot));
        self.outgoing[source_slot].push(edge_slot);
        self.incoming[target_slot].push(edge_slot);
        Ok(())
    }

    /// Connect two nodes using a relationship name from an external source.
    ///
    /// Unknown names fail with `InvalidRelationship` before endpoints are checked.
    pub fn add_relationship_str(
        &mut self,
        source: &str,
        target: &str,
        kind: &str,
        confidence: f64,
        metadata: serde_json::Value,
    ) -> GraphResult<()> {
        let kind: RelationshipKind = kind.parse()?;
        self.add_relationship(source, target, kind, confidence, metadata)
    }

    fn slot(&self, id: &str) -> GraphResult<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownNode { id: id.to_string() })
    }

    /// Whether a node with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&EvidenceNode> {
        self.index.get(id).map(|&slot| &self.nodes[slot])
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[EvidenceNode] {
        &self.nodes
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> &[EvidenceEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges leaving `id`.
    pub fn outgoing(&self, id: &str) -> Vec<&EvidenceEdge> {
        self.index
            .get(id)
            .map(|&slot| self.outgoing[slot].iter().map(|&e| &self.edges[e]).collect())
            .unwrap_or_default()
    }

    /// Edges arriving at `id`.
    pub fn incoming(&self, id: &str) -> Vec<&EvidenceEdge> {
        self.index
            .get(id)
            .map(|&slot| self.incoming[slot].iter().map(|&e| &self.edges[e]).collect())
            .unwrap_or_default()
    }

    /// Ratio of edges to possible directed edges.
    pub fn density(&self) -> f64 {
        let n = self.nodes.len();
        if n < 2 {
            return 0.0;
        }
        self.edges.len() as f64 / (n * (n - 1)) as f64
    }

    /// Weakly connected components in insertion order.
    pub fn find_clusters(&self) -> Vec<Vec<String>> {
        algorithms::weakly_connected_components(self.nodes.len(), &self.endpoints)
            .into_iter()
            .map(|component| {
                component
                    .into_iter()
                    .map(|slot| self.nodes[slot].id.clone())
                    .collect()
            })
            .collect()
    }

    /// PageRank personalised by `quality_score * confidence`.
    ///
    /// Sorted by score descending; equal scores keep insertion order.
    pub fn importance_ranking(&self) -> Vec<NodeImportance> {
        let weights: Vec<f64> = self.nodes.iter().map(EvidenceNode::weight).collect();
        let scores = algorithms::weighted_pagerank(&weights, &self.endpoints);

        let mut ranking: Vec<NodeImportance> = self
            .nodes
            .iter()
            .zip(scores)
            .map(|(node, score)| NodeImportance {
                id: node.id.clone(),
                score,
            })
            .collect();
        // Stable sort keeps insertion order for ties.
        ranking.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranking
    }

    /// All `contradicts` edges.
    pub fn detect_inconsistencies(&self) -> Vec<EvidenceEdge> {
        self.edges
            .iter()
            .filter(|edge| edge.relationship_type == RelationshipKind::Contradicts)
            .cloned()
            .collect()
    }

    /// Summary metrics.
    pub fn metrics(&self) -> GraphMetrics {
        GraphMetrics {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            density: self.density(),
            clusters: self.find_clusters(),
        }
    }

    /// Export the graph in the versioned report schema.
    pub fn export(&self) -> GraphExport {
        GraphExport {
            version: EXPORT_SCHEMA_VERSION,
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            metrics: self.metrics(),
        }
    }

    /// Rebuild a graph from an export. Metrics are recomputed, not trusted.
    pub fn import(export: GraphExport) -> GraphResult<Self> {
        let mut graph = Self::new();
        for node in export.nodes {
            graph.add_evidence(node)?;
        }
        for edge in export.edges {
            graph.add_relationship(
                &edge.source,
                &edge.target,
                edge.relationship_type,
                edge.confidence,
                edge.metadata,
            )?;
        }
        Ok(graph)
    }
}

// ============================================================================
// Shared Graph
// ============================================================================

/// A graph shared between an investigation's run loop and its readers.
///
/// Every mutating call takes the lock for a single insert.
#[derive(Debug, Clone, Default)]
pub struct SharedGraph {
    inner: Arc<Mutex<EvidenceGraph>>,
}

impl SharedGraph {
    /// Create an empty shared graph.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, EvidenceGraph> {
        // Writers only ever append, so a poisoned graph is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_evidence(&self, node: EvidenceNode) -> GraphResult<()> {
        self.lock().add_evidence(node)
    }

    pub fn add_relationship(
        &self,
        source: &str,
        target: &str,
        kind: RelationshipKind,
        confidence: f64,
        metadata: serde_json::Value,
    ) -> GraphResult<()> {
        self.lock()
            .add_relationship(source, target, kind, confidence, metadata)
    }

    /// Run a read-only closure against the graph.
    pub fn read<R>(&self, f: impl FnOnce(&EvidenceGraph) -> R) -> R {
        f(&self.lock())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read(|g| g.contains(id))
    }

    pub fn export(&self) -> GraphExport {
        self.read(EvidenceGraph::export)
    }

    /// Clone the current graph state.
    pub fn snapshot(&self) -> EvidenceGraph {
        self.read(Clone::clone)
    }
}

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Symbol,
    Backlog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Imports,
    Extends,
    Implements,
    Calls,
    References,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub file_path: String,
    pub symbols: Vec<String>,
    #[serde(rename = "type")]
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
}

/// A directed graph stored as a plain node array + edge array rather than a
/// linked structure, per its own persisted `graph.json` shape. Cycles (e.g.
/// mutual imports) are valid and unremarkable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    /// Duplicate ids are coalesced: a re-insert of an existing node id is a
    /// no-op.
    pub fn add_node(&mut self, node: GraphNode) {
        if !self.has_node(&node.id) {
            self.nodes.push(node);
        }
    }

    /// Duplicate edges (identical source/target/kind) are coalesced. The
    /// edge is dropped, not added, if either endpoint is not yet a node —
    /// callers must add nodes before the edges that reference them.
    pub fn add_edge(&mut self, edge: GraphEdge) {
        if !self.has_node(&edge.source) || !self.has_node(&edge.target) {
            return;
        }
        let exists = self.edges.iter().any(|e| {
            e.source == edge.source && e.target == edge.target && e.kind == edge.kind
        });
        if !exists {
            self.edges.push(edge);
        }
    }

    /// Drops every node whose `file_path` is in `file_paths`, and every edge
    /// incident to a dropped node. Used by the incremental IndexStore update
    /// before re-inserting the freshly built per-file subgraph.
    pub fn remove_by_file_paths(&mut self, file_paths: &BTreeSet<String>) {
        let dropped: BTreeSet<String> = self
            .nodes
            .iter()
            .filter(|n| file_paths.contains(&n.file_path))
            .map(|n| n.id.clone())
            .collect();
        self.nodes.retain(|n| !dropped.contains(&n.id));
        self.edges
            .retain(|e| !dropped.contains(&e.source) && !dropped.contains(&e.target));
    }

    /// Inserts every node and edge from `other`. Edges whose endpoints are
    /// not present in the union of `self` and `other`'s nodes are dropped.
    pub fn merge(&mut self, other: &DependencyGraph) {
        for node in &other.nodes {
            self.add_node(node.clone());
        }
        for edge in &other.edges {
            self.add_edge(edge.clone());
        }
    }

    /// True iff every edge endpoint refers to a node present in the graph.
    pub fn is_referentially_sound(&self) -> bool {
        self.edges
            .iter()
            .all(|e| self.has_node(&e.source) && self.has_node(&e.target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_node(id: &str, path: &str) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            file_path: path.to_string(),
            symbols: vec![],
            kind: NodeKind::File,
        }
    }

    #[test]
    fn edge_dropped_when_endpoint_missing() {
        let mut graph = DependencyGraph::new();
        graph.add_node(file_node("a", "a.rs"));
        graph.add_edge(GraphEdge {
            source: "a".to_string(),
            target: "b".to_string(),
            kind: EdgeKind::Imports,
        });
        assert!(graph.edges().is_empty());
        assert!(graph.is_referentially_sound());
    }

    #[test]
    fn duplicate_nodes_and_edges_coalesce() {
        let mut graph = DependencyGraph::new();
        graph.add_node(file_node("a", "a.rs"));
        graph.add_node(file_node("a", "a.rs"));
        assert_eq!(graph.nodes().len(), 1);

        graph.add_node(file_node("b", "b.rs"));
        let edge = GraphEdge {
            source: "a".to_string(),
            target: "b".to_string(),
            kind: EdgeKind::Imports,
        };
        graph.add_edge(edge.clone());
        graph.add_edge(edge);
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn remove_by_file_paths_drops_incident_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_node(file_node("a", "a.rs"));
        graph.add_node(file_node("b", "b.rs"));
        graph.add_edge(GraphEdge {
            source: "a".to_string(),
            target: "b".to_string(),
            kind: EdgeKind::Calls,
        });

        let mut dropped = BTreeSet::new();
        dropped.insert("a.rs".to_string());
        graph.remove_by_file_paths(&dropped);

        assert!(!graph.has_node("a"));
        assert!(graph.has_node("b"));
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn cycles_are_representable() {
        let mut graph = DependencyGraph::new();
        graph.add_node(file_node("a", "a.rs"));
        graph.add_node(file_node("b", "b.rs"));
        graph.add_edge(GraphEdge {
            source: "a".to_string(),
            target: "b".to_string(),
            kind: EdgeKind::Imports,
        });
        graph.add_edge(GraphEdge {
            source: "b".to_string(),
            target: "a".to_string(),
            kind: EdgeKind::Imports,
        });
        assert_eq!(graph.edges().len(), 2);
        assert!(graph.is_referentially_sound());
    }
}

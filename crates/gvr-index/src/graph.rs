//! Code knowledge graph: files, symbols and the relationships between them.
//!
//! The graph is a plain in-memory structure with forward and reverse
//! adjacency indexes. It carries no locking; [`crate::graph_store::GraphStore`]
//! wraps it for concurrent use.
//!
//! # Example
//!
//! ```no_run
//! use gvr_index::graph::{CodeGraph, Direction};
//! use gvr_index::types::{Edge, EdgeType, Node, NodeType};
//!
//! let mut graph = CodeGraph::new();
//! graph.add_node(Node::new(NodeType::File, "a.ts", "a.ts", "typescript"));
//! graph.add_node(Node::new(NodeType::File, "b.ts", "b.ts", "typescript"));
//! graph
//!     .add_edge(Edge::new(Node::file_id("a.ts"), Node::file_id("b.ts"), EdgeType::DependsOn))
//!     .unwrap();
//!
//! let dependents = graph.traverse_dependencies("b.ts", 2, Direction::Inbound);
//! assert_eq!(dependents[0].file, "a.ts");
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Edge, EdgeId, EdgeType, Node, NodeId, NodeType};

/// Direction of a dependency traversal over `depends_on` edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Follow edges backwards: who depends on this file
    Inbound,
    /// Follow edges forwards: what this file depends on
    Outbound,
}

/// How a file was reached from the traversal root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    Direct,
    Transitive,
}

/// One file reported by a dependency traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInfo {
    pub file: String,
    /// Shallowest depth at which the file was discovered (1 = direct)
    pub depth: usize,
    pub relationship: Relationship,
}

/// Node and edge counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub files: usize,
    pub nodes: usize,
    pub edges: usize,
    pub depends_on_edges: usize,
}

/// Directed graph representing codebase structure.
#[derive(Debug, Clone, Default)]
pub struct CodeGraph {
    nodes: HashMap<NodeId, Node>,
    /// Node ids in insertion order
    node_order: Vec<NodeId>,
    edges: HashMap<EdgeId, Edge>,
    /// Forward adjacency (source -> edge ids), insertion ordered
    outgoing: HashMap<NodeId, Vec<EdgeId>>,
    /// Reverse adjacency (target -> edge ids), insertion ordered
    incoming: HashMap<NodeId, Vec<EdgeId>>,
    /// File path -> node ids belonging to that file
    file_index: HashMap<String, Vec<NodeId>>,
}

impl CodeGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            files: self.file_index.len(),
            nodes: self.nodes.len(),
            edges: self.edges.len(),
            depends_on_edges: self
                .edges
                .values()
                .filter(|e| e.edge_type == EdgeType::DependsOn)
                .count(),
        }
    }

    /// Insert a node. A node with an existing id replaces the old one in place.
    pub fn add_node(&mut self, node: Node) {
        // Ids embed the file path, so a replacement never moves files
        let id = node.id.clone();
        if !self.nodes.contains_key(&id) {
            self.node_order.push(id.clone());
            self.file_index
                .entry(node.file_path.clone())
                .or_default()
                .push(id.clone());
        }
        self.nodes.insert(id, node);
    }

    /// Insert an edge between two existing nodes. Re-adding an edge id is a no-op.
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&edge.source_id) || !self.nodes.contains_key(&edge.target_id)
        {
            return Err(GraphError::InvalidEdge(
                edge.source_id.clone(),
                edge.target_id.clone(),
            ));
        }
        if self.edges.contains_key(&edge.id) {
            return Ok(());
        }

        self.outgoing
            .entry(edge.source_id.clone())
            .or_default()
            .push(edge.id.clone());
        self.incoming
            .entry(edge.target_id.clone())
            .or_default()
            .push(edge.id.clone());
        self.edges.insert(edge.id.clone(), edge);
        Ok(())
    }

    /// Remove a single edge by id.
    pub fn remove_edge(&mut self, edge_id: &str) -> Option<Edge> {
        let edge = self.edges.remove(edge_id)?;
        detach(&mut self.outgoing, &edge.source_id, edge_id);
        detach(&mut self.incoming, &edge.target_id, edge_id);
        Some(edge)
    }

    /// Remove every node of a file and every edge touching those nodes.
    ///
    /// Returns the number of nodes removed.
    pub fn remove_file(&mut self, file_path: &str) -> usize {
        let Some(node_ids) = self.file_index.remove(file_path) else {
            return 0;
        };

        for node_id in &node_ids {
            let mut touching: Vec<EdgeId> = self.outgoing.remove(node_id).unwrap_or_default();
            touching.extend(self.incoming.remove(node_id).unwrap_or_default());
            for edge_id in touching {
                self.remove_edge(&edge_id);
            }
            self.nodes.remove(node_id);
        }

        let removed: HashSet<&NodeId> = node_ids.iter().collect();
        self.node_order.retain(|id| !removed.contains(id));
        node_ids.len()
    }

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn contains_file(&self, file_path: &str) -> bool {
        self.nodes.contains_key(&Node::file_id(file_path))
    }

    /// Iterate nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.node_order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Nodes belonging to a file, in insertion order.
    pub fn nodes_for_file(&self, file_path: &str) -> Vec<&Node> {
        self.file_index
            .get(file_path)
            .map(|ids| ids.iter().filter_map(|id| self.nodes.get(id)).collect())
            .unwrap_or_default()
    }

    /// Indexed file paths, sorted.
    pub fn files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.file_index.keys().cloned().collect();
        files.sort();
        files
    }

    /// Outgoing edges from a node, optionally restricted to one type.
    pub fn outgoing_edges(&self, source: &str, edge_type: Option<EdgeType>) -> Vec<&Edge> {
        self.adjacent(&self.outgoing, source, edge_type)
    }

    /// Incoming edges to a node, optionally restricted to one type.
    pub fn incoming_edges(&self, target: &str, edge_type: Option<EdgeType>) -> Vec<&Edge> {
        self.adjacent(&self.incoming, target, edge_type)
    }

    fn adjacent<'g>(
        &'g self,
        index: &'g HashMap<NodeId, Vec<EdgeId>>,
        node_id: &str,
        edge_type: Option<EdgeType>,
    ) -> Vec<&'g Edge> {
        index
            .get(node_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.edges.get(id))
                    .filter(|e| edge_type.map_or(true, |t| e.edge_type == t))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Case-insensitive substring match on node names.
    ///
    /// Iterates in insertion order and stops at `limit`; results are not ranked.
    pub fn search_nodes(&self, query: &str, limit: usize) -> Vec<&Node> {
        let needle = query.to_lowercase();
        self.nodes()
            .filter(|n| n.name.to_lowercase().contains(&needle))
            .take(limit)
            .collect()
    }

    /// Bounded BFS over `depends_on` edges starting at a file.
    ///
    /// Each file is reported once, at the shallowest depth it was discovered.
    /// The start file itself is never reported. An unknown file yields an
    /// empty result.
    pub fn traverse_dependencies(
        &self,
        file_path: &str,
        max_depth: usize,
        direction: Direction,
    ) -> Vec<DependencyInfo> {
        let start = Node::file_id(file_path);
        if !self.nodes.contains_key(&start) || max_depth == 0 {
            return Vec::new();
        }

        let mut visited: HashSet<NodeId> = HashSet::new();
        visited.insert(start.clone());
        let mut queue: VecDeque<(NodeId, usize)> = VecDeque::new();
        queue.push_back((start, 0));
        let mut found = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }

            let neighbours: Vec<&NodeId> = match direction {
                Direction::Inbound => self
                    .incoming_edges(&current, Some(EdgeType::DependsOn))
                    .into_iter()
                    .map(|e| &e.source_id)
                    .collect(),
                Direction::Outbound => self
                    .outgoing_edges(&current, Some(EdgeType::DependsOn))
                    .into_iter()
                    .map(|e| &e.target_id)
                    .collect(),
            };

            for neighbour in neighbours {
                if !visited.insert(neighbour.clone()) {
                    continue;
                }
                let Some(node) = self.nodes.get(neighbour) else {
                    continue;
                };
                if node.node_type != NodeType::File {
                    continue;
                }

                let next_depth = depth + 1;
                found.push(DependencyInfo {
                    file: node.file_path.clone(),
                    depth: next_depth,
                    relationship: if next_depth == 1 {
                        Relationship::Direct
                    } else {
                        Relationship::Transitive
                    },
                });
                queue.push_back((neighbour.clone(), next_depth));
            }
        }

        found
    }

    /// Innermost symbol of a file whose line range contains `line`.
    pub fn innermost_node_at(&self, file_path: &str, line: usize) -> Option<&Node> {
        innermost_node(self.nodes_for_file(file_path), line)
    }

    /// Clear all data from the graph.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.node_order.clear();
        self.edges.clear();
        self.outgoing.clear();
        self.incoming.clear();
        self.file_index.clear();
    }
}

/// Drop `edge_id` from a node's adjacency list, removing the list once empty.
fn detach(adjacency: &mut HashMap<NodeId, Vec<EdgeId>>, node_id: &str, edge_id: &str) {
    if let Some(ids) = adjacency.get_mut(node_id) {
        ids.retain(|id| id != edge_id);
        if ids.is_empty() {
            adjacency.remove(node_id);
        }
    }
}

/// Narrowest symbol (not file or import node) whose range contains `line`.
///
/// Ties go to the first node in iteration order.
pub fn innermost_node<'a>(nodes: impl IntoIterator<Item = &'a Node>, line: usize) -> Option<&'a Node> {
    nodes
        .into_iter()
        .filter(|n| !matches!(n.node_type, NodeType::File | NodeType::Import))
        .filter(|n| n.contains_line(line))
        .min_by_key(|n| n.end_line.saturating_sub(n.start_line))
}

/// Graph operation errors.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Invalid edge: source '{0}' or target '{1}' not found")]
    InvalidEdge(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> Node {
        Node::new(NodeType::File, path, path, "typescript")
    }

    fn depends(graph: &mut CodeGraph, from: &str, to: &str) {
        graph
            .add_edge(Edge::new(Node::file_id(from), Node::file_id(to), EdgeType::DependsOn))
            .unwrap();
    }

    /// a -> b -> c -> d, plus e -> c
    fn chain() -> CodeGraph {
        let mut graph = CodeGraph::new();
        for path in ["a.ts", "b.ts", "c.ts", "d.ts", "e.ts"] {
            graph.add_node(file(path));
        }
        depends(&mut graph, "a.ts", "b.ts");
        depends(&mut graph, "b.ts", "c.ts");
        depends(&mut graph, "c.ts", "d.ts");
        depends(&mut graph, "e.ts", "c.ts");
        graph
    }

    #[test]
    fn test_add_edge_requires_endpoints() {
        let mut graph = CodeGraph::new();
        graph.add_node(file("a.ts"));
        let err = graph
            .add_edge(Edge::new(Node::file_id("a.ts"), "missing", EdgeType::DependsOn))
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidEdge(_, _)));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_duplicate_edge_is_ignored() {
        let mut graph = chain();
        let before = graph.edge_count();
        depends(&mut graph, "a.ts", "b.ts");
        assert_eq!(graph.edge_count(), before);
        assert_eq!(graph.incoming_edges(&Node::file_id("b.ts"), None).len(), 1);
    }

    #[test]
    fn test_dependents_bounded_by_depth() {
        let graph = chain();

        let direct = graph.traverse_dependencies("c.ts", 1, Direction::Inbound);
        let files: Vec<&str> = direct.iter().map(|d| d.file.as_str()).collect();
        assert_eq!(files, vec!["b.ts", "e.ts"]);
        assert!(direct.iter().all(|d| d.depth == 1 && d.relationship == Relationship::Direct));

        let deep = graph.traverse_dependencies("c.ts", 3, Direction::Inbound);
        for d in &direct {
            assert!(deep.contains(d));
        }
        let a = deep.iter().find(|d| d.file == "a.ts").unwrap();
        assert_eq!(a.depth, 2);
        assert_eq!(a.relationship, Relationship::Transitive);
    }

    #[test]
    fn test_dependencies_outbound() {
        let graph = chain();
        let deps = graph.traverse_dependencies("a.ts", 5, Direction::Outbound);
        let files: Vec<(&str, usize)> = deps.iter().map(|d| (d.file.as_str(), d.depth)).collect();
        assert_eq!(files, vec![("b.ts", 1), ("c.ts", 2), ("d.ts", 3)]);
    }

    #[test]
    fn test_cycle_terminates_and_reports_shallowest() {
        let mut graph = chain();
        depends(&mut graph, "d.ts", "a.ts");
        let deps = graph.traverse_dependencies("a.ts", 10, Direction::Outbound);
        assert_eq!(deps.len(), 3);
        assert!(deps.iter().all(|d| d.file != "a.ts"));
    }

    #[test]
    fn test_unknown_file_is_empty() {
        let graph = chain();
        assert!(graph
            .traverse_dependencies("nope.ts", 3, Direction::Inbound)
            .is_empty());
    }

    #[test]
    fn test_remove_file_leaves_no_dangling_edges() {
        let mut graph = chain();
        let class = Node::new(NodeType::Class, "C", "c.ts", "typescript");
        let class_id = class.id.clone();
        graph.add_node(class);
        graph
            .add_edge(Edge::new(Node::file_id("c.ts"), &class_id, EdgeType::Contains))
            .unwrap();

        let removed = graph.remove_file("c.ts");
        assert_eq!(removed, 2);
        assert!(graph.get_node(&class_id).is_none());
        for edge in graph.edges() {
            assert!(graph.get_node(&edge.source_id).is_some());
            assert!(graph.get_node(&edge.target_id).is_some());
            assert!(!edge.source_id.starts_with("c.ts#"));
            assert!(!edge.target_id.starts_with("c.ts#"));
        }
        assert!(graph
            .incoming_edges(&Node::file_id("d.ts"), None)
            .is_empty());
        assert_eq!(graph.stats().depends_on_edges, 1);
    }

    #[test]
    fn test_search_nodes_insertion_order_and_limit() {
        let mut graph = CodeGraph::new();
        graph.add_node(Node::new(NodeType::Class, "UserService", "a.ts", "typescript"));
        graph.add_node(Node::new(NodeType::Function, "parse", "a.ts", "typescript"));
        graph.add_node(Node::new(NodeType::Interface, "User", "b.ts", "typescript"));
        graph.add_node(Node::new(NodeType::Function, "loadUsers", "b.ts", "typescript"));

        let hits: Vec<&str> = graph
            .search_nodes("user", 10)
            .iter()
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(hits, vec!["UserService", "User", "loadUsers"]);
        assert_eq!(graph.search_nodes("USER", 2).len(), 2);
    }

    #[test]
    fn test_innermost_node_at() {
        let mut graph = CodeGraph::new();
        graph.add_node(file("a.ts").with_range(1, 40));
        graph.add_node(Node::new(NodeType::Class, "A", "a.ts", "typescript").with_range(2, 30));
        graph.add_node(Node::new(NodeType::Method, "run", "a.ts", "typescript").with_range(5, 10));

        assert_eq!(graph.innermost_node_at("a.ts", 7).unwrap().name, "run");
        assert_eq!(graph.innermost_node_at("a.ts", 20).unwrap().name, "A");
        assert!(graph.innermost_node_at("a.ts", 35).is_none());
    }

    #[test]
    fn test_reindex_cycles_leave_no_empty_adjacency() {
        let mut graph = CodeGraph::new();
        graph.add_node(file("a.ts"));
        for _ in 0..3 {
            graph.add_node(file("b.ts"));
            depends(&mut graph, "a.ts", "b.ts");
            depends(&mut graph, "b.ts", "a.ts");
            assert_eq!(graph.remove_file("b.ts"), 1);
        }

        assert_eq!(graph.edge_count(), 0);
        assert!(graph.outgoing.is_empty());
        assert!(graph.incoming.is_empty());
        assert!(graph.contains_file("a.ts"));
    }

    #[test]
    fn test_clear() {
        let mut graph = chain();
        graph.clear();
        assert!(graph.is_empty());
        assert_eq!(graph.stats(), GraphStats::default());
    }
}

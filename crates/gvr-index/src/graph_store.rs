//! Global graph store with checksum-based incremental re-indexing.
//!
//! All mutation of one file (remove old nodes, insert new ones, resolve
//! imports) happens under a single write lock, so readers never observe a
//! half-updated file.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::analyzer::{AnalysisResult, ImportInfo, SourceAnalyzer};
use crate::error::{GvrError, Result};
use crate::graph::{CodeGraph, DependencyInfo, Direction, GraphStats};
use crate::types::{compute_checksum, Edge, EdgeType, Node};
use crate::walk::{normalize_path, parent_dir, IndexOptions};

/// Outcome of indexing one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFileResult {
    /// False when the content checksum was unchanged
    pub updated: bool,
    pub nodes_created: usize,
    pub edges_created: usize,
}

/// Aggregate counts for a directory index run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryIndexStats {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    /// Files that failed to read or parse
    pub files_skipped: usize,
    pub nodes_created: usize,
    pub edges_created: usize,
    pub skipped: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    graph: CodeGraph,
    /// file path -> last indexed content checksum
    checksums: HashMap<String, String>,
    /// file path -> imports found in that file
    imports: HashMap<String, Vec<ImportInfo>>,
}

/// Candidate paths for a relative import, in resolution priority order.
fn import_candidates(importer: &str, specifier: &str) -> Vec<String> {
    let dir = parent_dir(importer);
    let base = if dir.is_empty() {
        normalize_path(specifier)
    } else {
        normalize_path(&format!("{}/{}", dir, specifier))
    };

    vec![
        format!("{}.ts", base),
        format!("{}.tsx", base),
        format!("{}/index.ts", base),
        format!("{}/index.tsx", base),
        base,
    ]
}

impl Inner {
    fn resolve_import(&self, importer: &str, import: &ImportInfo) -> Option<String> {
        if !import.is_relative() {
            return None;
        }
        import_candidates(importer, &import.specifier)
            .into_iter()
            .find(|candidate| self.graph.contains_file(candidate))
    }

    /// Rebuild the outgoing `depends_on` edges of one file from its imports.
    ///
    /// Returns the number of edges created.
    fn link_imports(&mut self, file_path: &str) -> usize {
        let file_id = Node::file_id(file_path);
        let stale: Vec<String> = self
            .graph
            .outgoing_edges(&file_id, Some(EdgeType::DependsOn))
            .into_iter()
            .map(|e| e.id.clone())
            .collect();
        for edge_id in stale {
            self.graph.remove_edge(&edge_id);
        }

        let Some(imports) = self.imports.get(file_path) else {
            return 0;
        };
        let targets: Vec<String> = imports
            .iter()
            .filter_map(|import| self.resolve_import(file_path, import))
            .filter(|target| target != file_path)
            .collect();

        let mut created = 0;
        for target in targets {
            let edge = Edge::new(&file_id, Node::file_id(&target), EdgeType::DependsOn);
            if self.graph.get_edge(&edge.id).is_some() {
                continue;
            }
            match self.graph.add_edge(edge) {
                Ok(()) => created += 1,
                Err(e) => debug!("Skipping dependency edge from {}: {}", file_path, e),
            }
        }
        created
    }

    /// Files other than `changed` with a relative import that could resolve to it.
    fn importers_of(&self, changed: &str) -> Vec<String> {
        let mut importers: Vec<String> = self
            .imports
            .iter()
            .filter(|(path, _)| path.as_str() != changed)
            .filter(|(path, imports)| {
                imports.iter().any(|import| {
                    import.is_relative()
                        && import_candidates(path, &import.specifier)
                            .iter()
                            .any(|c| c == changed)
                })
            })
            .map(|(path, _)| path.clone())
            .collect();
        importers.sort();
        importers
    }

    fn remove(&mut self, file_path: &str) -> usize {
        self.checksums.remove(file_path);
        self.imports.remove(file_path);
        self.graph.remove_file(file_path)
    }

    fn apply(&mut self, file_path: &str, analysis: AnalysisResult) -> IndexFileResult {
        self.graph.remove_file(file_path);

        let nodes_created = analysis.nodes.len();
        for node in analysis.nodes {
            self.graph.add_node(node);
        }

        let mut edges_created = 0;
        for edge in analysis.edges {
            match self.graph.add_edge(edge) {
                Ok(()) => edges_created += 1,
                Err(e) => debug!("Dropping edge in {}: {}", file_path, e),
            }
        }

        self.imports.insert(file_path.to_string(), analysis.imports);
        edges_created += self.link_imports(file_path);

        for importer in self.importers_of(file_path) {
            self.link_imports(&importer);
        }

        self.checksums
            .insert(file_path.to_string(), analysis.checksum);

        IndexFileResult {
            updated: true,
            nodes_created,
            edges_created,
        }
    }
}

/// Owns the global code graph.
#[derive(Debug, Default)]
pub struct GraphStore {
    inner: RwLock<Inner>,
    analyzer: SourceAnalyzer,
    options: IndexOptions,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: IndexOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Index a file from disk, keyed by its normalised path.
    pub async fn index_file(&self, path: &Path) -> Result<IndexFileResult> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GvrError::io(path, e))?;
        self.index_content(&path.to_string_lossy(), &content).await
    }

    /// Index already-loaded content under `file_path`.
    ///
    /// Unchanged content (same checksum as the last index) is a no-op that
    /// reports `updated: false`.
    pub async fn index_content(&self, file_path: &str, content: &str) -> Result<IndexFileResult> {
        let file_path = normalize_path(file_path);
        let checksum = compute_checksum(content);

        {
            let inner = self.inner.read().await;
            if inner.checksums.get(&file_path) == Some(&checksum) {
                debug!("Unchanged, skipping: {}", file_path);
                return Ok(IndexFileResult::default());
            }
        }

        let analysis = self.analyzer.parse(&file_path, content)?;

        let mut inner = self.inner.write().await;
        // Another writer may have indexed the same content meanwhile
        if inner.checksums.get(&file_path) == Some(&checksum) {
            return Ok(IndexFileResult::default());
        }
        let result = inner.apply(&file_path, analysis);
        debug!(
            "Indexed {}: {} nodes, {} edges",
            file_path, result.nodes_created, result.edges_created
        );
        Ok(result)
    }

    /// Recursively index every supported file under `root`.
    ///
    /// Files are keyed by their path relative to `root`. Read and parse
    /// failures are counted and skipped; they never abort the run.
    pub async fn index_directory(&self, root: &Path) -> Result<DirectoryIndexStats> {
        if !root.is_dir() {
            return Err(GvrError::NotFound(format!(
                "directory {}",
                root.display()
            )));
        }

        info!("Indexing graph for {:?}", root);
        let mut stats = DirectoryIndexStats::default();

        for (path, key) in self.options.collect_files(root) {
            stats.files_scanned += 1;

            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Skipping unreadable file {:?}: {}", path, e);
                    stats.files_skipped += 1;
                    stats.skipped.push(key);
                    continue;
                }
            };

            match self.index_content(&key, &content).await {
                Ok(result) if result.updated => {
                    stats.files_indexed += 1;
                    stats.nodes_created += result.nodes_created;
                    stats.edges_created += result.edges_created;
                }
                Ok(_) => stats.files_unchanged += 1,
                Err(e) => {
                    warn!("Skipping {}: {}", key, e);
                    stats.files_skipped += 1;
                    stats.skipped.push(key);
                }
            }
        }

        info!("Graph indexing complete: {:?}", stats);
        Ok(stats)
    }

    /// Files that depend on `file_path`, up to `depth` hops.
    pub async fn get_dependents(&self, file_path: &str, depth: usize) -> Vec<DependencyInfo> {
        let file_path = normalize_path(file_path);
        let inner = self.inner.read().await;
        inner
            .graph
            .traverse_dependencies(&file_path, depth, Direction::Inbound)
    }

    /// Files `file_path` depends on, up to `depth` hops.
    pub async fn get_dependencies(&self, file_path: &str, depth: usize) -> Vec<DependencyInfo> {
        let file_path = normalize_path(file_path);
        let inner = self.inner.read().await;
        inner
            .graph
            .traverse_dependencies(&file_path, depth, Direction::Outbound)
    }

    pub async fn get_nodes_for_file(&self, file_path: &str) -> Vec<Node> {
        let file_path = normalize_path(file_path);
        let inner = self.inner.read().await;
        inner
            .graph
            .nodes_for_file(&file_path)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn search_nodes(&self, query: &str, limit: usize) -> Vec<Node> {
        let inner = self.inner.read().await;
        inner
            .graph
            .search_nodes(query, limit)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn get_node(&self, id: &str) -> Result<Node> {
        let inner = self.inner.read().await;
        inner
            .graph
            .get_node(id)
            .cloned()
            .ok_or_else(|| GvrError::NotFound(format!("node {}", id)))
    }

    /// Edges leaving or entering a node.
    pub async fn get_edges_for_node(&self, id: &str) -> Vec<Edge> {
        let inner = self.inner.read().await;
        let mut edges: Vec<Edge> = inner
            .graph
            .outgoing_edges(id, None)
            .into_iter()
            .cloned()
            .collect();
        edges.extend(inner.graph.incoming_edges(id, None).into_iter().cloned());
        edges
    }

    /// Remove a file's nodes, edges and checksum. Returns the number of nodes removed.
    pub async fn remove_file(&self, file_path: &str) -> usize {
        let file_path = normalize_path(file_path);
        let mut inner = self.inner.write().await;
        let removed = inner.remove(&file_path);
        // Importers may now resolve to a lower-priority candidate
        for importer in inner.importers_of(&file_path) {
            inner.link_imports(&importer);
        }
        debug!("Removed {} nodes for {}", removed, file_path);
        removed
    }

    /// Stored checksum for a file, if indexed.
    pub async fn checksum(&self, file_path: &str) -> Option<String> {
        let inner = self.inner.read().await;
        inner.checksums.get(&normalize_path(file_path)).cloned()
    }

    pub async fn stats(&self) -> GraphStats {
        self.inner.read().await.graph.stats()
    }

    /// Wipe the graph and the checksum map.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.graph.clear();
        inner.checksums.clear();
        inner.imports.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeType;

    #[test]
    fn test_import_candidates_priority() {
        assert_eq!(
            import_candidates("src/app.ts", "./util"),
            vec![
                "src/util.ts",
                "src/util.tsx",
                "src/util/index.ts",
                "src/util/index.tsx",
                "src/util",
            ]
        );
        assert_eq!(import_candidates("src/a/b.ts", "../c.ts")[4], "src/c.ts");
        assert_eq!(import_candidates("a.ts", "./b")[0], "b.ts");
    }

    #[tokio::test]
    async fn test_index_content_is_idempotent() {
        let store = GraphStore::new();
        let source = "export class A {}\nexport function f() {}\n";

        let first = store.index_content("a.ts", source).await.unwrap();
        assert!(first.updated);
        assert!(first.nodes_created >= 3);
        let stats = store.stats().await;

        let second = store.index_content("a.ts", source).await.unwrap();
        assert!(!second.updated);
        assert_eq!(store.stats().await, stats);
    }

    #[tokio::test]
    async fn test_reindex_replaces_nodes() {
        let store = GraphStore::new();
        store
            .index_content("a.ts", "export function oldName() {}\n")
            .await
            .unwrap();
        store
            .index_content("a.ts", "export function newName() {}\n")
            .await
            .unwrap();

        let names: Vec<String> = store
            .get_nodes_for_file("a.ts")
            .await
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert!(names.contains(&"newName".to_string()));
        assert!(!names.contains(&"oldName".to_string()));
    }

    #[tokio::test]
    async fn test_dependency_resolution_independent_of_order() {
        let store = GraphStore::new();
        // Importer first: the edge appears once the dependency is indexed
        store
            .index_content("src/a.ts", "import { b } from './b';\nexport const a = b;\n")
            .await
            .unwrap();
        assert!(store.get_dependents("src/b.ts", 1).await.is_empty());

        store
            .index_content("src/b.ts", "export const b = 1;\n")
            .await
            .unwrap();
        let dependents = store.get_dependents("src/b.ts", 1).await;
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].file, "src/a.ts");

        // Re-indexing the dependency keeps the edge
        store
            .index_content("src/b.ts", "export const b = 2;\n")
            .await
            .unwrap();
        assert_eq!(store.get_dependents("src/b.ts", 1).await.len(), 1);

        let deps = store.get_dependencies("./src/a.ts", 1).await;
        assert_eq!(deps[0].file, "src/b.ts");
    }

    #[tokio::test]
    async fn test_unresolved_and_package_imports_are_ignored() {
        let store = GraphStore::new();
        let result = store
            .index_content(
                "a.ts",
                "import React from 'react';\nimport { x } from './missing';\n",
            )
            .await
            .unwrap();
        assert!(result.updated);
        assert_eq!(store.stats().await.depends_on_edges, 0);
    }

    #[tokio::test]
    async fn test_parse_error_is_reported() {
        let store = GraphStore::new();
        let err = store
            .index_content("bad.ts", "class {{{")
            .await
            .unwrap_err();
        assert!(matches!(err, GvrError::Parse(_)));
        assert!(store.checksum("bad.ts").await.is_none());
    }

    #[tokio::test]
    async fn test_get_node_not_found() {
        let store = GraphStore::new();
        store.index_content("a.ts", "export class A {}\n").await.unwrap();

        let id = Node::generate_id("a.ts", NodeType::Class, "A");
        assert_eq!(store.get_node(&id).await.unwrap().name, "A");
        assert!(!store.get_edges_for_node(&id).await.is_empty());

        let err = store.get_node("a.ts#class:Missing").await.unwrap_err();
        assert!(matches!(err, GvrError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_file_and_clear() {
        let store = GraphStore::new();
        store
            .index_content("a.ts", "import './b';\nexport const a = 1;\n")
            .await
            .unwrap();
        store.index_content("b.ts", "export const b = 1;\n").await.unwrap();
        assert_eq!(store.stats().await.depends_on_edges, 1);

        assert!(store.remove_file("b.ts").await > 0);
        assert_eq!(store.stats().await.depends_on_edges, 0);
        assert!(store.checksum("b.ts").await.is_none());
        assert!(store.get_nodes_for_file("b.ts").await.is_empty());

        store.clear().await;
        assert_eq!(store.stats().await, GraphStats::default());
        assert!(store.checksum("a.ts").await.is_none());
    }
}

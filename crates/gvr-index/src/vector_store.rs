//! Vector store adapter and the brute-force in-memory implementation.
//!
//! [`VectorStore`] is the seam the engine depends on; an approximate nearest
//! neighbour index can replace [`InMemoryVectorStore`] without changing the
//! engine.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{GvrError, Result};
use crate::types::VectorDocument;

/// Restricts a search to a subset of documents. Every set condition must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    /// Exact file path
    pub file_path: Option<String>,
    /// Any of these file paths
    pub file_paths: Option<Vec<String>>,
    /// File path prefix
    pub path_prefix: Option<String>,
}

impl SearchFilter {
    /// Create a new empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_file_paths(mut self, paths: Vec<String>) -> Self {
        self.file_paths = Some(paths);
        self
    }

    /// Filter by file path prefix.
    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    pub fn matches(&self, doc: &VectorDocument) -> bool {
        if let Some(path) = &self.file_path {
            if &doc.file_path != path {
                return false;
            }
        }
        if let Some(paths) = &self.file_paths {
            if !paths.iter().any(|p| p == &doc.file_path) {
                return false;
            }
        }
        if let Some(prefix) = &self.path_prefix {
            if !doc.file_path.starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Search result from a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    /// Cosine similarity
    pub score: f32,
    pub document: VectorDocument,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert documents by id. Returns the number stored.
    ///
    /// Fails with `DimensionMismatch` without storing anything if any
    /// embedding has the wrong length.
    async fn insert(&self, docs: Vec<VectorDocument>) -> Result<usize>;

    /// Top-K cosine similarity search, sorted descending.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>>;

    /// Remove every document indexed under a file path. Returns the number removed.
    async fn delete_by_file(&self, file_path: &str) -> usize;

    /// Replace all documents of a file with `docs`.
    ///
    /// Implementations should make the swap atomic for concurrent readers;
    /// the default deletes then inserts.
    async fn replace_file(&self, file_path: &str, docs: Vec<VectorDocument>) -> Result<usize> {
        for doc in &docs {
            if doc.embedding.len() != self.dimensions() {
                return Err(GvrError::DimensionMismatch {
                    expected: self.dimensions(),
                    actual: doc.embedding.len(),
                });
            }
        }
        self.delete_by_file(file_path).await;
        self.insert(docs).await
    }

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn clear(&self);

    fn dimensions(&self) -> usize;
}

/// Cosine similarity; zero when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[derive(Debug, Default)]
struct Documents {
    by_id: HashMap<String, VectorDocument>,
    /// file path -> document ids
    by_file: HashMap<String, HashSet<String>>,
}

impl Documents {
    fn upsert(&mut self, doc: VectorDocument) {
        let moved_from = self
            .by_id
            .get(&doc.id)
            .map(|previous| previous.file_path.clone())
            .filter(|old_path| old_path != &doc.file_path);
        if let Some(old_path) = moved_from {
            if let Some(ids) = self.by_file.get_mut(&old_path) {
                ids.remove(&doc.id);
                if ids.is_empty() {
                    self.by_file.remove(&old_path);
                }
            }
        }
        self.by_file
            .entry(doc.file_path.clone())
            .or_default()
            .insert(doc.id.clone());
        self.by_id.insert(doc.id.clone(), doc);
    }

    fn remove_file(&mut self, file_path: &str) -> usize {
        let Some(ids) = self.by_file.remove(file_path) else {
            return 0;
        };
        for id in &ids {
            self.by_id.remove(id);
        }
        ids.len()
    }
}

/// Linear-scan store holding every vector in memory.
#[derive(Debug)]
pub struct InMemoryVectorStore {
    dimensions: usize,
    docs: RwLock<Documents>,
}

impl InMemoryVectorStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            docs: RwLock::new(Documents::default()),
        }
    }

    fn check_dimensions(&self, actual: usize) -> Result<()> {
        if actual != self.dimensions {
            return Err(GvrError::DimensionMismatch {
                expected: self.dimensions,
                actual,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert(&self, docs: Vec<VectorDocument>) -> Result<usize> {
        for doc in &docs {
            self.check_dimensions(doc.embedding.len())?;
        }

        let mut store = self.docs.write().await;
        let count = docs.len();
        for doc in docs {
            store.upsert(doc);
        }
        Ok(count)
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>> {
        let store = self.docs.read().await;
        if store.by_id.is_empty() {
            return Ok(Vec::new());
        }
        self.check_dimensions(query.len())?;

        let mut hits: Vec<SearchHit> = store
            .by_id
            .values()
            .filter(|doc| filter.map_or(true, |f| f.matches(doc)))
            .map(|doc| SearchHit {
                id: doc.id.clone(),
                score: cosine_similarity(query, &doc.embedding),
                document: doc.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        debug!("Vector search returned {} hits", hits.len());
        Ok(hits)
    }

    async fn delete_by_file(&self, file_path: &str) -> usize {
        self.docs.write().await.remove_file(file_path)
    }

    async fn replace_file(&self, file_path: &str, docs: Vec<VectorDocument>) -> Result<usize> {
        for doc in &docs {
            self.check_dimensions(doc.embedding.len())?;
        }

        let mut store = self.docs.write().await;
        let removed = store.remove_file(file_path);
        let count = docs.len();
        for doc in docs {
            store.upsert(doc);
        }
        debug!("Replaced {} documents with {} for {}", removed, count, file_path);
        Ok(count)
    }

    async fn len(&self) -> usize {
        self.docs.read().await.by_id.len()
    }

    async fn clear(&self) {
        let mut store = self.docs.write().await;
        store.by_id.clear();
        store.by_file.clear();
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, file: &str, embedding: Vec<f32>) -> VectorDocument {
        VectorDocument {
            id: id.to_string(),
            chunk_id: id.to_string(),
            embedding,
            content: format!("content of {}", id),
            file_path: file.to_string(),
            start_line: 1,
            end_line: 10,
            metadata: None,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_returns_all_sorted_when_top_k_exceeds_len() {
        let store = InMemoryVectorStore::new(3);
        store
            .insert(vec![
                doc("a", "a.ts", vec![1.0, 0.0, 0.0]),
                doc("b", "b.ts", vec![0.7, 0.7, 0.0]),
                doc("c", "c.ts", vec![0.0, 0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.1, 0.0], 5, None).await.unwrap();
        assert_eq!(hits.len(), 3);
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_leaves_store_untouched() {
        let store = InMemoryVectorStore::new(3);
        store
            .insert(vec![doc("a", "a.ts", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();

        let err = store.search(&[1.0, 0.0], 5, None).await.unwrap_err();
        assert!(matches!(
            err,
            GvrError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));

        let err = store
            .insert(vec![
                doc("b", "b.ts", vec![1.0, 0.0, 0.0]),
                doc("c", "c.ts", vec![1.0]),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, GvrError::DimensionMismatch { .. }));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_store_yields_empty() {
        let store = InMemoryVectorStore::new(4);
        assert!(store.search(&[1.0, 0.0, 0.0, 0.0], 3, None).await.unwrap().is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_upsert_and_delete_by_file() {
        let store = InMemoryVectorStore::new(2);
        store
            .insert(vec![
                doc("a:1-10", "a.ts", vec![1.0, 0.0]),
                doc("a:11-20", "a.ts", vec![0.0, 1.0]),
                doc("b:1-10", "b.ts", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();
        store
            .insert(vec![doc("a:1-10", "a.ts", vec![0.5, 0.5])])
            .await
            .unwrap();
        assert_eq!(store.len().await, 3);

        assert_eq!(store.delete_by_file("a.ts").await, 2);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.delete_by_file("a.ts").await, 0);

        store.clear().await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_replace_file() {
        let store = InMemoryVectorStore::new(2);
        store
            .insert(vec![
                doc("a:1-10", "a.ts", vec![1.0, 0.0]),
                doc("a:11-20", "a.ts", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let stored = store
            .replace_file("a.ts", vec![doc("a:1-30", "a.ts", vec![1.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(stored, 1);
        let hits = store.search(&[1.0, 1.0], 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a:1-30");

        assert!(store
            .replace_file("a.ts", vec![doc("bad", "a.ts", vec![1.0])])
            .await
            .is_err());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_filters() {
        let store = InMemoryVectorStore::new(2);
        store
            .insert(vec![
                doc("1", "src/a.ts", vec![1.0, 0.0]),
                doc("2", "src/b.ts", vec![1.0, 0.0]),
                doc("3", "lib/c.ts", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let only_a = SearchFilter::new().with_file_path("src/a.ts");
        let hits = store.search(&[1.0, 0.0], 10, Some(&only_a)).await.unwrap();
        assert_eq!(hits.len(), 1);

        let src = SearchFilter::new().with_path_prefix("src/");
        assert_eq!(store.search(&[1.0, 0.0], 10, Some(&src)).await.unwrap().len(), 2);

        let set = SearchFilter::new()
            .with_file_paths(vec!["src/b.ts".to_string(), "lib/c.ts".to_string()])
            .with_path_prefix("lib/");
        let hits = store.search(&[1.0, 0.0], 10, Some(&set)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "3");
    }
}

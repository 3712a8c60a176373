//! Collaborator interfaces consumed by the engine.
//!
//! The engine only sees these traits, so either side can be swapped for a
//! remote service or a test double.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::graph::DependencyInfo;
use crate::graph_store::{DirectoryIndexStats, GraphStore, IndexFileResult};
use crate::semantic::{SemanticIndexResult, SemanticIndexer};
use crate::types::Node;
use crate::vector_store::{SearchFilter, SearchHit};

#[async_trait]
pub trait GraphBackend: Send + Sync {
    async fn index_file(&self, path: &str, content: &str) -> Result<IndexFileResult>;

    async fn index_directory(&self, root: &Path) -> Result<DirectoryIndexStats>;

    async fn get_dependents(&self, file: &str, depth: usize) -> Result<Vec<DependencyInfo>>;

    async fn get_dependencies(&self, file: &str, depth: usize) -> Result<Vec<DependencyInfo>>;

    async fn get_nodes_for_file(&self, file: &str) -> Result<Vec<Node>>;

    async fn search_nodes(&self, query: &str, limit: usize) -> Result<Vec<Node>>;

    async fn clear(&self) -> Result<()>;
}

#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn index(&self, path: &str, content: &str) -> Result<SemanticIndexResult>;

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<SearchFilter>,
    ) -> Result<Vec<SearchHit>>;

    async fn delete_file(&self, path: &str) -> Result<()>;
}

#[async_trait]
impl GraphBackend for GraphStore {
    async fn index_file(&self, path: &str, content: &str) -> Result<IndexFileResult> {
        self.index_content(path, content).await
    }

    async fn index_directory(&self, root: &Path) -> Result<DirectoryIndexStats> {
        GraphStore::index_directory(self, root).await
    }

    async fn get_dependents(&self, file: &str, depth: usize) -> Result<Vec<DependencyInfo>> {
        Ok(GraphStore::get_dependents(self, file, depth).await)
    }

    async fn get_dependencies(&self, file: &str, depth: usize) -> Result<Vec<DependencyInfo>> {
        Ok(GraphStore::get_dependencies(self, file, depth).await)
    }

    async fn get_nodes_for_file(&self, file: &str) -> Result<Vec<Node>> {
        Ok(GraphStore::get_nodes_for_file(self, file).await)
    }

    async fn search_nodes(&self, query: &str, limit: usize) -> Result<Vec<Node>> {
        Ok(GraphStore::search_nodes(self, query, limit).await)
    }

    async fn clear(&self) -> Result<()> {
        GraphStore::clear(self).await;
        Ok(())
    }
}

#[async_trait]
impl VectorBackend for SemanticIndexer {
    async fn index(&self, path: &str, content: &str) -> Result<SemanticIndexResult> {
        SemanticIndexer::index(self, path, content).await
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<SearchFilter>,
    ) -> Result<Vec<SearchHit>> {
        SemanticIndexer::search(self, query, top_k, filter.as_ref()).await
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        SemanticIndexer::delete_file(self, path).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::chunker::ChunkingPolicy;
    use crate::embeddings::MockEmbeddings;
    use crate::vector_store::InMemoryVectorStore;

    #[tokio::test]
    async fn test_graph_store_through_trait_object() {
        let backend: Arc<dyn GraphBackend> = Arc::new(GraphStore::new());
        backend
            .index_file("b.ts", "export function helper() {}\n")
            .await
            .unwrap();
        backend
            .index_file("a.ts", "import { helper } from './b';\nhelper();\n")
            .await
            .unwrap();

        let dependents = backend.get_dependents("b.ts", 2).await.unwrap();
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].file, "a.ts");
        assert_eq!(backend.search_nodes("help", 10).await.unwrap().len(), 1);

        backend.clear().await.unwrap();
        assert!(backend.get_nodes_for_file("a.ts").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_semantic_indexer_through_trait_object() {
        let backend: Arc<dyn VectorBackend> = Arc::new(SemanticIndexer::new(
            ChunkingPolicy {
                min_chunk_size: 1,
                ..ChunkingPolicy::default()
            },
            Arc::new(MockEmbeddings::new(8)),
            Arc::new(InMemoryVectorStore::new(8)),
        ));
        let result = backend.index("a.ts", "export const a = 1;\n").await.unwrap();
        assert_eq!(result.chunks_created, 1);

        let filter = SearchFilter::new().with_file_path("a.ts");
        assert_eq!(backend.search("a", 5, Some(filter)).await.unwrap().len(), 1);

        backend.delete_file("a.ts").await.unwrap();
        assert!(backend.search("a", 5, None).await.unwrap().is_empty());
    }
}

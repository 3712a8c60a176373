//! Vector-side indexing: chunk, embed, store.
//!
//! Keyed by the same file paths as the graph store, but indexed through a
//! separate call path; the two stores converge eventually rather than
//! transactionally.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::chunker::{Chunker, ChunkingPolicy};
use crate::embeddings::EmbeddingProvider;
use crate::error::{ErrorKind, GvrError, Result};
use crate::types::{compute_checksum, VectorDocument};
use crate::vector_store::{SearchFilter, SearchHit, VectorStore};
use crate::walk::{normalize_path, IndexOptions};

/// Outcome of indexing one file into the vector store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticIndexResult {
    pub updated: bool,
    pub chunks_created: usize,
}

/// Statistics about a semantic directory index run.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticIndexStats {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    /// Files that failed to read or embed
    pub files_skipped: usize,
    pub chunks_created: usize,
    /// Number of embedding batch calls
    pub embedding_calls: usize,
    pub skipped: Vec<String>,
}

/// Chunks files, embeds the chunks and keeps them in a [`VectorStore`].
pub struct SemanticIndexer {
    chunker: Chunker,
    embeddings: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    options: IndexOptions,
    /// file path -> last indexed content checksum. The write guard is held
    /// across each store update so a file's documents and checksum agree.
    checksums: RwLock<HashMap<String, String>>,
}

impl SemanticIndexer {
    pub fn new(
        policy: ChunkingPolicy,
        embeddings: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            chunker: Chunker::new(policy),
            embeddings,
            store,
            options: IndexOptions::default(),
            checksums: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Embed texts in provider-sized batches. Returns the vectors and the
    /// number of batch calls made.
    async fn embed_all(&self, texts: &[String]) -> Result<(Vec<Vec<f32>>, usize)> {
        let batch_size = self.embeddings.max_batch_size().max(1);
        let mut vectors = Vec::with_capacity(texts.len());
        let mut calls = 0;

        for batch in texts.chunks(batch_size) {
            let embedded = self
                .embeddings
                .embed_batch(batch)
                .await
                .map_err(|e| GvrError::backend_unavailable("embeddings", e))?;
            calls += 1;
            vectors.extend(embedded);
        }
        Ok((vectors, calls))
    }

    /// Index `content` under `file_path`, replacing any previous documents.
    pub async fn index(&self, file_path: &str, content: &str) -> Result<SemanticIndexResult> {
        self.index_counting(file_path, content)
            .await
            .map(|(result, _)| result)
    }

    async fn index_counting(
        &self,
        file_path: &str,
        content: &str,
    ) -> Result<(SemanticIndexResult, usize)> {
        let file_path = normalize_path(file_path);
        let checksum = compute_checksum(content);
        if self.checksums.read().await.get(&file_path) == Some(&checksum) {
            debug!("Unchanged, skipping embeddings: {}", file_path);
            return Ok((SemanticIndexResult::default(), 0));
        }

        let chunks = self.chunker.chunk_content(&file_path, content);
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let (vectors, calls) = self.embed_all(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(GvrError::backend_unavailable(
                "embeddings",
                format!("expected {} vectors, got {}", chunks.len(), vectors.len()),
            ));
        }

        let docs: Vec<VectorDocument> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, embedding)| VectorDocument::from_chunk(chunk, embedding))
            .collect();
        let mut checksums = self.checksums.write().await;
        // Another writer may have stored the same content meanwhile
        if checksums.get(&file_path) == Some(&checksum) {
            return Ok((SemanticIndexResult::default(), calls));
        }
        let chunks_created = self.store.replace_file(&file_path, docs).await?;
        checksums.insert(file_path.clone(), checksum);
        drop(checksums);
        debug!("Embedded {}: {} chunks", file_path, chunks_created);

        Ok((
            SemanticIndexResult {
                updated: true,
                chunks_created,
            },
            calls,
        ))
    }

    /// Index every supported file under `root`, keyed relative to `root`.
    ///
    /// Read and embedding failures are counted and skipped, and the skipped
    /// file keeps no checksum so the next run retries it. A dimension mismatch
    /// between provider and store aborts the run.
    pub async fn index_directory(&self, root: &Path) -> Result<SemanticIndexStats> {
        if !root.is_dir() {
            return Err(GvrError::NotFound(format!(
                "directory {}",
                root.display()
            )));
        }

        info!("Indexing embeddings for {:?}", root);
        let mut stats = SemanticIndexStats::default();

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

            match self.index_counting(&key, &content).await {
                Ok((result, calls)) => {
                    stats.embedding_calls += calls;
                    if result.updated {
                        stats.files_indexed += 1;
                        stats.chunks_created += result.chunks_created;
                    } else {
                        stats.files_unchanged += 1;
                    }
                }
                Err(e) if e.kind() == ErrorKind::DimensionMismatch => return Err(e),
                Err(e) => {
                    warn!("Skipping {}: {}", key, e);
                    stats.files_skipped += 1;
                    stats.skipped.push(key);
                }
            }
        }

        info!("Semantic indexing complete: {:?}", stats);
        Ok(stats)
    }

    /// Embed the query and search the store.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>> {
        let vector = self
            .embeddings
            .embed(query)
            .await
            .map_err(|e| GvrError::backend_unavailable("embeddings", e))?;
        self.store.search(&vector, top_k, filter).await
    }

    /// Remove a file's documents and checksum. Returns the number of documents removed.
    pub async fn delete_file(&self, file_path: &str) -> usize {
        let file_path = normalize_path(file_path);
        let mut checksums = self.checksums.write().await;
        checksums.remove(&file_path);
        self.store.delete_by_file(&file_path).await
    }

    pub async fn clear(&self) {
        let mut checksums = self.checksums.write().await;
        checksums.clear();
        self.store.clear().await;
    }
}

//! Graph-vector retrieval for code context.
//!
//! This crate provides:
//! - Source analysis of TypeScript/JavaScript using tree-sitter
//! - A code knowledge graph with checksum-based incremental re-indexing
//! - Token-bounded, overlapping chunking
//! - Pluggable embedding providers (deterministic mock, OpenAI-compatible HTTP)
//! - A brute-force in-memory vector store behind an adapter trait
//! - A hybrid engine ranking vector hits with graph-derived relevance

pub mod analyzer;
pub mod backend;
pub mod chunker;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod graph;
pub mod graph_store;
pub mod semantic;
pub mod types;
pub mod vector_store;
pub mod walk;

// Re-exports
pub use analyzer::{AnalysisResult, ImportInfo, SourceAnalyzer};
pub use backend::{GraphBackend, VectorBackend};
pub use chunker::{estimate_tokens, Chunker, ChunkingPolicy};
pub use embeddings::{EmbeddingProvider, HttpEmbeddings, MockEmbeddings};
pub use engine::{
    DependencyLink, EngineConfig, GraphContext, GvrEngine, QueryMetadata, QueryRequest,
    QueryResponse, QueryResult, ScoreBreakdown, ScoringWeights,
};
pub use error::{ErrorKind, GvrError, ParseError, Result};
pub use graph::{CodeGraph, DependencyInfo, Direction, GraphError, GraphStats, Relationship};
pub use graph_store::{DirectoryIndexStats, GraphStore, IndexFileResult};
pub use semantic::{SemanticIndexResult, SemanticIndexStats, SemanticIndexer};
pub use types::{Chunk, Edge, EdgeType, MetadataValue, Node, NodeType, VectorDocument};
pub use vector_store::{InMemoryVectorStore, SearchFilter, SearchHit, VectorStore};
pub use walk::IndexOptions;

/// Default embedding dimensions for the mock provider
pub const DEFAULT_DIMENSIONS: usize = 384;

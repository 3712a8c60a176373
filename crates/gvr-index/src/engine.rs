//! Hybrid retrieval engine.
//!
//! A query fans out to the vector backend and the graph backend
//! concurrently, then scores every vector hit as
//!
//! ```text
//! combined = w_semantic * semantic + w_graph * graph_relevance + w_focus * focus_boost
//! ```
//!
//! where `graph_relevance` is 1 when the hit's file is impacted by the
//! focused files and `focus_boost` is 1 when the hit's file is itself
//! focused. Weights are independent and need not sum to one.
//!
//! A graph backend that fails, times out or is cancelled degrades to zero
//! graph relevance instead of failing the query.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{GraphBackend, VectorBackend};
use crate::error::{ErrorKind, GvrError, Result};
use crate::graph::{innermost_node, Relationship};
use crate::graph_store::DirectoryIndexStats;
use crate::types::{Node, NodeType};
use crate::vector_store::SearchHit;
use crate::walk::normalize_path;

pub const MAX_TOP_K: usize = 50;
pub const MAX_GRAPH_DEPTH: usize = 5;

fn default_top_k() -> usize {
    10
}

fn default_graph_depth() -> usize {
    2
}

fn default_true() -> bool {
    true
}

/// Non-negative weights for the three score signals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub semantic: f32,
    pub graph: f32,
    pub focus: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            semantic: 0.6,
            graph: 0.3,
            focus: 0.1,
        }
    }
}

impl ScoringWeights {
    pub fn combine(&self, breakdown: &ScoreBreakdown) -> f32 {
        self.semantic * breakdown.semantic
            + self.graph * breakdown.graph_relevance
            + self.focus * breakdown.focus_boost
    }
}

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub weights: ScoringWeights,
    /// Per-signal deadline for collaborator calls
    pub timeout: Duration,
    pub max_connected_files: usize,
    /// Vector candidates fetched per requested result
    pub over_fetch: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            timeout: Duration::from_millis(5000),
            max_connected_files: 5,
            over_fetch: 2,
        }
    }
}

/// A retrieval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub focused_files: Vec<String>,
    /// 1..=50
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// 1..=5
    #[serde(default = "default_graph_depth")]
    pub graph_depth: usize,
    #[serde(default = "default_true")]
    pub include_graph_context: bool,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            focused_files: Vec::new(),
            top_k: default_top_k(),
            graph_depth: default_graph_depth(),
            include_graph_context: true,
        }
    }

    pub fn with_focused_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.focused_files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_graph_depth(mut self, depth: usize) -> Self {
        self.graph_depth = depth;
        self
    }

    pub fn with_graph_context(mut self, include: bool) -> Self {
        self.include_graph_context = include;
        self
    }

    /// Reject out-of-range parameters before any work is done.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_TOP_K).contains(&self.top_k) {
            return Err(GvrError::Validation(format!(
                "topK must be between 1 and {}, got {}",
                MAX_TOP_K, self.top_k
            )));
        }
        if !(1..=MAX_GRAPH_DEPTH).contains(&self.graph_depth) {
            return Err(GvrError::Validation(format!(
                "graphDepth must be between 1 and {}, got {}",
                MAX_GRAPH_DEPTH, self.graph_depth
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub semantic: f32,
    pub graph_relevance: f32,
    pub focus_boost: f32,
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub id: String,
    pub content: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub score: f32,
    pub score_breakdown: ScoreBreakdown,
    pub connected_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
}

/// A focused file and one of its dependents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyLink {
    /// The focused file the traversal started from
    pub focus: String,
    /// A file depending on `focus`
    pub file: String,
    pub depth: usize,
    pub relationship: Relationship,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphContext {
    /// Focused files followed by their dependents, deduplicated
    pub impacted_files: Vec<String>,
    pub dependency_chain: Vec<DependencyLink>,
    /// Function, class and method names defined in the focused files
    pub modified_symbols: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    /// Wall-clock milliseconds
    #[serde(rename = "queryTime")]
    pub query_time_ms: u64,
    pub vector_hits: usize,
    pub graph_nodes_visited: usize,
    /// True when a signal was dropped because of failure, timeout or cancellation
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub results: Vec<QueryResult>,
    pub graph_context: Option<GraphContext>,
    pub metadata: QueryMetadata,
}

/// Why a collaborator call produced no value.
#[derive(Debug)]
enum SignalFailure {
    Cancelled,
    TimedOut,
    Failed(GvrError),
}

impl std::fmt::Display for SignalFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalFailure::Cancelled => f.write_str("cancelled"),
            SignalFailure::TimedOut => f.write_str("timed out"),
            SignalFailure::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Raw graph signal gathered for the focused files.
struct GraphSignal {
    chain: Vec<DependencyLink>,
    focus_nodes: Vec<Node>,
}

/// Orchestrates hybrid graph + vector retrieval.
pub struct GvrEngine {
    graph: Arc<dyn GraphBackend>,
    vector: Arc<dyn VectorBackend>,
    config: EngineConfig,
}

impl GvrEngine {
    pub fn new(graph: Arc<dyn GraphBackend>, vector: Arc<dyn VectorBackend>) -> Self {
        Self {
            graph,
            vector,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build the code graph for a project. Vector indexing is a separate path.
    pub async fn index_project(&self, root: &Path) -> Result<DirectoryIndexStats> {
        self.graph.index_directory(root).await
    }

    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse> {
        self.query_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Run a query; cancelling `cancel` degrades outstanding signals to empty.
    pub async fn query_with_cancel(
        &self,
        request: QueryRequest,
        cancel: CancellationToken,
    ) -> Result<QueryResponse> {
        request.validate()?;
        let started = Instant::now();

        let focused: Vec<String> = dedup(request.focused_files.iter().map(|f| normalize_path(f)));
        let fetch_limit = request.top_k * self.config.over_fetch.max(1);

        let vector_call = self.guarded(
            self.vector.search(&request.query, fetch_limit, None),
            &cancel,
        );
        let graph_call = async {
            if request.include_graph_context {
                Some(
                    self.guarded(self.graph_signal(&focused, request.graph_depth), &cancel)
                        .await,
                )
            } else {
                None
            }
        };
        let (vector_outcome, graph_outcome) = tokio::join!(vector_call, graph_call);

        let mut degraded = false;
        let hits = match vector_outcome {
            Ok(hits) => hits,
            Err(SignalFailure::Failed(e))
                if matches!(e.kind(), ErrorKind::DimensionMismatch | ErrorKind::Validation) =>
            {
                return Err(e);
            }
            Err(failure) => {
                warn!("Vector search degraded: {}", failure);
                degraded = true;
                Vec::new()
            }
        };

        let signal = match graph_outcome {
            Some(Ok(signal)) => Some(signal),
            Some(Err(failure)) => {
                warn!("Graph context degraded, using zero graph relevance: {}", failure);
                degraded = true;
                None
            }
            None => None,
        };

        let graph_context = signal.as_ref().map(|s| Self::build_context(&focused, s));
        let graph_nodes_visited = signal
            .as_ref()
            .map(|s| s.chain.len() + s.focus_nodes.len())
            .unwrap_or(0);
        let vector_hits = hits.len();

        let mut results = self.score(hits, &focused, graph_context.as_ref());
        results.truncate(request.top_k);

        if let Some(context) = &graph_context {
            self.attach_connected_files(&mut results, context);
        }
        let known_nodes = signal.map(|s| s.focus_nodes).unwrap_or_default();
        self.attach_node_types(&mut results, known_nodes, &cancel).await;

        let metadata = QueryMetadata {
            query_time_ms: started.elapsed().as_millis() as u64,
            vector_hits,
            graph_nodes_visited,
            degraded,
        };
        info!(
            "Query returned {} results from {} hits in {}ms",
            results.len(),
            metadata.vector_hits,
            metadata.query_time_ms
        );

        Ok(QueryResponse {
            results,
            graph_context,
            metadata,
        })
    }

    /// Await `call` under the engine timeout and the cancellation token.
    async fn guarded<T, F>(
        &self,
        call: F,
        cancel: &CancellationToken,
    ) -> std::result::Result<T, SignalFailure>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SignalFailure::Cancelled),
            outcome = tokio::time::timeout(self.config.timeout, call) => match outcome {
                Err(_) => Err(SignalFailure::TimedOut),
                Ok(Err(e)) => Err(SignalFailure::Failed(e)),
                Ok(Ok(value)) => Ok(value),
            },
        }
    }

    /// Dependents and node listings for every focused file, fetched concurrently.
    async fn graph_signal(&self, focused: &[String], depth: usize) -> Result<GraphSignal> {
        let dependents = join_all(
            focused
                .iter()
                .map(|file| self.graph.get_dependents(file, depth)),
        );
        let listings = join_all(focused.iter().map(|file| self.graph.get_nodes_for_file(file)));
        let (dependents, listings) = tokio::join!(dependents, listings);

        let mut chain = Vec::new();
        for (focus, result) in focused.iter().zip(dependents) {
            for info in result? {
                chain.push(DependencyLink {
                    focus: focus.clone(),
                    file: info.file,
                    depth: info.depth,
                    relationship: info.relationship,
                });
            }
        }

        let mut focus_nodes = Vec::new();
        for nodes in listings {
            focus_nodes.extend(nodes?);
        }

        debug!(
            "Graph signal: {} dependency links, {} focused nodes",
            chain.len(),
            focus_nodes.len()
        );
        Ok(GraphSignal { chain, focus_nodes })
    }

    fn build_context(focused: &[String], signal: &GraphSignal) -> GraphContext {
        let impacted_files = dedup(
            focused
                .iter()
                .cloned()
                .chain(signal.chain.iter().map(|link| link.file.clone())),
        );
        let modified_symbols = dedup(
            signal
                .focus_nodes
                .iter()
                .filter(|n| n.node_type.is_callable_or_class())
                .map(|n| n.name.clone()),
        );

        GraphContext {
            impacted_files,
            dependency_chain: signal.chain.clone(),
            modified_symbols,
        }
    }

    fn score(
        &self,
        hits: Vec<SearchHit>,
        focused: &[String],
        context: Option<&GraphContext>,
    ) -> Vec<QueryResult> {
        let focused: HashSet<&str> = focused.iter().map(String::as_str).collect();
        let impacted: HashSet<&str> = context
            .map(|c| c.impacted_files.iter().map(String::as_str).collect())
            .unwrap_or_default();

        let mut results: Vec<QueryResult> = hits
            .into_iter()
            .map(|hit| {
                let file = hit.document.file_path.as_str();
                let breakdown = ScoreBreakdown {
                    semantic: hit.score,
                    graph_relevance: if impacted.contains(file) { 1.0 } else { 0.0 },
                    focus_boost: if focused.contains(file) { 1.0 } else { 0.0 },
                };
                QueryResult {
                    score: self.config.weights.combine(&breakdown),
                    score_breakdown: breakdown,
                    id: hit.id,
                    content: hit.document.content,
                    file_path: hit.document.file_path,
                    start_line: hit.document.start_line,
                    end_line: hit.document.end_line,
                    connected_files: Vec::new(),
                    node_type: None,
                }
            })
            .collect();

        // Stable: equal scores keep vector order
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results
    }

    fn attach_connected_files(&self, results: &mut [QueryResult], context: &GraphContext) {
        let chain_files: Vec<&str> = dedup_refs(
            context
                .dependency_chain
                .iter()
                .flat_map(|link| [link.focus.as_str(), link.file.as_str()]),
        );

        for result in results.iter_mut() {
            result.connected_files = chain_files
                .iter()
                .filter(|f| **f != result.file_path)
                .take(self.config.max_connected_files)
                .map(|f| f.to_string())
                .collect();
        }
    }

    /// Best effort: results whose file listing fails keep no node type.
    async fn attach_node_types(
        &self,
        results: &mut [QueryResult],
        known: Vec<Node>,
        cancel: &CancellationToken,
    ) {
        let mut by_file: HashMap<String, Vec<Node>> = HashMap::new();
        for node in known {
            by_file.entry(node.file_path.clone()).or_default().push(node);
        }

        let missing: Vec<String> = dedup_refs(results.iter().map(|r| r.file_path.as_str()))
            .into_iter()
            .filter(|f| !by_file.contains_key(*f))
            .map(String::from)
            .collect();
        let listings = join_all(
            missing
                .iter()
                .map(|file| self.guarded(self.graph.get_nodes_for_file(file), cancel)),
        )
        .await;
        for (file, listing) in missing.into_iter().zip(listings) {
            match listing {
                Ok(nodes) => {
                    by_file.insert(file, nodes);
                }
                Err(failure) => debug!("No node types for {}: {}", file, failure),
            }
        }

        for result in results.iter_mut() {
            result.node_type = by_file
                .get(&result.file_path)
                .and_then(|nodes| innermost_node(nodes, result.start_line))
                .map(|node| node.node_type);
        }
    }
}

/// Keep the first occurrence of each value, preserving order.
fn dedup(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

fn dedup_refs<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    values.into_iter().filter(|v| seen.insert(*v)).collect()
}

//! Command-line driver for graph-vector retrieval.
//!
//! Every command builds fresh in-process stores, indexes the given root and
//! prints JSON on stdout. Logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use gvr_config::{EmbeddingsConfig, EmbeddingsProvider, GvrConfig};
use gvr_index::{
    DirectoryIndexStats, EmbeddingProvider, GraphStore, GvrEngine, HttpEmbeddings,
    InMemoryVectorStore, MockEmbeddings, QueryRequest, SemanticIndexStats, SemanticIndexer,
};

#[derive(Parser, Debug)]
#[command(name = "gvr", version)]
#[command(about = "Hybrid graph and vector retrieval over TypeScript/JavaScript sources", long_about = None)]
pub struct Cli {
    /// Path to a TOML config file (defaults to ./gvr.toml, then ~/.config/gvr/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Index a project into the code graph and the vector store
    Index {
        /// Project root
        root: PathBuf,
    },
    /// Run a hybrid query
    Query {
        /// Natural-language query
        text: String,
        /// Project root
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Focused file, relative to the root (repeatable)
        #[arg(long = "focus")]
        focus: Vec<String>,
        /// Number of results
        #[arg(long, default_value_t = 10)]
        top_k: usize,
        /// Dependent traversal depth
        #[arg(long, default_value_t = 2)]
        depth: usize,
        /// Skip the graph signal
        #[arg(long)]
        no_graph: bool,
    },
    /// Show the files a file depends on, or with --reverse the files depending on it
    Deps {
        /// File path relative to the root
        file: String,
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long, default_value_t = 2)]
        depth: usize,
        #[arg(long)]
        reverse: bool,
    },
    /// Search graph symbols by name
    Symbols {
        query: String,
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexSummary {
    graph: DirectoryIndexStats,
    semantic: SemanticIndexStats,
}

/// Stores and engine shared by every command of one process.
struct Workspace {
    graph: Arc<GraphStore>,
    semantic: Arc<SemanticIndexer>,
    engine: GvrEngine,
}

impl Workspace {
    fn new(config: &GvrConfig) -> Self {
        let graph = Arc::new(GraphStore::with_options(config.index.clone()));
        let semantic = Arc::new(
            SemanticIndexer::new(
                config.chunking,
                embedding_provider(&config.embeddings),
                Arc::new(InMemoryVectorStore::new(config.embeddings.dimensions)),
            )
            .with_options(config.index.clone()),
        );
        let engine = GvrEngine::new(graph.clone(), semantic.clone())
            .with_config(config.engine_config());

        Self {
            graph,
            semantic,
            engine,
        }
    }

    async fn index_graph(&self, root: &Path) -> Result<DirectoryIndexStats> {
        self.engine
            .index_project(root)
            .await
            .with_context(|| format!("Failed to build code graph for {}", root.display()))
    }

    async fn index_all(&self, root: &Path) -> Result<IndexSummary> {
        let graph = self.index_graph(root).await?;
        let semantic = self
            .semantic
            .index_directory(root)
            .await
            .with_context(|| format!("Failed to embed {}", root.display()))?;
        Ok(IndexSummary { graph, semantic })
    }
}

fn embedding_provider(config: &EmbeddingsConfig) -> Arc<dyn EmbeddingProvider> {
    match config.provider {
        EmbeddingsProvider::Mock => Arc::new(MockEmbeddings::new(config.dimensions)),
        EmbeddingsProvider::Http => {
            let mut provider = HttpEmbeddings::new(&config.model, config.dimensions);
            if let Some(url) = &config.base_url {
                provider = provider.with_base_url(url);
            }
            if let Some(key) = &config.api_key {
                provider = provider.with_api_key(key);
            }
            Arc::new(provider)
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "gvr=debug" } else { "gvr=info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = GvrConfig::load(cli.config.as_deref())?;
    debug!("Effective configuration: {:?}", config);

    let output = execute(cli.command, &config).await?;
    match output {
        Value::String(text) => print!("{}", text),
        value => println!("{}", serde_json::to_string_pretty(&value)?),
    }
    Ok(())
}

/// Run one command and return its output; `config` prints TOML as a string value.
pub async fn execute(command: Commands, config: &GvrConfig) -> Result<Value> {
    let workspace = Workspace::new(config);
    let output = match command {
        Commands::Index { root } => {
            let summary = workspace.index_all(&root).await?;
            info!(
                "Indexed {} files into the graph and {} chunks into the vector store",
                summary.graph.files_indexed, summary.semantic.chunks_created
            );
            serde_json::to_value(summary)?
        }
        Commands::Query {
            text,
            root,
            focus,
            top_k,
            depth,
            no_graph,
        } => {
            workspace.index_all(&root).await?;
            let request = QueryRequest::new(text)
                .with_focused_files(focus)
                .with_top_k(top_k)
                .with_graph_depth(depth)
                .with_graph_context(!no_graph);
            let response = workspace.engine.query(request).await?;
            serde_json::to_value(response)?
        }
        Commands::Deps {
            file,
            root,
            depth,
            reverse,
        } => {
            workspace.index_graph(&root).await?;
            let deps = if reverse {
                workspace.graph.get_dependents(&file, depth).await
            } else {
                workspace.graph.get_dependencies(&file, depth).await
            };
            serde_json::to_value(deps)?
        }
        Commands::Symbols { query, root, limit } => {
            workspace.index_graph(&root).await?;
            let nodes = workspace.graph.search_nodes(&query, limit).await;
            serde_json::to_value(nodes)?
        }
        Commands::Config => Value::String(config.to_toml()?),
    };
    Ok(output)
}

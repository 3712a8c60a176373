//! Shared data model for the code knowledge graph and the vector store.
//!
//! Nodes and edges carry deterministic ids so that re-parsing an unchanged
//! file reproduces the same keys. Two distinct symbols sharing
//! `(file_path, type, name)` (overloads, for example) map to the same node id;
//! the later one replaces the earlier one in the graph.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a node in the graph.
pub type NodeId = String;

/// Unique identifier for an edge in the graph.
pub type EdgeId = String;

/// Kind of graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    File,
    Class,
    Function,
    Method,
    Interface,
    Type,
    Variable,
    Import,
    Export,
    Enum,
}

impl NodeType {
    /// Stable lowercase label, also used inside node ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::File => "file",
            NodeType::Class => "class",
            NodeType::Function => "function",
            NodeType::Method => "method",
            NodeType::Interface => "interface",
            NodeType::Type => "type",
            NodeType::Variable => "variable",
            NodeType::Import => "import",
            NodeType::Export => "export",
            NodeType::Enum => "enum",
        }
    }

    /// Whether symbols of this kind count as "modified symbols" of a focused file.
    pub fn is_callable_or_class(&self) -> bool {
        matches!(self, NodeType::Function | NodeType::Class | NodeType::Method)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of relationship between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// File imports a module (file -> import node)
    Imports,
    /// File exports a symbol (file -> symbol)
    Exports,
    /// Class or interface extends another (symbol -> symbol)
    Extends,
    /// Class implements an interface (symbol -> symbol)
    Implements,
    Calls,
    References,
    /// Structural containment (file -> symbol, class -> method)
    Contains,
    /// Resolved relative import (file -> file)
    DependsOn,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Imports => "imports",
            EdgeType::Exports => "exports",
            EdgeType::Extends => "extends",
            EdgeType::Implements => "implements",
            EdgeType::Calls => "calls",
            EdgeType::References => "references",
            EdgeType::Contains => "contains",
            EdgeType::DependsOn => "depends_on",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar value allowed in node and document metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

/// Ordered metadata bag restricted to scalar values.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A code symbol or file in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Deterministic id derived from (file_path, node_type, name)
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub name: String,
    pub file_path: String,
    /// Start line (1-indexed)
    pub start_line: usize,
    /// End line (1-indexed)
    pub end_line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Node {
    /// Create a new node; the id is derived from the path, type and name.
    pub fn new(
        node_type: NodeType,
        name: impl Into<String>,
        file_path: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let file_path = file_path.into();
        let id = Self::generate_id(&file_path, node_type, &name);

        Self {
            id,
            node_type,
            name,
            file_path,
            start_line: 1,
            end_line: 1,
            signature: None,
            docstring: None,
            language: language.into(),
            metadata: None,
        }
    }

    /// Generate the deterministic node id.
    pub fn generate_id(file_path: &str, node_type: NodeType, name: &str) -> NodeId {
        format!("{}#{}:{}", file_path, node_type.as_str(), name)
    }

    /// Id of the file node for a path.
    pub fn file_id(file_path: &str) -> NodeId {
        Self::generate_id(file_path, NodeType::File, file_path)
    }

    /// Set line range.
    pub fn with_range(mut self, start_line: usize, end_line: usize) -> Self {
        self.start_line = start_line;
        self.end_line = end_line;
        self
    }

    pub fn with_signature(mut self, sig: impl Into<String>) -> Self {
        self.signature = Some(sig.into());
        self
    }

    pub fn with_docstring(mut self, doc: impl Into<String>) -> Self {
        self.docstring = Some(doc.into());
        self
    }

    /// Insert one metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value.into());
        self
    }

    /// Look up a metadata value.
    pub fn meta(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }

    /// Whether the analyzer marked this symbol as exported.
    pub fn is_exported(&self) -> bool {
        self.meta("exported")
            .and_then(MetadataValue::as_bool)
            .unwrap_or(false)
    }

    /// Whether `line` falls inside this node's range.
    pub fn contains_line(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }
}

/// A directed relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub source_id: NodeId,
    pub target_id: NodeId,
}

impl Edge {
    /// Create a new edge with a deterministic id.
    pub fn new(source: impl Into<String>, target: impl Into<String>, edge_type: EdgeType) -> Self {
        let source_id = source.into();
        let target_id = target.into();
        let id = format!("{}-{}->{}", source_id, edge_type.as_str(), target_id);

        Self {
            id,
            edge_type,
            source_id,
            target_id,
        }
    }
}

/// A bounded, overlapping slice of file text prepared for embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub file_path: String,
    /// Start line (1-indexed)
    pub start_line: usize,
    /// End line (1-indexed, inclusive)
    pub end_line: usize,
    /// SHA256 hex of `content`
    pub checksum: String,
}

/// A chunk together with its embedding, as held by a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorDocument {
    pub id: String,
    pub chunk_id: String,
    pub embedding: Vec<f32>,
    pub content: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl VectorDocument {
    /// Build a document from a chunk and its embedding. The document id is the chunk id.
    pub fn from_chunk(chunk: &Chunk, embedding: Vec<f32>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("checksum".to_string(), chunk.checksum.clone().into());

        Self {
            id: chunk.id.clone(),
            chunk_id: chunk.id.clone(),
            embedding,
            content: chunk.content.clone(),
            file_path: chunk.file_path.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            metadata: Some(metadata),
        }
    }
}

/// Compute the SHA256 hex digest of some text.
pub fn compute_checksum(content: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Map a file extension to the analyzer's language name.
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.').map(|(_, ext)| ext)?;
    match ext {
        "ts" | "tsx" | "mts" | "cts" => Some("typescript"),
        "js" | "jsx" | "mjs" | "cjs" => Some("javascript"),
        _ => None,
    }
}

//! Error taxonomy for graph-vector retrieval.
//!
//! Per-file parse failures and collaborator outages are recovered locally by
//! the indexers and the engine; dimension mismatches and validation errors are
//! terminal for the call that produced them.

use std::path::PathBuf;

use thiserror::Error;

/// Malformed source reported by the analyzer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to parse {file_path}: {reason}")]
pub struct ParseError {
    pub file_path: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(file_path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors produced by the stores, indexers and engine.
#[derive(Error, Debug)]
pub enum GvrError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backend unavailable ({backend}): {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fieldless error category, for callers that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    DimensionMismatch,
    NotFound,
    BackendUnavailable,
    Validation,
    Io,
}

impl GvrError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GvrError::Parse(_) => ErrorKind::Parse,
            GvrError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            GvrError::NotFound(_) => ErrorKind::NotFound,
            GvrError::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            GvrError::Validation(_) => ErrorKind::Validation,
            GvrError::Io { .. } => ErrorKind::Io,
        }
    }

    pub fn backend_unavailable(backend: impl Into<String>, reason: impl ToString) -> Self {
        GvrError::BackendUnavailable {
            backend: backend.into(),
            reason: reason.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GvrError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, GvrError>;

//! Error types for the kestrel-ml crate.
//!
//! Retrieval itself never fails on degenerate input (empty queries and empty
//! corpora produce empty results); these errors cover corpus IO and invalid
//! caller-supplied parameters.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Failed to read corpus file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid index configuration: {0}")]
    Config(String),
}

impl RagError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

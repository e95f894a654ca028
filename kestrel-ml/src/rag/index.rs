//! Lexical TF-IDF index over the knowledge corpus.
//!
//! Built once from a directory of Markdown documents; read-only afterwards.
//! `KnowledgeBase` provides lazy build-once access for long-lived callers.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

use super::loader::{Chunk, chunk_document, load_documents};
use crate::error::RagError;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "only", "over", "when", "then",
    "than", "must", "should", "can", "may", "are", "your", "you", "use", "using", "uses", "set",
    "sets", "not", "none",
];

type SparseVector = HashMap<String, f64>;

/// Lowercase, extract ASCII alphanumeric runs, drop 1-char tokens and stopwords.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        .filter(|token| token.len() > 1 && !STOPWORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// A chunk ranked against a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub chunk_id: String,
    pub title: String,
    pub source_url: String,
    pub text: String,
    /// Cosine similarity in `(0, 1]`.
    pub score: f64,
}

/// Build statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub vocabulary: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LexicalIndex {
    chunks: Vec<Chunk>,
    idf: HashMap<String, f64>,
    vectors: Vec<SparseVector>,
    norms: Vec<f64>,
    documents: usize,
}

impl LexicalIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load, chunk, and vectorize every document under `path`.
    ///
    /// A missing directory yields an empty index.
    pub fn build(path: &Path, max_chunk_chars: usize) -> Result<Self, RagError> {
        if max_chunk_chars == 0 {
            return Err(RagError::config("max_chunk_chars must be greater than zero"));
        }
        let documents = load_documents(path)?;
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| chunk_document(doc, max_chunk_chars))
            .collect();
        let index = Self::from_chunks(chunks);

        let stats = index.stats();
        if stats.chunks == 0 {
            warn!(path = %path.display(), "Knowledge index is empty; explanations will carry no citations");
        } else {
            info!(
                path = %path.display(),
                documents = stats.documents,
                chunks = stats.chunks,
                vocabulary = stats.vocabulary,
                "Built knowledge index"
            );
        }
        Ok(index)
    }

    /// Vectorize pre-built chunks.
    pub fn from_chunks(chunks: Vec<Chunk>) -> Self {
        let idf = compute_idf(&chunks);
        let vectors: Vec<SparseVector> = chunks
            .iter()
            .map(|chunk| vectorize(&indexed_text(chunk), &idf))
            .collect();
        let norms = vectors.iter().map(l2_norm).collect();
        let documents = chunks
            .iter()
            .map(|chunk| chunk.doc_id.as_str())
            .collect::<HashSet<_>>()
            .len();
        Self {
            chunks,
            idf,
            vectors,
            norms,
            documents,
        }
    }

    /// Rank chunks by cosine similarity to `query`.
    ///
    /// Only strictly positive scores are kept. Equal scores keep chunk order.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<RetrievedContext> {
        let query = query.trim();
        if self.chunks.is_empty() || query.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let query_vector = vectorize(query, &self.idf);
        let query_norm = l2_norm(&query_vector);
        if query_vector.is_empty() || query_norm == 0.0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f64)> = self
            .vectors
            .iter()
            .zip(&self.norms)
            .enumerate()
            .filter(|(_, (_, norm))| **norm != 0.0)
            .filter_map(|(idx, (vector, norm))| {
                let dot: f64 = query_vector
                    .iter()
                    .map(|(token, weight)| weight * vector.get(token).copied().unwrap_or(0.0))
                    .sum();
                let score = dot / (query_norm * norm);
                (score > 0.0).then_some((idx, score))
            })
            .collect();

        // Stable: ties keep insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(idx, score)| {
                let chunk = &self.chunks[idx];
                RetrievedContext {
                    chunk_id: chunk.chunk_id.clone(),
                    title: chunk.title.clone(),
                    source_url: chunk.source_url.clone(),
                    text: chunk.text.clone(),
                    score,
                }
            })
            .collect()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            documents: self.documents,
            chunks: self.chunks.len(),
            vocabulary: self.idf.len(),
        }
    }
}

fn indexed_text(chunk: &Chunk) -> String {
    format!("{} {}", chunk.title, chunk.text)
}

/// `idf = ln((1 + N) / (1 + df)) + 1`, with df over distinct tokens per chunk.
fn compute_idf(chunks: &[Chunk]) -> HashMap<String, f64> {
    let mut df: HashMap<String, usize> = HashMap::new();
    for chunk in chunks {
        let distinct: HashSet<String> = tokenize(&indexed_text(chunk)).into_iter().collect();
        for token in distinct {
            *df.entry(token).or_insert(0) += 1;
        }
    }
    let n = chunks.len() as f64;
    df.into_iter()
        .map(|(token, count)| {
            let idf = ((1.0 + n) / (1.0 + count as f64)).ln() + 1.0;
            (token, idf)
        })
        .collect()
}

fn vectorize(text: &str, idf: &HashMap<String, f64>) -> SparseVector {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return SparseVector::new();
    }
    let total = tokens.len() as f64;
    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in tokens {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .filter_map(|(token, count)| {
            let weight = (count as f64 / total) * idf.get(&token).copied().unwrap_or(0.0);
            (weight != 0.0).then_some((token, weight))
        })
        .collect()
}

fn l2_norm(vector: &SparseVector) -> f64 {
    vector.values().map(|w| w * w).sum::<f64>().sqrt()
}

/// Lazily built, shared knowledge index.
///
/// The first `index()` call builds from `path`; later calls return the same
/// instance. A failed build is logged and leaves an empty index in place.
#[derive(Debug)]
pub struct KnowledgeBase {
    path: PathBuf,
    max_chunk_chars: usize,
    index: OnceLock<LexicalIndex>,
}

impl KnowledgeBase {
    pub fn new(path: impl Into<PathBuf>, max_chunk_chars: usize) -> Self {
        Self {
            path: path.into(),
            max_chunk_chars,
            index: OnceLock::new(),
        }
    }

    /// Wrap an already-built index.
    pub fn from_index(index: LexicalIndex) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(index);
        Self {
            path: PathBuf::new(),
            max_chunk_chars: 0,
            index: cell,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_built(&self) -> bool {
        self.index.get().is_some()
    }

    pub fn index(&self) -> &LexicalIndex {
        self.index.get_or_init(|| {
            LexicalIndex::build(&self.path, self.max_chunk_chars).unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build knowledge index; retrieval disabled");
                LexicalIndex::empty()
            })
        })
    }

    pub fn search(&self, query: &str, top_k: usize) -> Vec<RetrievedContext> {
        self.index().search(query, top_k)
    }

    /// Discard the current index and build a fresh one from the same path.
    pub fn rebuild(self) -> Result<Self, RagError> {
        let index = LexicalIndex::build(&self.path, self.max_chunk_chars)?;
        let cell = OnceLock::new();
        let _ = cell.set(index);
        Ok(Self {
            path: self.path,
            max_chunk_chars: self.max_chunk_chars,
            index: cell,
        })
    }
}

//! Corpus loading and chunking.
//!
//! A corpus is a directory tree of Markdown files. Each file carries a
//! `# Title` line and a `source: <url>` line; everything else is body text,
//! split into paragraph blocks and then into bounded chunks.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::RagError;

/// Title used when a document has no `# ` heading.
pub const DEFAULT_TITLE: &str = "Karpenter docs";

/// A titled, source-attributed knowledge document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub title: String,
    pub source_url: String,
    pub content: String,
}

/// A bounded slice of a document's body, carrying its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub title: String,
    pub source_url: String,
    pub text: String,
}

/// Load every `*.md` document under `dir`, recursively, in sorted path order.
///
/// A missing directory is an empty corpus. Files whose body is empty after
/// removing the metadata lines are skipped. Document ids are the path
/// relative to `dir`, without the extension, with separators replaced by `-`.
pub fn load_documents(dir: &Path) -> Result<Vec<Document>, RagError> {
    if !dir.is_dir() {
        debug!(path = %dir.display(), "Knowledge directory not found; corpus is empty");
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in walkdir::WalkDir::new(dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Skipping unreadable corpus entry");
                continue;
            }
        };
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "md")
        {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = std::fs::read_to_string(&path).map_err(|e| RagError::io(&path, e))?;
        let doc_id = doc_id_for(dir, &path);
        match parse_document(&doc_id, &raw) {
            Some(document) => documents.push(document),
            None => debug!(doc_id = %doc_id, "Skipping document with empty body"),
        }
    }
    Ok(documents)
}

fn doc_id_for(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path).with_extension("");
    relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("-")
}

/// Split raw Markdown into a document, or `None` when the body is empty.
pub fn parse_document(doc_id: &str, raw: &str) -> Option<Document> {
    let mut title: Option<String> = None;
    let mut source_url: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();

    for line in raw.lines() {
        if let Some(heading) = line.strip_prefix("# ") {
            title.get_or_insert_with(|| heading.trim().to_string());
            continue;
        }
        if is_source_line(line) {
            if source_url.is_none() {
                let value = line.split_once(':').map(|(_, rest)| rest).unwrap_or("");
                source_url = Some(value.trim().to_string());
            }
            continue;
        }
        body.push(line);
    }

    let content = body.join("\n").trim().to_string();
    if content.is_empty() {
        return None;
    }
    Some(Document {
        doc_id: doc_id.to_string(),
        title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        source_url: source_url.unwrap_or_default(),
        content,
    })
}

fn is_source_line(line: &str) -> bool {
    line.get(..7)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("source:"))
}

/// Chunk a document: paragraph blocks, then sentence-aligned pieces of at
/// most `max_chars` characters. Chunk ids are `<doc_id>-<n>`, sequential per
/// document.
pub fn chunk_document(document: &Document, max_chars: usize) -> Vec<Chunk> {
    paragraph_blocks(&document.content)
        .iter()
        .flat_map(|block| split_long_block(block, max_chars))
        .enumerate()
        .map(|(idx, text)| Chunk {
            chunk_id: format!("{}-{}", document.doc_id, idx),
            doc_id: document.doc_id.clone(),
            title: document.title.clone(),
            source_url: document.source_url.clone(),
            text,
        })
        .collect()
}

/// Group consecutive non-blank lines; each block is its trimmed lines joined
/// by single spaces.
pub fn paragraph_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !current.is_empty() {
                blocks.push(current.join(" "));
                current.clear();
            }
            continue;
        }
        current.push(trimmed);
    }
    if !current.is_empty() {
        blocks.push(current.join(" "));
    }
    blocks
}

/// Split a block longer than `max_chars` characters at the last `". "`
/// that fits, falling back to a hard cut at `max_chars`.
pub fn split_long_block(block: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if block.chars().count() <= max_chars {
        return vec![block.to_string()];
    }

    let mut parts = Vec::new();
    let mut remaining = block.to_string();
    while remaining.chars().count() > max_chars {
        let limit = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(offset, _)| offset)
            .unwrap_or(remaining.len());
        let cut = match remaining[..limit].rfind(". ") {
            Some(pos) => pos + 1,
            None => limit,
        };
        let part = remaining[..cut].trim();
        if !part.is_empty() {
            parts.push(part.to_string());
        }
        remaining = remaining[cut..].trim().to_string();
    }
    if !remaining.is_empty() {
        parts.push(remaining);
    }
    parts
}

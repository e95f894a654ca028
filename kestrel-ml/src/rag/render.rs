//! Retrieved-context to citation projection.

use kestrel_core::types::Citation;
use std::collections::HashSet;
use url::Url;

use super::index::RetrievedContext;
use super::loader::DEFAULT_TITLE;

/// True when `url` is an absolute `http`/`https` URL with a host.
pub fn is_valid_source_url(url: &str) -> bool {
    Url::parse(url).is_ok_and(|parsed| {
        matches!(parsed.scheme(), "http" | "https")
            && parsed.host_str().is_some_and(|host| !host.is_empty())
    })
}

/// Project retrieved contexts into citations.
///
/// First occurrence of each source URL wins; blank, malformed, and
/// duplicate URLs are dropped silently.
pub fn render_citations(contexts: &[RetrievedContext]) -> Vec<Citation> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut citations = Vec::new();
    for context in contexts {
        let url = context.source_url.trim();
        if url.is_empty() || !is_valid_source_url(url) || !seen.insert(url) {
            continue;
        }
        let title = context.title.trim();
        citations.push(Citation {
            title: if title.is_empty() {
                DEFAULT_TITLE.to_string()
            } else {
                title.to_string()
            },
            source_url: url.to_string(),
            score: Some(context.score),
        });
    }
    citations
}

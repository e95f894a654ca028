//! Retrieval-augmented explanation: corpus loading, lexical index, query
//! construction, citation rendering, and grounded explanation generation.

pub mod explain;
pub mod index;
pub mod loader;
pub mod prompts;
pub mod query;
pub mod render;
pub mod sanitize;

pub use explain::{DEFAULT_NO_LLM_NOTE, ExplanationGenerator};
pub use index::{IndexStats, KnowledgeBase, LexicalIndex, RetrievedContext, tokenize};
pub use loader::{Chunk, Document};
pub use query::build_query;
pub use render::{is_valid_source_url, render_citations};

//! Tool wrappers exposing retrieval through the tool registry.

pub mod rag_tools;

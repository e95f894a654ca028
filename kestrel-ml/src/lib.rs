//! # kestrel-ml
//!
//! The grounded explanation pipeline for Kestrel: a lexical TF-IDF index over
//! the Karpenter knowledge corpus, finding-to-query mapping, citation
//! rendering, explanation and narrative generation, the grounding evaluator,
//! and the orchestrator that sequences detection, explanation, evaluation,
//! and the single bounded retry.

pub mod error;
pub mod grounding;
pub mod narrative;
pub mod orchestrator;
pub mod rag;
pub mod tools;

pub use error::RagError;
pub use grounding::{
    EvaluationResult, GroundingCheck, GroundingEvaluator, RagContextMap, Reason, ReasonCode,
};
pub use narrative::NarrativeWriter;
pub use orchestrator::{Orchestrator, Stage};
pub use rag::{ExplanationGenerator, KnowledgeBase, LexicalIndex, RetrievedContext};

use kestrel_core::error::ToolError;
use kestrel_tools::registry::ToolRegistry;
use std::sync::Arc;

/// Register the retrieval tools with the tool registry.
pub fn register_rag_tools(
    registry: &mut ToolRegistry,
    knowledge: &Arc<KnowledgeBase>,
) -> Result<(), ToolError> {
    tools::rag_tools::register(registry, knowledge)
}

//! Retrieval tool: ranked knowledge-base search.

use async_trait::async_trait;
use kestrel_core::error::ToolError;
use kestrel_core::types::ToolOutput;
use kestrel_tools::registry::{Tool, ToolRegistry, parse_args, structured_output};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::RagError;
use crate::rag::{KnowledgeBase, RetrievedContext};

pub const RETRIEVE_DOCS: &str = "retrieve_docs";

const DEFAULT_TOP_K: usize = 3;
const MAX_TOP_K: usize = 10;

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrieveDocsInput {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl RetrieveDocsInput {
    fn validate(&self) -> Result<(), RagError> {
        if !(1..=MAX_TOP_K).contains(&self.top_k) {
            return Err(RagError::invalid_query(format!(
                "top_k must be between 1 and {MAX_TOP_K}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieveDocsOutput {
    pub contexts: Vec<RetrievedContext>,
}

pub struct RetrieveDocsTool {
    knowledge: Arc<KnowledgeBase>,
}

impl RetrieveDocsTool {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self { knowledge }
    }
}

#[async_trait]
impl Tool for RetrieveDocsTool {
    fn name(&self) -> &str {
        RETRIEVE_DOCS
    }

    fn description(&self) -> &str {
        "Search the local Karpenter knowledge base and return ranked excerpts with source URLs."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "top_k": { "type": "integer", "minimum": 1, "maximum": MAX_TOP_K, "default": DEFAULT_TOP_K }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let input: RetrieveDocsInput = parse_args(self.name(), args)?;
        input.validate().map_err(|e| ToolError::InvalidArguments {
            name: self.name().to_string(),
            reason: e.to_string(),
        })?;
        let contexts = self.knowledge.search(&input.query, input.top_k);
        structured_output(
            self.name(),
            format!("Retrieved {} context(s)", contexts.len()),
            &RetrieveDocsOutput { contexts },
        )
    }
}

/// Register the retrieval tools.
pub fn register(registry: &mut ToolRegistry, knowledge: &Arc<KnowledgeBase>) -> Result<(), ToolError> {
    registry.register(Arc::new(RetrieveDocsTool::new(Arc::clone(knowledge))))
}

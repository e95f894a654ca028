//! Tool Registry: registration, typed argument validation, and execution.
//!
//! Tools are registered once and looked up by name. Every call deserializes
//! its JSON arguments into the tool's typed input before running, so a bad
//! payload aborts that single call with `ToolError::InvalidArguments`.

use async_trait::async_trait;
use kestrel_core::error::ToolError;
use kestrel_core::types::{ToolDefinition, ToolOutput};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// Human-readable description of what this tool does.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError>;

    /// Maximum execution time before timeout.
    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
}

/// Deserialize `args` into a tool's typed input.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: serde_json::Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        name: tool.to_string(),
        reason: e.to_string(),
    })
}

/// Serialize a tool's typed output into a `ToolOutput`.
pub fn structured_output<T: serde::Serialize>(
    tool: &str,
    summary: impl Into<String>,
    output: &T,
) -> Result<ToolOutput, ToolError> {
    let data = serde_json::to_value(output).map_err(|e| ToolError::ExecutionFailed {
        name: tool.to_string(),
        message: format!("failed to serialize output: {}", e),
    })?;
    Ok(ToolOutput::structured(summary, data))
}

/// The tool registry holds all registered tools and handles execution.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Returns error if a tool with the same name is already registered.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered { name });
        }
        debug!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// All registered tool definitions, ordered by name.
    pub fn list_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    /// All registered tool names, ordered.
    pub fn list_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name with the given arguments, applying timeout.
    pub async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
        })?;

        let timeout = tool.timeout();
        debug!(tool = %name, timeout_ms = timeout.as_millis() as u64, "Executing tool");

        match tokio::time::timeout(timeout, tool.execute(args)).await {
            Ok(result) => result,
            Err(_) => {
                info!(tool = %name, "Tool timed out");
                Err(ToolError::Timeout {
                    name: name.to_string(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! # Kestrel Tools
//!
//! Local tool runtime for Kestrel: the `Tool` trait, the registry that
//! validates and executes calls, and the built-in configuration tools.

pub mod config_tools;
pub mod registry;

use registry::{Tool, ToolRegistry};
use kestrel_core::error::ToolError;
use std::sync::Arc;

/// Register the built-in configuration tools.
pub fn register_builtin_tools(registry: &mut ToolRegistry) -> Result<(), ToolError> {
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(config_tools::ValidateConfigTool),
        Arc::new(config_tools::EstimateCostSignalsTool),
        Arc::new(config_tools::ExplainRecommendationTool),
    ];
    for tool in tools {
        registry.register(tool)?;
    }
    Ok(())
}

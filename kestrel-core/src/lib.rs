//! # Kestrel Core
//!
//! Core library for the Kestrel Karpenter advisor.
//! Provides the domain types, YAML configuration parser, deterministic
//! detectors, summary metrics, remediation patches, layered configuration,
//! and the text-generation interface (brain) with its HTTP backend.

pub mod brain;
pub mod config;
pub mod detectors;
pub mod error;
pub mod parser;
pub mod patches;
pub mod providers;
pub mod summary;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{GenerationRequest, MockTextGenerator, TextGenerator};
pub use config::{KestrelConfig, LlmConfig, PipelineConfig, RagConfig, load_config};
pub use error::{ConfigError, LlmError, ToolError};
pub use parser::parse_documents;
pub use patches::{Bundle, PatchCategory, PatchSuggestion};
pub use types::{
    AnalysisInput, AnalysisOptions, AnalysisReport, CanonicalConfig, CanonicalNodeClass,
    CanonicalProvisioner, Citation, ConfigParseError, Diagnostics, Explanation, Finding,
    OptimizationStatus, ProvisionerKind, Severity, SeverityCounts, ToolDefinition,
    ToolOutput,
};

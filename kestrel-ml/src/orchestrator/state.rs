//! Pipeline stages and per-run state.

use kestrel_core::types::{AnalysisInput, AnalysisReport, CanonicalConfig, ConfigParseError, Finding};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::grounding::{EvaluationResult, RagContextMap};

/// Explanation passes allowed per run: the first plus one retry.
pub const MAX_EXPLAIN_ATTEMPTS: u32 = 2;

/// A state of the analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parse,
    Cost,
    Reliability,
    Security,
    Aggregate,
    Explain,
    Evaluate,
    End,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Parse => "parse",
            Stage::Cost => "cost",
            Stage::Reliability => "reliability",
            Stage::Security => "security",
            Stage::Aggregate => "aggregate",
            Stage::Explain => "explain",
            Stage::Evaluate => "evaluate",
            Stage::End => "end",
        };
        f.write_str(name)
    }
}

/// Transient state threaded through one run; discarded when it completes.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub input: AnalysisInput,
    pub config: Option<CanonicalConfig>,
    pub parse_errors: Vec<ConfigParseError>,
    /// Findings per detector stage, keyed by stage name.
    pub stage_findings: BTreeMap<&'static str, Vec<Finding>>,
    pub cost_signals: BTreeMap<String, serde_json::Value>,
    pub report: Option<AnalysisReport>,
    pub rag_context: RagContextMap,
    pub explain_attempts: u32,
    pub evaluations: Vec<EvaluationResult>,
    /// Stages entered, in order.
    pub trace: Vec<Stage>,
}

impl PipelineState {
    pub fn new(input: AnalysisInput) -> Self {
        Self {
            input,
            ..Default::default()
        }
    }

    /// Detection is skipped when parsing produced no configuration or any error.
    pub fn short_circuited(&self) -> bool {
        self.config.is_none() || !self.parse_errors.is_empty()
    }

    pub fn can_retry_explain(&self) -> bool {
        self.explain_attempts < MAX_EXPLAIN_ATTEMPTS
    }
}

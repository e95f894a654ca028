//! Configuration tools: validation, cost signals, and templated recommendations.
//!
//! All three are deterministic and read-only.

use async_trait::async_trait;
use kestrel_core::error::ToolError;
use kestrel_core::parser::parse_documents;
use kestrel_core::types::{CanonicalConfig, ConfigParseError, ToolOutput};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::registry::{Tool, parse_args, structured_output};

pub const VALIDATE_CONFIG: &str = "validate_config";
pub const ESTIMATE_COST_SIGNALS: &str = "estimate_cost_signals";
pub const EXPLAIN_RECOMMENDATION: &str = "explain_recommendation";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidateConfigInput {
    pub yaml_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateConfigOutput {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<ConfigParseError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<CanonicalConfig>,
}

/// Parses configuration text and reports whether it is usable.
pub struct ValidateConfigTool;

#[async_trait]
impl Tool for ValidateConfigTool {
    fn name(&self) -> &str {
        VALIDATE_CONFIG
    }

    fn description(&self) -> &str {
        "Parse Karpenter YAML (Provisioner, NodePool, EC2NodeClass) and report structured errors."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "yaml_text": { "type": "string", "description": "Multi-document YAML" }
            },
            "required": ["yaml_text"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let input: ValidateConfigInput = parse_args(self.name(), args)?;
        let output = match parse_documents(&input.yaml_text) {
            Ok(config) => ValidateConfigOutput {
                valid: true,
                errors: Vec::new(),
                config: Some(config),
            },
            Err(errors) => ValidateConfigOutput {
                valid: false,
                errors,
                config: None,
            },
        };
        let summary = if output.valid {
            "Configuration is valid".to_string()
        } else {
            format!("Configuration has {} error(s)", output.errors.len())
        };
        structured_output(self.name(), summary, &output)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EstimateCostSignalsInput {
    pub config: CanonicalConfig,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub monthly_spend: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimateCostSignalsOutput {
    pub signals: BTreeMap<String, serde_json::Value>,
}

/// Counts cost-relevant adoption across provisioning policies.
pub struct EstimateCostSignalsTool;

#[async_trait]
impl Tool for EstimateCostSignalsTool {
    fn name(&self) -> &str {
        ESTIMATE_COST_SIGNALS
    }

    fn description(&self) -> &str {
        "Return deterministic cost signals (Spot and Graviton adoption) for a parsed configuration."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "config": { "type": "object", "description": "Canonical configuration" },
                "region": { "type": ["string", "null"] },
                "monthly_spend": { "type": ["number", "null"] }
            },
            "required": ["config"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let input: EstimateCostSignalsInput = parse_args(self.name(), args)?;
        let provisioners = &input.config.provisioners;

        let mut signals = BTreeMap::new();
        signals.insert("total_provisioners".to_string(), provisioners.len().into());
        signals.insert(
            "spot_enabled".to_string(),
            provisioners.iter().filter(|p| p.spot_allowed).count().into(),
        );
        signals.insert(
            "graviton_used".to_string(),
            provisioners.iter().filter(|p| p.graviton_used).count().into(),
        );

        structured_output(
            self.name(),
            format!("Computed {} cost signals", signals.len()),
            &EstimateCostSignalsOutput { signals },
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExplainRecommendationInput {
    pub rule_id: String,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainRecommendationOutput {
    pub explanation: String,
}

/// Fixed, template-based explanation for a rule.
pub struct ExplainRecommendationTool;

#[async_trait]
impl Tool for ExplainRecommendationTool {
    fn name(&self) -> &str {
        EXPLAIN_RECOMMENDATION
    }

    fn description(&self) -> &str {
        "Return a deterministic, template-based explanation for a triggered rule."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "rule_id": { "type": "string" },
                "context": { "type": "object" }
            },
            "required": ["rule_id"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let input: ExplainRecommendationInput = parse_args(self.name(), args)?;
        if input.rule_id.trim().is_empty() {
            return Err(ToolError::InvalidArguments {
                name: self.name().to_string(),
                reason: "rule_id must not be empty".to_string(),
            });
        }
        let explanation = format!(
            "Rule '{}' triggered based on the provided configuration. \
             Review the recommendation and apply only after validation.",
            input.rule_id
        );
        structured_output(
            self.name(),
            explanation.clone(),
            &ExplainRecommendationOutput { explanation },
        )
    }
}

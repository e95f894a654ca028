//! Core type definitions for Kestrel.
//!
//! Defines the fundamental data structures shared by every stage of the
//! analysis pipeline: findings and their explanations, the canonical
//! configuration model produced by the parser, the analysis input, and the
//! final report handed to presentation layers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Metadata key carrying the structural path of the offending field.
pub const FIELD_METADATA_KEY: &str = "field";

/// Severity of a deterministic finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    /// Sort rank: high sorts first.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::High => 0,
            Severity::Medium => 1,
            Severity::Low => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A citation attached to an explanation.
///
/// Always carries an absolute `http`/`https` URL when produced by the
/// citation renderer; the grounding evaluator re-checks this anyway because
/// explanations may be constructed by other code paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Narrative explanation attached to a finding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why_matters: Option<String>,
    #[serde(default)]
    pub what_to_change: Vec<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

impl Explanation {
    /// An explanation carrying only a fixed note and its citations.
    pub fn templated(note: impl Into<String>, citations: Vec<Citation>) -> Self {
        Self {
            why_matters: Some(note.into()),
            what_to_change: Vec::new(),
            citations,
        }
    }
}

/// A single deterministic issue detected in a configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: String,
    pub severity: Severity,
    pub category: String,
    pub message: String,
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_snippet: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Explanation>,
}

impl Finding {
    pub fn new(
        rule_id: impl Into<String>,
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity,
            category: category.into(),
            message: message.into(),
            recommendation: recommendation.into(),
            resource_kind: None,
            resource_name: None,
            patch_snippet: None,
            metadata: HashMap::new(),
            explanation: None,
        }
    }

    /// Attach the resource this finding was raised against.
    pub fn with_resource(mut self, kind: impl Into<String>, name: impl Into<String>) -> Self {
        self.resource_kind = Some(kind.into());
        self.resource_name = Some(name.into());
        self
    }

    /// Attach a remediation snippet.
    pub fn with_patch(mut self, snippet: impl Into<String>) -> Self {
        self.patch_snippet = Some(snippet.into());
        self
    }

    /// Record the structural path of the offending field.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.metadata.insert(
            FIELD_METADATA_KEY.to_string(),
            serde_json::Value::String(field.into()),
        );
        self
    }

    /// The structural field path, looked up by exact key.
    pub fn field(&self) -> Option<&str> {
        self.metadata
            .get(FIELD_METADATA_KEY)
            .and_then(|value| value.as_str())
    }
}

/// A structured error produced while parsing configuration text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigParseError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl ConfigParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            line: None,
        }
    }
}

/// Resource kind of a provisioning policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProvisionerKind {
    Provisioner,
    NodePool,
}

impl ProvisionerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionerKind::Provisioner => "Provisioner",
            ProvisionerKind::NodePool => "NodePool",
        }
    }
}

impl std::fmt::Display for ProvisionerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Karpenter `Provisioner` or `NodePool`, normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProvisioner {
    pub name: String,
    pub kind: ProvisionerKind,
    pub nodeclass_name: Option<String>,
    /// `Some(false)` only when consolidation is explicitly disabled.
    pub consolidation_enabled: Option<bool>,
    pub spot_allowed: bool,
    pub instance_families: Vec<String>,
    pub graviton_used: bool,
    pub ttl_seconds_after_empty: Option<u64>,
}

/// A Karpenter `EC2NodeClass`, normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalNodeClass {
    pub name: String,
    pub instance_types: Vec<String>,
    pub ami_selector_present: bool,
    pub security_groups_present: bool,
    pub subnets_present: bool,
    pub instance_profile: Option<String>,
    pub role: Option<String>,
}

/// The canonical configuration model produced by the parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalConfig {
    pub provisioners: Vec<CanonicalProvisioner>,
    pub node_classes: Vec<CanonicalNodeClass>,
}

impl CanonicalConfig {
    pub fn is_empty(&self) -> bool {
        self.provisioners.is_empty() && self.node_classes.is_empty()
    }

    pub fn node_class(&self, name: &str) -> Option<&CanonicalNodeClass> {
        self.node_classes.iter().find(|nc| nc.name == name)
    }
}

/// Feature switches for a single analysis run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    #[serde(default)]
    pub enable_explanations: bool,
    #[serde(default)]
    pub enable_evaluator: bool,
    #[serde(default)]
    pub enable_summary: bool,
}

/// Input to one orchestrator run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisInput {
    pub yaml_text: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub monthly_spend: Option<f64>,
    #[serde(default)]
    pub options: AnalysisOptions,
}

impl AnalysisInput {
    pub fn new(yaml_text: impl Into<String>) -> Self {
        Self {
            yaml_text: yaml_text.into(),
            ..Default::default()
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_options(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self
    }
}

/// Finding counts per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut counts = Self::default();
        for finding in findings {
            match finding.severity {
                Severity::High => counts.high += 1,
                Severity::Medium => counts.medium += 1,
                Severity::Low => counts.low += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }
}

/// Best-practice adoption across provisioning policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationStatus {
    pub total_provisioners: usize,
    pub spot_enabled: usize,
    pub graviton_used: usize,
    pub consolidation_enabled: usize,
    pub node_class_count: usize,
}

/// Raw diagnostic flags exposed alongside the report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// NodePool name to referenced node class name.
    #[serde(default)]
    pub nodepool_refs: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub nodeclass_names: Vec<String>,
    #[serde(default)]
    pub cost_signals: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub explain_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_passed: Option<bool>,
    #[serde(default)]
    pub evaluation_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_latency_ms: Option<f64>,
    #[serde(default)]
    pub explanations_suppressed: bool,
}

/// The aggregated analysis report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub health_score: u8,
    pub findings: Vec<Finding>,
    pub severity_counts: SeverityCounts,
    pub optimization: OptimizationStatus,
    #[serde(default)]
    pub parse_errors: Vec<ConfigParseError>,
    #[serde(default)]
    pub patch_suggestions: Vec<crate::patches::PatchSuggestion>,
    /// Overall generated narrative, if one was requested and produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    #[serde(default)]
    pub evaluation_notes: Vec<String>,
    #[serde(default)]
    pub diagnostics: Diagnostics,
}

impl AnalysisReport {
    /// Rule identifiers of every finding in this report.
    pub fn rule_ids(&self) -> std::collections::HashSet<&str> {
        self.findings.iter().map(|f| f.rule_id.as_str()).collect()
    }

    /// Remove every explanation and the narrative.
    pub fn clear_explanations(&mut self) {
        for finding in &mut self.findings {
            finding.explanation = None;
        }
        self.narrative = None;
    }
}

/// A definition describing a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Output produced by a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ToolOutput {
    /// Create a simple text output.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            data: serde_json::Value::Null,
        }
    }

    /// Create an output carrying a structured payload.
    pub fn structured(content: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            content: content.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_serde_lowercase() {
        let json = serde_json::to_string(&Severity::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
        let back: Severity = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(back, Severity::High);
    }

    #[test]
    fn test_severity_rank_orders_high_first() {
        assert!(Severity::High.rank() < Severity::Medium.rank());
        assert!(Severity::Medium.rank() < Severity::Low.rank());
    }

    #[test]
    fn test_finding_field_lookup() {
        let finding = Finding::new(
            "cost:spot-disabled",
            Severity::High,
            "Cost Optimization",
            "Spot is disabled",
            "Enable spot",
        )
        .with_field("spec.requirements");
        assert_eq!(finding.field(), Some("spec.requirements"));
    }

    #[test]
    fn test_finding_field_ignores_non_string_values() {
        let mut finding = Finding::new("a:b", Severity::Low, "c", "m", "r");
        finding
            .metadata
            .insert(FIELD_METADATA_KEY.into(), serde_json::json!(42));
        assert_eq!(finding.field(), None);
    }

    #[test]
    fn test_severity_counts() {
        let findings = vec![
            Finding::new("a:one", Severity::High, "c", "m", "r"),
            Finding::new("a:two", Severity::High, "c", "m", "r"),
            Finding::new("a:three", Severity::Low, "c", "m", "r"),
        ];
        let counts = SeverityCounts::from_findings(&findings);
        assert_eq!(counts.high, 2);
        assert_eq!(counts.medium, 0);
        assert_eq!(counts.low, 1);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_clear_explanations_drops_narrative() {
        let mut finding = Finding::new("a:one", Severity::High, "c", "m", "r");
        finding.explanation = Some(Explanation::templated("note", Vec::new()));
        let mut report = AnalysisReport {
            findings: vec![finding],
            narrative: Some("summary".into()),
            ..Default::default()
        };
        report.clear_explanations();
        assert!(report.findings[0].explanation.is_none());
        assert!(report.narrative.is_none());
    }
}

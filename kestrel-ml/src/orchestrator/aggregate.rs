//! Report aggregation.

use kestrel_core::detectors::DetectorStage;
use kestrel_core::patches::build_patch_suggestions;
use kestrel_core::summary::summarize;
use kestrel_core::types::{AnalysisReport, Diagnostics, Finding, ProvisionerKind, SeverityCounts};

use super::state::PipelineState;

/// Merge stage findings, summary metrics, and patch suggestions into a report.
///
/// On the short-circuit path the report carries only parse errors and a
/// health score of zero.
pub fn aggregate(state: &PipelineState) -> AnalysisReport {
    let findings: Vec<Finding> = DetectorStage::ALL
        .iter()
        .filter_map(|stage| state.stage_findings.get(stage.name()))
        .flatten()
        .cloned()
        .collect();
    let patch_suggestions = build_patch_suggestions(&findings);

    let config = match &state.config {
        Some(config) if !state.short_circuited() => config,
        _ => {
            return AnalysisReport {
                region: state.input.region.clone(),
                health_score: 0,
                severity_counts: SeverityCounts::from_findings(&findings),
                findings,
                parse_errors: state.parse_errors.clone(),
                patch_suggestions,
                ..Default::default()
            };
        }
    };

    let summary = summarize(config, &findings);
    let diagnostics = Diagnostics {
        nodepool_refs: config
            .provisioners
            .iter()
            .filter(|p| p.kind == ProvisionerKind::NodePool)
            .map(|p| (p.name.clone(), p.nodeclass_name.clone()))
            .collect(),
        nodeclass_names: config.node_classes.iter().map(|nc| nc.name.clone()).collect(),
        cost_signals: state.cost_signals.clone(),
        ..Default::default()
    };

    AnalysisReport {
        region: state.input.region.clone(),
        health_score: summary.health_score,
        findings,
        severity_counts: summary.severity_counts,
        optimization: summary.optimization,
        parse_errors: state.parse_errors.clone(),
        patch_suggestions,
        diagnostics,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::parser::parse_documents;
    use kestrel_core::types::{AnalysisInput, ConfigParseError};

    const NODEPOOL: &str = r#"
apiVersion: karpenter.sh/v1
kind: NodePool
metadata:
  name: general
spec:
  template:
    spec:
      nodeClassRef:
        name: default
      requirements:
        - key: karpenter.sh/capacity-type
          operator: In
          values: ["on-demand"]
---
apiVersion: karpenter.k8s.aws/v1
kind: EC2NodeClass
metadata:
  name: default
spec:
  role: KarpenterNodeRole
  subnetSelectorTerms:
    - tags:
        karpenter.sh/discovery: demo
  securityGroupSelectorTerms:
    - tags:
        karpenter.sh/discovery: demo
"#;

    #[test]
    fn test_short_circuit_report() {
        let mut state = PipelineState::new(AnalysisInput::new("::").with_region("us-west-2"));
        state.parse_errors.push(ConfigParseError::new("Invalid YAML"));
        let report = aggregate(&state);
        assert_eq!(report.health_score, 0);
        assert!(report.findings.is_empty());
        assert_eq!(report.parse_errors.len(), 1);
        assert_eq!(report.region.as_deref(), Some("us-west-2"));
        assert!(report.diagnostics.nodepool_refs.is_empty());
    }

    #[test]
    fn test_full_report_merges_stages_in_order() {
        let config = parse_documents(NODEPOOL).unwrap();
        let mut state = PipelineState::new(AnalysisInput::new(NODEPOOL));
        for stage in DetectorStage::ALL.iter().rev() {
            state.stage_findings.insert(stage.name(), stage.run(&config));
        }
        state.config = Some(config);

        let report = aggregate(&state);
        assert!(report.findings.iter().any(|f| f.rule_id == "cost:spot-disabled"));
        let first_reliability = report
            .findings
            .iter()
            .position(|f| f.rule_id.starts_with("reliability:"));
        let last_cost = report
            .findings
            .iter()
            .rposition(|f| f.rule_id.starts_with("cost:"));
        if let (Some(r), Some(c)) = (first_reliability, last_cost) {
            assert!(c < r);
        }
        assert_eq!(
            report.diagnostics.nodepool_refs.get("general"),
            Some(&Some("default".to_string()))
        );
        assert_eq!(report.diagnostics.nodeclass_names, vec!["default"]);
        assert_eq!(report.severity_counts.total(), report.findings.len());
        assert!(report.health_score > 0);
    }
}

//! Cost detectors: Spot capacity and Graviton adoption.

use super::requirements_field;
use crate::types::{CanonicalConfig, CanonicalProvisioner, Finding, ProvisionerKind, Severity};

pub const SPOT_DISABLED: &str = "cost:spot-disabled";
pub const GRAVITON_UNUSED: &str = "cost:graviton-unused";

const CATEGORY: &str = "Cost Optimization";

pub fn detect(config: &CanonicalConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    for prov in &config.provisioners {
        findings.extend(check_spot(prov));
        findings.extend(check_graviton(prov));
    }
    findings
}

fn requirements_patch(prov: &CanonicalProvisioner, comment: &str, requirement: &str) -> String {
    match prov.kind {
        ProvisionerKind::NodePool => format!(
            "# {comment} for NodePool '{name}'\nspec:\n  template:\n    spec:\n      requirements:\n{req}",
            name = prov.name,
            req = indent(requirement, 8),
        ),
        ProvisionerKind::Provisioner => format!(
            "# {comment} for Provisioner '{name}'\nspec:\n  requirements:\n{req}",
            name = prov.name,
            req = indent(requirement, 4),
        ),
    }
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| format!("{pad}{line}\n"))
        .collect()
}

fn check_spot(prov: &CanonicalProvisioner) -> Option<Finding> {
    if prov.spot_allowed {
        return None;
    }
    let patch = requirements_patch(
        prov,
        "Enable Spot capacity",
        "- key: karpenter.sh/capacity-type\n  operator: In\n  values: [\"spot\", \"on-demand\"]",
    );
    Some(
        Finding::new(
            SPOT_DISABLED,
            Severity::High,
            CATEGORY,
            format!("Spot instances are not enabled for {} '{}'.", prov.kind, prov.name),
            "Enable the Spot capacity type to reduce compute costs by up to 90%. \
             Add 'spot' to the karpenter.sh/capacity-type requirement.",
        )
        .with_resource(prov.kind.as_str(), &prov.name)
        .with_patch(patch)
        .with_field(requirements_field(prov.kind)),
    )
}

fn check_graviton(prov: &CanonicalProvisioner) -> Option<Finding> {
    if prov.graviton_used {
        return None;
    }
    let patch = requirements_patch(
        prov,
        "Add Graviton instance families",
        "- key: karpenter.k8s.aws/instance-family\n  operator: In\n  values: [\"m7g\", \"c7g\", \"r7g\"]  # adjust to your workloads",
    );
    Some(
        Finding::new(
            GRAVITON_UNUSED,
            Severity::Medium,
            CATEGORY,
            format!(
                "No Graviton instance families are used by {} '{}'.",
                prov.kind, prov.name
            ),
            "Consider adding ARM-based Graviton instance families to improve \
             price-performance where workloads are compatible.",
        )
        .with_resource(prov.kind.as_str(), &prov.name)
        .with_patch(patch)
        .with_field(requirements_field(prov.kind)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_documents;

    fn pool(spot: bool, graviton: bool) -> CanonicalProvisioner {
        CanonicalProvisioner {
            name: "general".into(),
            kind: ProvisionerKind::NodePool,
            nodeclass_name: Some("default".into()),
            consolidation_enabled: Some(true),
            spot_allowed: spot,
            instance_families: Vec::new(),
            graviton_used: graviton,
            ttl_seconds_after_empty: Some(30),
        }
    }

    #[test]
    fn test_optimized_pool_is_clean() {
        let config = CanonicalConfig {
            provisioners: vec![pool(true, true)],
            node_classes: Vec::new(),
        };
        assert!(detect(&config).is_empty());
    }

    #[test]
    fn test_spot_disabled_finding() {
        let config = CanonicalConfig {
            provisioners: vec![pool(false, true)],
            node_classes: Vec::new(),
        };
        let findings = detect(&config);
        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.rule_id, SPOT_DISABLED);
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.resource_kind.as_deref(), Some("NodePool"));
        assert_eq!(finding.resource_name.as_deref(), Some("general"));
        assert_eq!(finding.field(), Some("spec.template.spec.requirements"));
        let patch = finding.patch_snippet.as_deref().unwrap();
        assert!(patch.contains("karpenter.sh/capacity-type"));
        assert!(patch.contains("      requirements:\n        - key:"));
    }

    #[test]
    fn test_patch_snippet_is_valid_yaml() {
        let config = CanonicalConfig {
            provisioners: vec![pool(false, false)],
            node_classes: Vec::new(),
        };
        for finding in detect(&config) {
            let snippet = finding.patch_snippet.unwrap();
            let parsed: serde_yaml::Value = serde_yaml::from_str(&snippet).unwrap();
            assert!(parsed.get("spec").is_some(), "{snippet}");
        }
    }

    #[test]
    fn test_legacy_provisioner_uses_flat_requirements() {
        let yaml = "kind: Provisioner\nmetadata:\n  name: old\nspec:\n  requirements:\n    - key: karpenter.sh/capacity-type\n      operator: In\n      values: [on-demand]\n";
        let config = parse_documents(yaml).unwrap();
        let findings = detect(&config);
        let spot = findings.iter().find(|f| f.rule_id == SPOT_DISABLED).unwrap();
        assert_eq!(spot.field(), Some("spec.requirements"));
        assert!(findings.iter().any(|f| f.rule_id == GRAVITON_UNUSED));
    }
}

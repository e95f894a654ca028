//! Reliability detectors: consolidation and empty-node TTL.

use crate::types::{CanonicalConfig, CanonicalProvisioner, Finding, ProvisionerKind, Severity};

pub const CONSOLIDATION_DISABLED: &str = "reliability:consolidation-disabled";
pub const EMPTY_TTL_MISSING: &str = "reliability:empty-ttl-missing";
pub const EMPTY_TTL_TOO_HIGH: &str = "reliability:empty-ttl-too-high";

/// Empty nodes lingering longer than this are flagged.
pub const MAX_EMPTY_TTL_SECS: u64 = 600;

pub fn detect(config: &CanonicalConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    for prov in &config.provisioners {
        findings.extend(check_consolidation(prov));
        findings.extend(check_empty_ttl(prov));
    }
    findings
}

fn check_consolidation(prov: &CanonicalProvisioner) -> Option<Finding> {
    // Unset consolidation is left alone.
    if prov.consolidation_enabled != Some(false) {
        return None;
    }

    let (field, patch) = match prov.kind {
        ProvisionerKind::NodePool => (
            "spec.disruption.consolidationPolicy",
            format!(
                "# Enable consolidation for NodePool '{}'\nspec:\n  disruption:\n    consolidationPolicy: WhenEmptyOrUnderutilized\n",
                prov.name
            ),
        ),
        ProvisionerKind::Provisioner => (
            "spec.consolidation.enabled",
            format!(
                "# Enable consolidation for Provisioner '{}'\nspec:\n  consolidation:\n    enabled: true\n",
                prov.name
            ),
        ),
    };

    Some(
        Finding::new(
            CONSOLIDATION_DISABLED,
            Severity::High,
            "Resource Efficiency",
            format!("Consolidation is explicitly disabled for {} '{}'.", prov.kind, prov.name),
            "Enable consolidation so Karpenter can pack workloads onto fewer nodes \
             and remove underutilized capacity.",
        )
        .with_resource(prov.kind.as_str(), &prov.name)
        .with_patch(patch)
        .with_field(field),
    )
}

fn ttl_field(kind: ProvisionerKind) -> &'static str {
    match kind {
        ProvisionerKind::NodePool => "spec.disruption.consolidateAfter",
        ProvisionerKind::Provisioner => "spec.ttlSecondsAfterEmpty",
    }
}

fn ttl_patch(prov: &CanonicalProvisioner, comment: &str, previous: Option<u64>) -> String {
    let note = previous
        .map(|secs| format!("  # previous value: {secs}s"))
        .unwrap_or_default();
    match prov.kind {
        ProvisionerKind::NodePool => format!(
            "# {comment} for NodePool '{}'\nspec:\n  disruption:\n    consolidateAfter: 5m{note}\n",
            prov.name
        ),
        ProvisionerKind::Provisioner => format!(
            "# {comment} for Provisioner '{}'\nspec:\n  ttlSecondsAfterEmpty: 300{note}\n",
            prov.name
        ),
    }
}

fn check_empty_ttl(prov: &CanonicalProvisioner) -> Option<Finding> {
    match prov.ttl_seconds_after_empty {
        None => Some(
            Finding::new(
                EMPTY_TTL_MISSING,
                Severity::Medium,
                "Cost Optimization",
                format!(
                    "No empty-node TTL (ttlSecondsAfterEmpty or consolidateAfter) is configured for {} '{}'.",
                    prov.kind, prov.name
                ),
                "Set ttlSecondsAfterEmpty or an equivalent disruption TTL so empty nodes \
                 are terminated automatically and idle capacity is not billed.",
            )
            .with_resource(prov.kind.as_str(), &prov.name)
            .with_patch(ttl_patch(prov, "Set an empty-node TTL", None))
            .with_field(ttl_field(prov.kind)),
        ),
        Some(ttl) if ttl > MAX_EMPTY_TTL_SECS => Some(
            Finding::new(
                EMPTY_TTL_TOO_HIGH,
                Severity::Low,
                "Cost Optimization",
                format!(
                    "Empty-node TTL for {} '{}' is {} seconds (> {} seconds).",
                    prov.kind, prov.name, ttl, MAX_EMPTY_TTL_SECS
                ),
                "Consider reducing the empty-node TTL for faster cleanup of unused nodes \
                 and lower idle capacity costs.",
            )
            .with_resource(prov.kind.as_str(), &prov.name)
            .with_patch(ttl_patch(prov, "Reduce the empty-node TTL", Some(ttl)))
            .with_field(ttl_field(prov.kind)),
        ),
        Some(_) => None,
    }
}

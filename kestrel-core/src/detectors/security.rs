//! Security detectors: node class IAM, networking, and NodePool wiring.

use crate::types::{
    CanonicalConfig, CanonicalNodeClass, CanonicalProvisioner, Finding, ProvisionerKind, Severity,
};

pub const MISSING_IAM: &str = "security:missing-iam";
pub const MISSING_SECURITY_GROUPS: &str = "security:missing-security-groups";
pub const MISSING_SUBNETS: &str = "security:missing-subnets";
pub const MISSING_NODECLASS: &str = "security:missing-nodeclass";

const NODECLASS_KIND: &str = "EC2NodeClass";

pub fn detect(config: &CanonicalConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    for class in &config.node_classes {
        findings.extend(check_iam(class));
        findings.extend(check_security_groups(class));
        findings.extend(check_subnets(class));
    }
    for prov in &config.provisioners {
        findings.extend(check_nodeclass_ref(prov, config));
    }
    findings
}

fn check_iam(class: &CanonicalNodeClass) -> Option<Finding> {
    if class.instance_profile.is_some() || class.role.is_some() {
        return None;
    }
    Some(
        Finding::new(
            MISSING_IAM,
            Severity::High,
            "EC2NodeClass IAM",
            format!(
                "EC2NodeClass '{}' does not specify an instanceProfile or IAM role.",
                class.name
            ),
            "Configure an instanceProfile or role so nodes receive the IAM permissions \
             required to join the cluster and call AWS APIs.",
        )
        .with_resource(NODECLASS_KIND, &class.name)
        .with_patch(format!(
            "# IAM configuration for EC2NodeClass '{}'\nspec:\n  role: KarpenterNodeRole-my-cluster\n  # or: instanceProfile: KarpenterNodeInstanceProfile-my-cluster\n",
            class.name
        ))
        .with_field("spec.role"),
    )
}

fn check_security_groups(class: &CanonicalNodeClass) -> Option<Finding> {
    if class.security_groups_present {
        return None;
    }
    Some(
        Finding::new(
            MISSING_SECURITY_GROUPS,
            Severity::High,
            "EC2NodeClass Networking",
            format!("EC2NodeClass '{}' does not specify security groups.", class.name),
            "Configure securityGroupSelectorTerms so nodes launch with the intended \
             network security posture.",
        )
        .with_resource(NODECLASS_KIND, &class.name)
        .with_patch(format!(
            "# Security groups for EC2NodeClass '{}'\nspec:\n  securityGroupSelectorTerms:\n    - tags:\n        karpenter.sh/discovery: my-cluster\n",
            class.name
        ))
        .with_field("spec.securityGroupSelectorTerms"),
    )
}

fn check_subnets(class: &CanonicalNodeClass) -> Option<Finding> {
    if class.subnets_present {
        return None;
    }
    Some(
        Finding::new(
            MISSING_SUBNETS,
            Severity::High,
            "EC2NodeClass Networking",
            format!("EC2NodeClass '{}' does not specify subnets.", class.name),
            "Configure subnetSelectorTerms so nodes are placed into approved subnets \
             for your cluster.",
        )
        .with_resource(NODECLASS_KIND, &class.name)
        .with_patch(format!(
            "# Subnets for EC2NodeClass '{}'\nspec:\n  subnetSelectorTerms:\n    - tags:\n        karpenter.sh/discovery: my-cluster\n",
            class.name
        ))
        .with_field("spec.subnetSelectorTerms"),
    )
}

/// A NodePool must reference an EC2NodeClass present in the same document set.
fn check_nodeclass_ref(prov: &CanonicalProvisioner, config: &CanonicalConfig) -> Option<Finding> {
    if prov.kind != ProvisionerKind::NodePool {
        return None;
    }
    let message = match prov.nodeclass_name.as_deref() {
        Some(name) if config.node_class(name).is_some() => return None,
        Some(name) => format!(
            "NodePool '{}' references EC2NodeClass '{}', which is not defined.",
            prov.name, name
        ),
        None => format!("NodePool '{}' does not reference an EC2NodeClass.", prov.name),
    };
    let target = prov.nodeclass_name.as_deref().unwrap_or("default");

    Some(
        Finding::new(
            MISSING_NODECLASS,
            Severity::High,
            "NodePool Wiring",
            message,
            "Point spec.template.spec.nodeClassRef at an EC2NodeClass that is applied \
             alongside this NodePool; otherwise Karpenter cannot launch nodes for it.",
        )
        .with_resource(prov.kind.as_str(), &prov.name)
        .with_patch(format!(
            "# Node class reference for NodePool '{}'\nspec:\n  template:\n    spec:\n      nodeClassRef:\n        group: karpenter.k8s.aws\n        kind: EC2NodeClass\n        name: {}\n",
            prov.name, target
        ))
        .with_field("spec.template.spec.nodeClassRef"),
    )
}

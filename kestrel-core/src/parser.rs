//! Karpenter configuration parser.
//!
//! Turns multi-document YAML into a [`CanonicalConfig`]. `Provisioner` and
//! `NodePool` documents become provisioning policies, `EC2NodeClass`
//! documents become node templates; everything else is ignored. Both the
//! v0 (`Provisioner`, `consolidation.enabled`, `ttlSecondsAfterEmpty`) and v1
//! (`NodePool`, `disruption`, duration strings) shapes are understood.

use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeSet;
use tracing::debug;

use crate::types::{
    CanonicalConfig, CanonicalNodeClass, CanonicalProvisioner, ConfigParseError, ProvisionerKind,
};

/// Instance family prefixes that identify AWS Graviton (arm64) hardware.
pub const GRAVITON_PREFIXES: &[&str] = &[
    "m6g", "c6g", "r6g", "m7g", "c7g", "r7g", "t4g", "x2gd", "im4gn", "is4gen", "g5g", "c6gn",
    "c6gd", "r6gd", "m6gd",
];

static NULL: Value = Value::Null;

/// Parse every document in `yaml_text`.
///
/// A YAML syntax error yields a single structured error carrying the line
/// number. Text that parses but holds no recognized resource is also an error.
pub fn parse_documents(yaml_text: &str) -> Result<CanonicalConfig, Vec<ConfigParseError>> {
    let mut config = CanonicalConfig::default();

    for document in serde_yaml::Deserializer::from_str(yaml_text) {
        let value = Value::deserialize(document).map_err(|e| {
            vec![ConfigParseError {
                message: format!("Invalid YAML: {}", e),
                path: None,
                line: e.location().map(|loc| loc.line()),
            }]
        })?;

        if !value.is_mapping() {
            continue;
        }

        match value.get("kind").and_then(Value::as_str) {
            Some("Provisioner") => config
                .provisioners
                .push(extract_provisioner(&value, ProvisionerKind::Provisioner)),
            Some("NodePool") => config
                .provisioners
                .push(extract_provisioner(&value, ProvisionerKind::NodePool)),
            Some("EC2NodeClass") => config.node_classes.push(extract_node_class(&value)),
            other => debug!(kind = ?other, "Ignoring unrecognized document"),
        }
    }

    if config.is_empty() {
        return Err(vec![ConfigParseError {
            message: "No Provisioner, NodePool, or EC2NodeClass resources found".to_string(),
            path: Some("kind".to_string()),
            line: None,
        }]);
    }

    debug!(
        provisioners = config.provisioners.len(),
        node_classes = config.node_classes.len(),
        "Parsed configuration"
    );
    Ok(config)
}

fn extract_provisioner(doc: &Value, kind: ProvisionerKind) -> CanonicalProvisioner {
    let name = metadata_name(doc).unwrap_or_else(|| "unnamed".to_string());
    let spec = doc.get("spec").unwrap_or(&NULL);

    let instance_families = instance_families(spec);
    let graviton_used = uses_graviton(&instance_families);
    let nodeclass_name = match kind {
        ProvisionerKind::NodePool => nodeclass_ref(spec),
        ProvisionerKind::Provisioner => None,
    };

    CanonicalProvisioner {
        name,
        kind,
        nodeclass_name,
        consolidation_enabled: consolidation(spec),
        spot_allowed: spot_allowed(doc, spec),
        instance_families,
        graviton_used,
        ttl_seconds_after_empty: empty_ttl(spec),
    }
}

fn extract_node_class(doc: &Value) -> CanonicalNodeClass {
    let name = metadata_name(doc).unwrap_or_else(|| "unnamed-ec2nodeclass".to_string());
    let spec = doc.get("spec").unwrap_or(&NULL);

    let any_present = |keys: &[&str]| keys.iter().any(|key| truthy(spec.get(*key)));

    CanonicalNodeClass {
        name,
        instance_types: sequence_strings(spec.get("instanceTypes")),
        ami_selector_present: any_present(&[
            "amiSelectorTerms",
            "amiSelector",
            "amiFamily",
            "amiSelectorIDs",
            "amiSelectorTags",
        ]),
        security_groups_present: any_present(&[
            "securityGroupSelectorTerms",
            "securityGroupSelector",
            "securityGroups",
        ]),
        subnets_present: any_present(&["subnetSelectorTerms", "subnetSelector", "subnets"]),
        instance_profile: non_empty_string(spec.get("instanceProfile")),
        role: non_empty_string(spec.get("role")),
    }
}

fn metadata_name(doc: &Value) -> Option<String> {
    doc.get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(scalar_string)
        .filter(|name| !name.is_empty())
}

fn template_spec(spec: &Value) -> Option<&Value> {
    spec.get("template").and_then(|t| t.get("spec"))
}

fn nodeclass_ref(spec: &Value) -> Option<String> {
    let reference = template_spec(spec)
        .and_then(|ts| ts.get("nodeClassRef").or_else(|| ts.get("nodeClass")))
        .or_else(|| spec.get("nodeClassRef"))
        .or_else(|| spec.get("nodeClass"))?;

    let name = match reference {
        Value::String(name) => Some(name.clone()),
        Value::Mapping(_) => reference.get("name").and_then(scalar_string).or_else(|| {
            reference.get("nameRef").and_then(|r| match r {
                Value::String(name) => Some(name.clone()),
                other => other.get("name").and_then(scalar_string),
            })
        }),
        _ => None,
    };
    name.filter(|name| !name.is_empty())
}

fn consolidation_from_policy(disruption: Option<&Value>) -> Option<bool> {
    let disruption = disruption?;
    let policy = disruption
        .get("consolidationPolicy")
        .and_then(Value::as_str)
        .map(str::to_lowercase);
    match policy.as_deref() {
        Some("whenempty" | "empty") => Some(false),
        Some("whenunderutilized" | "underutilized" | "whenemptyorunderutilized") => Some(true),
        _ => None,
    }
}

/// `Some(false)` only when consolidation is explicitly switched off.
fn consolidation(spec: &Value) -> Option<bool> {
    if let Some(enabled) = spec.get("consolidation").and_then(|c| c.get("enabled")) {
        return Some(truthy(Some(enabled)));
    }

    let disruption = spec.get("disruption");
    if let Some(decided) = consolidation_from_policy(disruption) {
        return Some(decided);
    }
    if truthy(disruption.and_then(|d| d.get("budgets"))) {
        return Some(true);
    }

    consolidation_from_policy(template_spec(spec).and_then(|ts| ts.get("disruption")))
}

fn requirements(spec: &Value) -> Vec<&Value> {
    let locations = [
        spec.get("requirements"),
        template_spec(spec).and_then(|ts| ts.get("requirements")),
        spec.get("provider").and_then(|p| p.get("requirements")),
    ];
    locations
        .into_iter()
        .flatten()
        .filter_map(Value::as_sequence)
        .flatten()
        .filter(|req| req.is_mapping())
        .collect()
}

fn contains_spot(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(s)) => s.eq_ignore_ascii_case("spot"),
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(scalar_string)
            .any(|s| s.eq_ignore_ascii_case("spot")),
        _ => false,
    }
}

fn spot_allowed(doc: &Value, spec: &Value) -> bool {
    for req in requirements(spec) {
        let key = req.get("key").and_then(scalar_string).unwrap_or_default();
        if !key.to_lowercase().contains("capacity-type") {
            continue;
        }
        let operator = req
            .get("operator")
            .and_then(scalar_string)
            .unwrap_or_else(|| "In".to_string())
            .to_lowercase();
        if matches!(operator.as_str(), "in" | "exists") && contains_spot(req.get("values")) {
            return true;
        }
    }

    let label_sources = [
        doc.get("metadata").and_then(|m| m.get("labels")),
        spec.get("template")
            .and_then(|t| t.get("metadata"))
            .and_then(|m| m.get("labels")),
        spec.get("labels"),
    ];
    for labels in label_sources.into_iter().flatten().filter_map(Value::as_mapping) {
        for (key, value) in labels {
            let key = scalar_string(key).unwrap_or_default().to_lowercase();
            if key.contains("capacity-type") && contains_spot(Some(value)) {
                return true;
            }
        }
    }

    if contains_spot(spec.get("constraints").and_then(|c| c.get("capacityTypes"))) {
        return true;
    }

    contains_spot(spec.get("provider").and_then(|p| p.get("capacityType")))
}

fn family_of(instance_type: &str) -> Option<String> {
    instance_type
        .split('.')
        .next()
        .filter(|family| !family.is_empty())
        .map(str::to_string)
}

fn instance_families(spec: &Value) -> Vec<String> {
    let mut families = BTreeSet::new();

    for req in requirements(spec) {
        let key = req
            .get("key")
            .and_then(scalar_string)
            .unwrap_or_default()
            .to_lowercase();
        let values = sequence_strings(req.get("values"));
        if key.contains("instance-family") {
            families.extend(values.into_iter().filter(|v| !v.is_empty()));
        } else if key.contains("instance-type") {
            families.extend(values.iter().filter_map(|v| family_of(v)));
        }
    }

    let constraint_types = spec
        .get("constraints")
        .and_then(|c| c.get("instanceTypes"));
    families.extend(
        sequence_strings(constraint_types)
            .iter()
            .filter_map(|v| family_of(v)),
    );

    families.into_iter().collect()
}

/// Whether any family matches a known Graviton prefix.
pub fn uses_graviton(families: &[String]) -> bool {
    families.iter().any(|family| {
        let family = family.to_lowercase();
        GRAVITON_PREFIXES
            .iter()
            .any(|prefix| family.contains(prefix))
    })
}

fn seconds_value(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn duration_value(value: Option<&Value>) -> Option<u64> {
    value
        .and_then(scalar_string)
        .and_then(|s| parse_duration_secs(&s))
}

/// The effective empty-node TTL in seconds, searched across v0 and v1 fields.
fn empty_ttl(spec: &Value) -> Option<u64> {
    if let Some(ttl) = seconds_value(spec.get("ttlSecondsAfterEmpty")) {
        return Some(ttl);
    }

    if let Some(disruption) = spec.get("disruption") {
        for key in ["consolidateAfter", "expireAfter"] {
            if let Some(secs) = duration_value(disruption.get(key)) {
                return Some(secs);
            }
        }
    }

    let template_expire = template_spec(spec)
        .and_then(|ts| ts.get("disruption"))
        .and_then(|d| d.get("expireAfter"));
    if let Some(secs) = duration_value(template_expire) {
        return Some(secs);
    }

    let annotations = spec
        .get("template")
        .and_then(|t| t.get("metadata"))
        .and_then(|m| m.get("annotations"))
        .and_then(Value::as_mapping);
    if let Some(annotations) = annotations {
        for (key, value) in annotations {
            let key = scalar_string(key).unwrap_or_default().to_lowercase();
            if key.contains("ttl") || key.contains("expire") {
                if let Some(secs) = duration_value(Some(value)) {
                    return Some(secs);
                }
            }
        }
    }

    seconds_value(spec.get("ttlSecondsUntilExpired"))
}

/// Parse a Go-style duration (`300`, `45s`, `10m`, `1h30m`, `1d2h`) into seconds.
///
/// `never`, `none`, `inf`, `infinity`, blank input, and zero totals yield `None`.
/// A trailing number without a unit counts as seconds.
pub fn parse_duration_secs(input: &str) -> Option<u64> {
    let text = input.trim().to_lowercase();
    if text.is_empty() || matches!(text.as_str(), "never" | "none" | "inf" | "infinity") {
        return None;
    }
    if text.chars().all(|c| c.is_ascii_digit()) {
        return text.parse().ok();
    }

    let mut total: u64 = 0;
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            current.push(ch);
            continue;
        }
        let unit = match ch {
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            _ => continue,
        };
        if current.is_empty() {
            continue;
        }
        let amount: u64 = current.parse().ok()?;
        total = total.saturating_add(amount.saturating_mul(unit));
        current.clear();
    }
    if !current.is_empty() {
        total = total.saturating_add(current.parse().ok()?);
    }

    (total > 0).then_some(total)
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Sequence(items)) => !items.is_empty(),
        Some(Value::Mapping(map)) => !map.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Tagged(tagged)) => truthy(Some(&tagged.value)),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(scalar_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn sequence_strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_sequence)
        .map(|items| items.iter().filter_map(scalar_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NODEPOOL_V1: &str = r#"
apiVersion: karpenter.sh/v1
kind: NodePool
metadata:
  name: general
spec:
  template:
    spec:
      nodeClassRef:
        group: karpenter.k8s.aws
        kind: EC2NodeClass
        name: default
      requirements:
        - key: karpenter.sh/capacity-type
          operator: In
          values: ["spot", "on-demand"]
        - key: node.kubernetes.io/instance-type
          operator: In
          values: ["m6g.large", "c5.xlarge"]
  disruption:
    consolidationPolicy: WhenEmptyOrUnderutilized
    consolidateAfter: 5m
---
apiVersion: karpenter.k8s.aws/v1
kind: EC2NodeClass
metadata:
  name: default
spec:
  amiFamily: AL2023
  role: KarpenterNodeRole
  subnetSelectorTerms:
    - tags:
        karpenter.sh/discovery: demo
  securityGroupSelectorTerms:
    - tags:
        karpenter.sh/discovery: demo
"#;

    #[test]
    fn test_parse_nodepool_and_nodeclass() {
        let config = parse_documents(NODEPOOL_V1).unwrap();
        assert_eq!(config.provisioners.len(), 1);
        assert_eq!(config.node_classes.len(), 1);

        let pool = &config.provisioners[0];
        assert_eq!(pool.name, "general");
        assert_eq!(pool.kind, ProvisionerKind::NodePool);
        assert_eq!(pool.nodeclass_name.as_deref(), Some("default"));
        assert_eq!(pool.consolidation_enabled, Some(true));
        assert!(pool.spot_allowed);
        assert_eq!(pool.instance_families, vec!["c5".to_string(), "m6g".to_string()]);
        assert!(pool.graviton_used);
        assert_eq!(pool.ttl_seconds_after_empty, Some(300));

        let class = &config.node_classes[0];
        assert_eq!(class.name, "default");
        assert!(class.ami_selector_present);
        assert!(class.subnets_present);
        assert!(class.security_groups_present);
        assert_eq!(class.role.as_deref(), Some("KarpenterNodeRole"));
        assert_eq!(class.instance_profile, None);
    }

    #[test]
    fn test_parse_legacy_provisioner() {
        let yaml = r#"
apiVersion: karpenter.sh/v1alpha5
kind: Provisioner
metadata:
  name: legacy
spec:
  consolidation:
    enabled: false
  ttlSecondsAfterEmpty: 900
  requirements:
    - key: karpenter.sh/capacity-type
      operator: In
      values: ["on-demand"]
"#;
        let config = parse_documents(yaml).unwrap();
        let prov = &config.provisioners[0];
        assert_eq!(prov.kind, ProvisionerKind::Provisioner);
        assert_eq!(prov.consolidation_enabled, Some(false));
        assert!(!prov.spot_allowed);
        assert_eq!(prov.ttl_seconds_after_empty, Some(900));
        assert_eq!(prov.nodeclass_name, None);
    }

    #[test]
    fn test_when_empty_policy_is_disabled() {
        let yaml = "kind: NodePool\nmetadata:\n  name: p\nspec:\n  disruption:\n    consolidationPolicy: WhenEmpty\n";
        let config = parse_documents(yaml).unwrap();
        assert_eq!(config.provisioners[0].consolidation_enabled, Some(false));
    }

    #[test]
    fn test_unset_consolidation_is_none() {
        let yaml = "kind: NodePool\nmetadata:\n  name: p\nspec: {}\n";
        let config = parse_documents(yaml).unwrap();
        assert_eq!(config.provisioners[0].consolidation_enabled, None);
        assert_eq!(config.provisioners[0].ttl_seconds_after_empty, None);
    }

    #[test]
    fn test_spot_from_labels() {
        let yaml = r#"
kind: Provisioner
metadata:
  name: labelled
  labels:
    karpenter.sh/capacity-type: spot
spec: {}
"#;
        let config = parse_documents(yaml).unwrap();
        assert!(config.provisioners[0].spot_allowed);
    }

    #[test]
    fn test_missing_names_get_defaults() {
        let yaml = "kind: NodePool\nspec: {}\n---\nkind: EC2NodeClass\nspec: {}\n";
        let config = parse_documents(yaml).unwrap();
        assert_eq!(config.provisioners[0].name, "unnamed");
        assert_eq!(config.node_classes[0].name, "unnamed-ec2nodeclass");
    }

    #[test]
    fn test_syntax_error_has_line() {
        let errors = parse_documents("kind: NodePool\nspec:\n  - a\n b: [").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("Invalid YAML"));
        assert!(errors[0].line.is_some());
    }

    #[test]
    fn test_no_recognized_resources() {
        let errors = parse_documents("kind: Deployment\nmetadata:\n  name: web\n").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("No Provisioner"));
    }

    #[test]
    fn test_comment_only_documents_are_skipped() {
        let yaml = "# just a comment\n---\nkind: EC2NodeClass\nmetadata:\n  name: only\n";
        let config = parse_documents(yaml).unwrap();
        assert!(config.provisioners.is_empty());
        assert_eq!(config.node_classes[0].name, "only");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration_secs("300"), Some(300));
        assert_eq!(parse_duration_secs("45s"), Some(45));
        assert_eq!(parse_duration_secs("10m"), Some(600));
        assert_eq!(parse_duration_secs("1h30m"), Some(5400));
        assert_eq!(parse_duration_secs("1d2h"), Some(93_600));
        assert_eq!(parse_duration_secs("720h"), Some(2_592_000));
        assert_eq!(parse_duration_secs("Never"), None);
        assert_eq!(parse_duration_secs("0s"), None);
        assert_eq!(parse_duration_secs(""), None);
    }

    #[test]
    fn test_graviton_prefixes() {
        assert!(uses_graviton(&["c7g".to_string()]));
        assert!(uses_graviton(&["M6GD".to_string()]));
        assert!(!uses_graviton(&["m5".to_string(), "c6i".to_string()]));
    }
}

//! Finding-to-query mapping.

use kestrel_core::types::Finding;

/// Build the retrieval query for a finding.
///
/// Non-empty values are joined in a fixed order: rule id, category, message,
/// recommendation, resource kind, resource name, then the structural field
/// path from metadata.
pub fn build_query(finding: &Finding) -> String {
    let parts = [
        Some(finding.rule_id.as_str()),
        Some(finding.category.as_str()),
        Some(finding.message.as_str()),
        Some(finding.recommendation.as_str()),
        finding.resource_kind.as_deref(),
        finding.resource_name.as_deref(),
        finding.field(),
    ];
    parts
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::types::Severity;

    #[test]
    fn test_query_field_order() {
        let finding = Finding::new(
            "cost:spot-disabled",
            Severity::High,
            "Cost Optimization",
            "Spot is not allowed",
            "Allow spot",
        )
        .with_resource("NodePool", "default")
        .with_field("spec.template.spec.requirements");
        assert_eq!(
            build_query(&finding),
            "cost:spot-disabled Cost Optimization Spot is not allowed Allow spot NodePool default spec.template.spec.requirements"
        );
    }

    #[test]
    fn test_query_skips_empty_and_missing_values() {
        let mut finding = Finding::new("security:missing-iam", Severity::High, "", "No role", "");
        finding
            .metadata
            .insert("unrelated".into(), serde_json::json!("ignored"));
        assert_eq!(build_query(&finding), "security:missing-iam No role");
    }

    #[test]
    fn test_query_is_independent_of_metadata_order() {
        let base = Finding::new("a:b", Severity::Low, "c", "m", "r").with_field("spec.x");
        let mut shuffled = base.clone();
        for i in 0..16 {
            shuffled
                .metadata
                .insert(format!("k{i}"), serde_json::json!(i));
        }
        assert_eq!(build_query(&base), build_query(&shuffled));
    }
}

//! Remediation patch suggestions and per-NodePool bundles.
//!
//! Suggestions are derived from findings that carry a patch snippet. Bundles
//! group suggestions by the NodePool they apply to; node-class patches fan
//! out to every NodePool referencing that class, or land in `_unscoped`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::detectors::{cost, reliability};
use crate::types::{AnalysisReport, Finding, Severity};

/// Bundle name for patches that cannot be tied to a NodePool.
pub const UNSCOPED_BUNDLE: &str = "_unscoped";

/// Kind of change a patch makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchCategory {
    Spot,
    Consolidation,
    Ttl,
    Graviton,
    Nodeclass,
}

impl PatchCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchCategory::Spot => "spot",
            PatchCategory::Consolidation => "consolidation",
            PatchCategory::Ttl => "ttl",
            PatchCategory::Graviton => "graviton",
            PatchCategory::Nodeclass => "nodeclass",
        }
    }

    /// Categories bundled when the caller does not choose.
    pub fn defaults() -> BTreeSet<PatchCategory> {
        BTreeSet::from([
            PatchCategory::Spot,
            PatchCategory::Consolidation,
            PatchCategory::Ttl,
            PatchCategory::Graviton,
        ])
    }
}

impl std::fmt::Display for PatchCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PatchCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "spot" => Ok(PatchCategory::Spot),
            "consolidation" => Ok(PatchCategory::Consolidation),
            "ttl" => Ok(PatchCategory::Ttl),
            "graviton" => Ok(PatchCategory::Graviton),
            "nodeclass" => Ok(PatchCategory::Nodeclass),
            other => Err(format!("unknown patch category '{}'", other)),
        }
    }
}

/// One remediation patch tied to a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchSuggestion {
    pub resource_kind: String,
    pub resource_name: String,
    pub category: PatchCategory,
    pub patch_yaml: String,
    pub rule_id: String,
    pub severity: Severity,
}

impl PatchSuggestion {
    fn sort_key(&self) -> (&str, &str, PatchCategory, u8, &str) {
        (
            &self.resource_kind,
            &self.resource_name,
            self.category,
            self.severity.rank(),
            &self.rule_id,
        )
    }

    /// Render as a standalone YAML document with a `# Fix:` header.
    pub fn to_document(&self) -> String {
        format!(
            "# Fix: {} for {}/{}\n{}\n",
            self.rule_id,
            self.resource_kind,
            self.resource_name,
            self.patch_yaml.trim()
        )
    }
}

fn infer_category(finding: &Finding) -> Option<PatchCategory> {
    match finding.rule_id.as_str() {
        cost::SPOT_DISABLED => return Some(PatchCategory::Spot),
        cost::GRAVITON_UNUSED => return Some(PatchCategory::Graviton),
        reliability::CONSOLIDATION_DISABLED => return Some(PatchCategory::Consolidation),
        reliability::EMPTY_TTL_MISSING | reliability::EMPTY_TTL_TOO_HIGH => {
            return Some(PatchCategory::Ttl);
        }
        _ => {}
    }

    if finding.rule_id.starts_with("security:")
        || finding.resource_kind.as_deref() == Some("EC2NodeClass")
        || finding.category.to_lowercase().contains("nodeclass")
    {
        return Some(PatchCategory::Nodeclass);
    }

    let message = finding.message.to_lowercase();
    [
        ("spot", PatchCategory::Spot),
        ("graviton", PatchCategory::Graviton),
        ("ttl", PatchCategory::Ttl),
        ("consolidation", PatchCategory::Consolidation),
    ]
    .into_iter()
    .find(|(needle, _)| message.contains(needle))
    .map(|(_, category)| category)
}

/// Suggestion for one finding, if it carries a patch and a known category.
pub fn suggestion_for(finding: &Finding) -> Option<PatchSuggestion> {
    let patch_yaml = finding.patch_snippet.as_ref().filter(|p| !p.trim().is_empty())?;
    let category = infer_category(finding)?;
    Some(PatchSuggestion {
        resource_kind: finding.resource_kind.clone().unwrap_or_default(),
        resource_name: finding.resource_name.clone().unwrap_or_default(),
        category,
        patch_yaml: patch_yaml.clone(),
        rule_id: finding.rule_id.clone(),
        severity: finding.severity,
    })
}

pub fn build_patch_suggestions(findings: &[Finding]) -> Vec<PatchSuggestion> {
    findings.iter().filter_map(suggestion_for).collect()
}

/// Patches for one NodePool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub nodepool_name: String,
    pub selected_categories: BTreeSet<PatchCategory>,
    pub suggestions: Vec<PatchSuggestion>,
    pub yaml_documents: Vec<String>,
    pub bundle_yaml: String,
}

fn sorted(mut suggestions: Vec<PatchSuggestion>) -> Vec<PatchSuggestion> {
    suggestions.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    suggestions
}

fn join_documents(documents: &[String]) -> String {
    documents
        .iter()
        .map(|doc| doc.trim())
        .filter(|doc| !doc.is_empty())
        .collect::<Vec<_>>()
        .join("\n---\n")
}

fn nodeclass_to_nodepools(report: &AnalysisReport) -> BTreeMap<&str, Vec<&str>> {
    let mut mapping: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (nodepool, nodeclass) in &report.diagnostics.nodepool_refs {
        if let Some(nodeclass) = nodeclass.as_deref().filter(|n| !n.is_empty()) {
            mapping.entry(nodeclass).or_default().push(nodepool);
        }
    }
    mapping
}

fn target_bundles(suggestion: &PatchSuggestion, nodeclass_map: &BTreeMap<&str, Vec<&str>>) -> Vec<String> {
    let name = suggestion.resource_name.as_str();
    match suggestion.resource_kind.as_str() {
        "EC2NodeClass" => match nodeclass_map.get(name) {
            Some(pools) if !pools.is_empty() => pools.iter().map(|p| p.to_string()).collect(),
            _ => vec![UNSCOPED_BUNDLE.to_string()],
        },
        "NodePool" | "Provisioner" if !name.is_empty() => vec![name.to_string()],
        _ => vec![UNSCOPED_BUNDLE.to_string()],
    }
}

/// Group the report's suggestions into bundles keyed by NodePool name.
pub fn build_bundles(
    report: &AnalysisReport,
    categories: Option<&BTreeSet<PatchCategory>>,
) -> BTreeMap<String, Bundle> {
    let categories = categories.cloned().unwrap_or_else(PatchCategory::defaults);
    let nodeclass_map = nodeclass_to_nodepools(report);

    let mut grouped: BTreeMap<String, Vec<PatchSuggestion>> = BTreeMap::new();
    for suggestion in &report.patch_suggestions {
        if !categories.contains(&suggestion.category) {
            continue;
        }
        for bundle_name in target_bundles(suggestion, &nodeclass_map) {
            grouped.entry(bundle_name).or_default().push(suggestion.clone());
        }
    }

    grouped
        .into_iter()
        .map(|(name, suggestions)| {
            let suggestions = sorted(suggestions);
            let yaml_documents: Vec<String> =
                suggestions.iter().map(PatchSuggestion::to_document).collect();
            let bundle = Bundle {
                nodepool_name: name.clone(),
                selected_categories: categories.clone(),
                bundle_yaml: join_documents(&yaml_documents),
                suggestions,
                yaml_documents,
            };
            (name, bundle)
        })
        .collect()
}

/// Every selected suggestion as one `---`-separated YAML stream.
pub fn build_bundle_yaml(
    report: &AnalysisReport,
    categories: Option<&BTreeSet<PatchCategory>>,
) -> String {
    let categories = categories.cloned().unwrap_or_else(PatchCategory::defaults);
    let selected = report
        .patch_suggestions
        .iter()
        .filter(|s| categories.contains(&s.category))
        .cloned()
        .collect();
    let documents: Vec<String> = sorted(selected)
        .iter()
        .map(PatchSuggestion::to_document)
        .collect();
    join_documents(&documents)
}

/// The bundle for one NodePool, or an empty string when it has none.
pub fn build_bundle_yaml_for_nodepool(
    report: &AnalysisReport,
    nodepool_name: &str,
    categories: Option<&BTreeSet<PatchCategory>>,
) -> String {
    build_bundles(report, categories)
        .remove(nodepool_name)
        .map(|bundle| bundle.bundle_yaml)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::security;
    use pretty_assertions::assert_eq;

    fn finding(rule_id: &str, kind: &str, name: &str, severity: Severity) -> Finding {
        Finding::new(rule_id, severity, "c", "message", "r")
            .with_resource(kind, name)
            .with_patch(format!("spec:\n  fix: {}\n", rule_id.replace(':', "-")))
    }

    fn report_with(findings: Vec<Finding>, refs: &[(&str, Option<&str>)]) -> AnalysisReport {
        let mut report = AnalysisReport {
            patch_suggestions: build_patch_suggestions(&findings),
            findings,
            ..Default::default()
        };
        for (pool, class) in refs {
            report
                .diagnostics
                .nodepool_refs
                .insert(pool.to_string(), class.map(str::to_string));
        }
        report
    }

    #[test]
    fn test_findings_without_patch_are_skipped() {
        let bare = Finding::new(cost::SPOT_DISABLED, Severity::High, "c", "m", "r");
        assert!(build_patch_suggestions(&[bare]).is_empty());
    }

    #[test]
    fn test_category_inference() {
        let cases = [
            (cost::SPOT_DISABLED, PatchCategory::Spot),
            (cost::GRAVITON_UNUSED, PatchCategory::Graviton),
            (reliability::EMPTY_TTL_TOO_HIGH, PatchCategory::Ttl),
            (reliability::CONSOLIDATION_DISABLED, PatchCategory::Consolidation),
            (security::MISSING_NODECLASS, PatchCategory::Nodeclass),
        ];
        for (rule_id, expected) in cases {
            let f = finding(rule_id, "NodePool", "web", Severity::High);
            assert_eq!(suggestion_for(&f).unwrap().category, expected, "{rule_id}");
        }
    }

    #[test]
    fn test_bundle_ordering_and_header() {
        let report = report_with(
            vec![
                finding(reliability::EMPTY_TTL_MISSING, "NodePool", "web", Severity::Medium),
                finding(cost::SPOT_DISABLED, "NodePool", "web", Severity::High),
            ],
            &[("web", None)],
        );
        let yaml = build_bundle_yaml_for_nodepool(&report, "web", None);
        assert_eq!(
            yaml,
            "# Fix: cost:spot-disabled for NodePool/web\nspec:\n  fix: cost-spot-disabled\n---\n\
             # Fix: reliability:empty-ttl-missing for NodePool/web\nspec:\n  fix: reliability-empty-ttl-missing"
        );
    }

    #[test]
    fn test_nodeclass_patches_fan_out() {
        let report = report_with(
            vec![finding(security::MISSING_IAM, "EC2NodeClass", "default", Severity::High)],
            &[("a", Some("default")), ("b", Some("default")), ("c", Some("other"))],
        );
        let categories = BTreeSet::from([PatchCategory::Nodeclass]);
        let bundles = build_bundles(&report, Some(&categories));
        let names: Vec<&str> = bundles.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_unreferenced_nodeclass_goes_unscoped() {
        let report = report_with(
            vec![finding(security::MISSING_SUBNETS, "EC2NodeClass", "lonely", Severity::High)],
            &[],
        );
        let categories = BTreeSet::from([PatchCategory::Nodeclass]);
        let bundles = build_bundles(&report, Some(&categories));
        assert!(bundles.contains_key(UNSCOPED_BUNDLE));
    }

    #[test]
    fn test_default_categories_exclude_nodeclass() {
        let report = report_with(
            vec![finding(security::MISSING_IAM, "EC2NodeClass", "default", Severity::High)],
            &[("a", Some("default"))],
        );
        assert!(build_bundles(&report, None).is_empty());
        assert_eq!(build_bundle_yaml(&report, None), "");
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("TTL".parse::<PatchCategory>(), Ok(PatchCategory::Ttl));
        assert!("nope".parse::<PatchCategory>().is_err());
    }
}

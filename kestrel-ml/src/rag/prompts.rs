//! System prompts and user payloads for text generation.

use kestrel_core::summary::HEALTH_SCORE_MAX;
use kestrel_core::types::{AnalysisReport, Finding};
use serde_json::{Value, json};

use super::index::RetrievedContext;

pub const EXPLANATION_SYSTEM_PROMPT: &str = "You are an expert Karpenter reviewer.

You will be given one detected issue and a small set of Karpenter docs excerpts.
Your job is to explain ONLY the given issue. Do not invent new issues, do not
change severity, and do not add resources not mentioned in the issue.

Output format (strict):
WHY: <2-4 sentences>
CHANGE:
- <1-3 bullets>
DOCS:
- <use only provided source URLs>
";

pub const REPORT_SYSTEM_PROMPT: &str = "You are a Karpenter cost and reliability reviewer.

The user message is JSON with a \"region\", a \"summary\" object (issues_by_severity,
optimization_status, health_score, health_score_max, ec2_nodeclass_count) and an
\"issues\" array of deterministic findings. Write a short plain-text report.

Formatting:
- No Markdown headings, bold, italics, or fenced code blocks.
- No YAML, JSON, or other configuration snippets.
- Bullets start with \"- \" and nothing else.

Grounding:
- Every bullet must come from an entry in \"issues\". Never add issues.
- Name exactly the resources an issue names; do not widen its scope.
- Merge duplicate problems into one bullet without changing the affected resources.
- Counts must agree with summary.issues_by_severity.
- Never mention spend or dollar amounts.

Structure:
Open with 2-3 sentences on overall risk, consistent with the counts and health score.
Then these section titles, in order, each on its own line:

High severity issues:
Medium severity issues:
Low severity issues or observations:
Recommended actions:

Write \"- None.\" under any empty section. Recommended actions must cover every
issue, grouping similar actions, each justified by at least one issue.
";

fn issue_payload(finding: &Finding) -> Value {
    json!({
        "severity": finding.severity,
        "category": finding.category,
        "message": finding.message,
        "recommendation": finding.recommendation,
        "resource_kind": finding.resource_kind,
        "resource_name": finding.resource_name,
        "field": finding.field(),
    })
}

/// User message for a single finding explanation.
pub fn build_issue_prompt(finding: &Finding, contexts: &[RetrievedContext]) -> String {
    let retrieved_docs: Vec<Value> = contexts
        .iter()
        .map(|ctx| {
            json!({
                "title": ctx.title,
                "source_url": ctx.source_url,
                "text": ctx.text,
            })
        })
        .collect();
    let payload = json!({
        "issue": issue_payload(finding),
        "retrieved_docs": retrieved_docs,
    });
    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
}

/// User message for the overall narrative.
pub fn build_report_prompt(report: &AnalysisReport) -> String {
    let issues: Vec<Value> = report
        .findings
        .iter()
        .map(|finding| {
            let mut issue = issue_payload(finding);
            issue["rule_id"] = json!(finding.rule_id);
            issue
        })
        .collect();
    let payload = json!({
        "region": report.region,
        "summary": {
            "issues_by_severity": report.severity_counts,
            "optimization_status": {
                "total_provisioners": report.optimization.total_provisioners,
                "spot_enabled": report.optimization.spot_enabled,
                "graviton_used": report.optimization.graviton_used,
                "consolidation_enabled": report.optimization.consolidation_enabled,
            },
            "health_score": report.health_score,
            "health_score_max": HEALTH_SCORE_MAX,
            "ec2_nodeclass_count": report.optimization.node_class_count,
        },
        "issues": issues,
    });
    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
}

//! Grounding evaluation of generated explanations and narrative.
//!
//! Checks that generated text only references findings the detectors
//! produced, and that every citation is a well-formed URL drawn from the
//! context retrieved for that finding. Failures are data (`Reason`s), never
//! errors; the orchestrator decides whether to retry or suppress.

use kestrel_core::types::AnalysisReport;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;
use std::time::Instant;

use crate::rag::index::RetrievedContext;
use crate::rag::render::is_valid_source_url;

/// Retrieved contexts per rule id.
pub type RagContextMap = BTreeMap<String, Vec<RetrievedContext>>;

static RULE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-z]+:[a-z0-9-]+\b").expect("rule id pattern"));

/// Rule-identifier-shaped tokens (`prefix:slug`) in `text`, lowercased.
pub fn extract_rule_ids(text: &str) -> BTreeSet<String> {
    RULE_ID
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    UnknownFindingReference,
    MissingRequiredWhyMatters,
    MissingRequiredDocs,
    HallucinatedFindingReference,
    InvalidDocSourceUrl,
    HallucinatedCitation,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::UnknownFindingReference => "unknown_finding_reference",
            ReasonCode::MissingRequiredWhyMatters => "missing_required_why_matters",
            ReasonCode::MissingRequiredDocs => "missing_required_docs",
            ReasonCode::HallucinatedFindingReference => "hallucinated_finding_reference",
            ReasonCode::InvalidDocSourceUrl => "invalid_doc_source_url",
            ReasonCode::HallucinatedCitation => "hallucinated_citation",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ReasonCode::UnknownFindingReference => {
                "Explanation referenced a finding not in deterministic results."
            }
            ReasonCode::MissingRequiredWhyMatters => {
                "Explanation is missing required why_matters content."
            }
            ReasonCode::MissingRequiredDocs => "Explanation is missing required citations.",
            ReasonCode::HallucinatedFindingReference => {
                "Explanation referenced findings that were not detected."
            }
            ReasonCode::InvalidDocSourceUrl => {
                "Citation source_url must be an absolute http(s) URL."
            }
            ReasonCode::HallucinatedCitation => {
                "Citation was not present in retrieved RAG context."
            }
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One grounding violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    pub code: ReasonCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

impl Reason {
    fn new(code: ReasonCode, rule_id: impl Into<String>) -> Self {
        Self {
            code,
            message: code.message().to_string(),
            rule_id: Some(rule_id.into()),
        }
    }

    pub fn note(&self) -> String {
        format!("{}: {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub passed: bool,
    pub reasons: Vec<Reason>,
    pub notes: Vec<String>,
    pub retries: u32,
    pub latency_ms: f64,
}

/// Seam for the orchestrator's evaluate stage.
pub trait GroundingCheck: Send + Sync {
    fn evaluate(
        &self,
        report: &AnalysisReport,
        rag_context: Option<&RagContextMap>,
        narrative: Option<&str>,
    ) -> EvaluationResult;
}

/// Deterministic, stateless grounding evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroundingEvaluator;

impl GroundingEvaluator {
    pub fn new() -> Self {
        Self
    }
}

fn allowed_sources<'a>(rule_id: &str, rag_context: Option<&'a RagContextMap>) -> HashSet<&'a str> {
    rag_context
        .and_then(|map| map.get(rule_id))
        .map(|contexts| {
            contexts
                .iter()
                .map(|ctx| ctx.source_url.trim())
                .filter(|url| !url.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

impl GroundingCheck for GroundingEvaluator {
    fn evaluate(
        &self,
        report: &AnalysisReport,
        rag_context: Option<&RagContextMap>,
        narrative: Option<&str>,
    ) -> EvaluationResult {
        let started = Instant::now();
        let known = report.rule_ids();
        let mut reasons = Vec::new();

        if let Some(text) = narrative.filter(|text| !text.is_empty()) {
            for rule_id in extract_rule_ids(text) {
                if !known.contains(rule_id.as_str()) {
                    reasons.push(Reason::new(ReasonCode::UnknownFindingReference, rule_id));
                }
            }
        }

        for finding in &report.findings {
            let Some(explanation) = &finding.explanation else {
                continue;
            };

            let why = explanation.why_matters.as_deref().unwrap_or("").trim();
            if why.is_empty() {
                reasons.push(Reason::new(
                    ReasonCode::MissingRequiredWhyMatters,
                    &finding.rule_id,
                ));
            }

            if explanation.citations.is_empty() {
                reasons.push(Reason::new(ReasonCode::MissingRequiredDocs, &finding.rule_id));
                continue;
            }

            let mut combined = why.to_string();
            for change in &explanation.what_to_change {
                combined.push(' ');
                combined.push_str(change);
            }
            for rule_id in extract_rule_ids(&combined) {
                if !known.contains(rule_id.as_str()) {
                    reasons.push(Reason::new(
                        ReasonCode::HallucinatedFindingReference,
                        rule_id,
                    ));
                }
            }

            let allowed = allowed_sources(&finding.rule_id, rag_context);
            for citation in &explanation.citations {
                let url = citation.source_url.trim();
                if !is_valid_source_url(url) {
                    reasons.push(Reason::new(
                        ReasonCode::InvalidDocSourceUrl,
                        &finding.rule_id,
                    ));
                    continue;
                }
                if !allowed.is_empty() && !allowed.contains(url) {
                    reasons.push(Reason::new(
                        ReasonCode::HallucinatedCitation,
                        &finding.rule_id,
                    ));
                }
            }
        }

        let notes = reasons.iter().map(Reason::note).collect();
        EvaluationResult {
            passed: reasons.is_empty(),
            reasons,
            notes,
            retries: 0,
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }
}

//! Per-finding explanation generation, restricted to retrieved sources.

use kestrel_core::brain::{GenerationRequest, TextGenerator};
use kestrel_core::config::LlmConfig;
use kestrel_core::types::{Explanation, Finding};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::index::RetrievedContext;
use super::prompts::{EXPLANATION_SYSTEM_PROMPT, build_issue_prompt};
use super::render::render_citations;
use super::sanitize::{parse_sections, sanitize};

/// Note attached when no generated explanation is available.
pub const DEFAULT_NO_LLM_NOTE: &str =
    "Relevant docs found; enable AI summary for narrative explanation.";

/// Builds explanations for findings from retrieved contexts.
///
/// Without a backend every cited finding gets the templated note. With one,
/// each finding costs exactly one bounded generation call; any failure falls
/// back to the template.
pub struct ExplanationGenerator {
    generator: Option<Arc<dyn TextGenerator>>,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl ExplanationGenerator {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self::from_config(generator, &LlmConfig::default())
    }

    pub fn from_config(generator: Option<Arc<dyn TextGenerator>>, config: &LlmConfig) -> Self {
        Self {
            generator,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: config.timeout(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.generator.is_some()
    }

    /// Explain one finding. `None` when no context yields a valid citation.
    pub async fn explain(
        &self,
        finding: &Finding,
        contexts: &[RetrievedContext],
    ) -> Option<Explanation> {
        let citations = render_citations(contexts);
        if citations.is_empty() {
            debug!(rule_id = %finding.rule_id, "No citable context; leaving finding unexplained");
            return None;
        }

        let Some(generator) = &self.generator else {
            return Some(Explanation::templated(DEFAULT_NO_LLM_NOTE, citations));
        };

        let request = GenerationRequest::new(
            EXPLANATION_SYSTEM_PROMPT,
            build_issue_prompt(finding, contexts),
        )
        .with_max_tokens(self.max_tokens)
        .with_temperature(self.temperature)
        .with_timeout(self.timeout);

        let raw = match generator.generate(request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(rule_id = %finding.rule_id, error = %e, "Explanation generation failed; using template");
                return Some(Explanation::templated(DEFAULT_NO_LLM_NOTE, citations));
            }
        };

        let cleaned = sanitize(&raw);
        if cleaned.is_empty() {
            warn!(rule_id = %finding.rule_id, "Generated explanation was empty after sanitizing; using template");
            return Some(Explanation::templated(DEFAULT_NO_LLM_NOTE, citations));
        }

        let mut explanation = parse_sections(&cleaned);
        explanation.citations = citations;
        Some(explanation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::brain::MockTextGenerator;
    use kestrel_core::error::LlmError;
    use kestrel_core::types::Severity;

    fn finding() -> Finding {
        Finding::new(
            "cost:spot-disabled",
            Severity::High,
            "Cost Optimization",
            "Spot disabled",
            "Allow spot",
        )
        .with_resource("NodePool", "default")
    }

    fn contexts() -> Vec<RetrievedContext> {
        vec![RetrievedContext {
            chunk_id: "spot-0".into(),
            title: "Spot".into(),
            source_url: "https://karpenter.sh/docs/spot/".into(),
            text: "Spot is cheaper.".into(),
            score: 0.4,
        }]
    }

    #[tokio::test]
    async fn test_no_citations_means_no_explanation() {
        let mock = Arc::new(MockTextGenerator::with_response("WHY: x"));
        let generator = ExplanationGenerator::new(Some(mock.clone()));
        let mut bad = contexts();
        bad[0].source_url = "notaurl".into();
        assert!(generator.explain(&finding(), &bad).await.is_none());
        assert!(generator.explain(&finding(), &[]).await.is_none());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_without_backend_uses_template() {
        let generator = ExplanationGenerator::new(None);
        let explanation = generator.explain(&finding(), &contexts()).await.unwrap();
        assert_eq!(explanation.why_matters.as_deref(), Some(DEFAULT_NO_LLM_NOTE));
        assert!(explanation.what_to_change.is_empty());
        assert_eq!(explanation.citations.len(), 1);
    }

    #[tokio::test]
    async fn test_generated_explanation_parsed_with_citations() {
        let mock = Arc::new(MockTextGenerator::with_response(
            "WHY: Spot capacity is cheaper.\nCHANGE:\n- Allow spot in requirements\nDOCS:\n- https://karpenter.sh/docs/spot/",
        ));
        let generator = ExplanationGenerator::new(Some(mock.clone()));
        let explanation = generator.explain(&finding(), &contexts()).await.unwrap();
        assert_eq!(
            explanation.why_matters.as_deref(),
            Some("Spot capacity is cheaper.")
        );
        assert_eq!(explanation.what_to_change, vec!["Allow spot in requirements"]);
        assert_eq!(explanation.citations[0].source_url, "https://karpenter.sh/docs/spot/");

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system, EXPLANATION_SYSTEM_PROMPT);
        assert_eq!(requests[0].max_tokens, 300);
        assert_eq!(requests[0].timeout, Duration::from_secs(45));
    }

    #[tokio::test]
    async fn test_generation_failure_degrades_to_template() {
        let mock = Arc::new(MockTextGenerator::failing(LlmError::Timeout { timeout_secs: 45 }));
        let generator = ExplanationGenerator::new(Some(mock));
        let explanation = generator.explain(&finding(), &contexts()).await.unwrap();
        assert_eq!(explanation.why_matters.as_deref(), Some(DEFAULT_NO_LLM_NOTE));
    }

    #[tokio::test]
    async fn test_output_empty_after_sanitize_degrades_to_template() {
        let mock = Arc::new(MockTextGenerator::with_response("```yaml\nspec: {}\n```"));
        let generator = ExplanationGenerator::new(Some(mock));
        let explanation = generator.explain(&finding(), &contexts()).await.unwrap();
        assert_eq!(explanation.why_matters.as_deref(), Some(DEFAULT_NO_LLM_NOTE));
    }
}

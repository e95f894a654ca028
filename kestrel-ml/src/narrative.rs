//! Overall narrative summary of a report.

use kestrel_core::brain::{GenerationRequest, TextGenerator};
use kestrel_core::config::LlmConfig;
use kestrel_core::types::AnalysisReport;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::rag::prompts::{REPORT_SYSTEM_PROMPT, build_report_prompt};
use crate::rag::sanitize::sanitize;

/// Writes a plain-text narrative from the report's region, summary, and findings.
pub struct NarrativeWriter {
    generator: Arc<dyn TextGenerator>,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl NarrativeWriter {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self::from_config(generator, &LlmConfig::default())
    }

    pub fn from_config(generator: Arc<dyn TextGenerator>, config: &LlmConfig) -> Self {
        Self {
            generator,
            max_tokens: config.summary_max_tokens,
            temperature: config.temperature,
            timeout: config.summary_timeout(),
        }
    }

    /// One bounded generation call. `None` on failure or empty output.
    pub async fn write(&self, report: &AnalysisReport) -> Option<String> {
        let request = GenerationRequest::new(REPORT_SYSTEM_PROMPT, build_report_prompt(report))
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .with_timeout(self.timeout);

        match self.generator.generate(request).await {
            Ok(raw) => {
                let cleaned = sanitize(&raw);
                (!cleaned.is_empty()).then_some(cleaned)
            }
            Err(e) => {
                warn!(error = %e, "Narrative generation failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::brain::MockTextGenerator;
    use kestrel_core::error::LlmError;

    #[tokio::test]
    async fn test_narrative_sanitized_and_bounded() {
        let mock = Arc::new(MockTextGenerator::with_response(
            "Overall fine.\n```yaml\nx: 1\n```\nHigh severity issues:\n- None.",
        ));
        let writer = NarrativeWriter::new(mock.clone());
        let text = writer.write(&AnalysisReport::default()).await.unwrap();
        assert!(!text.contains("```"));
        assert!(text.starts_with("Overall fine."));

        let request = &mock.requests()[0];
        assert_eq!(request.system, REPORT_SYSTEM_PROMPT);
        assert_eq!(request.max_tokens, 900);
        assert_eq!(request.timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_narrative_failure_is_none() {
        let mock = Arc::new(MockTextGenerator::failing(LlmError::Connection {
            message: "refused".into(),
        }));
        assert!(NarrativeWriter::new(mock).write(&AnalysisReport::default()).await.is_none());
    }
}

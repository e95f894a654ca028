//! The orchestrator: a fixed stage sequence with one short-circuit branch and
//! a single bounded `evaluate -> explain` back-edge.

use kestrel_core::brain::TextGenerator;
use kestrel_core::config::{KestrelConfig, LlmConfig};
use kestrel_core::detectors::DetectorStage;
use kestrel_core::types::{AnalysisInput, AnalysisReport, ConfigParseError};
use kestrel_tools::config_tools::{
    ESTIMATE_COST_SIGNALS, EstimateCostSignalsOutput, VALIDATE_CONFIG, ValidateConfigOutput,
};
use kestrel_tools::register_builtin_tools;
use kestrel_tools::registry::ToolRegistry;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::aggregate::aggregate;
use super::state::{PipelineState, Stage};
use crate::grounding::{GroundingCheck, GroundingEvaluator, RagContextMap};
use crate::narrative::NarrativeWriter;
use crate::rag::{ExplanationGenerator, KnowledgeBase, build_query};

/// Runs one analysis from configuration text to report.
pub struct Orchestrator {
    tools: ToolRegistry,
    knowledge: Arc<KnowledgeBase>,
    explainer: ExplanationGenerator,
    narrator: Option<NarrativeWriter>,
    evaluator: Arc<dyn GroundingCheck>,
    top_k: usize,
}

impl Orchestrator {
    /// An orchestrator without a text-generation backend.
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        let mut tools = ToolRegistry::new();
        if let Err(e) = register_builtin_tools(&mut tools) {
            warn!(error = %e, "Failed to register built-in tools");
        }
        Self {
            tools,
            knowledge,
            explainer: ExplanationGenerator::new(None),
            narrator: None,
            evaluator: Arc::new(GroundingEvaluator::new()),
            top_k: 3,
        }
    }

    /// Build from loaded configuration; `generator` is `None` when no API key resolved.
    pub fn from_config(
        config: &KestrelConfig,
        knowledge: Arc<KnowledgeBase>,
        generator: Option<Arc<dyn TextGenerator>>,
    ) -> Self {
        let orchestrator = Self::new(knowledge).with_top_k(config.rag.top_k);
        match generator {
            Some(generator) => orchestrator.with_generator(generator, &config.llm),
            None => orchestrator,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>, llm: &LlmConfig) -> Self {
        self.explainer = ExplanationGenerator::from_config(Some(generator.clone()), llm);
        self.narrator = Some(NarrativeWriter::from_config(generator, llm));
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn GroundingCheck>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Run the pipeline to completion. Never fails: the worst outcome is a
    /// report without explanations.
    pub async fn run(&self, input: AnalysisInput) -> AnalysisReport {
        self.run_traced(input).await.0
    }

    /// Run the pipeline and also return the stages entered, in order.
    pub async fn run_traced(&self, input: AnalysisInput) -> (AnalysisReport, Vec<Stage>) {
        let mut state = PipelineState::new(input);
        let mut stage = Stage::Parse;
        while stage != Stage::End {
            debug!(stage = %stage, "Entering stage");
            state.trace.push(stage);
            stage = self.step(stage, &mut state).await;
        }
        let report = state.report.take().unwrap_or_else(|| aggregate(&state));
        (report, state.trace)
    }

    async fn step(&self, stage: Stage, state: &mut PipelineState) -> Stage {
        match stage {
            Stage::Parse => {
                self.parse(state).await;
                if state.short_circuited() {
                    debug!(errors = state.parse_errors.len(), "Parse failed; skipping detection");
                    Stage::Aggregate
                } else {
                    Stage::Cost
                }
            }
            Stage::Cost => {
                self.detect(DetectorStage::Cost, state);
                self.cost_signals(state).await;
                Stage::Reliability
            }
            Stage::Reliability => {
                self.detect(DetectorStage::Reliability, state);
                Stage::Security
            }
            Stage::Security => {
                self.detect(DetectorStage::Security, state);
                Stage::Aggregate
            }
            Stage::Aggregate => {
                state.report = Some(aggregate(state));
                if state.short_circuited() {
                    Stage::End
                } else {
                    Stage::Explain
                }
            }
            Stage::Explain => {
                self.explain(state).await;
                Stage::Evaluate
            }
            Stage::Evaluate => self.evaluate(state),
            Stage::End => Stage::End,
        }
    }

    async fn parse(&self, state: &mut PipelineState) {
        let args = json!({ "yaml_text": state.input.yaml_text });
        let output = match self.tools.execute(VALIDATE_CONFIG, args).await {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "validate_config failed");
                state.parse_errors = vec![ConfigParseError::new(e.to_string())];
                return;
            }
        };
        match serde_json::from_value::<ValidateConfigOutput>(output.data) {
            Ok(validated) => {
                state.config = validated.config;
                state.parse_errors = validated.errors;
            }
            Err(e) => {
                state.parse_errors = vec![ConfigParseError::new(format!(
                    "validate_config returned malformed output: {}",
                    e
                ))];
            }
        }
    }

    fn detect(&self, stage: DetectorStage, state: &mut PipelineState) {
        let findings = match &state.config {
            Some(config) => stage.run(config),
            None => Vec::new(),
        };
        debug!(stage = stage.name(), findings = findings.len(), "Detector finished");
        state.stage_findings.insert(stage.name(), findings);
    }

    async fn cost_signals(&self, state: &mut PipelineState) {
        let Some(config) = &state.config else {
            return;
        };
        let args = json!({
            "config": config,
            "region": state.input.region,
            "monthly_spend": state.input.monthly_spend,
        });
        let result = self
            .tools
            .execute(ESTIMATE_COST_SIGNALS, args)
            .await
            .map_err(|e| e.to_string())
            .and_then(|output| {
                serde_json::from_value::<EstimateCostSignalsOutput>(output.data)
                    .map_err(|e| e.to_string())
            });
        match result {
            Ok(output) => state.cost_signals = output.signals,
            Err(e) => warn!(error = %e, "estimate_cost_signals failed; continuing without signals"),
        }
    }

    async fn explain(&self, state: &mut PipelineState) {
        let options = state.input.options;
        if !(options.enable_explanations || options.enable_summary) {
            return;
        }
        let Some(report) = state.report.as_mut() else {
            return;
        };
        state.explain_attempts += 1;

        if options.enable_explanations {
            let mut rag_context = RagContextMap::new();
            for finding in &mut report.findings {
                let query = build_query(finding);
                let contexts = self.knowledge.search(&query, self.top_k);
                let explanation = self.explainer.explain(finding, &contexts).await;
                finding.explanation = explanation;
                rag_context
                    .entry(finding.rule_id.clone())
                    .or_default()
                    .extend(contexts);
            }
            state.rag_context = rag_context;
        }

        report.narrative = None;
        if options.enable_summary {
            if let Some(narrator) = &self.narrator {
                let narrative = narrator.write(report).await;
                report.narrative = narrative;
            }
        }
        report.diagnostics.explain_attempts = state.explain_attempts;
        let explained = report
            .findings
            .iter()
            .filter(|f| f.explanation.is_some())
            .count();
        info!(
            attempt = state.explain_attempts,
            explained,
            findings = report.findings.len(),
            "Explanations attached"
        );
    }

    fn evaluate(&self, state: &mut PipelineState) -> Stage {
        let options = state.input.options;
        let generated = options.enable_explanations || options.enable_summary;
        if !(generated && options.enable_evaluator) {
            return Stage::End;
        }
        let Some(report) = state.report.as_ref() else {
            return Stage::End;
        };

        let result = self.evaluator.evaluate(
            report,
            Some(&state.rag_context),
            report.narrative.as_deref(),
        );
        let passed = result.passed;
        let notes = result.notes.clone();
        state.evaluations.push(result);

        let retries = state.explain_attempts.saturating_sub(1);
        let latency_ms: f64 = state.evaluations.iter().map(|r| r.latency_ms).sum();

        if !passed && state.can_retry_explain() {
            warn!(reasons = notes.len(), "Grounding evaluation failed; regenerating explanations once");
            return Stage::Explain;
        }

        let Some(report) = state.report.as_mut() else {
            return Stage::End;
        };
        report.diagnostics.evaluation_passed = Some(passed);
        report.diagnostics.evaluation_retries = retries;
        report.diagnostics.evaluation_latency_ms = Some(latency_ms);
        report.evaluation_notes = notes;

        if !passed {
            warn!(
                attempts = state.explain_attempts,
                "Grounding evaluation failed after retry; suppressing explanations"
            );
            report.clear_explanations();
            report.diagnostics.explanations_suppressed = true;
        }
        Stage::End
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grounding::EvaluationResult;
    use crate::rag::LexicalIndex;
    use crate::rag::loader::Chunk;
    use kestrel_core::brain::MockTextGenerator;
    use kestrel_core::types::AnalysisOptions;
    use std::sync::Mutex;

    const CONFIG: &str = r#"
apiVersion: karpenter.sh/v1
kind: NodePool
metadata:
  name: general
spec:
  template:
    spec:
      nodeClassRef:
        name: missing
      requirements:
        - key: karpenter.sh/capacity-type
          operator: In
          values: ["on-demand"]
"#;

    fn knowledge() -> Arc<KnowledgeBase> {
        let chunks = vec![Chunk {
            chunk_id: "spot-0".into(),
            doc_id: "spot".into(),
            title: "Spot capacity".into(),
            source_url: "https://karpenter.sh/docs/concepts/nodepools/".into(),
            text: "Allow spot capacity type in NodePool requirements to reduce cost.".into(),
        }];
        Arc::new(KnowledgeBase::from_index(LexicalIndex::from_chunks(chunks)))
    }

    /// Fails a fixed number of times, then passes.
    struct ScriptedCheck {
        failures: Mutex<u32>,
        calls: Mutex<u32>,
    }

    impl ScriptedCheck {
        fn failing(times: u32) -> Self {
            Self {
                failures: Mutex::new(times),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl GroundingCheck for ScriptedCheck {
        fn evaluate(
            &self,
            _report: &AnalysisReport,
            _rag_context: Option<&RagContextMap>,
            _narrative: Option<&str>,
        ) -> EvaluationResult {
            *self.calls.lock().unwrap() += 1;
            let mut failures = self.failures.lock().unwrap();
            let passed = *failures == 0;
            if !passed {
                *failures -= 1;
            }
            EvaluationResult {
                passed,
                reasons: Vec::new(),
                notes: if passed { vec![] } else { vec!["scripted: failure".into()] },
                retries: 0,
                latency_ms: 1.0,
            }
        }
    }

    fn options(explain: bool, evaluate: bool) -> AnalysisOptions {
        AnalysisOptions {
            enable_explanations: explain,
            enable_evaluator: evaluate,
            enable_summary: false,
        }
    }

    #[tokio::test]
    async fn test_parse_failure_short_circuits() {
        let orchestrator = Orchestrator::new(knowledge());
        let (report, trace) = orchestrator
            .run_traced(AnalysisInput::new("key: [unclosed").with_options(options(true, true)))
            .await;
        assert_eq!(trace, vec![Stage::Parse, Stage::Aggregate]);
        assert_eq!(report.health_score, 0);
        assert!(!report.parse_errors.is_empty());
        assert!(report.findings.is_empty());
    }

    #[tokio::test]
    async fn test_full_sequence_without_explanations() {
        let orchestrator = Orchestrator::new(knowledge());
        let (report, trace) = orchestrator.run_traced(AnalysisInput::new(CONFIG)).await;
        assert_eq!(
            trace,
            vec![
                Stage::Parse,
                Stage::Cost,
                Stage::Reliability,
                Stage::Security,
                Stage::Aggregate,
                Stage::Explain,
                Stage::Evaluate,
            ]
        );
        assert!(report.findings.iter().all(|f| f.explanation.is_none()));
        assert_eq!(report.diagnostics.explain_attempts, 0);
        assert_eq!(report.diagnostics.evaluation_passed, None);
        assert_eq!(
            report.diagnostics.cost_signals.get("total_provisioners"),
            Some(&json!(1))
        );
    }

    #[tokio::test]
    async fn test_retry_once_then_pass() {
        let check = Arc::new(ScriptedCheck::failing(1));
        let orchestrator = Orchestrator::new(knowledge()).with_evaluator(check.clone());
        let (report, trace) = orchestrator
            .run_traced(AnalysisInput::new(CONFIG).with_options(options(true, true)))
            .await;
        assert_eq!(check.calls(), 2);
        assert_eq!(trace.iter().filter(|s| **s == Stage::Explain).count(), 2);
        assert_eq!(report.diagnostics.evaluation_passed, Some(true));
        assert_eq!(report.diagnostics.evaluation_retries, 1);
        assert!(!report.diagnostics.explanations_suppressed);
        assert!(report.findings.iter().any(|f| f.explanation.is_some()));
    }

    #[tokio::test]
    async fn test_fail_closed_after_second_failure() {
        let check = Arc::new(ScriptedCheck::failing(u32::MAX));
        let generator = Arc::new(MockTextGenerator::with_response(
            "WHY: Spot capacity is cheaper.\nCHANGE:\n- Allow spot",
        ));
        let orchestrator = Orchestrator::new(knowledge())
            .with_generator(generator, &LlmConfig::default())
            .with_evaluator(check.clone());
        let input = AnalysisInput::new(CONFIG).with_options(AnalysisOptions {
            enable_explanations: true,
            enable_evaluator: true,
            enable_summary: true,
        });
        let report = orchestrator.run(input).await;

        assert_eq!(check.calls(), 2);
        assert!(report.findings.iter().all(|f| f.explanation.is_none()));
        assert!(report.narrative.is_none());
        assert!(report.diagnostics.explanations_suppressed);
        assert_eq!(report.diagnostics.evaluation_passed, Some(false));
        assert_eq!(report.diagnostics.evaluation_retries, 1);
        assert_eq!(report.diagnostics.explain_attempts, 2);
        assert_eq!(report.evaluation_notes, vec!["scripted: failure"]);
    }

    #[tokio::test]
    async fn test_first_pass_keeps_explanations() {
        let check = Arc::new(ScriptedCheck::failing(0));
        let orchestrator = Orchestrator::new(knowledge()).with_evaluator(check.clone());
        let report = orchestrator
            .run(AnalysisInput::new(CONFIG).with_options(options(true, true)))
            .await;
        assert_eq!(check.calls(), 1);
        assert_eq!(report.diagnostics.evaluation_retries, 0);
        assert_eq!(report.diagnostics.explain_attempts, 1);
    }

    #[tokio::test]
    async fn test_evaluator_skipped_without_explanations() {
        let check = Arc::new(ScriptedCheck::failing(u32::MAX));
        let orchestrator = Orchestrator::new(knowledge()).with_evaluator(check.clone());
        orchestrator
            .run(AnalysisInput::new(CONFIG).with_options(options(false, true)))
            .await;
        assert_eq!(check.calls(), 0);
    }

    #[tokio::test]
    async fn test_summary_without_explanations_writes_narrative() {
        let generator = Arc::new(MockTextGenerator::with_response(
            "The general NodePool runs on-demand only.",
        ));
        let orchestrator =
            Orchestrator::new(knowledge()).with_generator(generator.clone(), &LlmConfig::default());
        let input = AnalysisInput::new(CONFIG).with_options(AnalysisOptions {
            enable_explanations: false,
            enable_evaluator: false,
            enable_summary: true,
        });
        let report = orchestrator.run(input).await;

        assert_eq!(generator.call_count(), 1);
        assert_eq!(
            report.narrative.as_deref(),
            Some("The general NodePool runs on-demand only.")
        );
        assert!(report.findings.iter().all(|f| f.explanation.is_none()));
        assert_eq!(report.diagnostics.explain_attempts, 1);
    }

    #[tokio::test]
    async fn test_summary_only_narrative_is_evaluated() {
        let check = Arc::new(ScriptedCheck::failing(u32::MAX));
        let generator = Arc::new(MockTextGenerator::with_response("Allow spot capacity."));
        let orchestrator = Orchestrator::new(knowledge())
            .with_generator(generator, &LlmConfig::default())
            .with_evaluator(check.clone());
        let input = AnalysisInput::new(CONFIG).with_options(AnalysisOptions {
            enable_explanations: false,
            enable_evaluator: true,
            enable_summary: true,
        });
        let report = orchestrator.run(input).await;

        assert_eq!(check.calls(), 2);
        assert!(report.narrative.is_none());
        assert!(report.diagnostics.explanations_suppressed);
    }
}

//! Text and JSON rendering of reports and search results.

use kestrel_core::summary::HEALTH_SCORE_MAX;
use kestrel_core::types::{AnalysisReport, Finding};
use kestrel_ml::RetrievedContext;
use std::fmt::Write;

const EXCERPT_CHARS: usize = 160;

pub fn report_json(report: &AnalysisReport) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// All parse errors on one line, with line numbers when known.
pub fn parse_errors_line(report: &AnalysisReport) -> String {
    report
        .parse_errors
        .iter()
        .map(|e| match e.line {
            Some(line) => format!("line {}: {}", line, e.message),
            None => e.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn report_text(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let generated = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let _ = writeln!(out, "Kestrel report ({})", generated);
    if let Some(region) = &report.region {
        let _ = writeln!(out, "Region: {}", region);
    }
    let _ = writeln!(out, "Health score: {}/{}", report.health_score, HEALTH_SCORE_MAX);

    if !report.parse_errors.is_empty() {
        let _ = writeln!(out, "\nConfiguration could not be parsed:");
        for error in &report.parse_errors {
            match error.line {
                Some(line) => {
                    let _ = writeln!(out, "  - line {}: {}", line, error.message);
                }
                None => {
                    let _ = writeln!(out, "  - {}", error.message);
                }
            }
        }
        return out;
    }

    let counts = &report.severity_counts;
    let opt = &report.optimization;
    let _ = writeln!(
        out,
        "Findings: {} (high {}, medium {}, low {})",
        counts.total(),
        counts.high,
        counts.medium,
        counts.low
    );
    let _ = writeln!(
        out,
        "Provisioners: {} | spot {} | graviton {} | consolidation {} | node classes {}",
        opt.total_provisioners,
        opt.spot_enabled,
        opt.graviton_used,
        opt.consolidation_enabled,
        opt.node_class_count
    );

    for finding in &report.findings {
        out.push('\n');
        write_finding(&mut out, finding);
    }

    if let Some(narrative) = &report.narrative {
        let _ = writeln!(out, "\nSummary\n{}", narrative);
    }

    let diagnostics = &report.diagnostics;
    if let Some(passed) = diagnostics.evaluation_passed {
        let verdict = if passed { "passed" } else { "failed" };
        let _ = writeln!(
            out,
            "\nGrounding check {} (retries: {})",
            verdict, diagnostics.evaluation_retries
        );
        for note in &report.evaluation_notes {
            let _ = writeln!(out, "  - {}", note);
        }
        if diagnostics.explanations_suppressed {
            let _ = writeln!(out, "  Explanations were withheld.");
        }
    }
    out
}

fn write_finding(out: &mut String, finding: &Finding) {
    let resource = match (&finding.resource_kind, &finding.resource_name) {
        (Some(kind), Some(name)) => format!(" {}/{}", kind, name),
        _ => String::new(),
    };
    let _ = writeln!(
        out,
        "[{}] {}{}",
        finding.severity.as_str().to_uppercase(),
        finding.rule_id,
        resource
    );
    let _ = writeln!(out, "  {}", finding.message);
    let _ = writeln!(out, "  Fix: {}", finding.recommendation);

    let Some(explanation) = &finding.explanation else {
        return;
    };
    if let Some(why) = &explanation.why_matters {
        let _ = writeln!(out, "  Why: {}", why);
    }
    if !explanation.what_to_change.is_empty() {
        let _ = writeln!(out, "  Change:");
        for change in &explanation.what_to_change {
            let _ = writeln!(out, "    - {}", change);
        }
    }
    if !explanation.citations.is_empty() {
        let _ = writeln!(out, "  Docs:");
        for citation in &explanation.citations {
            let _ = writeln!(out, "    - {} ({})", citation.title, citation.source_url);
        }
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", cut.trim_end())
}

pub fn contexts_text(contexts: &[RetrievedContext]) -> String {
    if contexts.is_empty() {
        return "No matching documents.\n".to_string();
    }
    let mut out = String::new();
    for (idx, ctx) in contexts.iter().enumerate() {
        let _ = writeln!(out, "{}. [{:.3}] {}", idx + 1, ctx.score, ctx.title);
        if !ctx.source_url.is_empty() {
            let _ = writeln!(out, "   {}", ctx.source_url);
        }
        let _ = writeln!(out, "   {}", excerpt(&ctx.text));
    }
    out
}

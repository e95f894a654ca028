//! Post-processing of generated text and the WHY/CHANGE/DOCS section parser.

use kestrel_core::types::Explanation;
use regex::Regex;
use std::sync::LazyLock;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("fenced block pattern"));

static EXTRA_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank line pattern"));

const PATCH_HEADER_PREFIXES: &[&str] = &["suggested yaml", "yaml patch"];

/// Strip fenced blocks and patch-header lines, collapse runs of blank lines.
pub fn sanitize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let without_fences = FENCED_BLOCK.replace_all(text, "");
    let kept: Vec<&str> = without_fences
        .lines()
        .filter(|line| {
            let lower = line.trim().to_lowercase();
            !PATCH_HEADER_PREFIXES
                .iter()
                .any(|prefix| lower.starts_with(prefix))
        })
        .collect();
    let joined = kept.join("\n");
    EXTRA_BLANK_LINES
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Why,
    Change,
    Docs,
}

fn strip_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let head = line.get(..marker.len())?;
    head.eq_ignore_ascii_case(marker)
        .then(|| &line[marker.len()..])
}

/// Parse sanitized text into an explanation without citations.
///
/// Lines before the first marker and everything under `DOCS:` are ignored;
/// only `-` bullets count under `CHANGE:`.
pub fn parse_sections(text: &str) -> Explanation {
    let mut section: Option<Section> = None;
    let mut why_lines: Vec<String> = Vec::new();
    let mut changes: Vec<String> = Vec::new();

    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if let Some(rest) = strip_marker(line, "WHY:") {
            section = Some(Section::Why);
            let rest = rest.trim();
            if !rest.is_empty() {
                why_lines.push(rest.to_string());
            }
            continue;
        }
        if strip_marker(line, "CHANGE:").is_some() {
            section = Some(Section::Change);
            continue;
        }
        if strip_marker(line, "DOCS:").is_some() {
            section = Some(Section::Docs);
            continue;
        }

        match section {
            Some(Section::Why) => why_lines.push(line.to_string()),
            Some(Section::Change) => {
                if let Some(bullet) = line.strip_prefix('-') {
                    changes.push(bullet.trim().to_string());
                }
            }
            Some(Section::Docs) | None => {}
        }
    }

    let why = why_lines.join(" ");
    Explanation {
        why_matters: (!why_lines.is_empty()).then(|| why.trim().to_string()),
        what_to_change: changes,
        citations: Vec::new(),
    }
}

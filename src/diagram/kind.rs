//! Diagram kind detection
//!
//! Keyword heuristics that guess the PlantUML diagram kind without invoking
//! the renderer. Explicit `@start<kind>` directives win; otherwise the first
//! matching keyword family decides.

use serde::Serialize;

/// Detected diagram kind with a confidence score in `[0, 1]`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramKind {
    pub diagram_type: &'static str,
    pub confidence: f64,
}

/// `@start` directives that name their diagram kind directly
const EXPLICIT_KINDS: &[&str] = &[
    "mindmap", "wbs", "gantt", "salt", "yaml", "json", "ebnf", "regex", "chen",
];

const SEQUENCE_DECLARATIONS: &[&str] = &[
    "participant ",
    "actor ",
    "boundary ",
    "control ",
    "entity ",
    "database ",
    "collections ",
];

/// Detect the diagram kind of a source
pub fn detect(source: &str) -> DiagramKind {
    let diagram_type = detect_type(source);
    DiagramKind {
        diagram_type,
        confidence: confidence(source, diagram_type),
    }
}

fn detect_type(source: &str) -> &'static str {
    if source.trim().is_empty() {
        return "unknown";
    }

    let lower = source.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if let Some(kind) = EXPLICIT_KINDS
        .iter()
        .find(|kind| has(format!("@start{}", kind).as_str()))
    {
        return *kind;
    }

    if SEQUENCE_DECLARATIONS.iter().any(|k| has(*k)) || (has("->") && !has("class ")) {
        return "sequence";
    }

    if ["class ", "interface ", "abstract ", "enum ", "extends ", "implements "]
        .iter()
        .any(|k| has(*k))
    {
        return "class";
    }

    if has("state ") || has("[*]") || (has("-->") && has(":")) {
        return "state";
    }

    if (has("start") && has("stop"))
        || has("if (")
        || has("while (")
        || has("fork")
        || has("split")
    {
        return "activity";
    }

    if has("component ") || has("package ") || has("node ") {
        return "component";
    }

    if has("usecase ") || (has("actor") && has("-->")) {
        return "usecase";
    }

    if has("object ") {
        return "object";
    }

    if has("artifact ") || has("cloud ") {
        return "deployment";
    }

    if has("robust ") || has("concise ") {
        return "timing";
    }

    if has("nwdiag") {
        return "network";
    }

    "unknown"
}

fn confidence(source: &str, diagram_type: &str) -> f64 {
    if diagram_type == "unknown" {
        return 0.1;
    }

    let lower = source.to_lowercase();
    if lower.contains(&format!("@start{}", diagram_type)) {
        return 0.95;
    }

    let checks: [bool; 3] = match diagram_type {
        "sequence" => [
            lower.contains("participant"),
            lower.contains("->"),
            lower.contains("activate") || lower.contains("deactivate"),
        ],
        "class" => [
            lower.contains("class "),
            lower.contains("interface ") || lower.contains("abstract "),
            lower.contains("extends") || lower.contains("implements"),
        ],
        "state" => [
            lower.contains("state "),
            lower.contains("[*]"),
            lower.contains("-->"),
        ],
        _ => return 0.7,
    };

    let matches = checks.iter().filter(|hit| **hit).count();
    0.5 + (matches as f64 / checks.len() as f64) * 0.4
}

/// Participant names mentioned by a sequence-style diagram, in first-seen order
pub fn participants(source: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        let name = name.trim().trim_matches('"');
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    };

    for line in source.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('@') || line.starts_with('\'') {
            continue;
        }

        let lower = line.to_lowercase();
        if let Some(keyword) = SEQUENCE_DECLARATIONS.iter().find(|k| lower.starts_with(*k)) {
            let rest = &line[keyword.len()..];
            let name = rest.split(" as ").next().unwrap_or(rest);
            push(name);
            continue;
        }

        let statement = line.split(':').next().unwrap_or(line);
        if let Some((from, to)) = split_arrow(statement) {
            push(from);
            push(to);
        }
    }

    names
}

/// Split `A -> B` style statements on the first arrow token
fn split_arrow(statement: &str) -> Option<(&str, &str)> {
    let start = statement.find(['-', '<', '='])?;
    let arrow_len = statement[start..]
        .find(|c: char| !matches!(c, '-' | '<' | '>' | '=' | '.' | '/' | '\\'))
        .unwrap_or(statement.len() - start);
    let arrow = &statement[start..start + arrow_len];
    if !arrow.contains('>') && !arrow.contains('<') {
        return None;
    }

    let from = &statement[..start];
    let to = &statement[start + arrow_len..];
    if from.trim().is_empty() || to.trim().is_empty() {
        return None;
    }
    Some((from, to))
}

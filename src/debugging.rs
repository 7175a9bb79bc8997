//! Debugger support: breakpoint-adjacent positions and expressions.

use std::sync::LazyLock;

use regex::Regex;

use crate::document::{Language, MappedPosition};
use crate::template::CodeDocument;

/// Identifiers and member-access chains.
static EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*").unwrap()
});

/// Keywords and generated names that are never worth evaluating.
const IGNORED: &[&str] = &[
    "__o", "__attr", "if", "else", "for", "foreach", "in", "while", "switch", "case", "lock",
    "return", "var", "new", "true", "false", "null", "int", "string", "bool", "void",
];

/// The code position closest to `offset`, for binding a breakpoint.
///
/// Markup lines use the first code on the same line.
pub fn proximity_position(document: &CodeDocument, offset: usize) -> Option<MappedPosition> {
    let mapper = document.mapper();
    match document.spans.language_at(offset, false)? {
        Language::Code => mapper
            .to_generated(offset)
            .filter(|m| m.language == Language::Code),
        Language::Markup => mapper.to_generated_or_next_mapped(offset),
        Language::Host => None,
    }
}

/// Expressions on the projected code line nearest `offset`, in order of appearance.
pub fn proximity_expressions(document: &CodeDocument, offset: usize) -> Vec<String> {
    let Some(position) = proximity_position(document, offset) else {
        return Vec::new();
    };
    let text = document.code.text.as_str();
    let at = position.projected_offset.min(text.len());
    let start = text[..at].rfind('\n').map_or(0, |i| i + 1);
    let end = text[at..].find('\n').map_or(text.len(), |i| at + i);
    let line = strip_strings(&text[start..end]);

    let mut expressions: Vec<String> = Vec::new();
    for found in EXPRESSION.find_iter(&line) {
        let candidate = found.as_str();
        let preceded_by_digit = line[..found.start()]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_digit());
        if preceded_by_digit || IGNORED.contains(&candidate) {
            continue;
        }
        if !expressions.iter().any(|e| e == candidate) {
            expressions.push(candidate.to_string());
        }
    }
    expressions
}

/// Blank out string literal contents so words inside them are not reported.
fn strip_strings(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut quote = None;
    let mut escaped = false;
    for c in line.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                    out.push(c);
                    continue;
                }
                out.push(' ');
            }
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}

//! Generated projections for the code and markup sub-languages.

use crate::document::{ClassifiedSpan, Language, Projection, SourceMapping, StructuralKind};

const CODE_HEADER: &str = "// <auto-generated/>\npartial class __Template\n{\n    void __Render()\n    {\n";
const CODE_FOOTER: &str = "    }\n}\n";

/// A run of host-contiguous spans of one language.
struct Run {
    start: usize,
    end: usize,
    kind: StructuralKind,
}

/// Group spans of `language` into runs. Spans tile the document, so two spans of the
/// same language that touch are only separated by zero-length markers.
fn runs(spans: &[ClassifiedSpan], language: Language) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for span in spans {
        if span.language != language {
            continue;
        }
        match runs.last_mut() {
            Some(run) if run.end == span.start => {
                run.end = span.end;
            }
            _ => runs.push(Run {
                start: span.start,
                end: span.end,
                kind: span.kind,
            }),
        }
    }
    runs
}

/// Build the code projection: every code run is copied into a synthetic method body,
/// with expressions wrapped as assignments.
pub fn code_projection(source: &str, spans: &[ClassifiedSpan]) -> Projection {
    let mut text = String::from(CODE_HEADER);
    let mut mappings = Vec::new();

    for run in runs(spans, Language::Code) {
        let (prefix, suffix) = match run.kind {
            StructuralKind::Expression => ("        __o = ", ";"),
            StructuralKind::AttributeValue => ("        __attr = ", ";"),
            _ => ("", ""),
        };
        text.push_str("#line hidden\n");
        text.push_str(prefix);
        mappings.push(SourceMapping::new(run.start, text.len(), run.end - run.start));
        text.push_str(&source[run.start..run.end]);
        text.push_str(suffix);
        text.push('\n');
    }

    text.push_str(CODE_FOOTER);
    Projection::new(Language::Code, text, mappings)
}

/// Build the markup projection: the host text with everything that is not markup
/// blanked out byte for byte, so markup offsets are identical in both documents.
pub fn markup_projection(source: &str, spans: &[ClassifiedSpan]) -> Projection {
    let mut bytes = source.as_bytes().to_vec();
    for span in spans.iter().filter(|s| s.language != Language::Markup) {
        for byte in &mut bytes[span.start..span.end] {
            if *byte != b'\n' && *byte != b'\r' {
                *byte = b'~';
            }
        }
    }
    // Non-markup bytes are replaced by ASCII and markup spans end on char boundaries.
    let text = String::from_utf8(bytes).unwrap_or_else(|_| source.to_string());

    let mappings = runs(spans, Language::Markup)
        .into_iter()
        .map(|run| SourceMapping::new(run.start, run.start, run.end - run.start))
        .collect();

    Projection::new(Language::Markup, text, mappings)
}

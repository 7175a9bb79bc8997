//! Whole-document indentation.

use crate::document::{Language, StructuralKind, TextChange};

use super::{FormattingContext, FormattingKind, FormattingResult, IndentationEntry};

/// Replace a line's leading whitespace so it sits at `level`. `None` if it already does.
pub(super) fn reindent(
    ctx: &FormattingContext,
    entry: &IndentationEntry,
    level: usize,
) -> Option<TextChange> {
    let range = ctx.line_index().line_range(entry.line)?;
    let existing = range.start..range.start + entry.existing_indent_width;
    let desired = ctx.indentation_string(level);
    (ctx.source()[existing.clone()] != desired).then(|| TextChange::new(existing, desired))
}

fn probe(ctx: &FormattingContext, entry: &IndentationEntry) -> Option<usize> {
    ctx.line_index()
        .line_range(entry.line)
        .map(|range| range.start + entry.existing_indent_width)
}

/// Whether the line starts inside a string literal or inline expression that began
/// on an earlier line. Its leading whitespace is part of the code.
pub(super) fn continues_code_literal(ctx: &FormattingContext, entry: &IndentationEntry) -> bool {
    let span = &entry.owning_span;
    matches!(span.kind, StructuralKind::StringLiteral | StructuralKind::Expression)
        && probe(ctx, entry).is_some_and(|probe| span.start < probe)
}

/// Lines whose leading whitespace belongs to a construct that spans lines: comments,
/// multi-line string literals and the attribute lists of multi-line start tags.
fn is_preserved(ctx: &FormattingContext, entry: &IndentationEntry) -> bool {
    let Some(probe) = probe(ctx, entry) else {
        return true;
    };
    let span = &entry.owning_span;
    let continues = span.start < probe;

    match span.kind {
        StructuralKind::Comment => continues,
        StructuralKind::StringLiteral | StructuralKind::Expression => continues,
        StructuralKind::Markup => {
            continues && ctx.source()[span.range()].starts_with("<!--")
        }
        StructuralKind::Tag
        | StructuralKind::AttributeName
        | StructuralKind::AttributeEquals
        | StructuralKind::AttributeValue => !ctx.source()[probe..].starts_with('<'),
        _ => false,
    }
}

pub(super) fn document(ctx: &FormattingContext, result: FormattingResult) -> FormattingResult {
    if result.owner != Language::Host || ctx.kind() != FormattingKind::Document {
        return result;
    }

    let mut edits = result.edits;
    for entry in ctx.indentations() {
        if entry.is_blank || is_preserved(ctx, entry) {
            continue;
        }
        if let Some(change) = reindent(ctx, entry, entry.structural_level) {
            edits.push(change);
        }
    }

    tracing::debug!(edits = edits.len(), "document indentation");
    FormattingResult::new(edits, Language::Host)
}

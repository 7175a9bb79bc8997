//! Language passes: map sub-language edits to the host and apply on-type rules.

use crate::document::{Language, PositionMapper, TextChange};

use super::indent::{continues_code_literal, reindent};
use super::{FormattingContext, FormattingKind, FormattingResult};

/// Map projection edits to host edits, dropping any that do not map cleanly.
fn map_to_host(
    mapper: &PositionMapper<'_>,
    edits: Vec<TextChange>,
    language: Language,
) -> Vec<TextChange> {
    edits
        .into_iter()
        .filter_map(|edit| match mapper.range_to_host(&edit.span, language) {
            Some(span) => Some(TextChange::new(span, edit.new_text)),
            None => {
                tracing::debug!(
                    ?edit.span,
                    %language,
                    "dropping edit that does not map to the host document"
                );
                None
            }
        })
        .collect()
}

/// Host offset of the trigger character: just before the cursor, or under it when
/// the editor auto-closed the character.
fn trigger_position(ctx: &FormattingContext, offset: usize, trigger: char) -> Option<usize> {
    let source = ctx.source();
    let before = offset.checked_sub(trigger.len_utf8());
    if let Some(before) = before {
        if source.get(before..offset).and_then(|s| s.chars().next()) == Some(trigger) {
            return Some(before);
        }
    }
    source
        .get(offset..)
        .filter(|rest| rest.starts_with(trigger))
        .map(|_| offset)
}

/// Re-indent `line` to `level`.
fn reindent_line(ctx: &FormattingContext, line: usize, level: usize) -> Option<TextChange> {
    let entry = ctx.indentations().get(line)?;
    if entry.is_blank {
        // Blank lines only get indentation when the cursor sits on them.
        let range = ctx.line_index().line_range(line)?;
        let desired = ctx.indentation_string(level);
        return (ctx.source()[range.clone()] != desired).then(|| TextChange::new(range, desired));
    }
    reindent(ctx, entry, level)
}

/// Re-indent a line to its own structural level.
fn reindent_to_structure(ctx: &FormattingContext, line: usize) -> Option<TextChange> {
    let entry = ctx.indentations().get(line)?;
    if continues_code_literal(ctx, entry) {
        return None;
    }
    reindent_line(ctx, line, entry.structural_level)
}

/// The `{` matching the `}` at `brace`, counting only braces owned by code.
fn find_opener(ctx: &FormattingContext, brace: usize) -> Option<usize> {
    let bytes = ctx.source().as_bytes();
    let mut depth = 0usize;
    for span in ctx
        .document()
        .spans
        .spans()
        .iter()
        .rev()
        .filter(|s| s.language == Language::Code && s.start < brace)
    {
        for i in (span.start..span.end.min(brace)).rev() {
            match bytes[i] {
                b'}' => depth += 1,
                b'{' if depth == 0 => return Some(i),
                b'{' => depth -= 1,
                _ => {}
            }
        }
    }
    None
}

fn close_brace(ctx: &FormattingContext, brace: usize) -> Option<TextChange> {
    let index = ctx.line_index();
    let line = index.line_of(brace);
    // The brace's own span, not a marker for an empty body that may start there.
    let level = ctx
        .document()
        .spans
        .spans()
        .iter()
        .find(|s| s.start <= brace && brace < s.end)?
        .nesting_depth;
    let opener = find_opener(ctx, brace)?;

    if index.line_of(opener) == line {
        // An empty block closed on its opener's line moves the brace to its own line.
        let between = &ctx.source()[opener + 1..brace];
        if !between.trim().is_empty() {
            return None;
        }
        return Some(TextChange::new(
            opener + 1..brace,
            format!("\n{}", ctx.indentation_string(level)),
        ));
    }

    if index.first_non_whitespace(line) != Some(brace) {
        return None;
    }
    reindent_line(ctx, line, level)
}

/// Indent continuation lines of a multi-line insertion relative to the line it lands on.
fn reindent_continuation(ctx: &FormattingContext, edit: TextChange) -> TextChange {
    if !edit.new_text.contains('\n') {
        return edit;
    }
    let line = ctx.line_index().line_of(edit.span.start);
    let level = ctx
        .indentations()
        .get(line)
        .map(|e| e.structural_level)
        .unwrap_or(0);
    let base = ctx.indentation_string(level);

    let mut lines = edit.new_text.split('\n');
    let first = lines.next().unwrap_or_default();
    let rest: Vec<&str> = lines.collect();
    let leading = |l: &str| l.len() - l.trim_start_matches([' ', '\t']).len();
    let common = rest
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| leading(*l))
        .min()
        .unwrap_or(0);

    let mut text = first.to_string();
    for continuation in rest {
        text.push('\n');
        if !continuation.trim().is_empty() {
            text.push_str(&base);
            text.push_str(&continuation[common..]);
        }
    }
    TextChange::new(edit.span, text)
}

pub(super) fn code(ctx: &FormattingContext, result: FormattingResult) -> FormattingResult {
    if result.owner != Language::Code {
        return result;
    }

    let mapper = ctx.document().mapper();
    let mut edits = map_to_host(&mapper, result.edits, Language::Code);

    match ctx.kind() {
        FormattingKind::OnType { offset, trigger } => {
            let rule = trigger_position(ctx, offset, trigger).and_then(|at| match trigger {
                '}' => close_brace(ctx, at),
                ';' => reindent_to_structure(ctx, ctx.line_index().line_of(at)),
                _ => None,
            });
            edits.extend(rule);
        }
        FormattingKind::Snippet => {
            edits = edits
                .into_iter()
                .map(|edit| reindent_continuation(ctx, edit))
                .collect();
        }
        FormattingKind::Document => {}
    }

    FormattingResult::new(edits, Language::Host)
}

pub(super) fn markup(ctx: &FormattingContext, result: FormattingResult) -> FormattingResult {
    if result.owner != Language::Markup {
        return result;
    }

    let mapper = ctx.document().mapper();
    let mut edits = map_to_host(&mapper, result.edits, Language::Markup);

    if let FormattingKind::OnType { offset, trigger } = ctx.kind() {
        let index = ctx.line_index();
        let rule = match trigger {
            '\n' => {
                let line = index.line_of(offset);
                match index.first_non_whitespace(line) {
                    Some(_) => reindent_to_structure(ctx, line),
                    None => ctx
                        .indentation_level_at(offset)
                        .and_then(|level| reindent_line(ctx, line, level)),
                }
            }
            '{' | '}' | ';' => trigger_position(ctx, offset, trigger)
                .and_then(|at| reindent_to_structure(ctx, index.line_of(at))),
            _ => None,
        };
        edits.extend(rule);
    }

    FormattingResult::new(edits, Language::Host)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::document::apply_changes;
    use crate::formatting::{IndentOptions, ValidationMode};
    use crate::template::ScanningEngine;

    fn on_type(source: &str, offset: usize, trigger: char, owner: Language) -> Vec<TextChange> {
        let scanned = Arc::new(ScanningEngine.scan(source.to_string()));
        let ctx = FormattingContext::for_on_type(
            scanned,
            IndentOptions::default(),
            offset,
            trigger,
            ScanningEngine::shared(),
            ValidationMode::Strict,
        )
        .unwrap();
        let initial = FormattingResult::empty(owner);
        let result = match owner {
            Language::Code => code(&ctx, initial),
            _ => markup(&ctx, initial),
        };
        assert_eq!(result.owner, Language::Host);
        result.edits
    }

    #[test]
    fn empty_block_brace_moves_to_own_line() {
        let edits = on_type("@code {}", 7, '}', Language::Code);
        assert_eq!(edits, vec![TextChange::insert(7, "\n")]);
        assert_eq!(apply_changes("@code {}", &edits).as_deref(), Some("@code {\n}"));
    }

    #[test]
    fn closing_brace_is_idempotent() {
        assert!(on_type("@code {\n}", 9, '}', Language::Code).is_empty());
    }

    #[test]
    fn nested_closing_brace_reindents() {
        let source = "@code {\n    void M()\n    {\n        x();\n}\n}";
        let brace = source.rfind("\n}\n").unwrap() + 1;
        let edits = on_type(source, brace + 1, '}', Language::Code);
        assert_eq!(edits, vec![TextChange::insert(brace, "    ")]);
    }

    #[test]
    fn semicolon_reindents_its_line() {
        let source = "@code {\nint x;\n}";
        let edits = on_type(source, 14, ';', Language::Code);
        assert_eq!(edits, vec![TextChange::insert(8, "    ")]);
    }

    #[test]
    fn markup_newline_indents_blank_line() {
        let source = "<div>\n    <p>a</p>\n";
        let edits = on_type(source, source.len(), '\n', Language::Markup);
        assert_eq!(edits, vec![TextChange::insert(source.len(), "    ")]);
    }

    #[test]
    fn maps_projected_code_edits() {
        let source = "<p>@name</p>";
        let scanned = Arc::new(ScanningEngine.scan(source.to_string()));
        let generated = scanned.code.mappings[0].generated.clone();
        let ctx = FormattingContext::for_snippet(
            scanned,
            IndentOptions::default(),
            ScanningEngine::shared(),
            ValidationMode::Strict,
        );
        let draft = vec![
            TextChange::new(generated.clone(), "Name"),
            TextChange::insert(0, "dropped"),
        ];
        let result = code(&ctx, FormattingResult::new(draft, Language::Code));
        assert_eq!(result.edits, vec![TextChange::new(4..8, "Name")]);
    }

    #[test]
    fn snippet_continuations_follow_host_level() {
        let source = "@code {\n    int x;\n}";
        let scanned = Arc::new(ScanningEngine.scan(source.to_string()));
        let ctx = FormattingContext::for_snippet(
            scanned,
            IndentOptions::default(),
            ScanningEngine::shared(),
            ValidationMode::Strict,
        );
        let edit = TextChange::insert(18, "\n        void M()\n        {\n        }");
        let reindented = reindent_continuation(&ctx, edit);
        assert_eq!(reindented.new_text, "\n    void M()\n    {\n    }");
    }
}

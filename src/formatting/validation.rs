//! Validation passes. Both run after every language pass.

use crate::document::{apply_changes, Language};
use crate::error::{FormatError, FormatResult};
use crate::reconcile::EditReconciler;
use crate::template::diagnostic_multiset;

use super::{FormattingContext, FormattingKind, FormattingResult, ValidationMode};

/// Log and degrade, or fail in strict mode.
fn reject(ctx: &FormattingContext, pass: &str, reason: String) -> FormatResult<FormattingResult> {
    match ctx.mode() {
        ValidationMode::Strict => Err(FormatError::invariant(reason)),
        ValidationMode::Permissive => {
            tracing::warn!(pass, %reason, "formatting edits rejected");
            Ok(FormattingResult::empty(Language::Host))
        }
    }
}

fn non_whitespace(text: &str) -> impl Iterator<Item = char> + '_ {
    text.chars().filter(|c| !c.is_whitespace())
}

/// Document formatting may only touch whitespace.
pub(super) fn content(
    ctx: &FormattingContext,
    result: FormattingResult,
) -> FormatResult<FormattingResult> {
    if result.owner != Language::Host
        || ctx.kind() != FormattingKind::Document
        || result.is_empty()
    {
        return Ok(result);
    }

    let edits = EditReconciler::reconcile(result.edits);
    let Some(changed) = apply_changes(ctx.source(), &edits) else {
        return reject(ctx, "content", "edits fall outside the document".to_string());
    };
    if !non_whitespace(ctx.source()).eq(non_whitespace(&changed)) {
        return reject(
            ctx,
            "content",
            "document formatting changed non-whitespace content".to_string(),
        );
    }
    Ok(FormattingResult::new(edits, Language::Host))
}

/// Edits must leave the document's diagnostics unchanged, ignoring locations.
pub(super) async fn diagnostics(
    ctx: &FormattingContext,
    result: FormattingResult,
) -> FormatResult<FormattingResult> {
    if result.owner != Language::Host || result.is_empty() {
        return Ok(result);
    }

    let edits = EditReconciler::reconcile(result.edits);
    let Some(changed) = apply_changes(ctx.source(), &edits) else {
        return reject(ctx, "diagnostics", "edits fall outside the document".to_string());
    };

    let sibling = ctx.with_text(changed).await?;
    let before = diagnostic_multiset(&ctx.document().diagnostics);
    let after = diagnostic_multiset(&sibling.document().diagnostics);
    if before != after {
        return reject(
            ctx,
            "diagnostics",
            format!("edits change diagnostics from {before:?} to {after:?}"),
        );
    }

    Ok(FormattingResult::new(edits, Language::Host))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::document::TextChange;
    use crate::formatting::IndentOptions;
    use crate::template::ScanningEngine;

    fn context(source: &str, kind: FormattingKind, mode: ValidationMode) -> FormattingContext {
        let scanned = Arc::new(ScanningEngine.scan(source.to_string()));
        FormattingContext::new(
            scanned,
            IndentOptions::default(),
            kind,
            ScanningEngine::shared(),
            mode,
        )
    }

    const SOURCE: &str = "@code {\n    int x;\n}\n";

    fn delete_closing_line() -> FormattingResult {
        let start = SOURCE.rfind("}\n").unwrap();
        FormattingResult::new(vec![TextChange::new(start..SOURCE.len(), "")], Language::Host)
    }

    #[tokio::test]
    async fn destructive_edit_degrades_to_nothing() {
        let ctx = context(SOURCE, FormattingKind::Snippet, ValidationMode::Permissive);
        let result = diagnostics(&ctx, delete_closing_line()).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(result.owner, Language::Host);
    }

    #[tokio::test]
    async fn destructive_edit_fails_in_strict_mode() {
        let ctx = context(SOURCE, FormattingKind::Snippet, ValidationMode::Strict);
        let result = diagnostics(&ctx, delete_closing_line()).await;
        assert!(matches!(result, Err(FormatError::InvariantViolation { .. })));
    }

    #[tokio::test]
    async fn whitespace_edits_pass() {
        let ctx = context(SOURCE, FormattingKind::Document, ValidationMode::Strict);
        let input = FormattingResult::new(vec![TextChange::new(8..12, "  ")], Language::Host);
        let result = diagnostics(&ctx, input.clone()).await.unwrap();
        assert_eq!(result, input);
    }

    #[test]
    fn content_rejects_text_changes() {
        let ctx = context(SOURCE, FormattingKind::Document, ValidationMode::Permissive);
        let input = FormattingResult::new(vec![TextChange::new(12..15, "var")], Language::Host);
        assert!(content(&ctx, input).unwrap().is_empty());

        let spaces = FormattingResult::new(vec![TextChange::insert(8, "\t")], Language::Host);
        assert_eq!(content(&ctx, spaces.clone()).unwrap(), spaces);
    }

    #[test]
    fn content_ignores_on_type_requests() {
        let ctx = context(
            SOURCE,
            FormattingKind::OnType {
                offset: 18,
                trigger: ';',
            },
            ValidationMode::Strict,
        );
        let input = FormattingResult::new(vec![TextChange::new(12..15, "var")], Language::Host);
        assert_eq!(content(&ctx, input.clone()).unwrap(), input);
    }
}

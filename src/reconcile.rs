//! Reconciling edits and completion data coming back from delegated services.

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionTextEdit, InsertTextFormat, TextDocumentIdentifier, TextEdit,
};

use crate::delegation::{DelegatedCompletionResolveParams, DelegatedFormatter};
use crate::document::{apply_changes, DocumentSnapshot, Language, LineIndex, TextChange};
use crate::error::{FormatError, FormatResult};
use crate::formatting::{FormattingService, IndentOptions};

/// Key of the object that wraps merged completion data.
pub const MERGED_DATA_KEY: &str = "_tmpl_merged";

/// Combine two data payloads, flattening an already-merged first payload.
pub fn merge_data(first: Option<Value>, second: Option<Value>) -> Option<Value> {
    match (first, second) {
        (None, None) => None,
        (Some(value), None) | (None, Some(value)) => Some(value),
        (Some(first), Some(second)) => {
            let mut pieces = split_merged_data(&first).unwrap_or_else(|| vec![first]);
            pieces.push(second);
            Some(json!({ MERGED_DATA_KEY: pieces }))
        }
    }
}

/// The pieces of a merged payload, or `None` if `value` is not one.
pub fn split_merged_data(value: &Value) -> Option<Vec<Value>> {
    value.as_object()?.get(MERGED_DATA_KEY)?.as_array().cloned()
}

/// Give an item back the data its originating service attached.
///
/// With exactly two merged pieces the second one (the service's) is restored. An
/// item left without data gets `fallback`, usually the list-level data.
pub fn restore_item_data(item: &mut CompletionItem, fallback: Option<Value>) {
    match item.data.as_ref().and_then(split_merged_data) {
        Some(pieces) if pieces.len() == 2 => {
            item.data = pieces
                .into_iter()
                .nth(1)
                .filter(|data| !data.is_null())
                .or(fallback)
        }
        Some(pieces) => {
            tracing::debug!(pieces = pieces.len(), "leaving merged data with unexpected arity")
        }
        None if item.data.is_none() => item.data = fallback,
        None => {}
    }
}

/// Final filter between the pipeline and the client.
pub struct EditReconciler;

impl EditReconciler {
    /// Drop edits that overlap an earlier edit, then sort by position.
    ///
    /// Arrival order decides conflicts: the first edit touching a region wins.
    pub fn reconcile(edits: Vec<TextChange>) -> Vec<TextChange> {
        let mut accepted: Vec<TextChange> = Vec::with_capacity(edits.len());
        for edit in edits {
            if let Some(existing) = accepted.iter().find(|a| a.overlaps(&edit)) {
                if *existing == edit {
                    tracing::debug!(span = ?edit.span, "dropping duplicate edit");
                } else {
                    tracing::warn!(
                        kept = ?existing.span,
                        dropped = ?edit.span,
                        "discarding overlapping edit"
                    );
                }
                continue;
            }
            accepted.push(edit);
        }
        accepted.sort_by_key(|e| (e.span.start, e.span.end));
        accepted
    }

    /// Fold non-overlapping edits into one edit covering all of them.
    pub fn collapse(source: &str, edits: &[TextChange]) -> Option<TextChange> {
        let start = edits.iter().map(|e| e.span.start).min()?;
        let end = edits.iter().map(|e| e.span.end).max()?;
        let shifted: Vec<TextChange> = edits
            .iter()
            .map(|e| TextChange::new(e.span.start - start..e.span.end - start, e.new_text.clone()))
            .collect();
        let text = apply_changes(source.get(start..end)?, &shifted)?;
        Some(TextChange::new(start..end, text))
    }
}

/// Everything needed to resolve one completion item.
pub struct ResolveRequest<'a> {
    pub item: CompletionItem,
    /// The item as first sent to the client, found by label in the cached list.
    /// Supplies data the client dropped.
    pub original: Option<&'a CompletionItem>,
    pub list_data: Option<Value>,
    pub document: TextDocumentIdentifier,
    pub snapshot: &'a DocumentSnapshot,
    pub language: Language,
    pub options: IndentOptions,
}

/// Resolves completion items produced by a delegated service.
pub struct DelegatedCompletionResolver<'a> {
    delegate: &'a dyn DelegatedFormatter,
    formatter: &'a FormattingService,
}

impl<'a> DelegatedCompletionResolver<'a> {
    pub fn new(delegate: &'a dyn DelegatedFormatter, formatter: &'a FormattingService) -> Self {
        Self {
            delegate,
            formatter,
        }
    }

    /// Resolve an item that originated in a delegated completion list.
    ///
    /// Code items have their edits mapped to the host and formatted as snippets.
    pub async fn resolve(
        &self,
        request: ResolveRequest<'_>,
        cancel: &CancellationToken,
    ) -> FormatResult<CompletionItem> {
        let ResolveRequest {
            mut item,
            original,
            list_data,
            document,
            snapshot,
            language,
            options,
        } = request;

        if item.data.is_none() {
            item.data = original.and_then(|o| o.data.clone());
        }
        restore_item_data(&mut item, list_data);

        if cancel.is_cancelled() {
            return Err(FormatError::Cancelled);
        }
        let mut resolved = self
            .delegate
            .resolve_completion(DelegatedCompletionResolveParams {
                text_document: document,
                language,
                item,
            })
            .await?;

        if language != Language::Code {
            return Ok(resolved);
        }

        let projection = LineIndex::new(snapshot.document.code.text.clone());
        let host = &snapshot.line_index;

        if let Some(CompletionTextEdit::Edit(edit)) = resolved.text_edit.take() {
            let formatted = self
                .format_edits(snapshot, &projection, host, vec![edit], options, cancel)
                .await?;
            resolved.text_edit = formatted.into_iter().next().map(CompletionTextEdit::Edit);
            resolved.insert_text_format = Some(InsertTextFormat::SNIPPET);
        }
        if let Some(additional) = resolved.additional_text_edits.take() {
            let formatted = self
                .format_edits(snapshot, &projection, host, additional, options, cancel)
                .await?;
            resolved.additional_text_edits = Some(formatted);
        }
        Ok(resolved)
    }

    async fn format_edits(
        &self,
        snapshot: &DocumentSnapshot,
        projection: &LineIndex,
        host: &LineIndex,
        edits: Vec<TextEdit>,
        options: IndentOptions,
        cancel: &CancellationToken,
    ) -> FormatResult<Vec<TextEdit>> {
        let draft: Vec<TextChange> = edits
            .iter()
            .filter_map(|edit| projection.edit_to_change(edit))
            .collect();
        let changes = self
            .formatter
            .format_snippet(snapshot.document.clone(), options, draft, cancel)
            .await?;
        Ok(changes.iter().map(|c| host.change_to_edit(c)).collect())
    }
}

//! Completion delegated to the code and markup services in the client.
//!
//! Items come back in projection coordinates. Their edits are mapped to the host
//! and their data is wrapped with the origin of the list so a later
//! `completionItem/resolve` can find the document again.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{
    CompletionContext, CompletionItem, CompletionList, CompletionTextEdit, InsertReplaceEdit,
    Position, TextDocumentIdentifier, TextEdit, Url,
};

use crate::delegation::{DelegatedCompletionList, DelegatedCompletionParams, DelegatedFormatter};
use crate::document::{DocumentSnapshot, Language, LineIndex, PositionMapper, TextChange};
use crate::error::{FormatError, FormatResult};
use crate::reconcile::{merge_data, split_merged_data};

/// Where a completion list came from. Serialized as the first piece of each item's
/// merged data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionOrigin {
    pub uri: Url,
    pub language: Language,
}

impl CompletionOrigin {
    /// Recover the origin from an item's merged data.
    pub fn from_item(item: &CompletionItem) -> Option<Self> {
        let pieces = split_merged_data(item.data.as_ref()?)?;
        serde_json::from_value(pieces.into_iter().next()?).ok()
    }
}

/// The most recent list sent to the client.
#[derive(Debug, Clone)]
pub struct CachedList {
    pub origin: CompletionOrigin,
    pub items: Vec<CompletionItem>,
    /// List-level data from the delegated service.
    pub data: Option<Value>,
}

impl CachedList {
    pub fn find(&self, label: &str) -> Option<&CompletionItem> {
        self.items.iter().find(|item| item.label == label)
    }
}

/// Keeps the last completion list for resolving items the client stripped.
#[derive(Debug, Default)]
pub struct CompletionCache {
    last: ArcSwapOption<CachedList>,
}

impl CompletionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, list: CachedList) {
        self.last.store(Some(Arc::new(list)));
    }

    pub fn last(&self) -> Option<Arc<CachedList>> {
        self.last.load_full()
    }
}

/// Maps projection edits of one language to host edits.
struct EditMapper<'a> {
    projection: &'a LineIndex,
    host: &'a LineIndex,
    mapper: PositionMapper<'a>,
    language: Language,
}

impl EditMapper<'_> {
    fn span(&self, range: tower_lsp::lsp_types::Range) -> Option<tower_lsp::lsp_types::Range> {
        let projected = self.projection.range_to_span(range)?;
        let host = self.mapper.range_to_host(&projected, self.language)?;
        Some(self.host.span_to_range(&host))
    }

    fn edit(&self, edit: &TextEdit) -> Option<TextEdit> {
        let change = self.projection.edit_to_change(edit)?;
        let span = self.mapper.range_to_host(&change.span, self.language)?;
        Some(self.host.change_to_edit(&TextChange::new(span, change.new_text)))
    }

    fn completion_edit(&self, edit: &CompletionTextEdit) -> Option<CompletionTextEdit> {
        match edit {
            CompletionTextEdit::Edit(edit) => self.edit(edit).map(CompletionTextEdit::Edit),
            CompletionTextEdit::InsertAndReplace(edit) => {
                Some(CompletionTextEdit::InsertAndReplace(InsertReplaceEdit {
                    new_text: edit.new_text.clone(),
                    insert: self.span(edit.insert)?,
                    replace: self.span(edit.replace)?,
                }))
            }
        }
    }

    /// Map an item's edits and tag its data. Items whose main edit does not map
    /// are dropped.
    fn item(&self, mut item: CompletionItem, origin: &Value) -> Option<CompletionItem> {
        if let Some(edit) = item.text_edit.take() {
            match self.completion_edit(&edit) {
                Some(mapped) => item.text_edit = Some(mapped),
                None => {
                    tracing::debug!(label = %item.label, "dropping completion with unmappable edit");
                    return None;
                }
            }
        }
        if let Some(additional) = item.additional_text_edits.take() {
            item.additional_text_edits =
                Some(additional.iter().filter_map(|e| self.edit(e)).collect());
        }
        // Always merged, so the origin survives even when the service sent no data.
        let data = item.data.take().unwrap_or(Value::Null);
        item.data = merge_data(Some(origin.clone()), Some(data));
        Some(item)
    }
}

/// Request completions at `position` from the service owning that position.
pub async fn delegated_completion(
    delegate: &dyn DelegatedFormatter,
    cache: &CompletionCache,
    snapshot: &DocumentSnapshot,
    document: &TextDocumentIdentifier,
    position: Position,
    context: Option<CompletionContext>,
    cancel: &CancellationToken,
) -> FormatResult<Option<CompletionList>> {
    let Some(offset) = snapshot.line_index.position_to_offset(position) else {
        return Ok(None);
    };
    let mapper = snapshot.document.mapper();
    let Some(mapped) = mapper.to_generated(offset) else {
        tracing::debug!(offset, "completion requested outside code and markup");
        return Ok(None);
    };
    let Some(projection) = mapper.projection(mapped.language) else {
        return Ok(None);
    };
    let projection_index = LineIndex::new(projection.text.clone());

    if cancel.is_cancelled() {
        return Err(FormatError::Cancelled);
    }
    let delegated = delegate
        .completion(DelegatedCompletionParams {
            text_document: document.clone(),
            version: snapshot.version,
            language: mapped.language,
            projected_position: projection_index.offset_to_position(mapped.projected_offset),
            context,
        })
        .await?;
    let Some(DelegatedCompletionList {
        is_incomplete,
        items,
        data,
    }) = delegated
    else {
        return Ok(None);
    };

    let origin = CompletionOrigin {
        uri: document.uri.clone(),
        language: mapped.language,
    };
    let origin_value = serde_json::to_value(&origin).unwrap_or(Value::Null);
    let edits = EditMapper {
        projection: &projection_index,
        host: &snapshot.line_index,
        mapper,
        language: mapped.language,
    };
    let items: Vec<CompletionItem> = items
        .into_iter()
        .filter_map(|item| edits.item(item, &origin_value))
        .collect();

    tracing::debug!(
        language = %mapped.language,
        items = items.len(),
        "delegated completion"
    );
    cache.store(CachedList {
        origin,
        items: items.clone(),
        data,
    });
    Ok(Some(CompletionList {
        is_incomplete,
        items,
    }))
}

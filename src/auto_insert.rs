//! Auto-insert: companion text inserted right after a trigger character.
//!
//! In-process providers handle template-level constructs first. Anything they leave
//! is routed to the markup or code service in the client. Code inserts come back
//! raw and are run through the formatting pipeline; markup inserts are used as is.

use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{FormattingOptions, InsertTextFormat, TextDocumentIdentifier};

use crate::delegation::{DelegatedEdit, DelegatedFormatter, DelegatedOnAutoInsertParams};
use crate::document::{DocumentSnapshot, Language, LineIndex, TextChange};
use crate::error::{FormatError, FormatResult};
use crate::formatting::{FormattingService, IndentOptions};
use crate::reconcile::EditReconciler;
use crate::settings::LanguageOptions;
use crate::template::CodeDocument;
use crate::trigger::{Routing, TriggerRequest, TriggerRouter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditFormat {
    Plain,
    /// Contains `$0`-style placeholders.
    Snippet,
}

impl From<InsertTextFormat> for EditFormat {
    fn from(format: InsertTextFormat) -> Self {
        if format == InsertTextFormat::SNIPPET {
            EditFormat::Snippet
        } else {
            EditFormat::Plain
        }
    }
}

impl From<EditFormat> for InsertTextFormat {
    fn from(format: EditFormat) -> Self {
        match format {
            EditFormat::Plain => InsertTextFormat::PLAIN_TEXT,
            EditFormat::Snippet => InsertTextFormat::SNIPPET,
        }
    }
}

/// A single host edit to apply after the trigger character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoInsertResponse {
    pub edit: TextChange,
    pub format: EditFormat,
}

/// Auto-insert behavior implemented without the client, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoInsertProvider {
    /// `>` ending a start tag inserts the matching end tag.
    AutoClosingTag,
    /// `*` right after `@` closes the comment.
    CloseComment,
}

impl AutoInsertProvider {
    pub const ALL: [AutoInsertProvider; 2] = [
        AutoInsertProvider::AutoClosingTag,
        AutoInsertProvider::CloseComment,
    ];

    pub fn trigger(self) -> char {
        match self {
            AutoInsertProvider::AutoClosingTag => '>',
            AutoInsertProvider::CloseComment => '*',
        }
    }

    /// The edit for a trigger typed just before `offset`, if this provider applies.
    pub fn try_insert(self, document: &CodeDocument, offset: usize) -> Option<AutoInsertResponse> {
        let source = document.source.as_str();
        let at = offset.checked_sub(1)?;
        if source.as_bytes().get(at) != Some(&(self.trigger() as u8)) {
            return None;
        }
        match self {
            AutoInsertProvider::AutoClosingTag => close_tag(document, at),
            AutoInsertProvider::CloseComment => {
                let after_transition = at > 0 && source.as_bytes()[at - 1] == b'@';
                let unterminated = document.diagnostics.iter().any(|d| {
                    d.id == "TMPL1003" && d.span.start + 1 == at
                });
                (after_transition && unterminated).then(|| AutoInsertResponse {
                    edit: TextChange::insert(offset, " $0 *@"),
                    format: EditFormat::Snippet,
                })
            }
        }
    }
}

/// The end tag for the start tag closed by the `>` at `gt`, if that element has none.
fn close_tag(document: &CodeDocument, gt: usize) -> Option<AutoInsertResponse> {
    let span = document.spans.classify(gt, false)?;
    if span.language != Language::Markup {
        return None;
    }
    let source = document.source.as_str();
    let open = source[..gt].rfind('<')?;
    let name_start = open + 1;
    let name_len = source[name_start..gt]
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(gt - name_start);
    if name_len == 0 || source[..gt].ends_with('/') {
        return None;
    }
    let name_span = name_start..name_start + name_len;

    // Void and already closed elements never carry this diagnostic.
    let missing_end = document
        .diagnostics
        .iter()
        .any(|d| d.id == "TMPL2001" && d.span == name_span);
    missing_end.then(|| AutoInsertResponse {
        edit: TextChange::insert(gt + 1, format!("$0</{}>", &source[name_span])),
        format: EditFormat::Snippet,
    })
}

/// One auto-insert request.
#[derive(Debug, Clone, Copy)]
pub struct AutoInsertRequest<'a> {
    pub document: &'a TextDocumentIdentifier,
    pub snapshot: &'a DocumentSnapshot,
    /// Host offset of the cursor, just after the trigger character.
    pub offset: usize,
    pub character: char,
    pub options: &'a LanguageOptions,
}

/// Runs providers, routing and delegation for auto-insert requests.
pub struct AutoInsertService<'a> {
    delegate: &'a dyn DelegatedFormatter,
    formatter: &'a FormattingService,
}

impl<'a> AutoInsertService<'a> {
    pub fn new(delegate: &'a dyn DelegatedFormatter, formatter: &'a FormattingService) -> Self {
        Self {
            delegate,
            formatter,
        }
    }

    pub async fn on_auto_insert(
        &self,
        request: AutoInsertRequest<'_>,
        cancel: &CancellationToken,
    ) -> FormatResult<Option<AutoInsertResponse>> {
        let document = &request.snapshot.document;

        for provider in AutoInsertProvider::ALL {
            if provider.trigger() != request.character {
                continue;
            }
            if let Some(response) = provider.try_insert(document, request.offset) {
                tracing::debug!(?provider, "auto-insert handled in process");
                return Ok(Some(response));
            }
        }

        let Some(trigger) = TriggerRequest::at(document, request.offset, request.character) else {
            return Ok(None);
        };
        let language = match TriggerRouter::auto_insert().route(&trigger, request.options) {
            Routing::Routed(language) => language,
            Routing::Rejected(reason) => {
                tracing::debug!(%reason, "auto-insert not routed");
                return Ok(None);
            }
        };

        let mapper = document.mapper();
        let projected_offset = match language {
            Language::Code => match mapper.to_generated(request.offset) {
                Some(mapped) if mapped.language == Language::Code => mapped.projected_offset,
                _ => return Ok(None),
            },
            // Markup offsets are preserved by the markup projection.
            _ => document
                .markup
                .to_generated(request.offset)
                .unwrap_or(request.offset),
        };
        let Some(projection) = mapper.projection(language) else {
            return Ok(None);
        };
        let projection_index = LineIndex::new(projection.text.clone());

        if cancel.is_cancelled() {
            return Err(FormatError::Cancelled);
        }
        let delegated = self
            .delegate
            .on_auto_insert(DelegatedOnAutoInsertParams {
                text_document: request.document.clone(),
                version: request.snapshot.version,
                language,
                projected_position: projection_index.offset_to_position(projected_offset),
                character: request.character.to_string(),
                options: FormattingOptions {
                    tab_size: request.options.tab_size,
                    insert_spaces: request.options.insert_spaces,
                    ..Default::default()
                },
            })
            .await?;
        let Some(DelegatedEdit { edit, format }) = delegated else {
            return Ok(None);
        };
        let Some(projected) = projection_index.edit_to_change(&edit) else {
            tracing::debug!(?edit, "delegated edit lies outside the projection");
            return Ok(None);
        };
        let format = EditFormat::from(format);

        let host_edits = match language {
            Language::Markup => match projection.range_to_host(&projected.span) {
                Some(span) => vec![TextChange::new(span, projected.new_text)],
                None => return Ok(None),
            },
            _ => {
                let options = IndentOptions::from(request.options);
                let draft = vec![projected];
                match format {
                    EditFormat::Snippet => {
                        self.formatter
                            .format_snippet(document.clone(), options, draft, cancel)
                            .await?
                    }
                    EditFormat::Plain => {
                        self.formatter
                            .format_on_type(
                                document.clone(),
                                options,
                                request.offset,
                                request.character,
                                Language::Code,
                                draft,
                                cancel,
                            )
                            .await?
                    }
                }
            }
        };

        Ok(into_response(document.source.as_str(), &host_edits, format))
    }
}

/// The client takes a single edit, so several host edits are folded into one
/// covering all of them.
fn into_response(source: &str, edits: &[TextChange], format: EditFormat) -> Option<AutoInsertResponse> {
    if edits.len() > 1 {
        tracing::debug!(edits = edits.len(), "folding auto-insert edits into one");
    }
    EditReconciler::collapse(source, edits).map(|edit| AutoInsertResponse { edit, format })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::ScanningEngine;

    fn scan(source: &str) -> CodeDocument {
        ScanningEngine.scan(source.to_string())
    }

    #[test]
    fn closes_open_element() {
        let source = "<div>";
        let response = AutoInsertProvider::AutoClosingTag
            .try_insert(&scan(source), source.len())
            .unwrap();
        assert_eq!(response.edit, TextChange::insert(5, "$0</div>"));
        assert_eq!(response.format, EditFormat::Snippet);
    }

    #[test]
    fn leaves_void_and_closed_elements() {
        let provider = AutoInsertProvider::AutoClosingTag;
        assert_eq!(provider.try_insert(&scan("<br>"), 4), None);
        assert_eq!(provider.try_insert(&scan("<p></p>"), 3), None);
        assert_eq!(provider.try_insert(&scan("<p/>"), 4), None);
    }

    #[test]
    fn several_code_edits_become_one_equivalent_edit() {
        let source = "@code {\n  ///\n  void M() { }\n}";
        let edits = vec![
            TextChange::insert(13, " <summary>\n    /// $0\n    /// </summary>"),
            TextChange::new(14..16, "    "),
        ];
        let response = into_response(source, &edits, EditFormat::Snippet).unwrap();
        assert_eq!(response.edit.span, 13..16);
        assert_eq!(response.format, EditFormat::Snippet);
        assert_eq!(
            crate::document::apply_changes(source, std::slice::from_ref(&response.edit)),
            crate::document::apply_changes(source, &edits)
        );
        assert_eq!(into_response(source, &[], EditFormat::Plain), None);
    }

    #[test]
    fn closes_comment_after_transition() {
        let provider = AutoInsertProvider::CloseComment;
        assert_eq!(
            provider.try_insert(&scan("@*"), 2).map(|r| r.edit),
            Some(TextChange::insert(2, " $0 *@"))
        );
        assert_eq!(provider.try_insert(&scan("a *"), 3), None);
    }
}

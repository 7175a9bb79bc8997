use std::path::PathBuf;
use std::sync::Mutex;

use expect_test::expect;
use serde_json::json;
use tmplsp::auto_insert::{AutoInsertRequest, AutoInsertService, EditFormat};
use tmplsp::delegation::{
    DelegatedCompletionList, DelegatedCompletionParams, DelegatedCompletionResolveParams,
    DelegatedEdit, DelegatedFormatter, DelegatedOnAutoInsertParams,
};
use tmplsp::document::{apply_changes, Language};
use tmplsp::formatting::{FormattingService, IndentOptions, ValidationMode};
use tmplsp::reconcile::{merge_data, DelegatedCompletionResolver, EditReconciler, ResolveRequest};
use tmplsp::template::{ScanningEngine, TemplateEngine};
use tmplsp::trigger::{RejectReason, Routing, TriggerMode, TriggerRequest, TriggerRouter};
use tmplsp::{
    load_settings, DocumentSnapshot, FormatError, FormatResult, LanguageOptions, LineIndex,
    TextChange,
};
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionTextEdit, FormattingOptions, InsertTextFormat,
    TextDocumentIdentifier, TextEdit,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Render edits one per line as `<start_line>:<start_col>-<end_line>:<end_col> <text>`.
fn format_edits(source: &str, changes: &[TextChange]) -> String {
    if changes.is_empty() {
        return "OK (no edits)".to_string();
    }
    let line_index = LineIndex::new(source.to_string());
    changes
        .iter()
        .map(|change| format_text_edit(&line_index.change_to_edit(change)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_text_edit(edit: &TextEdit) -> String {
    format!(
        "{}:{}-{}:{} {:?}",
        edit.range.start.line,
        edit.range.start.character,
        edit.range.end.line,
        edit.range.end.character,
        edit.new_text,
    )
}

fn snapshot(source: &str) -> DocumentSnapshot {
    DocumentSnapshot::new(ScanningEngine.scan(source.to_string()), 1)
}

fn service(mode: ValidationMode) -> FormattingService {
    FormattingService::new(ScanningEngine::shared(), mode)
}

fn document_id() -> TextDocumentIdentifier {
    TextDocumentIdentifier::new("file:///Index.tmpl".parse().unwrap())
}

/// Route an on-type trigger and run it through the pipeline, like the server does.
async fn on_type(source: &str, offset: usize, trigger: char, options: LanguageOptions) -> String {
    let snapshot = snapshot(source);
    let request = TriggerRequest::at(&snapshot.document, offset, trigger).unwrap();
    let language = match TriggerRouter::on_type().route(&request, &options) {
        Routing::Routed(language) => language,
        Routing::Rejected(reason) => return format!("rejected: {reason}"),
    };
    let edits = service(ValidationMode::Strict)
        .format_on_type(
            snapshot.document.clone(),
            IndentOptions::from(&options),
            offset,
            trigger,
            language,
            Vec::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    format_edits(source, &edits)
}

async fn format_document(source: &str) -> String {
    let edits = service(ValidationMode::Strict)
        .format_document(
            snapshot(source).document,
            IndentOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    apply_changes(source, &edits).unwrap()
}

/// Delegate standing in for the client's language services.
#[derive(Default)]
struct FakeDelegate {
    auto_insert: Option<DelegatedEdit>,
    resolved_edit: Option<TextEdit>,
    auto_insert_calls: Mutex<Vec<DelegatedOnAutoInsertParams>>,
    resolve_calls: Mutex<Vec<DelegatedCompletionResolveParams>>,
}

#[tower_lsp::async_trait]
impl DelegatedFormatter for FakeDelegate {
    async fn on_auto_insert(
        &self,
        params: DelegatedOnAutoInsertParams,
    ) -> FormatResult<Option<DelegatedEdit>> {
        let position = params.projected_position;
        self.auto_insert_calls.lock().unwrap().push(params);
        Ok(self.auto_insert.clone().map(|mut delegated| {
            // Answer at the requested position.
            delegated.edit.range.start = position;
            delegated.edit.range.end = position;
            delegated
        }))
    }

    async fn completion(
        &self,
        _params: DelegatedCompletionParams,
    ) -> FormatResult<Option<DelegatedCompletionList>> {
        Ok(None)
    }

    async fn resolve_completion(
        &self,
        params: DelegatedCompletionResolveParams,
    ) -> FormatResult<CompletionItem> {
        let mut item = params.item.clone();
        self.resolve_calls.lock().unwrap().push(params);
        item.text_edit = self.resolved_edit.clone().map(CompletionTextEdit::Edit);
        Ok(item)
    }

    async fn formatting_options(
        &self,
        _document: TextDocumentIdentifier,
    ) -> FormatResult<Option<FormattingOptions>> {
        Ok(None)
    }
}

async fn auto_insert(
    delegate: &FakeDelegate,
    source: &str,
    offset: usize,
    character: char,
    options: LanguageOptions,
) -> Option<(String, EditFormat)> {
    let snapshot = snapshot(source);
    let formatter = service(ValidationMode::Strict);
    let document = document_id();
    let response = AutoInsertService::new(delegate, &formatter)
        .on_auto_insert(
            AutoInsertRequest {
                document: &document,
                snapshot: &snapshot,
                offset,
                character,
                options: &options,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap()?;
    Some((
        format_edits(source, std::slice::from_ref(&response.edit)),
        response.format,
    ))
}

// ---------------------------------------------------------------------------
// On-type formatting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_code_block_closing_brace() {
    let expected = expect![[r#"0:7-0:7 "\n""#]];
    expected.assert_eq(&on_type("@code {}", 8, '}', LanguageOptions::default()).await);
}

#[tokio::test]
async fn empty_code_block_closing_brace_with_format_on_type_off() {
    let options = LanguageOptions {
        format_on_type: false,
        ..LanguageOptions::default()
    };
    let expected = expect![[r#"rejected: disabled by configuration"#]];
    expected.assert_eq(&on_type("@code {}", 8, '}', options).await);
}

#[tokio::test]
async fn closing_brace_already_on_its_own_line() {
    let expected = expect![[r#"OK (no edits)"#]];
    expected.assert_eq(&on_type("@code {\n}", 9, '}', LanguageOptions::default()).await);
}

#[tokio::test]
async fn semicolon_reindents_statement() {
    let source = "@code {\n  int x;\n}";
    let expected = expect![[r#"1:0-1:2 "    ""#]];
    expected.assert_eq(&on_type(source, 16, ';', LanguageOptions::default()).await);
}

#[tokio::test]
async fn markup_newline_uses_two_space_tabs() {
    let source = "<ul>\n    <li>a</li>\n";
    let options = LanguageOptions {
        tab_size: 2,
        ..LanguageOptions::default()
    };
    let expected = expect![[r#"2:0-2:0 "  ""#]];
    expected.assert_eq(&on_type(source, source.len(), '\n', options).await);
}

// ---------------------------------------------------------------------------
// Document formatting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn formats_nested_markup_and_code() {
    let source = "<div>\n<ul>\n@foreach (var item in items) {\n<li>@item</li>\n}\n</ul>\n</div>";
    let expected = expect![[r#"
        <div>
            <ul>
                @foreach (var item in items) {
                    <li>@item</li>
                }
            </ul>
        </div>"#]];
    expected.assert_eq(&format_document(source).await);
}

#[tokio::test]
async fn formatting_is_idempotent() {
    let sources = [
        "<div>\n<p>a</p>\n</div>",
        "@code {\nvoid M()\n{\nint x;\n}\n}",
        "@if (a) {\n<b>x</b>\n} else {\n<i>y</i>\n}",
        "<Counter Value=\"@count\" />\n<p>\n@(1 + 2)\n</p>",
    ];
    for source in sources {
        let once = format_document(source).await;
        let twice = format_document(&once).await;
        assert_eq!(once, twice, "formatting {source:?} is not idempotent");
    }
}

#[tokio::test]
async fn formatting_keeps_comments() {
    let source = "@* keep\n      this *@\n<p>\nx\n</p>";
    let expected = expect![[r#"
        @* keep
              this *@
        <p>
            x
        </p>"#]];
    expected.assert_eq(&format_document(source).await);
}

// ---------------------------------------------------------------------------
// Diagnostic preservation
// ---------------------------------------------------------------------------

const BLOCK: &str = "@code {\n    int x;\n}\n";

/// A code edit deleting the line that holds the closing brace.
fn destructive_draft() -> Vec<TextChange> {
    let document = ScanningEngine.scan(BLOCK.to_string());
    let start = document.code.to_generated(BLOCK.find(";\n").unwrap() + 1).unwrap();
    let end = document.code.to_generated(BLOCK.rfind('}').unwrap() + 1).unwrap();
    vec![TextChange::new(start..end, "")]
}

#[tokio::test]
async fn destructive_edit_is_discarded() {
    let edits = service(ValidationMode::Permissive)
        .format_snippet(
            snapshot(BLOCK).document,
            IndentOptions::default(),
            destructive_draft(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let expected = expect![[r#"OK (no edits)"#]];
    expected.assert_eq(&format_edits(BLOCK, &edits));
}

#[tokio::test]
async fn destructive_edit_fails_in_strict_mode() {
    let result = service(ValidationMode::Strict)
        .format_snippet(
            snapshot(BLOCK).document,
            IndentOptions::default(),
            destructive_draft(),
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(FormatError::InvariantViolation { .. })));
}

#[tokio::test]
async fn accepted_edits_preserve_diagnostics() {
    // The unclosed <p> stays unclosed after formatting.
    let source = "<div>\n<p>\n</div>";
    let snapshot = snapshot(source);
    let edits = service(ValidationMode::Strict)
        .format_document(
            snapshot.document.clone(),
            IndentOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let formatted = ScanningEngine
        .process(apply_changes(source, &edits).unwrap())
        .await
        .unwrap();
    let ids = |diagnostics: &[tmplsp::template::TemplateDiagnostic]| {
        let mut ids: Vec<_> = diagnostics.iter().map(|d| d.key()).collect();
        ids.sort();
        ids
    };
    assert_eq!(ids(&snapshot.document.diagnostics), ids(&formatted.diagnostics));
}

// ---------------------------------------------------------------------------
// Auto-insert
// ---------------------------------------------------------------------------

fn quote_insert() -> FakeDelegate {
    FakeDelegate {
        auto_insert: Some(DelegatedEdit {
            edit: TextEdit::new(Default::default(), "\"$0\"".to_string()),
            format: InsertTextFormat::SNIPPET,
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn attribute_value_equals_is_quoted_by_markup() {
    let source = "<Counter Value=";
    let delegate = quote_insert();
    let (edit, format) = auto_insert(&delegate, source, source.len(), '=', LanguageOptions::default())
        .await
        .unwrap();

    let expected = expect![[r#"0:15-0:15 "\"$0\"""#]];
    expected.assert_eq(&edit);
    assert_eq!(format, EditFormat::Snippet);

    let calls = delegate.auto_insert_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].language, Language::Markup);
    assert_eq!(calls[0].character, "=");
}

#[tokio::test]
async fn attribute_value_equals_with_quotes_disabled() {
    let source = "<Counter Value=";
    let delegate = quote_insert();
    let options = LanguageOptions {
        auto_insert_attribute_quotes: false,
        ..LanguageOptions::default()
    };
    assert_eq!(
        auto_insert(&delegate, source, source.len(), '=', options).await,
        None
    );
    assert!(delegate.auto_insert_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn code_auto_insert_is_formatted() {
    let source = "@code {\n    ///\n    void M() { }\n}";
    let delegate = FakeDelegate {
        auto_insert: Some(DelegatedEdit {
            edit: TextEdit::new(
                Default::default(),
                " <summary>\n/// $0\n/// </summary>".to_string(),
            ),
            format: InsertTextFormat::SNIPPET,
        }),
        ..Default::default()
    };
    let offset = source.find("///").unwrap() + 3;
    let (edit, format) = auto_insert(&delegate, source, offset, '/', LanguageOptions::default())
        .await
        .unwrap();

    let expected = expect![[r#"1:7-1:7 " <summary>\n    /// $0\n    /// </summary>""#]];
    expected.assert_eq(&edit);
    assert_eq!(format, EditFormat::Snippet);
    assert_eq!(
        delegate.auto_insert_calls.lock().unwrap()[0].language,
        Language::Code
    );
}

#[tokio::test]
async fn closing_tag_is_inserted_without_the_client() {
    let delegate = FakeDelegate::default();
    let (edit, format) = auto_insert(&delegate, "<section>", 9, '>', LanguageOptions::default())
        .await
        .unwrap();
    let expected = expect![[r#"0:9-0:9 "$0</section>""#]];
    expected.assert_eq(&edit);
    assert_eq!(format, EditFormat::Snippet);
    assert!(delegate.auto_insert_calls.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Completion resolve
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resolved_code_completion_is_formatted_and_data_restored() {
    let source = "@code {\n    x\n}";
    let snapshot = snapshot(source);
    let document = &snapshot.document;

    let x = source.find('x').unwrap();
    let projection = LineIndex::new(document.code.text.clone());
    let generated = document.mapper().to_generated(x).unwrap().projected_offset;
    let delegate = FakeDelegate {
        resolved_edit: Some(TextEdit::new(
            projection.span_to_range(&(generated..generated + 1)),
            "Foo()\n{\n}".to_string(),
        )),
        ..Default::default()
    };
    let formatter = service(ValidationMode::Strict);

    let item = CompletionItem {
        label: "Foo".to_string(),
        data: merge_data(Some(json!({"uri": "file:///Index.tmpl"})), Some(json!("theirs"))),
        ..Default::default()
    };
    let resolved = DelegatedCompletionResolver::new(&delegate, &formatter)
        .resolve(
            ResolveRequest {
                item,
                original: None,
                list_data: None,
                document: document_id(),
                snapshot: &snapshot,
                language: Language::Code,
                options: IndentOptions::default(),
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        delegate.resolve_calls.lock().unwrap()[0].item.data,
        Some(json!("theirs"))
    );
    let Some(CompletionTextEdit::Edit(edit)) = resolved.text_edit else {
        panic!("expected a plain text edit");
    };
    let expected = expect![[r#"1:4-1:5 "Foo()\n    {\n    }""#]];
    expected.assert_eq(&format_text_edit(&edit));
    assert_eq!(resolved.insert_text_format, Some(InsertTextFormat::SNIPPET));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

const SAMPLES: &[&str] = &[
    "",
    "@code {}",
    "<p>@name</p>\n<b>x</b> @y",
    "@* c *@<div class=\"a\">@(1 + 2)</div>",
    "@if (a) {\n<b>x</b>\n} else {\n<i>@y</i>\n}",
    "<Counter Value=\"@count\" Other=x Empty= />",
    "mail me at a@b.c or @@ here",
    "@functions {\n    int Count() { return 1; }\n}",
    "<div\n@code {",
];

#[test]
fn spans_cover_every_document() {
    for source in SAMPLES {
        let document = ScanningEngine.scan(source.to_string());
        assert!(document.spans.is_well_formed(), "{source:?}");
        for pair in document.spans.spans().windows(2) {
            assert!(pair[0].end <= pair[1].start, "{source:?}: {pair:?}");
        }
    }
}

#[test]
fn mapping_round_trips() {
    for source in SAMPLES {
        let document = ScanningEngine.scan(source.to_string());
        let mapper = document.mapper();
        for offset in 0..=source.len() {
            if let Some(mapped) = mapper.to_generated(offset) {
                assert_eq!(
                    mapper.to_host(mapped.projected_offset, mapped.language),
                    Some(offset),
                    "{source:?} at {offset}"
                );
            }
        }
    }
}

#[test]
fn markers_win_boundary_ties() {
    let document = ScanningEngine.scan("@code {}".to_string());
    let left = document.spans.classify(7, false).unwrap();
    assert!(left.is_marker());
    let right = document.spans.classify(7, true).unwrap();
    assert_eq!((right.start, right.end), (6, 7));
}

#[test]
fn foreign_trigger_characters_are_always_rejected() {
    let all_off = LanguageOptions {
        formatting_enabled: false,
        format_on_type: false,
        auto_insert_attribute_quotes: false,
        ..LanguageOptions::default()
    };
    for mode in [TriggerMode::OnType, TriggerMode::AutoInsert] {
        for language in [Language::Code, Language::Markup] {
            for character in (0u8..128).map(char::from) {
                if mode.allow_list(language).contains(&character) {
                    continue;
                }
                let request = TriggerRequest {
                    offset: 0,
                    character,
                    language_at_offset: language,
                    in_attribute_value: false,
                };
                for options in [LanguageOptions::default(), all_off] {
                    assert_eq!(
                        TriggerRouter::new(mode).route(&request, &options),
                        Routing::Rejected(RejectReason::NotInAllowList)
                    );
                }
            }
        }
    }
}

#[test]
fn reconciled_edits_never_share_a_position() {
    let edits = EditReconciler::reconcile(vec![
        TextChange::new(0..4, "a"),
        TextChange::new(2..6, "b"),
        TextChange::insert(4, "c"),
        TextChange::insert(4, "d"),
        TextChange::new(8..9, "e"),
    ]);
    for (i, a) in edits.iter().enumerate() {
        for b in &edits[i + 1..] {
            assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
        }
    }
    assert_eq!(
        edits,
        vec![
            TextChange::new(0..4, "a"),
            TextChange::insert(4, "c"),
            TextChange::new(8..9, "e"),
        ]
    );
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[test]
fn fixture_settings_resolve_options() {
    let fixture = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/two_space");
    let options = load_settings(&fixture.join("settings.toml")).options();
    assert_eq!(
        options,
        LanguageOptions {
            formatting_enabled: true,
            format_on_type: false,
            auto_insert_attribute_quotes: true,
            tab_size: 2,
            insert_spaces: true,
        }
    );
}

//! Per-request formatting context.

use std::sync::{Arc, OnceLock};

use crate::document::{ClassifiedSpan, Language, LineIndex, StructuralKind};
use crate::error::{FormatError, FormatResult};
use crate::settings::LanguageOptions;
use crate::template::{CodeDocument, TemplateEngine};

/// Indentation preferences for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndentOptions {
    pub tab_size: u32,
    pub insert_spaces: bool,
}

impl Default for IndentOptions {
    fn default() -> Self {
        Self {
            tab_size: 4,
            insert_spaces: true,
        }
    }
}

impl From<&LanguageOptions> for IndentOptions {
    fn from(options: &LanguageOptions) -> Self {
        Self {
            tab_size: options.tab_size,
            insert_spaces: options.insert_spaces,
        }
    }
}

/// What kind of request a context was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormattingKind {
    Document,
    /// `offset` is the cursor offset after the trigger character was typed.
    OnType {
        offset: usize,
        trigger: char,
    },
    /// Formatting of edits produced elsewhere, such as completion snippets.
    Snippet,
}

/// How invariant violations found during formatting are surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Violations are returned as errors. For tests and debugging.
    Strict,
    /// Violations are logged and the result degrades to no edits.
    #[default]
    Permissive,
}

/// Indentation facts for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndentationEntry {
    pub line: usize,
    pub owning_span: ClassifiedSpan,
    pub structural_level: usize,
    /// Level change relative to the previous line.
    pub relative_level_delta: isize,
    /// Bytes of leading whitespace.
    pub existing_indent_width: usize,
    /// Columns of leading whitespace, with tabs expanded to the next tab stop.
    pub existing_indent_columns: usize,
    pub is_blank: bool,
}

/// Immutable snapshot a formatting request operates on.
///
/// A context never changes after construction. [`FormattingContext::with_text`]
/// produces a sibling for a hypothetical edit.
#[derive(Debug)]
pub struct FormattingContext {
    document: Arc<CodeDocument>,
    line_index: LineIndex,
    indentations: OnceLock<Vec<IndentationEntry>>,
    options: IndentOptions,
    kind: FormattingKind,
    engine: Arc<dyn TemplateEngine>,
    mode: ValidationMode,
}

impl FormattingContext {
    pub fn new(
        document: Arc<CodeDocument>,
        options: IndentOptions,
        kind: FormattingKind,
        engine: Arc<dyn TemplateEngine>,
        mode: ValidationMode,
    ) -> Self {
        let line_index = LineIndex::new(document.source.clone());
        Self {
            document,
            line_index,
            indentations: OnceLock::new(),
            options,
            kind,
            engine,
            mode,
        }
    }

    pub fn for_document(
        document: Arc<CodeDocument>,
        options: IndentOptions,
        engine: Arc<dyn TemplateEngine>,
        mode: ValidationMode,
    ) -> Self {
        Self::new(document, options, FormattingKind::Document, engine, mode)
    }

    pub fn for_on_type(
        document: Arc<CodeDocument>,
        options: IndentOptions,
        offset: usize,
        trigger: char,
        engine: Arc<dyn TemplateEngine>,
        mode: ValidationMode,
    ) -> FormatResult<Self> {
        if offset > document.source.len() {
            return Err(FormatError::precondition(format!(
                "trigger offset {offset} is past the end of a {}-byte document",
                document.source.len()
            )));
        }
        Ok(Self::new(
            document,
            options,
            FormattingKind::OnType { offset, trigger },
            engine,
            mode,
        ))
    }

    pub fn for_snippet(
        document: Arc<CodeDocument>,
        options: IndentOptions,
        engine: Arc<dyn TemplateEngine>,
        mode: ValidationMode,
    ) -> Self {
        Self::new(document, options, FormattingKind::Snippet, engine, mode)
    }

    pub fn document(&self) -> &Arc<CodeDocument> {
        &self.document
    }

    pub fn source(&self) -> &str {
        &self.document.source
    }

    pub fn line_index(&self) -> &LineIndex {
        &self.line_index
    }

    pub fn options(&self) -> IndentOptions {
        self.options
    }

    pub fn kind(&self) -> FormattingKind {
        self.kind
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    pub fn indentation_level_at(&self, offset: usize) -> Option<usize> {
        self.document.spans.indentation_level_at(offset)
    }

    pub fn indentation_offset_for_level(&self, level: usize) -> usize {
        level * self.options.tab_size as usize
    }

    /// Leading whitespace for a structural level.
    pub fn indentation_string(&self, level: usize) -> String {
        if self.options.insert_spaces {
            " ".repeat(self.indentation_offset_for_level(level))
        } else {
            "\t".repeat(level)
        }
    }

    /// Per-line indentation table, computed on first use.
    pub fn indentations(&self) -> &[IndentationEntry] {
        self.indentations.get_or_init(|| self.compute_indentations())
    }

    fn compute_indentations(&self) -> Vec<IndentationEntry> {
        let spans = &self.document.spans;
        let source = self.source();
        let tab_size = self.options.tab_size.max(1) as usize;

        let mut entries: Vec<IndentationEntry> = Vec::with_capacity(self.line_index.line_count());
        let mut previous_level = 0usize;

        for line in 0..self.line_index.line_count() {
            let Some(range) = self.line_index.line_range(line) else {
                break;
            };
            let first = self.line_index.first_non_whitespace(line);
            let is_blank = first.is_none();
            let probe = first.unwrap_or(range.start);

            let (existing_indent_width, existing_indent_columns) =
                measure_indent(&source[range.start..probe], tab_size);

            let (owning_span, structural_level, relative_level_delta) =
                match spans.classify(probe, false) {
                    Some(span) => {
                        let level = if is_blank {
                            previous_level
                        } else {
                            span.nesting_depth
                        };
                        (span.clone(), level, level as isize - previous_level as isize)
                    }
                    None => {
                        let placeholder = ClassifiedSpan::new(
                            range.start..range.start,
                            Language::Markup,
                            StructuralKind::Markup,
                        );
                        (placeholder, 0, previous_level as isize)
                    }
                };

            previous_level = structural_level;
            entries.push(IndentationEntry {
                line,
                owning_span,
                structural_level,
                relative_level_delta,
                existing_indent_width,
                existing_indent_columns,
                is_blank,
            });
        }

        entries
    }

    /// Re-run the engine on `changed` and return a sibling context with the same
    /// options, kind and mode.
    pub async fn with_text(&self, changed: String) -> FormatResult<FormattingContext> {
        let document = self.engine.process(changed).await?;

        if self.mode == ValidationMode::Strict
            && cfg!(debug_assertions)
            && document.component_count != self.document.component_count
        {
            return Err(FormatError::invariant(format!(
                "component element count changed from {} to {}",
                self.document.component_count, document.component_count
            )));
        }

        Ok(FormattingContext::new(
            Arc::new(document),
            self.options,
            self.kind,
            Arc::clone(&self.engine),
            self.mode,
        ))
    }
}

/// Width in bytes and columns of a run of leading whitespace.
fn measure_indent(indent: &str, tab_size: usize) -> (usize, usize) {
    let mut columns = 0;
    for c in indent.chars() {
        if c == '\t' {
            columns += tab_size - columns % tab_size;
        } else {
            columns += 1;
        }
    }
    (indent.len(), columns)
}

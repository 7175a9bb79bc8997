//! Text utilities for position conversion and edit application.
//!
//! Provides efficient byte offset <-> LSP position conversion with proper UTF-16 handling,
//! plus the offset-based [`TextChange`] used throughout the formatting pipeline.

use std::ops::Range;

use tower_lsp::lsp_types::{Position, TextEdit};

/// A replacement of a byte span with new text.
///
/// Offsets are relative to whichever document owns the change: the host document
/// for host edits, a projection for edits coming back from a sub-language service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextChange {
    pub span: Range<usize>,
    pub new_text: String,
}

impl TextChange {
    pub fn new(span: Range<usize>, new_text: impl Into<String>) -> Self {
        Self {
            span,
            new_text: new_text.into(),
        }
    }

    pub fn insert(offset: usize, new_text: impl Into<String>) -> Self {
        Self::new(offset..offset, new_text)
    }

    /// Whether two changes touch a common text position.
    ///
    /// Two insertions at the same offset overlap, as does an insertion strictly
    /// inside a replaced span. Replacements that merely share an endpoint do not.
    pub fn overlaps(&self, other: &TextChange) -> bool {
        let (a, b) = (&self.span, &other.span);
        if a.is_empty() && b.is_empty() {
            return a.start == b.start;
        }
        if a.is_empty() {
            return b.start < a.start && a.start < b.end;
        }
        if b.is_empty() {
            return a.start < b.start && b.start < a.end;
        }
        a.start < b.end && b.start < a.end
    }
}

/// Apply a set of non-overlapping changes to `source`.
///
/// Changes are applied back to front so earlier offsets stay valid. Returns `None`
/// if any change falls outside the text or off a char boundary.
pub fn apply_changes(source: &str, changes: &[TextChange]) -> Option<String> {
    let mut ordered: Vec<&TextChange> = changes.iter().collect();
    ordered.sort_by_key(|c| std::cmp::Reverse((c.span.start, c.span.end)));

    let mut text = source.to_string();
    for change in ordered {
        let Range { start, end } = change.span;
        if start > end
            || end > text.len()
            || !text.is_char_boundary(start)
            || !text.is_char_boundary(end)
        {
            return None;
        }
        text.replace_range(start..end, &change.new_text);
    }
    Some(text)
}

/// Pre-computed line index for efficient position lookups.
///
/// LSP positions use line/column where column is in UTF-16 code units.
/// This struct pre-computes line start offsets for O(log n) lookup.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset where each line starts.
    line_starts: Vec<usize>,
    /// Source text (needed for UTF-16 column calculation).
    source: String,
}

impl LineIndex {
    /// Build a line index from source text.
    pub fn new(source: String) -> Self {
        let mut line_starts = vec![0];

        for (i, c) in source.char_indices() {
            if c == '\n' {
                line_starts.push(i + 1);
            }
        }

        Self {
            line_starts,
            source,
        }
    }

    /// Get the source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Line containing the given byte offset.
    pub fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        }
    }

    /// Byte range of a line's content, excluding the line terminator.
    pub fn line_range(&self, line: usize) -> Option<Range<usize>> {
        let start = *self.line_starts.get(line)?;
        let mut end = self
            .line_starts
            .get(line + 1)
            .map(|&next| next - 1)
            .unwrap_or(self.source.len());
        if end > start && self.source.as_bytes()[end - 1] == b'\r' {
            end -= 1;
        }
        Some(start..end)
    }

    /// Offset of the first non-whitespace character on a line, or `None` for blank lines.
    pub fn first_non_whitespace(&self, line: usize) -> Option<usize> {
        let range = self.line_range(line)?;
        self.source[range.clone()]
            .char_indices()
            .find(|(_, c)| !c.is_whitespace())
            .map(|(i, _)| range.start + i)
    }

    /// Convert a byte offset to an LSP position.
    ///
    /// Uses binary search for O(log n) line lookup, then scans the line for UTF-16 column.
    pub fn offset_to_position(&self, offset: usize) -> Position {
        let line = self.line_of(offset);

        let line_start = self.line_starts[line];
        let line_end = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.source.len());

        // Calculate UTF-16 column
        let mut col = 0u32;
        let line_slice = &self.source[line_start..line_end];

        for (i, c) in line_slice.char_indices() {
            if line_start + i >= offset {
                break;
            }
            col += c.len_utf16() as u32;
        }

        Position::new(line as u32, col)
    }

    /// Convert an LSP position to a byte offset.
    ///
    /// Returns None if the position is out of bounds.
    pub fn position_to_offset(&self, position: Position) -> Option<usize> {
        let line = position.line as usize;

        if line >= self.line_starts.len() {
            return None;
        }

        let line_start = self.line_starts[line];
        let line_end = self
            .line_starts
            .get(line + 1)
            .map(|&end| end.saturating_sub(1)) // Exclude newline
            .unwrap_or(self.source.len());

        let line_slice = &self.source[line_start..line_end];

        // Walk UTF-16 code units to find byte offset
        let mut utf16_col = 0u32;
        for (i, c) in line_slice.char_indices() {
            if utf16_col >= position.character {
                return Some(line_start + i);
            }
            utf16_col += c.len_utf16() as u32;
        }

        // Position is at or past end of line
        Some(line_end.min(self.source.len()))
    }

    /// Convert a byte span to an LSP range.
    pub fn span_to_range(&self, span: &Range<usize>) -> tower_lsp::lsp_types::Range {
        let start = self.offset_to_position(span.start);
        let end = self.offset_to_position(span.end);
        tower_lsp::lsp_types::Range::new(start, end)
    }

    /// Convert an LSP range to a byte span.
    pub fn range_to_span(&self, range: tower_lsp::lsp_types::Range) -> Option<Range<usize>> {
        let start = self.position_to_offset(range.start)?;
        let end = self.position_to_offset(range.end)?;
        (start <= end).then_some(start..end)
    }

    pub fn change_to_edit(&self, change: &TextChange) -> TextEdit {
        TextEdit {
            range: self.span_to_range(&change.span),
            new_text: change.new_text.clone(),
        }
    }

    pub fn edit_to_change(&self, edit: &TextEdit) -> Option<TextChange> {
        let span = self.range_to_span(edit.range)?;
        Some(TextChange::new(span, edit.new_text.clone()))
    }
}

//! Classified spans over a host document.
//!
//! A [`SpanIndex`] partitions the host text into spans, each owned by exactly one
//! sub-language. It answers "which language owns offset X" and carries the
//! structural nesting depth used for indentation.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// The sub-languages that can own a region of the host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Template syntax with no sub-language counterpart (transitions, directives, comments).
    Host,
    /// Markup content and tags.
    Markup,
    /// Embedded code.
    Code,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::Host => "host",
            Language::Markup => "markup",
            Language::Code => "code",
        };
        f.write_str(name)
    }
}

/// What piece of structure a span represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructuralKind {
    /// The `@` that switches from markup into template syntax.
    Transition,
    /// A directive keyword such as `code` or `functions`.
    Directive,
    /// An opening or closing brace/paren delimiting a code region.
    BlockBrace,
    /// `@* ... *@`
    Comment,
    /// Plain markup text.
    Markup,
    /// A start or end tag, excluding component attributes.
    Tag,
    AttributeName,
    AttributeEquals,
    /// The value of a component attribute, which is code.
    AttributeValue,
    /// Statements inside a code block.
    CodeBlock,
    /// An implicit or explicit inline expression.
    Expression,
    /// A string literal in a code block that spans more than one line.
    StringLiteral,
    Whitespace,
}

/// A contiguous, classified range of the host document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedSpan {
    pub start: usize,
    pub end: usize,
    pub language: Language,
    pub kind: StructuralKind,
    /// Structural nesting depth (markup elements plus code blocks and braces).
    pub nesting_depth: usize,
    /// Whether the span sits inside the start tag of a component element.
    pub in_component_scope: bool,
}

impl ClassifiedSpan {
    pub fn new(range: Range<usize>, language: Language, kind: StructuralKind) -> Self {
        Self {
            start: range.start,
            end: range.end,
            language,
            kind,
            nesting_depth: 0,
            in_component_scope: false,
        }
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.nesting_depth = depth;
        self
    }

    pub fn in_component(mut self, in_component: bool) -> Self {
        self.in_component_scope = in_component;
        self
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Zero-length spans are markers that own only their own point.
    pub fn is_marker(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Attribute values of components are classified as code but carry markup semantics
    /// for auto-insert purposes.
    pub fn is_attribute_value(&self) -> bool {
        self.kind == StructuralKind::AttributeValue
    }
}

/// Sorted, non-overlapping set of classified spans covering a document.
#[derive(Debug, Clone, Default)]
pub struct SpanIndex {
    spans: Vec<ClassifiedSpan>,
    len: usize,
}

impl SpanIndex {
    /// Build the index from span facts in document order.
    ///
    /// Gaps between facts are filled with markup spans so the index always covers
    /// `[0, len)`. An empty document is represented by a single markup marker.
    pub fn build(facts: impl IntoIterator<Item = ClassifiedSpan>, len: usize) -> Self {
        let mut spans: Vec<ClassifiedSpan> = Vec::new();
        let mut cursor = 0;

        for span in facts {
            if span.start < cursor || span.end > len || span.end < span.start {
                tracing::debug!(
                    start = span.start,
                    end = span.end,
                    cursor,
                    "dropping span that overlaps its predecessor"
                );
                continue;
            }
            if span.start > cursor {
                let depth = spans.last().map(|s| s.nesting_depth).unwrap_or(0);
                spans.push(
                    ClassifiedSpan::new(cursor..span.start, Language::Markup, StructuralKind::Markup)
                        .with_depth(depth),
                );
            }
            cursor = span.end;
            spans.push(span);
        }

        if cursor < len {
            let depth = spans.last().map(|s| s.nesting_depth).unwrap_or(0);
            spans.push(
                ClassifiedSpan::new(cursor..len, Language::Markup, StructuralKind::Markup)
                    .with_depth(depth),
            );
        }
        if spans.is_empty() {
            spans.push(ClassifiedSpan::new(0..0, Language::Markup, StructuralKind::Markup));
        }

        Self { spans, len }
    }

    pub fn spans(&self) -> &[ClassifiedSpan] {
        &self.spans
    }

    /// Length of the document the index was built for.
    pub fn document_len(&self) -> usize {
        self.len
    }

    /// Resolve the span owning `offset`.
    ///
    /// With `right_associative == false` a marker at the offset wins, then the span
    /// containing the offset, which at a boundary is the span starting there. With
    /// `right_associative == true` a non-marker span ending exactly at the offset wins
    /// over the span starting there.
    pub fn classify(&self, offset: usize, right_associative: bool) -> Option<&ClassifiedSpan> {
        if offset > self.len {
            return None;
        }

        // First span whose end reaches the offset; everything before it ends earlier.
        let first = self.spans.partition_point(|s| s.end < offset);
        let candidates = &self.spans[first..];

        if right_associative {
            if let Some(ending) = candidates
                .iter()
                .take_while(|s| s.start <= offset)
                .find(|s| s.end == offset && !s.is_marker())
            {
                return Some(ending);
            }
        }

        let mut ending_here = None;
        for span in candidates {
            if span.start > offset {
                break;
            }
            if span.is_marker() {
                return Some(span);
            }
            if span.end > offset {
                return Some(span);
            }
            ending_here = Some(span);
        }

        // Only reachable at the end of the document.
        ending_here
    }

    pub fn language_at(&self, offset: usize, right_associative: bool) -> Option<Language> {
        self.classify(offset, right_associative).map(|s| s.language)
    }

    /// Structural indentation level at an offset.
    pub fn indentation_level_at(&self, offset: usize) -> Option<usize> {
        self.classify(offset, false).map(|s| s.nesting_depth)
    }

    /// Check that spans are sorted, non-overlapping and cover the document.
    pub fn is_well_formed(&self) -> bool {
        let mut cursor = 0;
        for span in &self.spans {
            if span.start != cursor || span.end < span.start {
                return false;
            }
            cursor = span.end;
        }
        cursor == self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(range: Range<usize>, language: Language) -> ClassifiedSpan {
        let kind = match language {
            Language::Host => StructuralKind::Transition,
            Language::Markup => StructuralKind::Markup,
            Language::Code => StructuralKind::CodeBlock,
        };
        ClassifiedSpan::new(range, language, kind)
    }

    #[test]
    fn fills_gaps_with_markup() {
        let index = SpanIndex::build(vec![span(3..5, Language::Code)], 8);
        let ranges: Vec<_> = index.spans().iter().map(|s| (s.range(), s.language)).collect();
        assert_eq!(
            ranges,
            vec![
                (0..3, Language::Markup),
                (3..5, Language::Code),
                (5..8, Language::Markup)
            ]
        );
        assert!(index.is_well_formed());
    }

    #[test]
    fn empty_document_has_one_marker() {
        let index = SpanIndex::build(Vec::new(), 0);
        assert_eq!(index.spans().len(), 1);
        assert!(index.spans()[0].is_marker());
        assert_eq!(index.language_at(0, false), Some(Language::Markup));
        assert!(index.is_well_formed());
    }

    #[test]
    fn boundary_prefers_span_starting_at_offset() {
        let index = SpanIndex::build(
            vec![span(0..1, Language::Host), span(1..4, Language::Code)],
            4,
        );
        assert_eq!(index.language_at(1, false), Some(Language::Code));
        assert_eq!(index.language_at(1, true), Some(Language::Host));
        assert_eq!(index.language_at(2, true), Some(Language::Code));
    }

    #[test]
    fn marker_wins_at_its_boundary() {
        let index = SpanIndex::build(
            vec![
                span(0..2, Language::Host),
                span(2..2, Language::Code),
                span(2..3, Language::Host),
            ],
            3,
        );
        let owner = index.classify(2, false).unwrap();
        assert!(owner.is_marker());
        assert_eq!(owner.language, Language::Code);
        assert_eq!(index.classify(2, true).unwrap().range(), 0..2);
    }

    #[test]
    fn end_of_document_resolves_to_last_span() {
        let index = SpanIndex::build(vec![span(0..3, Language::Code)], 3);
        assert_eq!(index.language_at(3, false), Some(Language::Code));
        assert_eq!(index.classify(4, false), None);
    }

    #[test]
    fn drops_overlapping_facts() {
        let index = SpanIndex::build(
            vec![span(0..4, Language::Code), span(2..6, Language::Host)],
            6,
        );
        assert!(index.is_well_formed());
        assert_eq!(index.language_at(5, false), Some(Language::Markup));
    }
}

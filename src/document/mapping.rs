//! Offset mapping between the host document and generated projections.
//!
//! Every sub-language gets a generated projection: a synthesized document whose
//! text is partly copied from the host (mapped regions) and partly scaffolding the
//! sub-language needs. [`SourceMapping`]s record the copied regions, and
//! [`PositionMapper`] answers position queries in both directions.
//!
//! Forward mapping may fall back to a nearby code position on the same line;
//! inverse mapping never guesses.

use std::ops::Range;

use super::span::{Language, SpanIndex};

/// A region copied verbatim from the host document into a projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMapping {
    pub host: Range<usize>,
    pub generated: Range<usize>,
}

impl SourceMapping {
    pub fn new(host_start: usize, generated_start: usize, len: usize) -> Self {
        Self {
            host: host_start..host_start + len,
            generated: generated_start..generated_start + len,
        }
    }

    /// Map a host offset, treating the end of the region as inside it so a cursor
    /// at the very end of an expression still maps.
    fn host_to_generated(&self, host_offset: usize) -> Option<usize> {
        (self.host.start <= host_offset && host_offset <= self.host.end)
            .then(|| self.generated.start + (host_offset - self.host.start))
    }

    fn generated_to_host(&self, generated_offset: usize) -> Option<usize> {
        (self.generated.start <= generated_offset && generated_offset <= self.generated.end)
            .then(|| self.host.start + (generated_offset - self.generated.start))
    }
}

/// A generated document for one sub-language.
#[derive(Debug, Clone)]
pub struct Projection {
    pub language: Language,
    pub text: String,
    /// Mappings in host order. Generated ranges never touch each other.
    pub mappings: Vec<SourceMapping>,
}

impl Projection {
    pub fn new(language: Language, text: String, mappings: Vec<SourceMapping>) -> Self {
        Self {
            language,
            text,
            mappings,
        }
    }

    pub fn empty(language: Language) -> Self {
        Self::new(language, String::new(), Vec::new())
    }

    pub fn to_generated(&self, host_offset: usize) -> Option<usize> {
        self.mappings
            .iter()
            .find_map(|m| m.host_to_generated(host_offset))
    }

    pub fn to_host(&self, generated_offset: usize) -> Option<usize> {
        if generated_offset > self.text.len() {
            return None;
        }
        self.mappings
            .iter()
            .find_map(|m| m.generated_to_host(generated_offset))
    }

    /// Map a generated range that lies within a single mapping.
    pub fn range_to_host(&self, range: &Range<usize>) -> Option<Range<usize>> {
        if range.start > range.end || range.end > self.text.len() {
            return None;
        }
        self.mappings.iter().find_map(|m| {
            let start = m.generated_to_host(range.start)?;
            let end = m.generated_to_host(range.end)?;
            Some(start..end)
        })
    }

    /// First mapping starting at or after `host_offset` and no later than `limit`.
    fn next_mapping(&self, host_offset: usize, limit: usize) -> Option<&SourceMapping> {
        self.mappings
            .iter()
            .find(|m| m.host.start >= host_offset && m.host.start <= limit)
    }
}

/// A host offset together with its position in a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedPosition {
    pub host_offset: usize,
    pub projected_offset: usize,
    pub language: Language,
}

/// Bidirectional position queries over a host document and its projections.
#[derive(Debug, Clone, Copy)]
pub struct PositionMapper<'a> {
    source: &'a str,
    spans: &'a SpanIndex,
    code: &'a Projection,
    markup: &'a Projection,
}

impl<'a> PositionMapper<'a> {
    pub fn new(
        source: &'a str,
        spans: &'a SpanIndex,
        code: &'a Projection,
        markup: &'a Projection,
    ) -> Self {
        Self {
            source,
            spans,
            code,
            markup,
        }
    }

    pub fn projection(&self, language: Language) -> Option<&'a Projection> {
        match language {
            Language::Code => Some(self.code),
            Language::Markup => Some(self.markup),
            Language::Host => None,
        }
    }

    /// Map a host offset into the projection of the language that owns it.
    ///
    /// Fails for offsets owned by template syntax, which has no projection.
    pub fn to_generated(&self, host_offset: usize) -> Option<MappedPosition> {
        let language = self.spans.language_at(host_offset, false)?;
        let projection = self.projection(language)?;
        let projected_offset = projection.to_generated(host_offset)?;
        Some(MappedPosition {
            host_offset,
            projected_offset,
            language,
        })
    }

    /// Map a host offset into the code projection, or if it is not mapped, the next
    /// mapped code position later on the same line.
    pub fn to_generated_or_next_mapped(&self, host_offset: usize) -> Option<MappedPosition> {
        if let Some(mapped) = self.to_generated(host_offset) {
            if mapped.language == Language::Code {
                return Some(mapped);
            }
        }

        let tail = self.source.get(host_offset..)?;
        let line_end = tail
            .find('\n')
            .map(|i| host_offset + i)
            .unwrap_or(self.source.len());

        let mapping = self.code.next_mapping(host_offset, line_end)?;
        Some(MappedPosition {
            host_offset: mapping.host.start,
            projected_offset: mapping.generated.start,
            language: Language::Code,
        })
    }

    /// Map a projection offset back to the host document.
    pub fn to_host(&self, generated_offset: usize, language: Language) -> Option<usize> {
        self.projection(language)?.to_host(generated_offset)
    }

    /// Map a projection range back to the host document.
    ///
    /// Both ends must map through the same mapping, so a range spanning scaffolding
    /// never expands over host text of another language.
    pub fn range_to_host(&self, range: &Range<usize>, language: Language) -> Option<Range<usize>> {
        self.projection(language)?.range_to_host(range)
    }
}

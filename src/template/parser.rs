//! Scanner for the host templating language.
//!
//! Splits a template into classified spans (host syntax, markup, code), tracks the
//! structural nesting depth of every span, and reports host-level diagnostics such
//! as unterminated blocks or unbalanced tags. The scanner never fails: a partially
//! typed document is still classified end to end.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::document::{ClassifiedSpan, Language, StructuralKind};

use super::{Severity, TemplateDiagnostic};

/// Directive keywords that introduce a class-level code block.
static DIRECTIVE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(code|functions)\b").unwrap());

/// Control-flow keywords whose header is followed by a code block.
static CONTROL_FLOW_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(if|foreach|for|while|switch|lock)\b").unwrap());

static ELSE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*else\b").unwrap());

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Output of scanning one template.
#[derive(Debug, Clone, Default)]
pub struct ParsedTemplate {
    pub spans: Vec<ClassifiedSpan>,
    pub diagnostics: Vec<TemplateDiagnostic>,
    /// Number of component elements (tags whose name starts with an uppercase letter).
    pub component_count: usize,
}

/// Scan a template into spans and diagnostics.
pub fn parse_template(source: &str) -> ParsedTemplate {
    let mut scanner = Scanner::new(source);
    scanner.run();
    ParsedTemplate {
        spans: scanner.spans,
        diagnostics: scanner.diagnostics,
        component_count: scanner.component_count,
    }
}

#[derive(Debug)]
struct OpenElement {
    name: String,
    name_span: Range<usize>,
    depth_before: usize,
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
    in_component: bool,
    elements: Vec<OpenElement>,
    /// End tags only match elements at or above this index of `elements`.
    floor: usize,
    spans: Vec<ClassifiedSpan>,
    diagnostics: Vec<TemplateDiagnostic>,
    component_count: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            depth: 0,
            in_component: false,
            elements: Vec::new(),
            floor: 0,
            spans: Vec::new(),
            diagnostics: Vec::new(),
            component_count: 0,
        }
    }

    fn run(&mut self) {
        while self.pos < self.bytes.len() {
            self.markup_step();
        }

        for element in std::mem::take(&mut self.elements) {
            self.error(
                "TMPL2001",
                format!("The element <{}> is missing an end tag", element.name),
                element.name_span,
            );
        }
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn push(&mut self, range: Range<usize>, language: Language, kind: StructuralKind) {
        if range.is_empty() {
            return;
        }
        self.push_span(range, language, kind);
    }

    fn push_marker(&mut self, at: usize, language: Language, kind: StructuralKind) {
        self.push_span(at..at, language, kind);
    }

    fn push_span(&mut self, range: Range<usize>, language: Language, kind: StructuralKind) {
        let span = ClassifiedSpan::new(range, language, kind)
            .with_depth(self.depth)
            .in_component(self.in_component);
        self.spans.push(span);
    }

    fn error(&mut self, id: &'static str, message: String, span: Range<usize>) {
        self.diagnostics.push(TemplateDiagnostic {
            id,
            severity: Severity::Error,
            message,
            span,
        });
    }

    /// An `@` is a transition unless it directly follows a word character, as in an
    /// e-mail address.
    fn is_transition_at(&self, at: usize) -> bool {
        self.bytes.get(at) == Some(&b'@') && (at == 0 || !self.bytes[at - 1].is_ascii_alphanumeric())
    }

    fn tag_starts_at(&self, at: usize) -> bool {
        if self.bytes.get(at) != Some(&b'<') {
            return false;
        }
        match self.bytes.get(at + 1) {
            Some(c) if c.is_ascii_alphabetic() => true,
            Some(b'/') => self.bytes.get(at + 2).is_some_and(|c| c.is_ascii_alphabetic()),
            Some(b'!') => self.src[at..].starts_with("<!--"),
            _ => false,
        }
    }

    fn markup_step(&mut self) {
        if self.is_transition_at(self.pos) {
            self.transition();
        } else if self.tag_starts_at(self.pos) {
            self.tag();
        } else {
            self.markup_text();
        }
    }

    fn markup_text(&mut self) {
        let start = self.pos;
        self.pos += 1;
        while self.pos < self.len()
            && !self.is_transition_at(self.pos)
            && !self.tag_starts_at(self.pos)
        {
            self.pos += 1;
        }
        self.push(start..self.pos, Language::Markup, StructuralKind::Markup);
    }

    fn read_name(&self, from: usize) -> usize {
        let mut end = from;
        while end < self.len() {
            let c = self.bytes[end];
            if c.is_ascii_alphanumeric() || matches!(c, b'-' | b'_' | b'.' | b':') {
                end += 1;
            } else {
                break;
            }
        }
        end
    }

    fn read_identifier(&self, from: usize) -> usize {
        let mut end = from;
        while end < self.len() && (self.bytes[end].is_ascii_alphanumeric() || self.bytes[end] == b'_')
        {
            end += 1;
        }
        end
    }

    // ------------------------------------------------------------------
    // Markup tags
    // ------------------------------------------------------------------

    fn tag(&mut self) {
        let start = self.pos;

        if self.src[start..].starts_with("<!--") {
            let end = self.src[start + 4..]
                .find("-->")
                .map(|i| start + 4 + i + 3)
                .unwrap_or(self.len());
            self.push(start..end, Language::Markup, StructuralKind::Markup);
            self.pos = end;
            return;
        }

        if self.peek(1) == Some(b'/') {
            self.end_tag();
        } else {
            self.start_tag();
        }
    }

    fn end_tag(&mut self) {
        let start = self.pos;
        let name_end = self.read_name(start + 2);
        let name = self.src[start + 2..name_end].to_string();
        let end = match self.src[name_end..].find('>') {
            Some(i) => name_end + i + 1,
            None => {
                self.error(
                    "TMPL2003",
                    format!("The end tag </{name}> is missing a closing \">\""),
                    start..name_end,
                );
                self.len()
            }
        };

        let matched = self.elements[self.floor..]
            .iter()
            .rposition(|e| e.name == name)
            .map(|index| index + self.floor);
        match matched {
            Some(index) => {
                let unclosed: Vec<OpenElement> = self.elements.drain(index + 1..).collect();
                for element in unclosed {
                    self.error(
                        "TMPL2001",
                        format!("The element <{}> is missing an end tag", element.name),
                        element.name_span,
                    );
                }
                if let Some(element) = self.elements.pop() {
                    self.depth = element.depth_before;
                }
            }
            None => self.error(
                "TMPL2002",
                format!("The end tag </{name}> has no matching start tag"),
                start..end,
            ),
        }

        self.push(start..end, Language::Markup, StructuralKind::Tag);
        self.pos = end;
    }

    fn start_tag(&mut self) {
        let start = self.pos;
        let name_end = self.read_name(start + 1);
        let name = self.src[start + 1..name_end].to_string();
        let is_component = name.starts_with(|c: char| c.is_ascii_uppercase());

        self.in_component = is_component;
        self.push(start..name_end, Language::Markup, StructuralKind::Tag);
        self.pos = name_end;

        let mut open = None;
        while self.pos < self.len() {
            match self.bytes[self.pos] {
                b'>' => {
                    self.push(self.pos..self.pos + 1, Language::Markup, StructuralKind::Tag);
                    self.pos += 1;
                    open = Some(!VOID_ELEMENTS.contains(&name.to_ascii_lowercase().as_str()));
                    break;
                }
                b'/' if self.peek(1) == Some(b'>') => {
                    self.push(self.pos..self.pos + 2, Language::Markup, StructuralKind::Tag);
                    self.pos += 2;
                    open = Some(false);
                    break;
                }
                _ if is_component => self.component_attribute(),
                b'@' if self.is_transition_at(self.pos) => self.transition(),
                quote @ (b'"' | b'\'') => self.quoted_markup_value(quote),
                _ => self.tag_text(),
            }
        }
        self.in_component = false;

        if is_component {
            self.component_count += 1;
        }

        match open {
            Some(true) => {
                self.elements.push(OpenElement {
                    name,
                    name_span: start + 1..name_end,
                    depth_before: self.depth,
                });
                self.depth += 1;
            }
            Some(false) => {}
            None => self.error(
                "TMPL2003",
                format!("The start tag <{name}> is missing a closing \">\""),
                start + 1..name_end,
            ),
        }
    }

    fn tag_text(&mut self) {
        let start = self.pos;
        self.pos += 1;
        while self.pos < self.len() {
            match self.bytes[self.pos] {
                b'>' | b'/' | b'"' | b'\'' => break,
                b'@' if self.is_transition_at(self.pos) => break,
                _ => self.pos += 1,
            }
        }
        self.push(start..self.pos, Language::Markup, StructuralKind::Tag);
    }

    fn quoted_markup_value(&mut self, quote: u8) {
        self.push(self.pos..self.pos + 1, Language::Markup, StructuralKind::Tag);
        self.pos += 1;
        let mut text_start = self.pos;
        while self.pos < self.len() && self.bytes[self.pos] != quote {
            if self.is_transition_at(self.pos) {
                self.push(text_start..self.pos, Language::Markup, StructuralKind::Tag);
                self.transition();
                text_start = self.pos;
            } else {
                self.pos += 1;
            }
        }
        self.push(text_start..self.pos, Language::Markup, StructuralKind::Tag);
        if self.pos < self.len() {
            self.push(self.pos..self.pos + 1, Language::Markup, StructuralKind::Tag);
            self.pos += 1;
        }
    }

    /// One step inside a component start tag: whitespace, an attribute name, or an
    /// `=value` pair whose value is code.
    fn component_attribute(&mut self) {
        let start = self.pos;
        if self.bytes[start].is_ascii_whitespace() {
            while self.pos < self.len() && self.bytes[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            self.push(start..self.pos, Language::Markup, StructuralKind::Tag);
            return;
        }

        while self.pos < self.len() {
            let c = self.bytes[self.pos];
            if c.is_ascii_whitespace() || matches!(c, b'=' | b'>' | b'/' | b'"' | b'\'') {
                break;
            }
            self.pos += 1;
        }
        let has_name = self.pos > start;
        self.push(start..self.pos, Language::Markup, StructuralKind::AttributeName);

        if self.peek(0) == Some(b'=') {
            self.push(self.pos..self.pos + 1, Language::Markup, StructuralKind::AttributeEquals);
            self.pos += 1;
            self.component_attribute_value();
        } else if !has_name && self.pos < self.len() {
            self.push(self.pos..self.pos + 1, Language::Markup, StructuralKind::Tag);
            self.pos += 1;
        }
    }

    fn component_attribute_value(&mut self) {
        let quote = match self.peek(0) {
            Some(q @ (b'"' | b'\'')) => {
                self.push(self.pos..self.pos + 1, Language::Markup, StructuralKind::Tag);
                self.pos += 1;
                Some(q)
            }
            _ => None,
        };

        let value_start = self.pos;
        while self.pos < self.len() {
            let c = self.bytes[self.pos];
            let stop = match quote {
                Some(q) => c == q,
                None => {
                    c.is_ascii_whitespace()
                        || c == b'>'
                        || (c == b'/' && self.peek(1) == Some(b'>'))
                }
            };
            if stop {
                break;
            }
            self.pos += 1;
        }

        let mut code_start = value_start;
        if self.bytes.get(value_start) == Some(&b'@') && value_start < self.pos {
            self.push(value_start..value_start + 1, Language::Host, StructuralKind::Transition);
            code_start += 1;
        }
        if code_start == self.pos {
            self.push_marker(code_start, Language::Code, StructuralKind::AttributeValue);
        } else {
            self.push(code_start..self.pos, Language::Code, StructuralKind::AttributeValue);
        }

        if quote.is_some() && self.pos < self.len() {
            self.push(self.pos..self.pos + 1, Language::Markup, StructuralKind::Tag);
            self.pos += 1;
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn transition(&mut self) {
        let start = self.pos;
        match self.peek(1) {
            Some(b'@') => {
                self.push(start..start + 2, Language::Markup, StructuralKind::Markup);
                self.pos += 2;
            }
            Some(b'*') => self.comment(),
            Some(b'{') => {
                self.push(start..start + 1, Language::Host, StructuralKind::Transition);
                self.pos += 1;
                self.code_block();
            }
            Some(b'(') => self.explicit_expression(),
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => {
                let rest = &self.src[start + 1..];
                if let Some(m) = DIRECTIVE_PATTERN.find(rest) {
                    self.directive(start + 1 + m.end());
                } else if CONTROL_FLOW_PATTERN.is_match(rest) {
                    self.control_flow();
                } else {
                    self.implicit_expression();
                }
            }
            _ => {
                self.error(
                    "TMPL1004",
                    "Unexpected character after \"@\"; expected an expression, block or directive"
                        .to_string(),
                    start..start + 1,
                );
                self.push(start..start + 1, Language::Host, StructuralKind::Transition);
                self.pos += 1;
            }
        }
    }

    fn comment(&mut self) {
        let start = self.pos;
        let end = match self.src[start + 2..].find("*@") {
            Some(i) => start + 2 + i + 2,
            None => {
                self.error(
                    "TMPL1003",
                    "The comment is missing a closing \"*@\"".to_string(),
                    start..start + 2,
                );
                self.len()
            }
        };
        self.push(start..end, Language::Host, StructuralKind::Comment);
        self.pos = end;
    }

    fn directive(&mut self, keyword_end: usize) {
        let start = self.pos;
        self.push(start..start + 1, Language::Host, StructuralKind::Transition);
        self.push(start + 1..keyword_end, Language::Host, StructuralKind::Directive);
        self.pos = keyword_end;

        let ws_start = self.pos;
        while self.pos < self.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }

        if self.peek(0) == Some(b'{') {
            self.push(ws_start..self.pos, Language::Host, StructuralKind::Whitespace);
            self.code_block();
        } else {
            // Leave the whitespace to markup so typing can continue after the keyword.
            self.pos = ws_start;
            self.error(
                "TMPL1005",
                format!(
                    "The \"{}\" directive must be followed by a block",
                    &self.src[start + 1..keyword_end]
                ),
                start..keyword_end,
            );
        }
    }

    fn control_flow(&mut self) {
        let start = self.pos;
        self.push(start..start + 1, Language::Host, StructuralKind::Transition);
        self.pos += 1;

        loop {
            let header_start = self.pos;
            let Some(brace) = self.find_block_open(header_start) else {
                self.push(header_start..self.len(), Language::Code, StructuralKind::CodeBlock);
                self.error(
                    "TMPL1001",
                    "The code block is missing a closing \"}\" character".to_string(),
                    start..start + 1,
                );
                self.pos = self.len();
                return;
            };
            self.push(header_start..brace, Language::Code, StructuralKind::CodeBlock);
            self.pos = brace;
            if !self.code_block() {
                return;
            }

            match ELSE_PATTERN.find(&self.src[self.pos..]) {
                Some(_) => continue,
                None => return,
            }
        }
    }

    /// Find the `{` that opens the block after a control-flow header, skipping
    /// parenthesized conditions and string literals.
    fn find_block_open(&self, from: usize) -> Option<usize> {
        let mut pos = from;
        let mut parens = 0usize;
        while pos < self.len() {
            match self.bytes[pos] {
                b'"' | b'\'' => pos = self.skip_string(pos),
                b'(' => {
                    parens += 1;
                    pos += 1;
                }
                b')' => {
                    parens = parens.saturating_sub(1);
                    pos += 1;
                }
                b'{' if parens == 0 => return Some(pos),
                _ => pos += 1,
            }
        }
        None
    }

    fn explicit_expression(&mut self) {
        let start = self.pos;
        self.push(start..start + 1, Language::Host, StructuralKind::Transition);
        self.push(start + 1..start + 2, Language::Host, StructuralKind::BlockBrace);
        let body_start = start + 2;

        match self.matching_close(body_start, b'(', b')') {
            Some(close) => {
                if close == body_start {
                    self.push_marker(body_start, Language::Code, StructuralKind::Expression);
                } else {
                    self.push(body_start..close, Language::Code, StructuralKind::Expression);
                }
                self.push(close..close + 1, Language::Host, StructuralKind::BlockBrace);
                self.pos = close + 1;
            }
            None => {
                self.push(body_start..self.len(), Language::Code, StructuralKind::Expression);
                self.error(
                    "TMPL1002",
                    "The explicit expression is missing a closing \")\" character".to_string(),
                    start..start + 2,
                );
                self.pos = self.len();
            }
        }
    }

    fn implicit_expression(&mut self) {
        let start = self.pos;
        self.push(start..start + 1, Language::Host, StructuralKind::Transition);

        let mut end = self.read_identifier(start + 1);
        loop {
            match self.bytes.get(end) {
                Some(b'.')
                    if self
                        .bytes
                        .get(end + 1)
                        .is_some_and(|c| c.is_ascii_alphabetic() || *c == b'_') =>
                {
                    end = self.read_identifier(end + 1);
                }
                Some(b'(') => {
                    end = self
                        .matching_close(end + 1, b'(', b')')
                        .map(|close| close + 1)
                        .unwrap_or(self.len());
                }
                Some(b'[') => {
                    end = self
                        .matching_close(end + 1, b'[', b']')
                        .map(|close| close + 1)
                        .unwrap_or(self.len());
                }
                _ => break,
            }
        }

        self.push(start + 1..end, Language::Code, StructuralKind::Expression);
        self.pos = end;
    }

    // ------------------------------------------------------------------
    // Code
    // ------------------------------------------------------------------

    /// Index of the delimiter closing a group whose contents start at `from`.
    fn matching_close(&self, from: usize, open: u8, close: u8) -> Option<usize> {
        let mut depth = 0usize;
        let mut pos = from;
        while pos < self.len() {
            let c = self.bytes[pos];
            if c == b'"' || c == b'\'' {
                pos = self.skip_string(pos);
                continue;
            }
            if c == open {
                depth += 1;
            } else if c == close {
                if depth == 0 {
                    return Some(pos);
                }
                depth -= 1;
            }
            pos += 1;
        }
        None
    }

    /// Skip a string or character literal starting at `at`, returning the offset after it.
    fn skip_string(&self, at: usize) -> usize {
        let quote = self.bytes[at];
        let mut pos = at + 1;
        while pos < self.len() {
            match self.bytes[pos] {
                b'\\' => pos += 2,
                c if c == quote => return pos + 1,
                b'\n' if quote == b'\'' => return pos,
                _ => pos += 1,
            }
        }
        self.len()
    }

    /// Parse a brace-delimited code block starting at the `{` under the cursor.
    ///
    /// The braces sit at the current depth, the body one level deeper. Returns
    /// `false` if the block is unterminated.
    fn code_block(&mut self) -> bool {
        let open = self.pos;
        self.push(open..open + 1, Language::Code, StructuralKind::BlockBrace);
        self.pos += 1;

        let depth = self.depth;
        self.depth += 1;
        let close = self.code_body();
        self.depth = depth;

        match close {
            Some(close) => {
                self.push(close..close + 1, Language::Code, StructuralKind::BlockBrace);
                self.pos = close + 1;
                true
            }
            None => {
                self.error(
                    "TMPL1001",
                    "The code block is missing a closing \"}\" character".to_string(),
                    open..open + 1,
                );
                false
            }
        }
    }

    /// Scan code statements up to the brace closing the enclosing block.
    ///
    /// Code is split into segments at every nested brace so each segment carries the
    /// brace depth of the lines it starts. Markup elements at statement starts are
    /// parsed as markup.
    fn code_body(&mut self) -> Option<usize> {
        let body_start = self.pos;
        let body_depth = self.depth;
        let mut segment_start = self.pos;
        let mut nested = 0usize;
        let mut statement_start = true;

        while self.pos < self.len() {
            let c = self.bytes[self.pos];
            match c {
                b'"' | b'\'' => {
                    let literal = self.pos;
                    self.pos = self.skip_string(literal);
                    if self.src[literal..self.pos].contains('\n') {
                        self.push(segment_start..literal, Language::Code, StructuralKind::CodeBlock);
                        self.push(literal..self.pos, Language::Code, StructuralKind::StringLiteral);
                        segment_start = self.pos;
                    }
                    statement_start = false;
                }
                b'/' if self.peek(1) == Some(b'/') => {
                    self.pos = self.src[self.pos..]
                        .find('\n')
                        .map(|i| self.pos + i)
                        .unwrap_or(self.len());
                }
                b'/' if self.peek(1) == Some(b'*') => {
                    self.pos = self.src[self.pos + 2..]
                        .find("*/")
                        .map(|i| self.pos + 2 + i + 2)
                        .unwrap_or(self.len());
                }
                b'{' => {
                    self.pos += 1;
                    self.push(segment_start..self.pos, Language::Code, StructuralKind::CodeBlock);
                    segment_start = self.pos;
                    nested += 1;
                    self.depth += 1;
                    statement_start = true;
                }
                b'}' if nested == 0 => {
                    self.push(segment_start..self.pos, Language::Code, StructuralKind::CodeBlock);
                    if self.pos == body_start {
                        self.push_marker(body_start, Language::Code, StructuralKind::CodeBlock);
                    }
                    return Some(self.pos);
                }
                b'}' => {
                    self.push(segment_start..self.pos, Language::Code, StructuralKind::CodeBlock);
                    nested -= 1;
                    self.depth = self.depth.saturating_sub(1);
                    segment_start = self.pos;
                    self.pos += 1;
                    statement_start = true;
                }
                b';' => {
                    self.pos += 1;
                    statement_start = true;
                }
                b'<' if statement_start
                    && self.peek(1).is_some_and(|c| c.is_ascii_alphabetic()) =>
                {
                    self.push(segment_start..self.pos, Language::Code, StructuralKind::CodeBlock);
                    self.markup_in_code();
                    segment_start = self.pos;
                }
                c if c.is_ascii_whitespace() => self.pos += 1,
                _ => {
                    self.pos += 1;
                    statement_start = false;
                }
            }
        }

        self.push(segment_start..self.len(), Language::Code, StructuralKind::CodeBlock);
        self.depth = body_depth;
        None
    }

    /// Parse one markup element embedded in code, including its content.
    ///
    /// End tags inside it cannot close elements opened outside the code block.
    fn markup_in_code(&mut self) {
        let base = self.elements.len();
        let outer_floor = std::mem::replace(&mut self.floor, base);
        self.tag();
        while self.elements.len() > base && self.pos < self.len() {
            self.markup_step();
        }
        self.floor = outer_floor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SpanIndex;

    fn classes(source: &str) -> Vec<(String, Language, usize)> {
        parse_template(source)
            .spans
            .iter()
            .map(|s| (source[s.range()].to_string(), s.language, s.nesting_depth))
            .collect()
    }

    fn ids(source: &str) -> Vec<&'static str> {
        parse_template(source).diagnostics.iter().map(|d| d.id).collect()
    }

    #[test]
    fn classifies_empty_code_directive() {
        let parsed = parse_template("@code {}");
        let spans: Vec<_> = parsed
            .spans
            .iter()
            .map(|s| (s.range(), s.language, s.kind))
            .collect();
        assert_eq!(
            spans,
            vec![
                (0..1, Language::Host, StructuralKind::Transition),
                (1..5, Language::Host, StructuralKind::Directive),
                (5..6, Language::Host, StructuralKind::Whitespace),
                (6..7, Language::Code, StructuralKind::BlockBrace),
                (7..7, Language::Code, StructuralKind::CodeBlock),
                (7..8, Language::Code, StructuralKind::BlockBrace),
            ]
        );
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn nested_braces_carry_depth() {
        let source = "@code {\nvoid M()\n{\nx();\n}\n}";
        let spans = classes(source);
        assert!(spans.contains(&("\nvoid M()\n{".to_string(), Language::Code, 1)));
        assert!(spans.contains(&("\nx();\n".to_string(), Language::Code, 2)));
        assert!(spans.contains(&("}\n".to_string(), Language::Code, 1)));
        assert_eq!(spans.last(), Some(&("}".to_string(), Language::Code, 0)));
    }

    #[test]
    fn elements_increase_depth() {
        let spans = classes("<div>\n<p>hi</p>\n</div>");
        assert_eq!(spans[0], ("<div".to_string(), Language::Markup, 0));
        assert!(spans.contains(&("<p".to_string(), Language::Markup, 1)));
        assert!(spans.contains(&("hi".to_string(), Language::Markup, 2)));
        assert!(spans.contains(&("</p>".to_string(), Language::Markup, 1)));
        assert_eq!(spans.last(), Some(&("</div>".to_string(), Language::Markup, 0)));
    }

    #[test]
    fn implicit_expression_with_members_and_calls() {
        let spans = classes("<p>@user.Name.ToUpper()!</p>");
        assert!(spans.contains(&("user.Name.ToUpper()".to_string(), Language::Code, 1)));
        assert!(spans.contains(&("!".to_string(), Language::Markup, 1)));
    }

    #[test]
    fn email_is_not_a_transition() {
        let spans = classes("mail me@example.com");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].1, Language::Markup);
    }

    #[test]
    fn escaped_transition_is_markup() {
        let spans = classes("@@name");
        assert!(spans.iter().all(|(_, language, _)| *language == Language::Markup));
    }

    #[test]
    fn component_attribute_values_are_code() {
        let parsed = parse_template("<Counter Start=\"@count\" Step=>");
        let value = parsed
            .spans
            .iter()
            .find(|s| s.is_attribute_value() && !s.is_marker())
            .unwrap();
        assert_eq!(value.language, Language::Code);
        assert!(value.in_component_scope);

        let marker = parsed
            .spans
            .iter()
            .find(|s| s.is_attribute_value() && s.is_marker())
            .unwrap();
        assert_eq!(marker.start, 29);
        assert_eq!(parsed.component_count, 1);
    }

    #[test]
    fn markup_inside_code_block() {
        let source = "@{\n<p>@x</p>\n}";
        let spans = classes(source);
        assert!(spans.contains(&("<p".to_string(), Language::Markup, 1)));
        assert!(spans.contains(&("x".to_string(), Language::Code, 2)));
        assert!(parse_template(source).diagnostics.is_empty());
    }

    #[test]
    fn control_flow_with_else() {
        let source = "@if (a) {\n<b>yes</b>\n} else {\n<i>no</i>\n}";
        let parsed = parse_template(source);
        assert!(parsed.diagnostics.is_empty());
        let index = SpanIndex::build(parsed.spans, source.len());
        assert!(index.is_well_formed());
        assert_eq!(index.language_at(source.find("else").unwrap(), false), Some(Language::Code));
    }

    #[test]
    fn reports_structural_errors() {
        assert_eq!(ids("@code {\nvoid M() {}\n"), vec!["TMPL1001"]);
        assert_eq!(ids("@(a + b"), vec!["TMPL1002"]);
        assert_eq!(ids("@* note"), vec!["TMPL1003"]);
        assert_eq!(ids("a @ b"), vec!["TMPL1004"]);
        assert_eq!(ids("@code"), vec!["TMPL1005"]);
        assert_eq!(ids("<div><p></div>"), vec!["TMPL2001"]);
        assert_eq!(ids("</span>"), vec!["TMPL2002"]);
        assert_eq!(ids("<div"), vec!["TMPL2003"]);
        assert!(ids("<br><img src=\"a\"/><div></div>").is_empty());
    }

    #[test]
    fn end_tag_in_code_does_not_close_outer_element() {
        let source = "<div>@{ <p></div> }";
        let parsed = parse_template(source);
        let ids: Vec<_> = parsed.diagnostics.iter().map(|d| d.id).collect();
        assert!(ids.contains(&"TMPL2002"), "{ids:?}");
        // The outer <div> is still open at the end.
        assert!(parsed
            .diagnostics
            .iter()
            .any(|d| d.id == "TMPL2001" && &source[d.span.clone()] == "div"));
        assert!(parsed.spans.iter().all(|s| s.nesting_depth < 8));
    }

    #[test]
    fn unterminated_block_with_stray_end_tag_keeps_depth() {
        let source = "<div>@code { { <b></div>";
        let parsed = parse_template(source);
        assert!(ids(source).contains(&"TMPL1001"));
        assert!(parsed.spans.iter().all(|s| s.nesting_depth < 8));
    }

    #[test]
    fn multi_line_string_literal_is_its_own_span() {
        let source = "@code {\n    string s = @\"line one\nkeep   this\";\n}";
        let parsed = parse_template(source);
        let literal = parsed
            .spans
            .iter()
            .find(|s| s.kind == StructuralKind::StringLiteral)
            .unwrap();
        assert_eq!(&source[literal.range()], "\"line one\nkeep   this\"");
        assert_eq!(literal.language, Language::Code);

        let single = parse_template("@code { var s = \"a\"; }");
        assert!(single.spans.iter().all(|s| s.kind != StructuralKind::StringLiteral));
    }

    #[test]
    fn spans_are_sorted_and_cover_document() {
        let sources = [
            "",
            "@code {}",
            "<Counter Value=@x />\n@* c *@\n@{ var a = \"}\"; }",
            "<div class=\"@cls big\">@(1 + 2)</div>",
            "@foreach (var i in items) {\n<li>@i</li>\n}",
            "<p>unterminated @(",
            "<div>@{ <p></div> }",
            "<div>@code { { <b></div>",
            "@code {\n    string s = @\"line one\nkeep   this\";\n}",
        ];
        for source in sources {
            let parsed = parse_template(source);
            let index = SpanIndex::build(parsed.spans, source.len());
            assert!(index.is_well_formed(), "{source:?}");
        }
    }
}

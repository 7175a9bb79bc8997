//! Template engine interface and the built-in scanning engine.
//!
//! The engine turns host source text into a [`CodeDocument`]: classified spans, a
//! generated projection per sub-language, and host-level diagnostics. The rest of the
//! crate only talks to the [`TemplateEngine`] trait so a full compiler can be plugged
//! in without touching the formatting pipeline.

mod parser;
mod projection;

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use thiserror::Error;

use crate::document::{PositionMapper, Projection, SpanIndex};

pub use parser::{parse_template, ParsedTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// A host-level diagnostic produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDiagnostic {
    pub id: &'static str,
    pub severity: Severity,
    pub message: String,
    pub span: Range<usize>,
}

impl TemplateDiagnostic {
    /// Identity used when comparing diagnostics across edits, where locations move.
    pub fn key(&self) -> (Severity, &'static str) {
        (self.severity, self.id)
    }
}

/// Count diagnostics by `(severity, id)`, ignoring location and message.
pub fn diagnostic_multiset(
    diagnostics: &[TemplateDiagnostic],
) -> HashMap<(Severity, &'static str), usize> {
    let mut counts = HashMap::new();
    for diagnostic in diagnostics {
        *counts.entry(diagnostic.key()).or_insert(0) += 1;
    }
    counts
}

/// Output of processing one version of a template.
#[derive(Debug, Clone)]
pub struct CodeDocument {
    pub source: String,
    pub spans: SpanIndex,
    pub code: Projection,
    pub markup: Projection,
    pub diagnostics: Vec<TemplateDiagnostic>,
    /// Number of component elements in the document.
    pub component_count: usize,
}

impl CodeDocument {
    pub fn mapper(&self) -> PositionMapper<'_> {
        PositionMapper::new(&self.source, &self.spans, &self.code, &self.markup)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("template engine failed: {0}")]
    Failed(String),
}

/// Produces a [`CodeDocument`] from host source text.
#[tower_lsp::async_trait]
pub trait TemplateEngine: Send + Sync + fmt::Debug {
    async fn process(&self, source: String) -> Result<CodeDocument, EngineError>;
}

/// In-process engine backed by the template scanner.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScanningEngine;

impl ScanningEngine {
    pub fn shared() -> Arc<dyn TemplateEngine> {
        Arc::new(Self)
    }

    /// Synchronous entry point, used when no engine round-trip is needed.
    pub fn scan(&self, source: String) -> CodeDocument {
        let parsed = parse_template(&source);
        let spans = SpanIndex::build(parsed.spans, source.len());
        let code = projection::code_projection(&source, spans.spans());
        let markup = projection::markup_projection(&source, spans.spans());

        tracing::debug!(
            spans = spans.spans().len(),
            code_mappings = code.mappings.len(),
            diagnostics = parsed.diagnostics.len(),
            "scanned template"
        );

        CodeDocument {
            source,
            spans,
            code,
            markup,
            diagnostics: parsed.diagnostics,
            component_count: parsed.component_count,
        }
    }
}

#[tower_lsp::async_trait]
impl TemplateEngine for ScanningEngine {
    async fn process(&self, source: String) -> Result<CodeDocument, EngineError> {
        Ok(self.scan(source))
    }
}

//! Diagnostics conversion from template diagnostics to LSP diagnostics.

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, NumberOrString};

use crate::document::LineIndex;
use crate::template::{Severity, TemplateDiagnostic};

/// Convert engine diagnostics to LSP diagnostics.
pub fn to_diagnostics(diagnostics: &[TemplateDiagnostic], line_index: &LineIndex) -> Vec<Diagnostic> {
    diagnostics
        .iter()
        .map(|diagnostic| {
            let severity = match diagnostic.severity {
                Severity::Error => DiagnosticSeverity::ERROR,
                Severity::Warning => DiagnosticSeverity::WARNING,
            };

            Diagnostic {
                range: line_index.span_to_range(&diagnostic.span),
                severity: Some(severity),
                code: Some(NumberOrString::String(diagnostic.id.to_string())),
                code_description: None,
                source: Some("tmpl".to_string()),
                message: diagnostic.message.clone(),
                related_information: None,
                tags: None,
                data: None,
            }
        })
        .collect()
}

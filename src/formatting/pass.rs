//! The closed set of formatting passes.

use crate::error::FormatResult;

use super::{indent, on_type, validation, FormattingContext, FormattingResult};

/// A formatting pass. Passes run in ascending [`order`](FormattingPass::order),
/// with validation passes always after every other pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormattingPass {
    /// Maps code edits to the host and applies brace/semicolon indentation rules.
    CodeOnType,
    /// Maps markup edits to the host and re-indents the trigger line.
    MarkupOnType,
    /// Re-indents every line of the document to its structural level.
    DocumentIndentation,
    /// Rejects document formatting that changes anything but whitespace.
    ContentValidation,
    /// Rejects edits that change the document's diagnostics.
    DiagnosticValidation,
}

impl FormattingPass {
    pub const ALL: [FormattingPass; 5] = [
        FormattingPass::CodeOnType,
        FormattingPass::MarkupOnType,
        FormattingPass::DocumentIndentation,
        FormattingPass::ContentValidation,
        FormattingPass::DiagnosticValidation,
    ];

    pub fn order(self) -> u32 {
        match self {
            FormattingPass::CodeOnType | FormattingPass::MarkupOnType => 10,
            FormattingPass::DocumentIndentation => 20,
            FormattingPass::ContentValidation => 990,
            FormattingPass::DiagnosticValidation => 1000,
        }
    }

    pub fn is_validation(self) -> bool {
        matches!(
            self,
            FormattingPass::ContentValidation | FormattingPass::DiagnosticValidation
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            FormattingPass::CodeOnType => "code-on-type",
            FormattingPass::MarkupOnType => "markup-on-type",
            FormattingPass::DocumentIndentation => "document-indentation",
            FormattingPass::ContentValidation => "content-validation",
            FormattingPass::DiagnosticValidation => "diagnostic-validation",
        }
    }

    pub async fn execute(
        self,
        ctx: &FormattingContext,
        result: FormattingResult,
    ) -> FormatResult<FormattingResult> {
        match self {
            FormattingPass::CodeOnType => Ok(on_type::code(ctx, result)),
            FormattingPass::MarkupOnType => Ok(on_type::markup(ctx, result)),
            FormattingPass::DocumentIndentation => Ok(indent::document(ctx, result)),
            FormattingPass::ContentValidation => validation::content(ctx, result),
            FormattingPass::DiagnosticValidation => validation::diagnostics(ctx, result).await,
        }
    }
}

//! Pass ordering and the public formatting entry points.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::document::{Language, TextChange};
use crate::error::{FormatError, FormatResult};
use crate::reconcile::EditReconciler;
use crate::template::{CodeDocument, TemplateEngine};

use super::{
    FormattingContext, FormattingKind, FormattingPass, FormattingResult, IndentOptions,
    ValidationMode,
};

/// An ordered list of passes.
#[derive(Debug, Clone)]
pub struct FormattingPipeline {
    passes: Vec<FormattingPass>,
}

impl FormattingPipeline {
    /// Order `passes`: language passes by order first, then validation passes.
    pub fn new(passes: impl IntoIterator<Item = FormattingPass>) -> Self {
        let mut passes: Vec<FormattingPass> = passes.into_iter().collect();
        passes.sort_by_key(|p| (p.is_validation(), p.order()));
        Self { passes }
    }

    pub fn standard() -> Self {
        Self::new(FormattingPass::ALL)
    }

    pub fn passes(&self) -> &[FormattingPass] {
        &self.passes
    }

    /// Run every pass over `initial`.
    ///
    /// Cancellation is observed between passes only; a pass that has started runs
    /// to completion.
    pub async fn run(
        &self,
        ctx: &FormattingContext,
        initial: FormattingResult,
        cancel: &CancellationToken,
    ) -> FormatResult<FormattingResult> {
        let mut result = initial;
        for pass in &self.passes {
            if cancel.is_cancelled() {
                tracing::debug!(pass = pass.name(), "formatting cancelled");
                return Err(FormatError::Cancelled);
            }
            let before = result.edits.len();
            result = pass.execute(ctx, result).await?;
            tracing::trace!(
                pass = pass.name(),
                before,
                after = result.edits.len(),
                owner = %result.owner,
                "formatting pass finished"
            );
        }
        Ok(result)
    }
}

impl Default for FormattingPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

/// Formats documents, on-type triggers and snippets through the pipeline.
#[derive(Debug, Clone)]
pub struct FormattingService {
    engine: Arc<dyn TemplateEngine>,
    pipeline: FormattingPipeline,
    mode: ValidationMode,
}

impl FormattingService {
    pub fn new(engine: Arc<dyn TemplateEngine>, mode: ValidationMode) -> Self {
        Self::with_pipeline(engine, FormattingPipeline::standard(), mode)
    }

    pub fn with_pipeline(
        engine: Arc<dyn TemplateEngine>,
        pipeline: FormattingPipeline,
        mode: ValidationMode,
    ) -> Self {
        Self {
            engine,
            pipeline,
            mode,
        }
    }

    pub fn engine(&self) -> &Arc<dyn TemplateEngine> {
        &self.engine
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    async fn run(
        &self,
        ctx: FormattingContext,
        initial: FormattingResult,
        cancel: &CancellationToken,
    ) -> FormatResult<Vec<TextChange>> {
        let result = self.pipeline.run(&ctx, initial, cancel).await?;
        if result.owner != Language::Host {
            return Err(FormatError::precondition(format!(
                "pipeline finished with {} edits instead of host edits",
                result.owner
            )));
        }
        Ok(EditReconciler::reconcile(result.edits))
    }

    /// Re-indent the whole document.
    pub async fn format_document(
        &self,
        document: Arc<CodeDocument>,
        options: IndentOptions,
        cancel: &CancellationToken,
    ) -> FormatResult<Vec<TextChange>> {
        let ctx = FormattingContext::for_document(
            document,
            options,
            Arc::clone(&self.engine),
            self.mode,
        );
        self.run(ctx, FormattingResult::empty(Language::Host), cancel)
            .await
    }

    /// Format after `trigger` was typed, with the cursor now at `offset`.
    ///
    /// `draft` holds edits from the sub-language service in `language`'s
    /// projection coordinates.
    #[allow(clippy::too_many_arguments)]
    pub async fn format_on_type(
        &self,
        document: Arc<CodeDocument>,
        options: IndentOptions,
        offset: usize,
        trigger: char,
        language: Language,
        draft: Vec<TextChange>,
        cancel: &CancellationToken,
    ) -> FormatResult<Vec<TextChange>> {
        if language == Language::Host {
            return Err(FormatError::precondition(
                "on-type formatting needs a code or markup position",
            ));
        }
        let ctx = FormattingContext::for_on_type(
            document,
            options,
            offset,
            trigger,
            Arc::clone(&self.engine),
            self.mode,
        )?;
        debug_assert_eq!(ctx.kind(), FormattingKind::OnType { offset, trigger });
        self.run(ctx, FormattingResult::new(draft, language), cancel)
            .await
    }

    /// Format code edits produced outside the pipeline, such as completion snippets.
    pub async fn format_snippet(
        &self,
        document: Arc<CodeDocument>,
        options: IndentOptions,
        draft: Vec<TextChange>,
        cancel: &CancellationToken,
    ) -> FormatResult<Vec<TextChange>> {
        let ctx = FormattingContext::for_snippet(
            document,
            options,
            Arc::clone(&self.engine),
            self.mode,
        );
        self.run(ctx, FormattingResult::new(draft, Language::Code), cancel)
            .await
    }
}

//! Multi-pass formatting pipeline.
//!
//! Draft edits enter the pipeline in the coordinates of the language that produced
//! them. Language passes map them to the host document and add indentation edits,
//! then validation passes reject any edit set that would change the document's
//! content or diagnostics.

mod context;
mod indent;
mod on_type;
mod pass;
mod pipeline;
mod validation;

pub use context::{FormattingContext, FormattingKind, IndentOptions, IndentationEntry, ValidationMode};
pub use pass::FormattingPass;
pub use pipeline::{FormattingPipeline, FormattingService};

use crate::document::{Language, TextChange};

/// Edits flowing between passes, tagged with the document they are expressed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattingResult {
    pub edits: Vec<TextChange>,
    pub owner: Language,
}

impl FormattingResult {
    pub fn new(edits: Vec<TextChange>, owner: Language) -> Self {
        Self { edits, owner }
    }

    pub fn empty(owner: Language) -> Self {
        Self::new(Vec::new(), owner)
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

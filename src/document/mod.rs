//! Document state management and text utilities.
//!
//! This module provides:
//! - `LineIndex` for efficient byte offset <-> LSP position conversion
//! - `SpanIndex` for classifying host offsets by owning sub-language
//! - `PositionMapper` for mapping offsets between the host and its projections
//! - `DocumentSnapshot` and `DocumentStore` for document lifecycle management

mod mapping;
mod span;
mod state;
mod text;

pub use mapping::{MappedPosition, PositionMapper, Projection, SourceMapping};
pub use span::{ClassifiedSpan, Language, SpanIndex, StructuralKind};
pub use state::{DocumentSnapshot, DocumentStore};
pub use text::{apply_changes, LineIndex, TextChange};

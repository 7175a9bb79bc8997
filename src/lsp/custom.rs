//! Custom methods the server exposes beyond the LSP specification.

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::{
    FormattingOptions, InsertTextFormat, Position, TextDocumentIdentifier, TextEdit,
};

pub const ON_AUTO_INSERT: &str = "tmpl/onAutoInsert";
pub const PROXIMITY_EXPRESSIONS: &str = "tmpl/proximityExpressions";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnAutoInsertParams {
    pub text_document: TextDocumentIdentifier,
    /// Cursor position after the character was typed.
    pub position: Position,
    pub ch: String,
    pub options: FormattingOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnAutoInsertResponse {
    pub text_edit: TextEdit,
    pub text_edit_format: InsertTextFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityExpressionsParams {
    pub text_document: TextDocumentIdentifier,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityExpressionsResponse {
    pub expressions: Vec<String>,
}

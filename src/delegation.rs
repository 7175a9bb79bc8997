//! Requests delegated to the editor client.
//!
//! Code and markup services live in the client, which owns the projected documents.
//! The server forwards positions in projection coordinates through custom JSON-RPC
//! requests and receives edits in the same coordinates.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_lsp::lsp_types::request::Request;
use tower_lsp::lsp_types::{
    CompletionContext, CompletionItem, FormattingOptions, InsertTextFormat,
    Position, TextDocumentIdentifier, TextEdit,
};
use tower_lsp::Client;

use crate::document::Language;
use crate::error::{FormatError, FormatResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedOnAutoInsertParams {
    pub text_document: TextDocumentIdentifier,
    pub version: i32,
    pub language: Language,
    pub projected_position: Position,
    pub character: String,
    pub options: FormattingOptions,
}

/// An edit in projection coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedEdit {
    pub edit: TextEdit,
    pub format: InsertTextFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedCompletionParams {
    pub text_document: TextDocumentIdentifier,
    pub version: i32,
    pub language: Language,
    pub projected_position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<CompletionContext>,
}

/// A completion list in projection coordinates.
///
/// `data` applies to every item that carries none of its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedCompletionList {
    pub is_incomplete: bool,
    pub items: Vec<CompletionItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedCompletionResolveParams {
    pub text_document: TextDocumentIdentifier,
    pub language: Language,
    pub item: CompletionItem,
}

pub enum DelegatedOnAutoInsert {}

impl Request for DelegatedOnAutoInsert {
    type Params = DelegatedOnAutoInsertParams;
    type Result = Option<DelegatedEdit>;
    const METHOD: &'static str = "tmpl/delegatedOnAutoInsert";
}

pub enum DelegatedCompletion {}

impl Request for DelegatedCompletion {
    type Params = DelegatedCompletionParams;
    type Result = Option<DelegatedCompletionList>;
    const METHOD: &'static str = "tmpl/delegatedCompletion";
}

pub enum DelegatedCompletionResolve {}

impl Request for DelegatedCompletionResolve {
    type Params = DelegatedCompletionResolveParams;
    type Result = CompletionItem;
    const METHOD: &'static str = "tmpl/delegatedCompletionResolve";
}

/// Asks the client for the formatting options of a document.
pub enum FormattingOptionsRequest {}

impl Request for FormattingOptionsRequest {
    type Params = TextDocumentIdentifier;
    type Result = Option<FormattingOptions>;
    const METHOD: &'static str = "tmpl/formattingOptions";
}

/// Language services reached through the client.
#[tower_lsp::async_trait]
pub trait DelegatedFormatter: Send + Sync {
    async fn on_auto_insert(
        &self,
        params: DelegatedOnAutoInsertParams,
    ) -> FormatResult<Option<DelegatedEdit>>;

    async fn completion(
        &self,
        params: DelegatedCompletionParams,
    ) -> FormatResult<Option<DelegatedCompletionList>>;

    async fn resolve_completion(
        &self,
        params: DelegatedCompletionResolveParams,
    ) -> FormatResult<CompletionItem>;

    async fn formatting_options(
        &self,
        document: TextDocumentIdentifier,
    ) -> FormatResult<Option<FormattingOptions>>;
}

/// [`DelegatedFormatter`] backed by custom requests to the connected client.
#[derive(Debug, Clone)]
pub struct ClientDelegate {
    client: Client,
}

impl ClientDelegate {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn send<R: Request>(&self, params: R::Params) -> FormatResult<R::Result> {
        tracing::debug!(method = R::METHOD, "delegating request to client");
        self.client
            .send_request::<R>(params)
            .await
            .map_err(|e| FormatError::Delegate(format!("{}: {e}", R::METHOD)))
    }
}

#[tower_lsp::async_trait]
impl DelegatedFormatter for ClientDelegate {
    async fn on_auto_insert(
        &self,
        params: DelegatedOnAutoInsertParams,
    ) -> FormatResult<Option<DelegatedEdit>> {
        self.send::<DelegatedOnAutoInsert>(params).await
    }

    async fn completion(
        &self,
        params: DelegatedCompletionParams,
    ) -> FormatResult<Option<DelegatedCompletionList>> {
        self.send::<DelegatedCompletion>(params).await
    }

    async fn resolve_completion(
        &self,
        params: DelegatedCompletionResolveParams,
    ) -> FormatResult<CompletionItem> {
        self.send::<DelegatedCompletionResolve>(params).await
    }

    async fn formatting_options(
        &self,
        document: TextDocumentIdentifier,
    ) -> FormatResult<Option<FormattingOptions>> {
        self.send::<FormattingOptionsRequest>(document).await
    }
}

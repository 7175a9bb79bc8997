//! Template Language Server implementation.
//!
//! Templates mix host syntax, markup and embedded code. The server classifies every
//! offset, maps positions into per-language projections, and runs formatting edits
//! through a validating pipeline before they reach the editor.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService};

pub mod auto_insert;
pub mod debugging;
pub mod delegation;
pub mod document;
pub mod error;
pub mod formatting;
mod lsp;
pub mod reconcile;
pub mod settings;
pub mod template;
pub mod trigger;

pub use document::{DocumentSnapshot, DocumentStore, LineIndex, TextChange};
pub use error::{FormatError, FormatResult};
pub use lsp::{
    to_diagnostics, CompletionCache, CompletionOrigin, OnAutoInsertParams, OnAutoInsertResponse,
    ProximityExpressionsParams, ProximityExpressionsResponse,
};
pub use settings::{discover_settings, load_settings, LanguageOptions, OptionsMonitor};

use auto_insert::{AutoInsertRequest, AutoInsertService};
use delegation::{ClientDelegate, DelegatedFormatter};
use formatting::{FormattingService, IndentOptions, ValidationMode};
use reconcile::{DelegatedCompletionResolver, ResolveRequest};
use settings::FormatSettings;
use template::{ScanningEngine, TemplateEngine};
use trigger::{Routing, TriggerRequest, TriggerRouter};

pub struct Backend {
    client: Client,
    documents: DocumentStore,
    engine: Arc<dyn TemplateEngine>,
    options: OptionsMonitor,
    delegate: Arc<dyn DelegatedFormatter>,
    formatter: FormattingService,
    completions: CompletionCache,
    workspace_root: OnceLock<PathBuf>,
    /// Parent of every request token; cancelled on shutdown.
    shutdown: CancellationToken,
}

impl Backend {
    pub(crate) fn new(client: Client) -> Self {
        let engine = ScanningEngine::shared();
        Self {
            delegate: Arc::new(ClientDelegate::new(client.clone())),
            client,
            documents: DocumentStore::new(),
            formatter: FormattingService::new(Arc::clone(&engine), ValidationMode::Permissive),
            engine,
            options: OptionsMonitor::default(),
            completions: CompletionCache::new(),
            workspace_root: OnceLock::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Process document and publish diagnostics.
    async fn on_document_change(&self, uri: Url, text: String, version: i32) {
        match self
            .documents
            .open(self.engine.as_ref(), uri.clone(), text, version)
            .await
        {
            Ok(snapshot) => self.publish_diagnostics_for(&uri, &snapshot).await,
            Err(error) => tracing::warn!(%uri, %error, "failed to process document"),
        }
    }

    /// Publish diagnostics for a document.
    async fn publish_diagnostics_for(&self, uri: &Url, snapshot: &DocumentSnapshot) {
        let diagnostics = lsp::to_diagnostics(&snapshot.document.diagnostics, &snapshot.line_index);
        self.client
            .publish_diagnostics(uri.clone(), diagnostics, Some(snapshot.version))
            .await;
    }

    /// Current options with the request's indentation preferences on top.
    fn request_options(&self, options: &FormattingOptions) -> LanguageOptions {
        let current = *self.options.current();
        current.merged(&FormatSettings {
            tab_size: Some(options.tab_size),
            insert_spaces: Some(options.insert_spaces),
            ..Default::default()
        })
    }

    fn to_text_edits(snapshot: &DocumentSnapshot, changes: &[TextChange]) -> Vec<TextEdit> {
        changes
            .iter()
            .map(|change| snapshot.line_index.change_to_edit(change))
            .collect()
    }

    async fn on_auto_insert(
        &self,
        params: OnAutoInsertParams,
    ) -> Result<Option<OnAutoInsertResponse>> {
        let Some(snapshot) = self.documents.get(&params.text_document.uri) else {
            return Ok(None);
        };
        let Some(character) = params.ch.chars().next() else {
            return Ok(None);
        };
        let Some(offset) = snapshot.line_index.position_to_offset(params.position) else {
            return Ok(None);
        };
        let options = self.request_options(&params.options);

        let service = AutoInsertService::new(self.delegate.as_ref(), &self.formatter);
        let request = AutoInsertRequest {
            document: &params.text_document,
            snapshot: &snapshot,
            offset,
            character,
            options: &options,
        };
        match service
            .on_auto_insert(request, &self.shutdown.child_token())
            .await
        {
            Ok(response) => Ok(response.map(|response| OnAutoInsertResponse {
                text_edit: snapshot.line_index.change_to_edit(&response.edit),
                text_edit_format: response.format.into(),
            })),
            Err(error) => {
                tracing::warn!(%error, "auto-insert failed");
                Ok(None)
            }
        }
    }

    async fn proximity_expressions(
        &self,
        params: ProximityExpressionsParams,
    ) -> Result<Option<ProximityExpressionsResponse>> {
        let Some(snapshot) = self.documents.get(&params.text_document.uri) else {
            return Ok(None);
        };
        let Some(offset) = snapshot.line_index.position_to_offset(params.position) else {
            return Ok(None);
        };
        let expressions = debugging::proximity_expressions(&snapshot.document, offset);
        Ok((!expressions.is_empty()).then_some(ProximityExpressionsResponse { expressions }))
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        // Extract workspace root from params
        let workspace_root = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .and_then(|f| f.uri.to_file_path().ok())
            .or_else(|| {
                #[allow(deprecated)]
                params.root_uri.as_ref()?.to_file_path().ok()
            });

        if let Some(root) = workspace_root {
            let _ = self.workspace_root.set(root.clone());

            // Discover settings by walking up the directory tree
            let (settings, settings_dir) = settings::discover_settings(&root);
            tracing::info!(dir = %settings_dir.display(), "loaded settings");
            self.options.replace(settings.options());
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                document_formatting_provider: Some(OneOf::Left(true)),
                document_on_type_formatting_provider: Some(DocumentOnTypeFormattingOptions {
                    first_trigger_character: "}".to_string(),
                    more_trigger_character: Some(vec![
                        ";".to_string(),
                        "\n".to_string(),
                        "{".to_string(),
                    ]),
                }),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![
                        ".".to_string(),
                        "<".to_string(),
                        "@".to_string(),
                    ]),
                    resolve_provider: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "Template language server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        self.on_document_change(
            params.text_document.uri,
            params.text_document.text,
            params.text_document.version,
        )
        .await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        // We use FULL sync, so there's exactly one change with the full text
        if let Some(change) = params.content_changes.into_iter().next() {
            self.on_document_change(
                params.text_document.uri,
                change.text,
                params.text_document.version,
            )
            .await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.documents.close(&params.text_document.uri);
        // Clear diagnostics
        self.client
            .publish_diagnostics(params.text_document.uri, vec![], None)
            .await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        match settings::settings_from_client(&params.settings) {
            Some(format) => {
                self.options.apply(&format);
            }
            None => tracing::debug!("configuration change without format settings"),
        }
    }

    async fn formatting(&self, params: DocumentFormattingParams) -> Result<Option<Vec<TextEdit>>> {
        let Some(snapshot) = self.documents.get(&params.text_document.uri) else {
            return Ok(None);
        };
        let options = self.request_options(&params.options);
        if !options.formatting_enabled {
            return Ok(None);
        }

        match self
            .formatter
            .format_document(
                Arc::clone(&snapshot.document),
                IndentOptions::from(&options),
                &self.shutdown.child_token(),
            )
            .await
        {
            Ok(changes) => Ok(Some(Self::to_text_edits(&snapshot, &changes))),
            Err(error) => {
                tracing::warn!(uri = %params.text_document.uri, %error, "formatting failed");
                Ok(None)
            }
        }
    }

    async fn on_type_formatting(
        &self,
        params: DocumentOnTypeFormattingParams,
    ) -> Result<Option<Vec<TextEdit>>> {
        let position = params.text_document_position;
        let Some(snapshot) = self.documents.get(&position.text_document.uri) else {
            return Ok(None);
        };
        let (Some(character), Some(offset)) = (
            params.ch.chars().next(),
            snapshot.line_index.position_to_offset(position.position),
        ) else {
            return Ok(None);
        };
        let options = self.request_options(&params.options);

        let Some(trigger) = TriggerRequest::at(&snapshot.document, offset, character) else {
            return Ok(None);
        };
        let language = match TriggerRouter::on_type().route(&trigger, &options) {
            Routing::Routed(language) => language,
            Routing::Rejected(_) => return Ok(None),
        };

        match self
            .formatter
            .format_on_type(
                Arc::clone(&snapshot.document),
                IndentOptions::from(&options),
                offset,
                character,
                language,
                Vec::new(),
                &self.shutdown.child_token(),
            )
            .await
        {
            Ok(changes) if changes.is_empty() => Ok(None),
            Ok(changes) => Ok(Some(Self::to_text_edits(&snapshot, &changes))),
            Err(error) => {
                tracing::warn!(%error, "on-type formatting failed");
                Ok(None)
            }
        }
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let document = params.text_document_position.text_document;
        let Some(snapshot) = self.documents.get(&document.uri) else {
            tracing::debug!(uri = %document.uri, "no document found for completion");
            return Ok(None);
        };

        match lsp::delegated_completion(
            self.delegate.as_ref(),
            &self.completions,
            &snapshot,
            &document,
            params.text_document_position.position,
            params.context,
            &self.shutdown.child_token(),
        )
        .await
        {
            Ok(list) => Ok(list.map(CompletionResponse::List)),
            Err(error) => {
                tracing::warn!(%error, "completion failed");
                Ok(None)
            }
        }
    }

    async fn completion_resolve(&self, item: CompletionItem) -> Result<CompletionItem> {
        let cached = self.completions.last();
        let origin = CompletionOrigin::from_item(&item).or_else(|| {
            cached
                .as_ref()
                .filter(|list| list.find(&item.label).is_some())
                .map(|list| list.origin.clone())
        });
        let Some(origin) = origin else {
            return Ok(item);
        };
        let Some(snapshot) = self.documents.get(&origin.uri) else {
            return Ok(item);
        };
        let document = TextDocumentIdentifier::new(origin.uri.clone());
        let cached = cached.filter(|list| list.origin == origin);

        let options = match self.delegate.formatting_options(document.clone()).await {
            Ok(Some(client)) => self.request_options(&client),
            Ok(None) => *self.options.current(),
            Err(error) => {
                tracing::debug!(%error, "falling back to configured formatting options");
                *self.options.current()
            }
        };

        let resolver = DelegatedCompletionResolver::new(self.delegate.as_ref(), &self.formatter);
        let request = ResolveRequest {
            item: item.clone(),
            original: cached.as_ref().and_then(|list| list.find(&item.label)),
            list_data: cached.as_ref().and_then(|list| list.data.clone()),
            document,
            snapshot: &snapshot,
            language: origin.language,
            options: IndentOptions::from(&options),
        };
        match resolver.resolve(request, &self.shutdown.child_token()).await {
            Ok(resolved) => Ok(resolved),
            Err(error) => {
                tracing::warn!(label = %item.label, %error, "completion resolve failed");
                Ok(item)
            }
        }
    }
}

pub fn create_service() -> (LspService<Backend>, tower_lsp::ClientSocket) {
    LspService::build(Backend::new)
        .custom_method(lsp::ON_AUTO_INSERT, Backend::on_auto_insert)
        .custom_method(lsp::PROXIMITY_EXPRESSIONS, Backend::proximity_expressions)
        .finish()
}

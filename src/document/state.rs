//! Document state management for the template language server.

use std::sync::Arc;

use dashmap::DashMap;
use tower_lsp::lsp_types::Url;

use crate::template::{CodeDocument, EngineError, TemplateEngine};

use super::text::LineIndex;

/// One processed version of an open document.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    /// Engine output for this version.
    pub document: Arc<CodeDocument>,
    /// Pre-computed line index for position conversion.
    pub line_index: LineIndex,
    /// Document version from the client.
    pub version: i32,
}

impl DocumentSnapshot {
    pub fn new(document: CodeDocument, version: i32) -> Self {
        let line_index = LineIndex::new(document.source.clone());
        Self {
            document: Arc::new(document),
            line_index,
            version,
        }
    }

    pub fn source(&self) -> &str {
        &self.document.source
    }
}

/// Thread-safe storage for open documents.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: DashMap<Url, Arc<DocumentSnapshot>>,
}

impl DocumentStore {
    /// Create a new empty document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a document through the engine and store the result.
    ///
    /// The engine runs before the map is touched, so no shard lock is held across
    /// the await. A snapshot older than the stored one is returned but not stored.
    pub async fn open(
        &self,
        engine: &dyn TemplateEngine,
        uri: Url,
        source: String,
        version: i32,
    ) -> Result<Arc<DocumentSnapshot>, EngineError> {
        let document = engine.process(source).await?;
        let snapshot = Arc::new(DocumentSnapshot::new(document, version));

        match self.documents.entry(uri) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if entry.get().version > version {
                    tracing::debug!(
                        stored = entry.get().version,
                        version,
                        "ignoring stale document version"
                    );
                } else {
                    entry.insert(Arc::clone(&snapshot));
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&snapshot));
            }
        }
        Ok(snapshot)
    }

    /// Close a document.
    pub fn close(&self, uri: &Url) {
        self.documents.remove(uri);
    }

    /// Get a document's state.
    pub fn get(&self, uri: &Url) -> Option<Arc<DocumentSnapshot>> {
        self.documents.get(uri).map(|r| Arc::clone(&r))
    }
}

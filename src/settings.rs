//! Settings infrastructure for tmplsp.
//!
//! This module provides support for loading and parsing settings.toml files
//! to configure formatting and auto-insert behavior, and for keeping a live
//! snapshot of those options that the client can update at runtime.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Deserialize;

/// Root settings structure loaded from settings.toml.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    /// Formatting configuration.
    pub format: Option<FormatSettings>,
}

/// The `[format]` section. Every field is optional so partial files and partial
/// client updates only override what they mention.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FormatSettings {
    /// Master switch for all formatting requests.
    pub enabled: Option<bool>,

    /// Whether typing `}`, `;`, newline or `{` re-indents code and markup.
    #[serde(alias = "formatOnType")]
    pub format_on_type: Option<bool>,

    /// Whether typing `=` after a markup attribute name inserts quotes.
    #[serde(alias = "autoInsertAttributeQuotes")]
    pub auto_insert_attribute_quotes: Option<bool>,

    #[serde(alias = "tabSize")]
    pub tab_size: Option<u32>,

    #[serde(alias = "insertSpaces")]
    pub insert_spaces: Option<bool>,
}

/// Resolved options consulted on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageOptions {
    pub formatting_enabled: bool,
    pub format_on_type: bool,
    pub auto_insert_attribute_quotes: bool,
    pub tab_size: u32,
    pub insert_spaces: bool,
}

impl Default for LanguageOptions {
    fn default() -> Self {
        Self {
            formatting_enabled: true,
            format_on_type: true,
            auto_insert_attribute_quotes: true,
            tab_size: 4,
            insert_spaces: true,
        }
    }
}

impl LanguageOptions {
    /// Overlay the fields that `settings` sets.
    pub fn merged(self, settings: &FormatSettings) -> Self {
        Self {
            formatting_enabled: settings.enabled.unwrap_or(self.formatting_enabled),
            format_on_type: settings.format_on_type.unwrap_or(self.format_on_type),
            auto_insert_attribute_quotes: settings
                .auto_insert_attribute_quotes
                .unwrap_or(self.auto_insert_attribute_quotes),
            // A zero tab size would make every indentation level collapse.
            tab_size: settings
                .tab_size
                .filter(|&size| size > 0)
                .unwrap_or(self.tab_size),
            insert_spaces: settings.insert_spaces.unwrap_or(self.insert_spaces),
        }
    }
}

impl Settings {
    /// Resolve file settings on top of the defaults.
    pub fn options(&self) -> LanguageOptions {
        match &self.format {
            Some(format) => LanguageOptions::default().merged(format),
            None => LanguageOptions::default(),
        }
    }
}

/// Load settings from a settings.toml file.
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(path: &Path) -> Settings {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse settings.toml");
                Settings::default()
            }
        },
        Err(_) => Settings::default(),
    }
}

/// Discover settings.toml by searching up the directory tree, then direct children.
///
/// Search order:
/// 1. Walk up from `start_dir` to filesystem root
/// 2. If not found, check immediate child directories of `start_dir`
///
/// Returns `(settings, settings_dir)` where `settings_dir` is the directory
/// containing the found settings.toml.
/// If not found, returns `(Settings::default(), start_dir)`.
pub fn discover_settings(start_dir: &Path) -> (Settings, PathBuf) {
    // Phase 1: Walk up from start_dir
    let mut current = Some(start_dir);
    while let Some(dir) = current {
        let candidate = dir.join("settings.toml");
        if candidate.is_file() {
            return (load_settings(&candidate), dir.to_path_buf());
        }
        current = dir.parent();
    }

    // Phase 2: Check immediate child directories
    if let Ok(entries) = std::fs::read_dir(start_dir) {
        for entry in entries.flatten() {
            if entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
                let candidate = entry.path().join("settings.toml");
                if candidate.is_file() {
                    return (load_settings(&candidate), entry.path());
                }
            }
        }
    }

    (Settings::default(), start_dir.to_path_buf())
}

/// Parse a `workspace/didChangeConfiguration` payload.
///
/// Accepts either `{"tmpl": {"format": {..}}}` or the `tmpl` object itself.
pub fn settings_from_client(value: &serde_json::Value) -> Option<FormatSettings> {
    let section = value.get("tmpl").unwrap_or(value);
    let format = section.get("format")?;
    match serde_json::from_value(format.clone()) {
        Ok(settings) => Some(settings),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed client configuration");
            None
        }
    }
}

/// Live options snapshot shared by every request.
///
/// Readers get a consistent `Arc` without locking; updates swap the whole value.
#[derive(Debug)]
pub struct OptionsMonitor {
    snap: ArcSwap<LanguageOptions>,
}

impl Default for OptionsMonitor {
    fn default() -> Self {
        Self::new(LanguageOptions::default())
    }
}

impl OptionsMonitor {
    pub fn new(options: LanguageOptions) -> Self {
        Self {
            snap: ArcSwap::from_pointee(options),
        }
    }

    pub fn current(&self) -> Arc<LanguageOptions> {
        self.snap.load_full()
    }

    pub fn replace(&self, options: LanguageOptions) {
        self.snap.store(Arc::new(options));
    }

    /// Overlay client-provided settings on the current snapshot.
    pub fn apply(&self, settings: &FormatSettings) -> LanguageOptions {
        let updated = self.current().merged(settings);
        self.replace(updated);
        tracing::info!(?updated, "language options updated");
        updated
    }
}

//! Trigger character routing for on-type formatting and auto-insert.
//!
//! Editors may broadcast trigger characters registered by any extension, so each
//! language only reacts to a small allow-list. The allow-list is consulted before
//! configuration: a foreign character is rejected whatever the options say.

use std::fmt;

use crate::document::Language;
use crate::settings::LanguageOptions;
use crate::template::CodeDocument;

/// Which feature a trigger character arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerMode {
    OnType,
    AutoInsert,
}

impl TriggerMode {
    /// Characters a language reacts to in this mode.
    pub fn allow_list(self, language: Language) -> &'static [char] {
        match (self, language) {
            (TriggerMode::OnType, Language::Code) => &['}', ';'],
            (TriggerMode::OnType, Language::Markup) => &['\n', '{', '}', ';'],
            (TriggerMode::AutoInsert, Language::Code) => &['\'', '/', '\n'],
            (TriggerMode::AutoInsert, Language::Markup) => &['='],
            (_, Language::Host) => &[],
        }
    }
}

/// A trigger character and the classification of the cursor it was typed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerRequest {
    /// Cursor offset after the character was typed.
    pub offset: usize,
    pub character: char,
    pub language_at_offset: Language,
    /// The cursor sits in a component attribute value, which is code.
    pub in_attribute_value: bool,
}

impl TriggerRequest {
    /// Classify the cursor in `document`. `None` if the offset is past the end.
    pub fn at(document: &CodeDocument, offset: usize, character: char) -> Option<Self> {
        let span = document.spans.classify(offset, false)?;
        Some(Self {
            offset,
            character,
            language_at_offset: span.language,
            in_attribute_value: span.is_attribute_value(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The character means nothing to the language at the cursor.
    NotInAllowList,
    /// The behavior is switched off in the options.
    Disabled,
    /// The cursor sits in template syntax, which has no language service.
    HostSyntax,
    /// The cursor could not be classified.
    UnknownPosition,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RejectReason::NotInAllowList => "character not in allow-list",
            RejectReason::Disabled => "disabled by configuration",
            RejectReason::HostSyntax => "position is template syntax",
            RejectReason::UnknownPosition => "position could not be classified",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    Routed(Language),
    Rejected(RejectReason),
}

impl Routing {
    pub fn language(self) -> Option<Language> {
        match self {
            Routing::Routed(language) => Some(language),
            Routing::Rejected(_) => None,
        }
    }
}

/// Decides which sub-language, if any, handles a trigger character.
#[derive(Debug, Clone, Copy)]
pub struct TriggerRouter {
    mode: TriggerMode,
}

impl TriggerRouter {
    pub fn new(mode: TriggerMode) -> Self {
        Self { mode }
    }

    pub fn on_type() -> Self {
        Self::new(TriggerMode::OnType)
    }

    pub fn auto_insert() -> Self {
        Self::new(TriggerMode::AutoInsert)
    }

    pub fn mode(&self) -> TriggerMode {
        self.mode
    }

    pub fn route(&self, request: &TriggerRequest, options: &LanguageOptions) -> Routing {
        let routing = self.decide(request, options);
        tracing::debug!(
            mode = ?self.mode,
            character = ?request.character,
            language = %request.language_at_offset,
            ?routing,
            "routed trigger"
        );
        routing
    }

    fn decide(&self, request: &TriggerRequest, options: &LanguageOptions) -> Routing {
        let language = match (self.mode, request.language_at_offset) {
            // Quoting an attribute value is markup behavior even though the value is code.
            (TriggerMode::AutoInsert, Language::Code) if request.in_attribute_value => {
                Language::Markup
            }
            (_, Language::Host) => return Routing::Rejected(RejectReason::HostSyntax),
            (_, language) => language,
        };

        if !self.mode.allow_list(language).contains(&request.character) {
            return Routing::Rejected(RejectReason::NotInAllowList);
        }

        let enabled = match (self.mode, language) {
            (TriggerMode::OnType, _) => options.formatting_enabled && options.format_on_type,
            (TriggerMode::AutoInsert, Language::Markup) => {
                request.character != '=' || options.auto_insert_attribute_quotes
            }
            (TriggerMode::AutoInsert, _) => options.format_on_type,
        };
        if !enabled {
            return Routing::Rejected(RejectReason::Disabled);
        }

        Routing::Routed(language)
    }
}

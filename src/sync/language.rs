//! Display-language resolution
//!
//! Picks the title and overview shown for a record, preferring the target
//! language and script:
//!
//! 1. a translation in the target language overrides each non-empty field;
//! 2. without a translated title, or when the title is not in the target
//!    script, the first alternative title tagged with the target country or
//!    language that *is* in the target script;
//! 3. an empty overview falls back to the tagline when the tagline is in the
//!    target script;
//! 4. an empty title falls back to the original title.

use crate::config::ApiConfig;
use crate::sync::source::RawRecord;

/// Writing system a display string must use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Cyrillic,
    Latin,
    /// Any non-empty text qualifies
    Any,
}

impl Script {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cyrillic" => Some(Self::Cyrillic),
            "latin" => Some(Self::Latin),
            "any" => Some(Self::Any),
            _ => None,
        }
    }

    /// Whether `text` contains at least one letter of this script
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Cyrillic => text
                .chars()
                .flat_map(char::to_lowercase)
                .any(|c| ('а'..='я').contains(&c)),
            Self::Latin => text.chars().any(|c| c.is_ascii_alphabetic()),
            Self::Any => !text.trim().is_empty(),
        }
    }
}

/// Target language, country and script for display fields
#[derive(Debug, Clone)]
pub struct LanguagePreference {
    pub language: String,
    pub country: String,
    pub script: Script,
}

impl LanguagePreference {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            language: config.target_language.clone(),
            country: config.target_country.clone(),
            script: Script::parse(&config.target_script).unwrap_or(Script::Any),
        }
    }
}

/// The resolved display fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayText {
    pub title: String,
    pub overview: String,
}

/// Resolves the display title and overview of a record
pub fn resolve_display(record: &RawRecord, prefs: &LanguagePreference) -> DisplayText {
    let mut title = if record.title.is_empty() {
        record.original_title.clone()
    } else {
        record.title.clone()
    };
    let mut overview = record.overview.clone();
    let mut tagline = record.tagline.clone();
    let mut translated_title = false;

    if let Some(variant) = record
        .language_variants
        .iter()
        .find(|v| v.lang_code == prefs.language)
    {
        if !variant.overview.is_empty() {
            overview = variant.overview.clone();
        }
        if !variant.title.is_empty() {
            title = variant.title.clone();
            translated_title = true;
        }
        if !variant.tagline.is_empty() {
            tagline = variant.tagline.clone();
        }
    }

    if !translated_title || !prefs.script.matches(&title) {
        if let Some(alt) = record.alt_titles.iter().find(|a| {
            (a.country == prefs.country || a.lang == prefs.language)
                && !a.title.is_empty()
                && prefs.script.matches(&a.title)
        }) {
            title = alt.title.clone();
        }
    }

    if overview.is_empty() && prefs.script.matches(&tagline) {
        overview = tagline;
    }

    if title.is_empty() {
        title = record.original_title.clone();
    }

    DisplayText { title, overview }
}

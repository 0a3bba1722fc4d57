//! Localized labels
//!
//! A label carries the same text in each supported language. The set of
//! languages is closed: adding one means adding a field and an enum variant.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use unicode_normalization::UnicodeNormalization;

use crate::error::{Error, Result};

/// Languages a label can be written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    De,
    Fr,
    It,
    En,
}

impl Language {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::De => "de",
            Self::Fr => "fr",
            Self::It => "it",
            Self::En => "en",
        }
    }

    /// Get all languages
    pub fn all() -> [Self; 4] {
        [Self::De, Self::Fr, Self::It, Self::En]
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "de" => Ok(Self::De),
            "fr" => Ok(Self::Fr),
            "it" => Ok(Self::It),
            "en" => Ok(Self::En),
            other => Err(Error::InvalidQuery(format!(
                "unsupported language '{}', expected one of de, fr, it, en",
                other
            ))),
        }
    }
}

/// The same label in every supported language
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Localized {
    #[serde(default)]
    pub de: Option<String>,
    #[serde(default)]
    pub fr: Option<String>,
    #[serde(default)]
    pub it: Option<String>,
    #[serde(default)]
    pub en: Option<String>,
}

impl Localized {
    /// Decode the JSON blob stored with each code.
    ///
    /// Unknown keys are ignored; anything that is not a JSON object with
    /// string-or-null language fields is a decode error.
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::Decode(format!("{} in label {:?}", e, raw)))
    }

    /// Encode to the stored JSON blob
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Decode(e.to_string()))
    }

    /// Text in the given language; blank text counts as absent
    pub fn get(&self, language: Language) -> Option<&str> {
        let field = match language {
            Language::De => &self.de,
            Language::Fr => &self.fr,
            Language::It => &self.it,
            Language::En => &self.en,
        };
        field.as_deref().filter(|text| !text.trim().is_empty())
    }

    /// Text in the given language, falling back to the first language that has one
    pub fn get_or_any(&self, language: Language) -> Option<&str> {
        self.get(language)
            .or_else(|| Language::all().into_iter().find_map(|l| self.get(l)))
    }

    /// True when no language carries text
    pub fn is_empty(&self) -> bool {
        Language::all().into_iter().all(|l| self.get(l).is_none())
    }

    /// Same label with every text in Unicode NFC
    pub fn normalized(self) -> Self {
        let nfc = |text: Option<String>| text.map(|t| t.nfc().collect::<String>());
        Self {
            de: nfc(self.de),
            fr: nfc(self.fr),
            it: nfc(self.it),
            en: nfc(self.en),
        }
    }

    /// Builder-style setter, mostly for fixtures and imports
    pub fn with(mut self, language: Language, text: impl Into<String>) -> Self {
        let text = Some(text.into());
        match language {
            Language::De => self.de = text,
            Language::Fr => self.fr = text,
            Language::It => self.it = text,
            Language::En => self.en = text,
        }
        self
    }
}

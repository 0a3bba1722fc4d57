//! Text analysis shared by label indexing and query building
//!
//! Text is NFC-normalized, lowercased and split into words on anything that
//! is not alphanumeric, matching what the `unicode61` FTS5 tokenizer does.
//! Localized matching additionally runs every word through the Snowball
//! stemmer of its language, once when a label is indexed and once when a
//! query is built, so both sides meet on the same stems.

use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::UnicodeNormalization;

use super::label::Language;

/// Split text into lowercase words
pub fn split_words(text: &str) -> Vec<String> {
    let composed: String = text.nfc().collect();
    composed
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Snowball stemmer for a language
pub fn stemmer(language: Language) -> Stemmer {
    let algorithm = match language {
        Language::De => Algorithm::German,
        Language::Fr => Algorithm::French,
        Language::It => Algorithm::Italian,
        Language::En => Algorithm::English,
    };
    Stemmer::create(algorithm)
}

/// Stem already split, lowercase words
pub fn stem_words(language: Language, words: &[String]) -> Vec<String> {
    let stemmer = stemmer(language);
    words.iter().map(|w| stemmer.stem(w).into_owned()).collect()
}

/// Stemmed form of a label, as stored in the per-language index
pub fn stemmed_text(language: Language, text: &str) -> String {
    stem_words(language, &split_words(text)).join(" ")
}

//! Full-text predicates over localized labels
//!
//! A raw query string is parsed with web-search semantics (quoted phrases,
//! `-` negation, implicit AND, `or` for disjunction), filtered and stemmed
//! through the text-search configuration of the requested language, and
//! rendered to an FTS5 match expression. The rendered expression is always handed to the
//! store as a bound parameter; only the static identifiers of the chosen
//! configuration end up in SQL text.

use std::fmt;

use super::analysis::{split_words, stem_words};
use super::label::Language;

/// FTS5 table indexing every language column with diacritic folding
pub const LABELS_FTS_TABLE: &str = "cpv_labels_fts";

/// FTS5 table holding each language column as Snowball stems
pub const LABELS_STEMMED_FTS_TABLE: &str = "cpv_labels_stemmed_fts";

/// How one language (or all of them at once) is tokenized and matched
#[derive(Debug, PartialEq, Eq)]
pub struct TextSearchConfig {
    /// Configuration name, for logs
    pub name: &'static str,
    /// Language this configuration applies to, `None` for cross-language search
    pub language: Option<Language>,
    /// FTS5 table holding the tokenized labels
    pub fts_table: &'static str,
    /// Column filter inside the table, `None` to match every indexed column
    pub column: Option<&'static str>,
    /// Words dropped from queries, before stemming
    pub stop_words: &'static [&'static str],
}

static GERMAN: TextSearchConfig = TextSearchConfig {
    name: "german",
    language: Some(Language::De),
    fts_table: LABELS_STEMMED_FTS_TABLE,
    column: Some("de"),
    stop_words: &[
        "aber", "als", "am", "an", "auf", "aus", "bei", "bis", "das", "dass", "dem", "den",
        "der", "des", "die", "ein", "eine", "einem", "einen", "einer", "eines", "für", "im",
        "in", "ist", "mit", "nach", "nicht", "oder", "sich", "so", "und", "von", "vom", "zu",
        "zum", "zur", "über", "unter",
    ],
};

static FRENCH: TextSearchConfig = TextSearchConfig {
    name: "french",
    language: Some(Language::Fr),
    fts_table: LABELS_STEMMED_FTS_TABLE,
    column: Some("fr"),
    stop_words: &[
        "à", "au", "aux", "avec", "ce", "ces", "dans", "de", "des", "du", "en", "et", "il",
        "la", "le", "les", "leur", "l", "d", "ou", "par", "pas", "pour", "qui", "que", "sa",
        "se", "ses", "son", "sur", "un", "une",
    ],
};

static ITALIAN: TextSearchConfig = TextSearchConfig {
    name: "italian",
    language: Some(Language::It),
    fts_table: LABELS_STEMMED_FTS_TABLE,
    column: Some("it"),
    stop_words: &[
        "a", "ad", "al", "alla", "alle", "agli", "ai", "con", "da", "dal", "dalla", "dei",
        "del", "della", "delle", "degli", "di", "e", "ed", "gli", "i", "il", "in", "l", "la",
        "le", "lo", "nel", "nella", "o", "per", "su", "sul", "sulla", "un", "una", "uno",
    ],
};

static ENGLISH: TextSearchConfig = TextSearchConfig {
    name: "english",
    language: Some(Language::En),
    fts_table: LABELS_STEMMED_FTS_TABLE,
    column: Some("en"),
    stop_words: &[
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is",
        "it", "of", "on", "or", "that", "the", "their", "this", "to", "with", "without",
    ],
};

static CROSS_LANGUAGE: TextSearchConfig = TextSearchConfig {
    name: "simple",
    language: None,
    fts_table: LABELS_FTS_TABLE,
    column: None,
    stop_words: &[],
};

impl TextSearchConfig {
    /// Configuration for a single language
    pub fn for_language(language: Language) -> &'static TextSearchConfig {
        match language {
            Language::De => &GERMAN,
            Language::Fr => &FRENCH,
            Language::It => &ITALIAN,
            Language::En => &ENGLISH,
        }
    }

    /// Configuration matching every language field at once
    pub fn cross_language() -> &'static TextSearchConfig {
        &CROSS_LANGUAGE
    }

    fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(&word)
    }

    fn stem(&self, words: Vec<String>) -> Vec<String> {
        match self.language {
            Some(language) => stem_words(language, &words),
            None => words,
        }
    }
}

/// A word or an exact phrase of a web-search query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Word(String),
    Phrase(Vec<String>),
}

impl Term {
    fn from_words(mut words: Vec<String>) -> Option<Self> {
        match words.len() {
            0 => None,
            1 => words.pop().map(Term::Word),
            _ => Some(Term::Phrase(words)),
        }
    }

    fn words(&self) -> &[String] {
        match self {
            Term::Word(word) => std::slice::from_ref(word),
            Term::Phrase(words) => words,
        }
    }

    fn stemmed(self, config: &TextSearchConfig) -> Self {
        match self {
            Term::Word(word) => Term::Word(config.stem(vec![word]).concat()),
            Term::Phrase(words) => Term::Phrase(config.stem(words)),
        }
    }

    fn to_fts5(&self) -> String {
        quote_fts5(&self.words().join(" "))
    }
}

/// Conjunction of required and excluded terms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clause {
    pub include: Vec<Term>,
    pub exclude: Vec<Term>,
}

impl Clause {
    fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    fn to_fts5(&self) -> String {
        let include: Vec<String> = self.include.iter().map(Term::to_fts5).collect();
        let mut rendered = format!("({})", include.join(" AND "));
        for term in &self.exclude {
            rendered.push_str(" NOT ");
            rendered.push_str(&term.to_fts5());
        }
        format!("({})", rendered)
    }
}

/// A query parsed with web-search semantics: a disjunction of clauses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebSearchQuery {
    pub clauses: Vec<Clause>,
}

impl WebSearchQuery {
    /// Parse raw user input
    pub fn parse(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let mut clauses = Vec::new();
        let mut current = Clause::default();
        let mut negate = false;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            if c.is_whitespace() {
                negate = false;
                i += 1;
                continue;
            }

            if c == '-' && !negate {
                negate = true;
                i += 1;
                continue;
            }

            let (text, quoted) = if c == '"' {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|c| *c == '"')
                    .map(|offset| start + offset)
                    .unwrap_or(chars.len());
                i = end + 1;
                (chars[start..end].iter().collect::<String>(), true)
            } else {
                let start = i;
                while i < chars.len() && !chars[i].is_whitespace() && chars[i] != '"' {
                    i += 1;
                }
                (chars[start..i].iter().collect::<String>(), false)
            };

            if !quoted && !negate && text.eq_ignore_ascii_case("or") {
                if !current.is_empty() {
                    clauses.push(std::mem::take(&mut current));
                }
                continue;
            }

            if let Some(term) = Term::from_words(split_words(&text)) {
                if negate {
                    current.exclude.push(term);
                } else {
                    current.include.push(term);
                }
            }
            negate = false;
        }

        if !current.is_empty() {
            clauses.push(current);
        }

        Self { clauses }
    }

    /// Drop stop words and clauses that can no longer match anything, then
    /// stem what is left.
    ///
    /// Phrases are kept whole unless every word in them is a stop word, so
    /// adjacency still holds against the indexed text.
    fn analyzed(self, config: &TextSearchConfig) -> Self {
        let keep = |term: &Term| !term.words().iter().all(|w| config.is_stop_word(w));
        let analyze = |terms: Vec<Term>| -> Vec<Term> {
            terms
                .into_iter()
                .filter(|t| keep(t))
                .map(|t| t.stemmed(config))
                .collect()
        };
        let clauses = self
            .clauses
            .into_iter()
            .map(|clause| Clause {
                include: analyze(clause.include),
                exclude: analyze(clause.exclude),
            })
            .filter(|clause| !clause.include.is_empty())
            .collect();
        Self { clauses }
    }

    fn to_fts5(&self) -> String {
        self.clauses
            .iter()
            .map(Clause::to_fts5)
            .collect::<Vec<_>>()
            .join(" OR ")
    }
}

/// Search condition over localized labels, evaluated by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Matches no code at all; the store is not consulted
    MatchNothing,
    /// Matches labels against a filtered web-search query
    Match {
        config: &'static TextSearchConfig,
        query: WebSearchQuery,
    },
}

impl Predicate {
    /// Build the predicate for a raw query and optional language.
    ///
    /// A blank query, or one left with no positive term after stop-word
    /// filtering, matches nothing. Terms are stemmed with the language's
    /// Snowball stemmer; cross-language search matches words as written.
    pub fn build(query: &str, language: Option<Language>) -> Self {
        let config = match language {
            Some(language) => TextSearchConfig::for_language(language),
            None => TextSearchConfig::cross_language(),
        };

        let parsed = WebSearchQuery::parse(query).analyzed(config);
        if parsed.clauses.is_empty() {
            return Self::MatchNothing;
        }

        Self::Match {
            config,
            query: parsed,
        }
    }

    pub fn is_match_nothing(&self) -> bool {
        matches!(self, Self::MatchNothing)
    }

    /// Text-search configuration in use, `None` when matching nothing
    pub fn config(&self) -> Option<&'static TextSearchConfig> {
        match self {
            Self::MatchNothing => None,
            Self::Match { config, .. } => Some(*config),
        }
    }

    /// FTS5 match expression to bind as a query parameter
    pub fn match_expression(&self) -> Option<String> {
        match self {
            Self::MatchNothing => None,
            Self::Match { config, query } => {
                let expression = query.to_fts5();
                Some(match config.column {
                    Some(column) => format!("{{{}}} : ({})", column, expression),
                    None => expression,
                })
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.config(), self.match_expression()) {
            (Some(config), Some(expression)) => {
                write!(f, "{}[{}] MATCH {}", config.fts_table, config.name, expression)
            }
            _ => write!(f, "<match nothing>"),
        }
    }
}

fn quote_fts5(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

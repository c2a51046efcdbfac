use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{BTreeSet, HashSet};
use stop_words::{get, LANGUAGE};
use unicode_normalization::UnicodeNormalization;

use crate::error::{AssistantError, Result};

/// Turns questions and schema text into comparable term sets
pub struct TextNormalizer {
    camel_case_regex: Regex,
    acronym_regex: Regex,
    special_chars_regex: Regex,
    extra_spaces_regex: Regex,
    stopwords: HashSet<String>,
    stemmer: Stemmer,
}

impl TextNormalizer {
    /// Create a normalizer for English text
    pub fn new() -> Result<Self> {
        // Initialize regular expressions for text cleaning
        let camel_case_regex = Regex::new(r"([a-z0-9])([A-Z])").map_err(|e| {
            AssistantError::Other(format!("Failed to compile camel case regex: {e}"))
        })?;
        let acronym_regex = Regex::new(r"([A-Z]+)([A-Z][a-z])").map_err(|e| {
            AssistantError::Other(format!("Failed to compile acronym regex: {e}"))
        })?;
        let special_chars_regex = Regex::new(r"[^\p{L}\p{N}\s]").map_err(|e| {
            AssistantError::Other(format!("Failed to compile special chars regex: {e}"))
        })?;
        let extra_spaces_regex = Regex::new(r"\s+")
            .map_err(|e| AssistantError::Other(format!("Failed to compile spaces regex: {e}")))?;

        // Initialize stopwords for English
        let stopwords: HashSet<String> = get(LANGUAGE::English)
            .iter()
            .map(ToString::to_string)
            .collect();

        // Initialize stemmer for English
        let stemmer = Stemmer::create(Algorithm::English);

        Ok(Self {
            camel_case_regex,
            acronym_regex,
            special_chars_regex,
            extra_spaces_regex,
            stopwords,
            stemmer,
        })
    }

    /// Normalize Unicode, split identifiers, strip punctuation and lowercase
    #[must_use]
    pub fn clean_text(&self, text: &str) -> String {
        // Normalize Unicode characters
        let normalized = text.nfc().collect::<String>();

        // Split identifiers: IncomePerCap -> Income Per Cap, HTTPStatus -> HTTP Status
        let split = self.acronym_regex.replace_all(&normalized, "$1 $2");
        let split = self.camel_case_regex.replace_all(&split, "$1 $2");

        // Replace punctuation and underscores with space
        let no_special = self.special_chars_regex.replace_all(&split, " ");

        // Normalize whitespace
        let normalized_spaces = self.extra_spaces_regex.replace_all(&no_special, " ");

        // Trim and convert to lowercase
        normalized_spaces.trim().to_lowercase()
    }

    /// Split cleaned text into words, dropping stopwords
    #[must_use]
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.split_whitespace()
            .filter(|s| !self.is_stopword(s))
            .map(ToString::to_string)
            .collect()
    }

    /// Every cleaned word of `text`, stopwords included
    #[must_use]
    pub fn words(&self, text: &str) -> Vec<String> {
        self.clean_text(text)
            .split_whitespace()
            .map(ToString::to_string)
            .collect()
    }

    /// Whether a lowercased word is on the stopword list
    #[must_use]
    pub fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.contains(word)
    }

    /// Stem a single token
    #[must_use]
    pub fn stem(&self, token: &str) -> String {
        self.stemmer.stem(token).into_owned()
    }

    /// Full pipeline: clean, tokenize and stem into a sorted, deduplicated set
    #[must_use]
    pub fn terms(&self, text: &str) -> BTreeSet<String> {
        self.tokenize(&self.clean_text(text))
            .iter()
            .map(|token| self.stem(token))
            .collect()
    }
}

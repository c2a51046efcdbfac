//! Relevance ranking of schema context for a question.
//!
//! Scoring is delegated to a [`ScoringStrategy`]; the ranker owns filtering,
//! ordering and truncation so every strategy gets the same deterministic
//! contract: descending score, ties broken by catalog declaration order.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::catalog::SchemaCatalog;
use crate::error::{AssistantError, Result};
use crate::models::{ContextTarget, RankedContextItem};
use crate::nlp::TextNormalizer;

/// Relevance scoring capability
pub trait ScoringStrategy: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &'static str;

    /// Relevance of `target` to `question`, in `[0, 1]`
    fn score(&self, question: &str, target: ContextTarget<'_>) -> f64;
}

/// Normalized term overlap between the question and the descriptor text
pub struct LexicalStrategy {
    normalizer: TextNormalizer,
}

impl LexicalStrategy {
    /// Create the strategy with an English normalizer
    pub fn new() -> Result<Self> {
        Ok(Self {
            normalizer: TextNormalizer::new()?,
        })
    }

    fn target_text(target: ContextTarget<'_>) -> String {
        match target {
            ContextTarget::Table(table) => {
                let mut text = format!("{} {}", table.name, table.description);
                for column in &table.columns {
                    text.push(' ');
                    text.push_str(&column.name);
                    text.push(' ');
                    text.push_str(&column.description);
                }
                text
            }
            ContextTarget::Column { table, column } => {
                format!("{} {} {}", table.name, column.name, column.description)
            }
        }
    }

    /// Words of the table and column names, which are never treated as stopwords
    fn identifier_words(&self, target: ContextTarget<'_>) -> HashSet<String> {
        let mut words: HashSet<String> = self
            .normalizer
            .words(&target.table().name)
            .into_iter()
            .collect();
        match target {
            ContextTarget::Table(table) => {
                for column in &table.columns {
                    words.extend(self.normalizer.words(&column.name));
                }
            }
            ContextTarget::Column { column, .. } => {
                words.extend(self.normalizer.words(&column.name));
            }
        }
        words
    }
}

impl ScoringStrategy for LexicalStrategy {
    fn name(&self) -> &'static str {
        "lexical"
    }

    #[allow(clippy::cast_precision_loss)]
    fn score(&self, question: &str, target: ContextTarget<'_>) -> f64 {
        let identifiers = self.identifier_words(target);
        let question_terms: BTreeSet<String> = self
            .normalizer
            .words(question)
            .iter()
            .filter(|word| !self.normalizer.is_stopword(word) || identifiers.contains(*word))
            .map(|word| self.normalizer.stem(word))
            .collect();
        if question_terms.is_empty() {
            return 0.0;
        }

        let mut target_terms = self.normalizer.terms(&Self::target_text(target));
        target_terms.extend(identifiers.iter().map(|word| self.normalizer.stem(word)));
        let matched = question_terms
            .iter()
            .filter(|term| target_terms.contains(*term))
            .count();
        matched as f64 / question_terms.len() as f64
    }
}

/// Selects the most relevant tables or columns for a question
#[derive(Clone)]
pub struct ContextRanker {
    strategy: Arc<dyn ScoringStrategy>,
    relevance_floor: f64,
}

impl ContextRanker {
    /// Ranker over an arbitrary strategy
    pub fn new(strategy: Arc<dyn ScoringStrategy>, relevance_floor: f64) -> Self {
        Self {
            strategy,
            relevance_floor,
        }
    }

    /// Ranker using the lexical baseline
    pub fn lexical(relevance_floor: f64) -> Result<Self> {
        Ok(Self::new(Arc::new(LexicalStrategy::new()?), relevance_floor))
    }

    /// Name of the active strategy
    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Rank whole tables, at most `max_items` of them
    pub fn rank<'c>(
        &self,
        question: &str,
        catalog: &'c SchemaCatalog,
        max_items: usize,
    ) -> Result<Vec<RankedContextItem<'c>>> {
        Self::check_question(question)?;
        let candidates = catalog.all_tables().iter().map(ContextTarget::Table);
        Ok(self.select(question, candidates, max_items))
    }

    /// Rank individual columns across the catalog, at most `max_items` of them
    pub fn rank_columns<'c>(
        &self,
        question: &str,
        catalog: &'c SchemaCatalog,
        max_items: usize,
    ) -> Result<Vec<RankedContextItem<'c>>> {
        Self::check_question(question)?;
        let candidates = catalog.all_tables().iter().flat_map(|table| {
            table
                .columns
                .iter()
                .map(move |column| ContextTarget::Column { table, column })
        });
        Ok(self.select(question, candidates, max_items))
    }

    fn check_question(question: &str) -> Result<()> {
        if question.trim().is_empty() {
            return Err(AssistantError::EmptyQuestion);
        }
        Ok(())
    }

    fn select<'c>(
        &self,
        question: &str,
        candidates: impl Iterator<Item = ContextTarget<'c>>,
        max_items: usize,
    ) -> Vec<RankedContextItem<'c>> {
        let mut scored: Vec<(usize, ContextTarget<'c>, f64)> = candidates
            .enumerate()
            .map(|(position, target)| {
                let raw = self.strategy.score(question, target);
                let score = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };
                (position, target, score)
            })
            .filter(|(_, _, score)| *score > 0.0 && *score >= self.relevance_floor)
            .collect();

        scored.sort_by(|a, b| match b.2.total_cmp(&a.2) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        scored.truncate(max_items);

        let ranked: Vec<RankedContextItem<'c>> = scored
            .into_iter()
            .enumerate()
            .map(|(i, (_, target, score))| RankedContextItem {
                target,
                score,
                rank: i + 1,
            })
            .collect();

        debug!(
            strategy = self.strategy.name(),
            floor = self.relevance_floor,
            selected = ranked.len(),
            top = ?ranked.first().map(|item| item.target.label()),
            "Ranked schema context"
        );
        ranked
    }
}

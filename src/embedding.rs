//! Embedding-based relevance scoring.
//!
//! Table documents are embedded once when the service starts. Each question
//! is embedded per request and compared to the table vectors with cosine
//! similarity; column targets use their owning table's vector.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::catalog::SchemaCatalog;
use crate::error::{AssistantError, Result};
use crate::models::{ContextTarget, TableDescriptor};
use crate::provider::{EmbeddingProvider, EmbeddingTask};
use crate::ranker::ScoringStrategy;

/// Precomputed vectors for every catalog table
#[derive(Debug, Clone, Default)]
pub struct SchemaEmbeddings {
    tables: Arc<HashMap<String, Vec<f32>>>,
}

impl SchemaEmbeddings {
    /// Embed every table of `catalog` as a retrieval document
    pub async fn build(provider: &dyn EmbeddingProvider, catalog: &SchemaCatalog) -> Result<Self> {
        let texts: Vec<String> = catalog.all_tables().iter().map(table_document).collect();
        if texts.is_empty() {
            return Ok(Self::default());
        }

        let vectors = provider.embed(&texts, EmbeddingTask::RetrievalDocument).await?;
        if vectors.len() != texts.len() {
            return Err(AssistantError::Other(format!(
                "{} returned {} embeddings for {} tables",
                provider.name(),
                vectors.len(),
                texts.len()
            )));
        }

        let tables: HashMap<String, Vec<f32>> = catalog
            .table_names()
            .map(str::to_string)
            .zip(vectors)
            .collect();
        info!(tables = tables.len(), provider = provider.name(), "Schema embeddings built");
        Ok(Self {
            tables: Arc::new(tables),
        })
    }

    /// Wrap vectors computed elsewhere
    #[must_use]
    pub fn from_vectors(tables: HashMap<String, Vec<f32>>) -> Self {
        Self {
            tables: Arc::new(tables),
        }
    }

    /// Number of embedded tables
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// True when nothing was embedded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Embed `question` and return a strategy scoring against it
    pub async fn strategy_for(
        &self,
        provider: &dyn EmbeddingProvider,
        question: &str,
    ) -> Result<EmbeddingStrategy> {
        let mut vectors = provider
            .embed(&[question.to_string()], EmbeddingTask::RetrievalQuery)
            .await?;
        let question_vector = vectors
            .pop()
            .ok_or_else(|| AssistantError::Other("no embedding returned for question".to_string()))?;
        debug!(dimensions = question_vector.len(), "Question embedded");
        Ok(EmbeddingStrategy {
            question: question_vector,
            tables: Arc::clone(&self.tables),
        })
    }
}

/// Cosine similarity between one question vector and the table vectors
pub struct EmbeddingStrategy {
    question: Vec<f32>,
    tables: Arc<HashMap<String, Vec<f32>>>,
}

impl ScoringStrategy for EmbeddingStrategy {
    fn name(&self) -> &'static str {
        "embedding"
    }

    fn score(&self, _question: &str, target: ContextTarget<'_>) -> f64 {
        self.tables
            .get(&target.table().name)
            .map_or(0.0, |vector| cosine_similarity(&self.question, vector).max(0.0))
    }
}

/// Cosine similarity; 0 for mismatched dimensions or zero vectors
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Text embedded for a table: name, description and column summaries
#[must_use]
pub fn table_document(table: &TableDescriptor) -> String {
    let mut text = format!("Table: {}\n{}\n", table.name, table.description);
    for column in &table.columns {
        text.push_str(&format!("{}: {}\n", column.name, column.description));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SchemaDocument;
    use crate::provider::{CompletionError, MockEmbeddingProvider};

    fn catalog() -> SchemaCatalog {
        let docs = ["weather", "sales"].into_iter().map(|name| {
            SchemaDocument::new(
                name,
                format!(
                    "Table Name: {name}\nTable Description: {name} facts.\nColumns:\n\
                     1. Column: Id\n   Type: STRING\n   Mode: REQUIRED\n   Description: Key.\n\
                     CREATE TABLE {name} (Id STRING);\n"
                ),
            )
        });
        SchemaCatalog::load(docs).expect("catalog")
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).abs() < f64::EPSILON);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_build_and_score() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed()
            .withf(|_, task| *task == EmbeddingTask::RetrievalDocument)
            .times(1)
            .returning(|texts, _| {
                Ok(texts
                    .iter()
                    .map(|t| if t.contains("weather") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
                    .collect())
            });
        provider
            .expect_embed()
            .withf(|_, task| *task == EmbeddingTask::RetrievalQuery)
            .returning(|_, _| Ok(vec![vec![0.9, 0.1]]));
        provider.expect_name().return_const("mock");

        let catalog = catalog();
        let embeddings = SchemaEmbeddings::build(&provider, &catalog).await.expect("build");
        assert_eq!(embeddings.len(), 2);

        let strategy = embeddings
            .strategy_for(&provider, "is it raining")
            .await
            .expect("strategy");
        let weather = ContextTarget::Table(catalog.lookup("weather").expect("weather"));
        let sales = ContextTarget::Table(catalog.lookup("sales").expect("sales"));
        assert!(strategy.score("", weather) > strategy.score("", sales));
    }

    #[tokio::test]
    async fn test_build_propagates_provider_failure() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed()
            .returning(|_, _| Err(CompletionError::Unavailable("mock".to_string())));

        let result = SchemaEmbeddings::build(&provider, &catalog()).await;
        assert!(matches!(result, Err(AssistantError::Completion(_))));
    }
}

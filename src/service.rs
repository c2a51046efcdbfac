use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::catalog::SchemaCatalog;
use crate::embedding::SchemaEmbeddings;
use crate::error::Result;
use crate::gateway::GenerationGateway;
use crate::logging::OperationTimer;
use crate::metrics::MetricsCollector;
use crate::models::{FallbackReason, GenerationResult, Prompt, RankedContextItem, RefusalCause};
use crate::prompt::PromptAssembler;
use crate::provider::{CompletionProvider, EmbeddingProvider};
use crate::ranker::ContextRanker;
use crate::validation::QuestionValidator;

/// Per-request knobs of the pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    /// Upper bound on ranked context items
    pub max_context_items: usize,
    /// Prompt length limit in characters
    pub char_budget: usize,
    /// Minimum relevance for an item to be kept
    pub relevance_floor: f64,
    /// Longest accepted question in characters
    pub max_question_chars: usize,
    /// Ask for refined questions when the model declines
    pub refine_on_refusal: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_context_items: 3,
            char_budget: 12_000,
            relevance_floor: 0.1,
            max_question_chars: 1_000,
            refine_on_refusal: false,
        }
    }
}

/// The outcome of [`AssistantService::ask`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// The question after sanitizing
    pub question: String,
    /// SQL or the reason there is none
    pub result: GenerationResult,
    /// Labels of the context items sent to the model
    pub context: Vec<String>,
    /// Refined questions, only after a declined request with refinement on
    pub suggestions: Vec<String>,
}

struct EmbeddingScoring {
    provider: Arc<dyn EmbeddingProvider>,
    embeddings: SchemaEmbeddings,
}

/// Question in, one SQL statement or a fallback out
pub struct AssistantService {
    catalog: Arc<SchemaCatalog>,
    ranker: ContextRanker,
    assembler: PromptAssembler,
    gateway: GenerationGateway,
    settings: PipelineSettings,
    embedding: Option<EmbeddingScoring>,
    metrics: Arc<MetricsCollector>,
    timeout: Duration,
}

impl AssistantService {
    /// Service with lexical ranking and bare table names
    pub fn new(
        catalog: Arc<SchemaCatalog>,
        provider: Arc<dyn CompletionProvider>,
        settings: PipelineSettings,
        timeout: Duration,
    ) -> Result<Self> {
        let metrics = Arc::new(MetricsCollector::default());
        metrics.set_catalog_size(catalog.len());
        Ok(Self {
            ranker: ContextRanker::lexical(settings.relevance_floor)?,
            gateway: GenerationGateway::new(provider, timeout)?,
            assembler: PromptAssembler::new(),
            catalog,
            settings,
            embedding: None,
            metrics,
            timeout,
        })
    }

    /// Replace the prompt assembler
    #[must_use]
    pub fn with_assembler(mut self, assembler: PromptAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    /// Score with embeddings; lexical ranking stays as the per-request fallback
    #[must_use]
    pub fn with_embeddings(
        mut self,
        provider: Arc<dyn EmbeddingProvider>,
        embeddings: SchemaEmbeddings,
    ) -> Self {
        self.embedding = Some(EmbeddingScoring {
            provider,
            embeddings,
        });
        self
    }

    /// Share a metrics collector
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        metrics.set_catalog_size(self.catalog.len());
        self.metrics = metrics;
        self
    }

    /// The loaded catalog
    #[must_use]
    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// The metrics collector
    #[must_use]
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Active settings
    #[must_use]
    pub const fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Rank tables lexically
    pub fn rank(&self, question: &str, limit: usize) -> Result<Vec<RankedContextItem<'_>>> {
        self.ranker.rank(question, &self.catalog, limit)
    }

    /// Rank columns lexically
    pub fn rank_columns(&self, question: &str, limit: usize) -> Result<Vec<RankedContextItem<'_>>> {
        self.ranker.rank_columns(question, &self.catalog, limit)
    }

    /// Validate, rank lexically and assemble, without calling the model
    pub fn prompt_for(&self, question: &str) -> Result<Prompt> {
        let question =
            QuestionValidator::validate_question(question, self.settings.max_question_chars)?;
        let ranked = self.rank(&question, self.settings.max_context_items)?;
        self.assembler
            .assemble(&question, &ranked, self.settings.char_budget)
    }

    /// Run the whole pipeline for one question
    ///
    /// Only question validation failures are returned as errors; every other
    /// problem ends up as [`GenerationResult::Fallback`].
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let started = Instant::now();
        let question =
            match QuestionValidator::validate_question(question, self.settings.max_question_chars) {
                Ok(question) => question,
                Err(e) => {
                    self.metrics.record_validation_error();
                    return Err(e);
                }
            };

        let timer = OperationTimer::new("rank");
        let ranker = self.ranker_for(&question).await;
        let ranked = ranker.rank(&question, &self.catalog, self.settings.max_context_items)?;
        timer.finish();
        self.metrics
            .record_ranking(ranked.len(), ranker.strategy_name());

        let timer = OperationTimer::new("assemble");
        let prompt = match self
            .assembler
            .assemble(&question, &ranked, self.settings.char_budget)
        {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(error = %e, "Prompt assembly failed");
                let result = GenerationResult::Fallback(FallbackReason::NoContext);
                self.metrics.record_request(&result, started.elapsed());
                return Ok(Answer {
                    question,
                    result,
                    context: Vec::new(),
                    suggestions: Vec::new(),
                });
            }
        };
        timer.finish();
        self.metrics.record_prompt(prompt.char_len(), prompt.is_fallback());

        let completion_started = Instant::now();
        let result = self.gateway.generate(&prompt).await;
        if !prompt.is_fallback() {
            self.metrics
                .record_completion(completion_started.elapsed(), self.gateway.provider_name());
        }

        let suggestions = if self.settings.refine_on_refusal
            && result == GenerationResult::Fallback(FallbackReason::ModelRefused(RefusalCause::Declined))
        {
            self.refine(&question, &ranked).await
        } else {
            Vec::new()
        };

        self.metrics.record_request(&result, started.elapsed());
        info!(
            outcome = result.fallback_reason().map_or("sql", FallbackReason::code),
            context = prompt.context_labels().len(),
            elapsed = ?started.elapsed(),
            "Question answered"
        );

        Ok(Answer {
            question,
            result,
            context: prompt.context_labels().to_vec(),
            suggestions,
        })
    }

    async fn ranker_for(&self, question: &str) -> ContextRanker {
        let Some(scoring) = &self.embedding else {
            return self.ranker.clone();
        };
        let embedded = tokio::time::timeout(
            self.timeout,
            scoring
                .embeddings
                .strategy_for(scoring.provider.as_ref(), question),
        )
        .await;
        match embedded {
            Ok(Ok(strategy)) => {
                ContextRanker::new(Arc::new(strategy), self.settings.relevance_floor)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Question embedding failed, using lexical ranking");
                self.ranker.clone()
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "Question embedding timed out, using lexical ranking");
                self.ranker.clone()
            }
        }
    }

    async fn refine(&self, question: &str, ranked: &[RankedContextItem<'_>]) -> Vec<String> {
        match self
            .assembler
            .refinement(question, ranked, self.settings.char_budget)
        {
            Ok(prompt) => self.gateway.suggest_refinements(&prompt).await,
            Err(e) => {
                warn!(error = %e, "Refinement prompt failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SchemaDocument;
    use crate::error::AssistantError;
    use crate::provider::{
        CompletionError, EmbeddingTask, MockCompletionProvider, MockEmbeddingProvider,
    };
    use crate::prompt::REFUSAL_SENTENCE;

    fn catalog() -> Arc<SchemaCatalog> {
        let doc = SchemaDocument::new(
            "glaciers.txt",
            "Table Name: glaciers\nTable Description: Glacier thickness surveys.\nColumns:\n\
             1. Column: Thickness\n   Type: FLOAT64\n   Mode: NULLABLE\n   Description: Ice thickness.\n\
             CREATE TABLE glaciers (Thickness FLOAT64);\n",
        );
        Arc::new(SchemaCatalog::load(vec![doc]).expect("catalog"))
    }

    fn service(llm: MockCompletionProvider, settings: PipelineSettings) -> AssistantService {
        AssistantService::new(catalog(), Arc::new(llm), settings, Duration::from_secs(5))
            .expect("service")
    }

    #[tokio::test]
    async fn test_validation_errors_escape() {
        let mut llm = MockCompletionProvider::new();
        llm.expect_complete().times(0);
        llm.expect_name().return_const("mock");
        let svc = service(llm, PipelineSettings::default());

        assert!(matches!(svc.ask("  ").await, Err(AssistantError::EmptyQuestion)));
        assert!(matches!(
            svc.ask(&"x".repeat(1_001)).await,
            Err(AssistantError::InvalidQuestion(_))
        ));
        assert_eq!(svc.metrics().snapshot().validation_errors, 2);
    }

    #[tokio::test]
    async fn test_declined_with_refinement() {
        let mut llm = MockCompletionProvider::new();
        llm.expect_complete()
            .withf(|p| p.contains("SQL:"))
            .times(1)
            .returning(|_| Ok(REFUSAL_SENTENCE.to_string()));
        llm.expect_complete()
            .withf(|p| p.contains("refined questions"))
            .times(1)
            .returning(|_| Ok("- Thickest glacier?".to_string()));
        llm.expect_name().return_const("mock");

        let settings = PipelineSettings {
            refine_on_refusal: true,
            ..PipelineSettings::default()
        };
        let answer = service(llm, settings)
            .ask("glacier thickness forecast")
            .await
            .expect("answer");

        assert_eq!(
            answer.result,
            GenerationResult::Fallback(FallbackReason::ModelRefused(RefusalCause::Declined))
        );
        assert_eq!(answer.context, vec!["glaciers"]);
        assert_eq!(answer.suggestions, vec!["Thickest glacier?"]);
    }

    #[tokio::test]
    async fn test_embedding_failure_falls_back_to_lexical() {
        let mut llm = MockCompletionProvider::new();
        llm.expect_complete()
            .returning(|_| Ok("SELECT MAX(Thickness) FROM glaciers".to_string()));
        llm.expect_name().return_const("mock");

        let mut embedder = MockEmbeddingProvider::new();
        embedder
            .expect_embed()
            .returning(|_, _| Err(CompletionError::Unavailable("mock".to_string())));
        embedder.expect_name().return_const("mock");

        let svc = service(llm, PipelineSettings::default())
            .with_embeddings(Arc::new(embedder), SchemaEmbeddings::default());
        let answer = svc.ask("thickest glacier").await.expect("answer");
        assert_eq!(
            answer.result.sql(),
            Some("SELECT MAX(Thickness) FROM glaciers")
        );
        assert_eq!(svc.metrics().snapshot().sql, 1);
    }

    /// Never answers
    struct StalledEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingProvider for StalledEmbedder {
        async fn embed(
            &self,
            _texts: &[String],
            _task: EmbeddingTask,
        ) -> std::result::Result<Vec<Vec<f32>>, CompletionError> {
            std::future::pending().await
        }

        fn name(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_stalled_embedding_is_bounded_by_timeout() {
        let mut llm = MockCompletionProvider::new();
        llm.expect_complete()
            .returning(|_| Ok("SELECT MAX(Thickness) FROM glaciers".to_string()));
        llm.expect_name().return_const("mock");

        let svc = AssistantService::new(
            catalog(),
            Arc::new(llm),
            PipelineSettings::default(),
            Duration::from_millis(50),
        )
        .expect("service")
        .with_embeddings(Arc::new(StalledEmbedder), SchemaEmbeddings::default());

        let answer = tokio::time::timeout(Duration::from_secs(5), svc.ask("thickest glacier"))
            .await
            .expect("ask finished")
            .expect("answer");
        assert_eq!(answer.result.sql(), Some("SELECT MAX(Thickness) FROM glaciers"));
    }

    #[test]
    fn test_prompt_for_is_offline() {
        let mut llm = MockCompletionProvider::new();
        llm.expect_complete().times(0);
        llm.expect_name().return_const("mock");
        let svc = service(llm, PipelineSettings::default());

        let prompt = svc.prompt_for("glacier thickness").expect("prompt");
        assert!(prompt.text().contains("CREATE TABLE glaciers"));
        assert!(svc.prompt_for("penguins").expect("prompt").is_fallback());
    }
}

//! Integration tests for the generation gateway

use async_trait::async_trait;
use nl2sql_assistant::prompt::REFUSAL_SENTENCE;
use nl2sql_assistant::{
    CompletionError, CompletionProvider, FallbackReason, GenerationGateway, GenerationResult,
    PromptAssembler, RefusalCause,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Answers every prompt with the same text
struct CannedProvider {
    response: Result<String, CompletionError>,
    calls: AtomicUsize,
}

impl CannedProvider {
    fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(response.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(error: CompletionError) -> Arc<Self> {
        Arc::new(Self {
            response: Err(error),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CompletionProvider for CannedProvider {
    async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }

    fn name(&self) -> &'static str {
        "canned"
    }
}

fn gateway(provider: Arc<CannedProvider>) -> GenerationGateway {
    GenerationGateway::new(provider, Duration::from_secs(5)).expect("gateway")
}

fn context_prompt() -> nl2sql_assistant::Prompt {
    // The pipeline never sends an empty ranking to the model, so build a
    // non-fallback prompt through the refinement path
    PromptAssembler::new()
        .refinement("how many rows", &[], 5_000)
        .expect("prompt")
}

#[tokio::test]
async fn test_well_formed_select() {
    let provider = CannedProvider::new("```sql\nSELECT COUNT(*) FROM t;\n```");
    let result = gateway(Arc::clone(&provider)).generate(&context_prompt()).await;
    assert_eq!(result, GenerationResult::Sql("SELECT COUNT(*) FROM t;".to_string()));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_zero_statements_is_unparsable() {
    for response in ["", "```sql\n```", "-- no query here", "```sql\n;\n```"] {
        let result = gateway(CannedProvider::new(response))
            .generate(&context_prompt())
            .await;
        assert!(
            matches!(
                result,
                GenerationResult::Fallback(FallbackReason::UnparsableResponse(_))
            ),
            "response {response:?} gave {result:?}"
        );
    }
}

#[tokio::test]
async fn test_prose_and_multiple_statements_are_unparsable() {
    for response in [
        "Sure! Here is the query you asked for.",
        "SELECT 1; SELECT 2;",
        "```sql\nSELECT 1\n```\nor\n```sql\nSELECT 2\n```",
        "UPDATE t SET a = 1;",
    ] {
        let result = gateway(CannedProvider::new(response))
            .generate(&context_prompt())
            .await;
        assert_eq!(
            result.fallback_reason().map(FallbackReason::code),
            Some("unparsable_response"),
            "response {response:?}"
        );
    }
}

#[tokio::test]
async fn test_backtick_wrapped_query() {
    let result = gateway(CannedProvider::new(
        "`SELECT d.State, SUM(d.TotalPop) FROM proj.census.demographics AS d GROUP BY d.State;`",
    ))
    .generate(&context_prompt())
    .await;
    assert_eq!(
        result.sql(),
        Some("SELECT d.State, SUM(d.TotalPop) FROM proj.census.demographics AS d GROUP BY d.State;")
    );
}

#[tokio::test]
async fn test_refusal_sentence_is_declined() {
    let result = gateway(CannedProvider::new(&format!("\"{REFUSAL_SENTENCE}\"")))
        .generate(&context_prompt())
        .await;
    assert_eq!(
        result,
        GenerationResult::Fallback(FallbackReason::ModelRefused(RefusalCause::Declined))
    );
}

#[tokio::test]
async fn test_provider_failure_keeps_cause() {
    let provider = CannedProvider::failing(CompletionError::Http("429 Too Many Requests".into()));
    let result = gateway(provider).generate(&context_prompt()).await;
    match result {
        GenerationResult::Fallback(FallbackReason::ModelRefused(RefusalCause::Service(cause))) => {
            assert!(cause.contains("429"));
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test]
async fn test_fallback_prompt_never_calls_provider() {
    let provider = CannedProvider::new("SELECT 1");
    let fallback = PromptAssembler::new().assemble("q", &[], 5_000).expect("prompt");

    let result = gateway(Arc::clone(&provider)).generate(&fallback).await;
    assert_eq!(result, GenerationResult::Fallback(FallbackReason::NoContext));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_interpret_without_network() {
    let gateway = gateway(CannedProvider::new(""));
    assert_eq!(
        gateway.interpret("with a as (select 1) select * from a;"),
        GenerationResult::Sql("with a as (select 1) select * from a;".to_string())
    );
}

//! Capability traits for the hosted language-model services.

use async_trait::async_trait;

/// Errors from completion or embedding calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    /// The provider could not be reached
    #[error("Provider '{0}' unavailable")]
    Unavailable(String),
    /// Non-success HTTP exchange
    #[error("HTTP error: {0}")]
    Http(String),
    /// The provider answered with something we could not read
    #[error("Parse error: {0}")]
    Parse(String),
    /// Missing credentials or bad settings
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

/// Text completion: prompt in, response text out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate a completion for the given prompt.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
    /// Human-readable provider name (e.g. "gemini").
    fn name(&self) -> &'static str;
}

/// How an embedded text will be used, for providers that distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    /// Schema documents that will be searched
    RetrievalDocument,
    /// A question searching them
    RetrievalQuery,
}

impl EmbeddingTask {
    /// Wire name used by the Gemini API
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            Self::RetrievalQuery => "RETRIEVAL_QUERY",
        }
    }
}

/// Text embedding: texts in, one vector per text out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed each text; the result has one vector per input, in order.
    async fn embed(
        &self,
        texts: &[String],
        task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, CompletionError>;
    /// Human-readable provider name.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completion_provider_mock() {
        let mut llm = MockCompletionProvider::new();
        llm.expect_complete()
            .returning(|_| Ok("SELECT * FROM users".to_string()));
        llm.expect_name().return_const("mock");

        let result = llm.complete("show all users").await;
        assert_eq!(result, Ok("SELECT * FROM users".to_string()));
        assert_eq!(llm.name(), "mock");
    }

    #[test]
    fn test_completion_error_display() {
        let e = CompletionError::Unavailable("gemini".to_string());
        assert!(e.to_string().contains("gemini"));
        assert_eq!(EmbeddingTask::RetrievalQuery.as_str(), "RETRIEVAL_QUERY");
    }
}

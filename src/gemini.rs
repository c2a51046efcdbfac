//! Google Gemini API provider.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::CompletionConfig;
use crate::provider::{CompletionError, CompletionProvider, EmbeddingProvider, EmbeddingTask};

/// Gemini `generateContent` / `embedContent` client
pub struct GeminiProvider {
    /// API key sent as the `key` query parameter
    api_key: String,
    /// Generation model, e.g. `gemini-1.5-pro`
    pub model: String,
    /// Embedding model, e.g. `embedding-001`
    pub embedding_model: String,
    /// Base URL up to and including the API version
    pub endpoint: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a client; `timeout` bounds each HTTP exchange.
    pub fn new(
        api_key: &str,
        model: &str,
        embedding_model: &str,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        if api_key.trim().is_empty() {
            return Err(CompletionError::Config("Gemini API key is empty".to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            embedding_model: embedding_model.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Build from the `completion` config section
    pub fn from_config(
        config: &CompletionConfig,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        Self::new(
            api_key,
            &config.model,
            &config.embedding_model,
            &config.endpoint,
            timeout,
        )
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.endpoint)
    }

    /// Pull the answer text out of a `generateContent` response
    pub fn parse_completion(json: &Value) -> Result<String, CompletionError> {
        json.pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                let reason = json
                    .pointer("/promptFeedback/blockReason")
                    .and_then(Value::as_str)
                    .unwrap_or("missing candidates[0].content.parts[0].text");
                CompletionError::Parse(reason.to_string())
            })
    }

    /// Pull the vector out of an `embedContent` response
    pub fn parse_embedding(json: &Value) -> Result<Vec<f32>, CompletionError> {
        let values = json
            .pointer("/embedding/values")
            .and_then(Value::as_array)
            .ok_or_else(|| CompletionError::Parse("missing embedding.values".to_string()))?;

        values
            .iter()
            .map(|v| {
                #[allow(clippy::cast_possible_truncation)]
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| CompletionError::Parse("non-numeric embedding value".to_string()))
            })
            .collect()
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value, CompletionError> {
        let resp = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| CompletionError::Unavailable(format!("gemini: {e}")))?
            .error_for_status()?;

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let body = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}]
        });
        let json = self.post(&self.url(&self.model, "generateContent"), &body).await?;
        Self::parse_completion(&json)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    async fn embed(
        &self,
        texts: &[String],
        task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, CompletionError> {
        let url = self.url(&self.embedding_model, "embedContent");
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            let body = serde_json::json!({
                "model": format!("models/{}", self.embedding_model),
                "content": {"parts": [{"text": text}]},
                "taskType": task.as_str(),
            });
            let json = self.post(&url, &body).await?;
            vectors.push(Self::parse_embedding(&json)?);
        }
        Ok(vectors)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

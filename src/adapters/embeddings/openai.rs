//! OpenAI embedding provider adapter.
//!
//! Talks to the `/v1/embeddings` endpoint of OpenAI or any compatible
//! server. The model is chosen per call, so one provider instance can
//! embed with both the source and the target model of a migration.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{EmbeddingConfig, EmbeddingModelIdentity};
use crate::domain::ports::embedding::{EmbeddingInput, EmbeddingOutput, EmbeddingProvider};

/// Configuration for the OpenAI embedding provider.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingConfig {
    /// API key. Falls back to `OPENAI_API_KEY` env var.
    pub api_key: Option<String>,
    /// Base URL for the API. Default: `https://api.openai.com/v1`.
    pub base_url: String,
    /// The configured current model, whose vector length is known.
    pub model: String,
    /// Expected embedding dimension for `model`. Default: 1536.
    pub dimension: usize,
    /// Request timeout in seconds. Default: 30.
    pub timeout_secs: u64,
    /// Maximum texts per single API request. Default: 2048.
    pub max_batch_size: usize,
    /// Client-side request rate limit.
    pub requests_per_second: u32,
}

impl Default for OpenAiEmbeddingConfig {
    fn default() -> Self {
        Self::from(&EmbeddingConfig::default())
    }
}

impl From<&EmbeddingConfig> for OpenAiEmbeddingConfig {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model_name.clone(),
            dimension: config.dimension,
            timeout_secs: config.request_timeout_secs,
            max_batch_size: config.max_batch_size.max(1),
            requests_per_second: config.requests_per_second,
        }
    }
}

impl OpenAiEmbeddingConfig {
    fn get_api_key(&self) -> DomainResult<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                DomainError::ValidationFailed(
                    "OpenAI API key not set. Set OPENAI_API_KEY env var or configure embedding.api_key."
                        .to_string(),
                )
            })
    }

    fn expected_dimension(&self, model: &EmbeddingModelIdentity) -> Option<usize> {
        (model.model_name == self.model && self.dimension > 0).then_some(self.dimension)
    }
}

/// OpenAI embedding provider.
pub struct OpenAiEmbeddingProvider {
    config: OpenAiEmbeddingConfig,
    client: reqwest::Client,
    limiter: DefaultDirectRateLimiter,
}

impl OpenAiEmbeddingProvider {
    pub fn new(config: OpenAiEmbeddingConfig) -> DomainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DomainError::ExecutionFailed(format!("Failed to build HTTP client: {e}")))?;
        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            config,
            client,
            limiter: RateLimiter::direct(Quota::per_second(rate)),
        })
    }

    async fn call_embeddings_api(
        &self,
        texts: Vec<String>,
        model: &EmbeddingModelIdentity,
    ) -> DomainResult<Vec<Vec<f32>>> {
        let api_key = self.config.get_api_key()?;
        let url = format!("{}/embeddings", self.config.base_url);
        let expected = texts.len();

        self.limiter.until_ready().await;

        let request_body = EmbeddingsRequest {
            model: model.model_name.clone(),
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| provider_failure(format!("Embedding API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(provider_failure(format!(
                "Embedding API returned {status}: {body}"
            )));
        }

        let result: EmbeddingsResponse = response.json().await.map_err(|e| {
            provider_failure(format!("Failed to parse embedding response: {e}"))
        })?;

        let mut data = result.data;
        if data.len() != expected {
            return Err(provider_failure(format!(
                "Embedding API returned {} vectors for {expected} inputs",
                data.len()
            )));
        }
        data.sort_by_key(|d| d.index);

        if let Some(dimension) = self.config.expected_dimension(model) {
            if let Some(bad) = data.iter().find(|d| d.embedding.len() != dimension) {
                return Err(provider_failure(format!(
                    "Embedding {} has dimension {}, expected {dimension}",
                    bad.index,
                    bad.embedding.len()
                )));
            }
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

fn provider_failure(message: String) -> DomainError {
    DomainError::ProviderFailure {
        attempts: 1,
        message,
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }

    async fn embed_batch(
        &self,
        inputs: &[EmbeddingInput],
        model: &EmbeddingModelIdentity,
    ) -> DomainResult<Vec<EmbeddingOutput>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_outputs = Vec::with_capacity(inputs.len());

        for chunk in inputs.chunks(self.config.max_batch_size) {
            let texts: Vec<String> = chunk.iter().map(|i| i.text.clone()).collect();
            let vectors = self.call_embeddings_api(texts, model).await?;
            debug!(model = %model, count = vectors.len(), "Embedded chunk");

            all_outputs.extend(chunk.iter().zip(vectors).map(|(input, vector)| {
                EmbeddingOutput {
                    id: input.id.clone(),
                    vector,
                }
            }));
        }

        Ok(all_outputs)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn config_for(server: &mockito::Server) -> OpenAiEmbeddingConfig {
        OpenAiEmbeddingConfig {
            api_key: Some("test-key".to_string()),
            base_url: server.url(),
            model: "text-embedding-3-small".to_string(),
            dimension: 2,
            timeout_secs: 5,
            max_batch_size: 2,
            requests_per_second: 100,
        }
    }

    fn inputs(n: usize) -> Vec<EmbeddingInput> {
        (0..n)
            .map(|i| EmbeddingInput {
                id: format!("doc-{i}"),
                text: format!("text {i}"),
            })
            .collect()
    }

    #[test]
    fn test_config_from_embedding_config() {
        let config = OpenAiEmbeddingConfig::default();
        assert_eq!(config.model, "text-embedding-3-small");
        assert_eq!(config.dimension, 1536);
        assert_eq!(config.max_batch_size, 2048);
        assert_eq!(config.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_api_key_from_config() {
        let config = OpenAiEmbeddingConfig {
            api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        assert_eq!(config.get_api_key().unwrap(), "test-key");
    }

    #[test]
    fn test_api_key_falls_back_to_env() {
        temp_env::with_var("OPENAI_API_KEY", Some("env-key"), || {
            let config = OpenAiEmbeddingConfig::default();
            assert_eq!(config.get_api_key().unwrap(), "env-key");
        });
    }

    #[tokio::test]
    async fn test_embed_batch_chunks_and_restores_order() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("POST", "/embeddings")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "text-embedding-3-large",
                "input": ["text 0", "text 1"]
            })))
            .with_status(200)
            .with_body(
                r#"{"data":[{"embedding":[1.0,1.0,1.0],"index":1},{"embedding":[0.0,0.0,0.0],"index":0}]}"#,
            )
            .create_async()
            .await;
        let second = server
            .mock("POST", "/embeddings")
            .match_body(Matcher::PartialJson(serde_json::json!({"input": ["text 2"]})))
            .with_status(200)
            .with_body(r#"{"data":[{"embedding":[2.0,2.0,2.0],"index":0}]}"#)
            .create_async()
            .await;

        let provider = OpenAiEmbeddingProvider::new(config_for(&server)).unwrap();
        let model = EmbeddingModelIdentity::new("text-embedding-3-large", "openai");
        let outputs = provider.embed_batch(&inputs(3), &model).await.unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0].id, "doc-0");
        assert_eq!(outputs[0].vector, vec![0.0, 0.0, 0.0]);
        assert_eq!(outputs[1].vector, vec![1.0, 1.0, 1.0]);
        assert_eq!(outputs[2].id, "doc-2");
    }

    #[tokio::test]
    async fn test_server_error_is_provider_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/embeddings")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let provider = OpenAiEmbeddingProvider::new(config_for(&server)).unwrap();
        let model = EmbeddingModelIdentity::new("text-embedding-3-large", "openai");
        let err = provider.embed_batch(&inputs(1), &model).await.unwrap_err();

        assert!(matches!(err, DomainError::ProviderFailure { .. }));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_dimension_checked_for_configured_model() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/embeddings")
            .with_status(200)
            .with_body(r#"{"data":[{"embedding":[1.0,2.0,3.0],"index":0}]}"#)
            .create_async()
            .await;

        let provider = OpenAiEmbeddingProvider::new(config_for(&server)).unwrap();
        let model = EmbeddingModelIdentity::new("text-embedding-3-small", "openai");
        let err = provider.embed_batch(&inputs(1), &model).await.unwrap_err();
        assert!(err.to_string().contains("expected 2"));
    }
}

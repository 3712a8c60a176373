//! Embedding provider trait and implementations.
//!
//! Any provider must return vectors of exactly `dimensions()` length and
//! identical vectors for identical input.

mod mock;

pub use mock::MockEmbeddings;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Trait for embedding providers.
///
/// Implementations should be Send + Sync to allow use in async contexts.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed multiple texts in a batch
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the number of dimensions
    fn dimensions(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the maximum batch size supported.
    fn max_batch_size(&self) -> usize {
        32
    }
}

/// Request body for embedding API
#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Response from embedding API
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

/// Individual embedding data in response
#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Provider for any OpenAI-compatible `/embeddings` endpoint.
///
/// Transport failures are returned as errors; there is no retry loop.
pub struct HttpEmbeddings {
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    client: Client,
    base_url: String,
}

impl HttpEmbeddings {
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            api_key: None,
            model: model.into(),
            dimensions,
            client: Client::new(),
            base_url: "https://api.openai.com/v1/embeddings".to_string(),
        }
    }

    /// Set a custom base URL (useful for testing or proxies).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    async fn send_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!(
            "Sending embedding request for {} texts to {}",
            texts.len(),
            self.base_url
        );

        let mut request = self
            .client
            .post(&self.base_url)
            .header("Content-Type", "application/json")
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            });
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("Network error: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("API error ({}): {}", status.as_u16(), error_body));
        }

        let embedding_response: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse response: {}", e))?;

        self.order_and_validate(embedding_response, texts.len())
    }

    /// Sort by index and check count and dimensions.
    fn order_and_validate(
        &self,
        response: EmbeddingResponse,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>> {
        let mut embeddings: Vec<(usize, Vec<f32>)> = response
            .data
            .into_iter()
            .map(|d| (d.index, d.embedding))
            .collect();
        embeddings.sort_by_key(|(idx, _)| *idx);

        if embeddings.len() != expected {
            return Err(anyhow!(
                "Expected {} embeddings, got {}",
                expected,
                embeddings.len()
            ));
        }
        if let Some((_, bad)) = embeddings.iter().find(|(_, e)| e.len() != self.dimensions) {
            return Err(anyhow!(
                "Embedding has {} dimensions, expected {}",
                bad.len(),
                self.dimensions
            ));
        }

        Ok(embeddings.into_iter().map(|(_, emb)| emb).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.send_request(texts).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(items: &[(usize, Vec<f32>)]) -> EmbeddingResponse {
        EmbeddingResponse {
            data: items
                .iter()
                .map(|(index, embedding)| EmbeddingData {
                    embedding: embedding.clone(),
                    index: *index,
                })
                .collect(),
        }
    }

    #[test]
    fn test_provider_creation() {
        let provider = HttpEmbeddings::new("text-embedding-3-small", 1536)
            .with_base_url("http://localhost:8080/embeddings")
            .with_api_key("test-key");
        assert_eq!(provider.dimensions(), 1536);
        assert_eq!(provider.model_name(), "text-embedding-3-small");
        assert_eq!(provider.max_batch_size(), 32);
        assert_eq!(provider.base_url, "http://localhost:8080/embeddings");
    }

    #[test]
    fn test_response_reordered_by_index() {
        let provider = HttpEmbeddings::new("m", 2);
        let ordered = provider
            .order_and_validate(response(&[(1, vec![0.0, 1.0]), (0, vec![1.0, 0.0])]), 2)
            .unwrap();
        assert_eq!(ordered, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_wrong_dimensions_rejected() {
        let provider = HttpEmbeddings::new("m", 3);
        let err = provider
            .order_and_validate(response(&[(0, vec![1.0, 0.0])]), 1)
            .unwrap_err();
        assert!(err.to_string().contains("expected 3"));
    }

    #[test]
    fn test_missing_embeddings_rejected() {
        let provider = HttpEmbeddings::new("m", 2);
        assert!(provider
            .order_and_validate(response(&[(0, vec![1.0, 0.0])]), 2)
            .is_err());
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        let provider = HttpEmbeddings::new("m", 2).with_base_url("http://127.0.0.1:9/unused");
        assert!(provider.embed_batch(&[]).await.unwrap().is_empty());
    }
}

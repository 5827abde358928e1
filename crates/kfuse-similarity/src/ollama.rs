//! Ollama embedding provider implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use kfuse_core::error::{FusionError, FusionResult};
use kfuse_core::traits::{Embedder, EmbedderConfig};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Ollama embedding provider, talking to `/api/embeddings`.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    endpoint: url::Url,
    config: EmbedderConfig,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder.
    pub fn new(config: EmbedderConfig) -> FusionResult<Self> {
        Self::with_timeout(config, Duration::from_secs(30))
    }

    pub fn with_timeout(config: EmbedderConfig, timeout: Duration) -> FusionResult<Self> {
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let endpoint = url::Url::parse(base_url)
            .and_then(|url| url.join("/api/embeddings"))
            .map_err(|e| FusionError::Configuration(format!("Invalid Ollama URL: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FusionError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> FusionResult<Vec<f32>> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&EmbeddingRequest {
                model: &self.config.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| FusionError::similarity(format!("Ollama embedding error: {}", e)))?;

        if !response.status().is_success() {
            return Err(FusionError::similarity(format!(
                "Ollama returned status {}",
                response.status()
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| FusionError::invalid_response(format!("Ollama response: {}", e)))?;
        Ok(body.embedding)
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dims
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

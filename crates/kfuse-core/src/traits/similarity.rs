//! Similarity scorer trait and related types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FusionResult;

/// Scores how likely two entity names denote the same real-world thing.
///
/// Implementations return a value in `[0, 1]`. The scanner treats an `Err` as a
/// failed comparison for that pair only.
#[async_trait]
pub trait SimilarityScorer: Send + Sync {
    /// Score a pair of names.
    async fn score(&self, a: &str, b: &str) -> FusionResult<f32>;

    /// Identifier for logs.
    fn name(&self) -> &str;
}

/// Similarity provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityProvider {
    /// Normalized edit distance, no external calls.
    #[default]
    Lexical,
    /// Cosine similarity over OpenAI embeddings.
    OpenAI,
    /// Cosine similarity over Ollama embeddings.
    Ollama,
}

/// Similarity scorer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub provider: SimilarityProvider,
    /// Embedding model name for embedding-backed providers.
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Upper bound for one scoring call.
    pub timeout_ms: u64,
    /// Maximum scoring calls in flight.
    pub concurrency: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            provider: SimilarityProvider::Lexical,
            model: "text-embedding-3-small".to_string(),
            base_url: None,
            api_key: None,
            timeout_ms: 30_000,
            concurrency: 8,
        }
    }
}

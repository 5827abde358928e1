//! Factory for creating similarity scorers.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use kfuse_core::error::FusionResult;
use kfuse_core::traits::{Embedder, EmbedderConfig, SimilarityConfig, SimilarityProvider, SimilarityScorer};

use crate::embedding::EmbeddingScorer;
use crate::lexical::LexicalScorer;
use crate::ollama::OllamaEmbedder;
use crate::openai::OpenAIEmbedder;

/// Factory for creating similarity scorers.
pub struct SimilarityFactory;

impl SimilarityFactory {
    /// Create a scorer from the given configuration.
    pub fn create(config: &SimilarityConfig) -> FusionResult<Arc<dyn SimilarityScorer>> {
        let scorer: Arc<dyn SimilarityScorer> = match config.provider {
            SimilarityProvider::Lexical => Arc::new(LexicalScorer::new()),
            SimilarityProvider::OpenAI => {
                let embedder = OpenAIEmbedder::new(Self::embedder_config(config))?;
                Arc::new(EmbeddingScorer::new(Arc::new(embedder)))
            }
            SimilarityProvider::Ollama => {
                let embedder = OllamaEmbedder::with_timeout(
                    Self::embedder_config(config),
                    Duration::from_millis(config.timeout_ms),
                )?;
                Arc::new(EmbeddingScorer::new(Arc::new(embedder)))
            }
        };
        info!(provider = ?config.provider, scorer = scorer.name(), "Created similarity scorer");
        Ok(scorer)
    }

    /// Wrap an existing embedder.
    pub fn from_embedder(embedder: Arc<dyn Embedder>) -> Arc<dyn SimilarityScorer> {
        Arc::new(EmbeddingScorer::new(embedder))
    }

    /// Create the lexical scorer.
    pub fn lexical() -> Arc<dyn SimilarityScorer> {
        Arc::new(LexicalScorer::new())
    }

    fn embedder_config(config: &SimilarityConfig) -> EmbedderConfig {
        EmbedderConfig {
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_lexical() {
        let scorer = SimilarityFactory::create(&SimilarityConfig::default()).unwrap();
        assert_eq!(scorer.name(), "lexical");
    }

    #[test]
    fn test_ollama_scorer_name() {
        let config = SimilarityConfig {
            provider: SimilarityProvider::Ollama,
            model: "nomic-embed-text".to_string(),
            ..Default::default()
        };
        let scorer = SimilarityFactory::create(&config).unwrap();
        assert_eq!(scorer.name(), "embedding:nomic-embed-text");
    }

    #[test]
    fn test_openai_with_explicit_key() {
        let config = SimilarityConfig {
            provider: SimilarityProvider::OpenAI,
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let scorer = SimilarityFactory::create(&config).unwrap();
        assert_eq!(scorer.name(), "embedding:text-embedding-3-small");
    }
}

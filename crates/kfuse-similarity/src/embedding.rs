//! Embedding-backed scorer.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use kfuse_core::error::{FusionError, FusionResult};
use kfuse_core::traits::{Embedder, SimilarityScorer};

/// Scores names by cosine similarity of their embeddings.
///
/// Each distinct name is embedded once per scorer. Negative cosines clamp to 0.
pub struct EmbeddingScorer {
    embedder: Arc<dyn Embedder>,
    cache: Mutex<HashMap<String, Arc<Vec<f32>>>>,
    name: String,
}

impl EmbeddingScorer {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        let name = format!("embedding:{}", embedder.model_name());
        Self {
            embedder,
            cache: Mutex::new(HashMap::new()),
            name,
        }
    }

    /// Number of cached embeddings.
    pub fn cached(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    async fn embedding(&self, text: &str) -> FusionResult<Arc<Vec<f32>>> {
        if let Some(hit) = self.lookup(text)? {
            return Ok(hit);
        }

        let vector = Arc::new(self.embedder.embed(text).await?);
        if vector.is_empty() {
            return Err(FusionError::invalid_response(format!("empty embedding for {:?}", text)));
        }
        debug!(text, dims = vector.len(), "Embedded name");

        let mut cache = self
            .cache
            .lock()
            .map_err(|_| FusionError::internal("embedding cache poisoned"))?;
        Ok(cache.entry(text.to_string()).or_insert(vector).clone())
    }

    fn lookup(&self, text: &str) -> FusionResult<Option<Arc<Vec<f32>>>> {
        let cache = self
            .cache
            .lock()
            .map_err(|_| FusionError::internal("embedding cache poisoned"))?;
        Ok(cache.get(text).cloned())
    }
}

#[async_trait]
impl SimilarityScorer for EmbeddingScorer {
    async fn score(&self, a: &str, b: &str) -> FusionResult<f32> {
        let left = self.embedding(a).await?;
        let right = self.embedding(b).await?;
        if left.len() != right.len() {
            return Err(FusionError::invalid_response(format!(
                "embedding dimensions differ: {} vs {}",
                left.len(),
                right.len()
            )));
        }
        Ok(cosine_similarity(&left, &right).clamp(0.0, 1.0))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Cosine similarity. Zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

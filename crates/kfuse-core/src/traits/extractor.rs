//! Extractor trait and related types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FusionResult;

/// Turns one chunk of free text into one extraction batch.
///
/// The returned value is passed to ingestion unchanged; shape validation
/// happens there.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, chunk: &str) -> FusionResult<serde_json::Value>;
}

/// Extraction adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Model endpoint that accepts `{"prompt": ...}`.
    pub url: String,
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    pub timeout_ms: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/generate".to_string(),
            chunk_size: 5000,
            timeout_ms: 120_000,
        }
    }
}

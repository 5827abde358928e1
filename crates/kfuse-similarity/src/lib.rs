//! kfuse-similarity - Similarity scorer implementations for kfuse.
//!
//! # Supported Providers
//!
//! - **Lexical** - normalized edit distance over entity names, no network calls
//! - **OpenAI** (feature: `openai`) - cosine similarity of text-embedding-3 vectors
//! - **Ollama** - cosine similarity of local embedding models
//!
//! # Example
//!
//! ```ignore
//! use kfuse_similarity::SimilarityFactory;
//!
//! let scorer = SimilarityFactory::create(&config.similarity)?;
//! let score = scorer.score("Type 99 Tank", "Type-99 Tank").await?;
//! ```

mod embedding;
mod factory;
mod lexical;
mod ollama;
mod openai;

pub use embedding::{cosine_similarity, EmbeddingScorer};
pub use factory::SimilarityFactory;
pub use lexical::{levenshtein_distance, LexicalScorer};
pub use ollama::OllamaEmbedder;
pub use openai::OpenAIEmbedder;

// Re-export core types for convenience
pub use kfuse_core::traits::{Embedder, EmbedderConfig, SimilarityConfig, SimilarityProvider, SimilarityScorer};

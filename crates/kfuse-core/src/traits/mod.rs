//! Traits at the seams to external collaborators.

mod embedder;
mod extractor;
mod graph_store;
mod similarity;

pub use embedder::{Embedder, EmbedderConfig};
pub use extractor::{ExtractionConfig, Extractor};
pub use graph_store::{GraphEdge, GraphNode, GraphStore, GraphStoreConfig, GraphStoreProvider};
pub use similarity::{SimilarityConfig, SimilarityProvider, SimilarityScorer};

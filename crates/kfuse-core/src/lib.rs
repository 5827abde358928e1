//! kfuse-core - Core library for kfuse.
//!
//! This crate provides the types, traits, relational store and fusion stages
//! for turning extracted entity/relationship batches into a deduplicated
//! knowledge graph.
//!
//! # Example
//!
//! ```ignore
//! use kfuse_core::{FusionConfig, KnowledgeStore, Pipeline};
//!
//! let config = FusionConfig::from_env()?;
//! let store = Arc::new(KnowledgeStore::from_config(&config.store)?);
//! let pipeline = Pipeline::new(config, store, scorer, graph);
//!
//! let report = pipeline.run(&batches).await?;
//! println!("merged {} fuzzy duplicates", report.fuzzy_merge.merged);
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod fusion;
pub mod ingestion;
pub mod pipeline;
pub mod projection;
pub mod store;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{FusionConfig, MergeStrategy, StoreConfig};
pub use error::{ErrorCode, FusionError, FusionResult};
pub use events::{EventBus, EventSubscriber, PipelineEvent, Stage};
pub use fusion::{
    ExactMatchMerger, ExactMergeReport, FuzzyMergeReport, FuzzyMerger, MergeOutcome, Merger, ScanReport,
    ScanSettings, SimilarityScanner,
};
pub use ingestion::{ErrorLog, IngestionOutcome, IngestionReport, Ingestor};
pub use pipeline::{JobHandle, JobQueue, Pipeline, PipelineReport};
pub use projection::{GraphProjector, LabelMap, ProjectionReport};
pub use store::{KnowledgeStore, StoreSnapshot};
pub use traits::{
    Embedder, EmbedderConfig, ExtractionConfig, Extractor, GraphEdge, GraphNode, GraphStore, GraphStoreConfig,
    GraphStoreProvider, SimilarityConfig, SimilarityProvider, SimilarityScorer,
};
pub use types::{CandidateIndex, CandidatePair, Category, Entity, EntityRecord, Relationship};

//! Configuration system for kfuse.
//!
//! A [`FusionConfig`] is built once (from a file, the environment or the builder)
//! and passed explicitly to every stage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{FusionError, FusionResult};
use crate::traits::{
    ExtractionConfig, GraphStoreConfig, GraphStoreProvider, SimilarityConfig, SimilarityProvider,
};
use crate::types::Category;

/// How accepted fuzzy pairs are turned into merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Union-find over accepted pairs; each cluster collapses into its
    /// earliest-created member.
    #[default]
    Transitive,
    /// Each accepted pair merges on its own; chains are not closed.
    Pairwise,
}

/// Relational store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file. `:memory:` opens a private in-memory database.
    pub path: PathBuf,
    /// How long a statement waits on a locked database.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("kfuse.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

/// Main pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Pairs scoring strictly above this are recorded as candidates.
    pub candidate_threshold: f32,
    /// Candidates scoring strictly above this are merged.
    pub merge_threshold: f32,
    pub merge_strategy: MergeStrategy,
    /// Categories scanned for fuzzy duplicates. Empty means all.
    pub scan_categories: Vec<Category>,
    pub store: StoreConfig,
    pub graph_store: GraphStoreConfig,
    pub similarity: SimilarityConfig,
    pub extraction: ExtractionConfig,
    /// Graph label per category, keyed by canonical category name.
    pub category_label_map: BTreeMap<String, String>,
    /// Label for categories missing from the map.
    pub fallback_label: String,
    pub candidate_index_path: PathBuf,
    pub error_log_path: PathBuf,
    /// Extraction output consumed by ingestion.
    pub batches_path: PathBuf,
    /// Chunk indices already extracted.
    pub progress_path: PathBuf,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            candidate_threshold: 0.7,
            merge_threshold: 0.95,
            merge_strategy: MergeStrategy::Transitive,
            scan_categories: Vec::new(),
            store: StoreConfig::default(),
            graph_store: GraphStoreConfig::default(),
            similarity: SimilarityConfig::default(),
            extraction: ExtractionConfig::default(),
            category_label_map: Category::all()
                .into_iter()
                .map(|c| (c.as_str().to_string(), c.default_label().to_string()))
                .collect(),
            fallback_label: "Unknown".to_string(),
            candidate_index_path: PathBuf::from("high_similarity_pairs.json"),
            error_log_path: PathBuf::from("ingestion_errors.log"),
            batches_path: PathBuf::from("extracted_batches.json"),
            progress_path: PathBuf::from("extraction_progress.json"),
        }
    }
}

impl FusionConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> FusionResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => toml::from_str(&content).map_err(|e| FusionError::Configuration(e.to_string()))?,
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| FusionError::Configuration(e.to_string()))?
            }
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| FusionError::Configuration(e.to_string()))?
            }
            _ => {
                return Err(FusionError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `KFUSE_*` environment variables on top of the defaults.
    pub fn from_env() -> FusionResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `KFUSE_*` environment variables onto this configuration.
    pub fn apply_env(&mut self) -> FusionResult<()> {
        if let Some(v) = env_parse::<f32>("KFUSE_CANDIDATE_THRESHOLD")? {
            self.candidate_threshold = v;
        }
        if let Some(v) = env_parse::<f32>("KFUSE_MERGE_THRESHOLD")? {
            self.merge_threshold = v;
        }
        if let Ok(v) = std::env::var("KFUSE_MERGE_STRATEGY") {
            self.merge_strategy = match v.to_lowercase().as_str() {
                "transitive" => MergeStrategy::Transitive,
                "pairwise" => MergeStrategy::Pairwise,
                other => {
                    return Err(FusionError::Configuration(format!("Unknown merge strategy: {}", other)))
                }
            };
        }

        // Relational store
        if let Ok(path) = std::env::var("KFUSE_DB_PATH") {
            self.store.path = PathBuf::from(path);
        }

        // Graph store
        if let Ok(provider) = std::env::var("KFUSE_GRAPH_PROVIDER") {
            self.graph_store.provider = match provider.to_lowercase().as_str() {
                "embedded" => GraphStoreProvider::Embedded,
                "neo4j" => GraphStoreProvider::Neo4j,
                other => {
                    return Err(FusionError::Configuration(format!("Unknown graph provider: {}", other)))
                }
            };
        }
        if let Ok(url) = std::env::var("KFUSE_GRAPH_URL") {
            self.graph_store.url = url;
        }
        if let Ok(user) = std::env::var("KFUSE_GRAPH_USERNAME") {
            self.graph_store.username = Some(user);
        }
        if let Ok(password) = std::env::var("KFUSE_GRAPH_PASSWORD") {
            self.graph_store.password = Some(password);
        }

        // Similarity
        if let Ok(provider) = std::env::var("KFUSE_SIMILARITY_PROVIDER") {
            self.similarity.provider = match provider.to_lowercase().as_str() {
                "lexical" => SimilarityProvider::Lexical,
                "openai" => SimilarityProvider::OpenAI,
                "ollama" => SimilarityProvider::Ollama,
                other => {
                    return Err(FusionError::Configuration(format!(
                        "Unknown similarity provider: {}",
                        other
                    )))
                }
            };
        }
        if let Ok(model) = std::env::var("KFUSE_SIMILARITY_MODEL") {
            self.similarity.model = model;
        }
        if let Ok(url) = std::env::var("KFUSE_SIMILARITY_URL") {
            self.similarity.base_url = Some(url);
        }
        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            self.similarity.api_key = Some(api_key);
        }
        if let Some(v) = env_parse::<usize>("KFUSE_SIMILARITY_CONCURRENCY")? {
            self.similarity.concurrency = v;
        }

        // Extraction
        if let Ok(url) = std::env::var("KFUSE_EXTRACTION_URL") {
            self.extraction.url = url;
        }
        if let Some(v) = env_parse::<usize>("KFUSE_CHUNK_SIZE")? {
            self.extraction.chunk_size = v;
        }

        Ok(())
    }

    /// Reject settings no stage can run with.
    pub fn validate(&self) -> FusionResult<()> {
        for (name, value) in [
            ("candidate_threshold", self.candidate_threshold),
            ("merge_threshold", self.merge_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(FusionError::Configuration(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.merge_threshold < self.candidate_threshold {
            return Err(FusionError::Configuration(format!(
                "merge_threshold ({}) must not be below candidate_threshold ({})",
                self.merge_threshold, self.candidate_threshold
            )));
        }
        if self.similarity.concurrency == 0 {
            return Err(FusionError::Configuration(
                "similarity.concurrency must be at least 1".to_string(),
            ));
        }
        if self.extraction.chunk_size == 0 {
            return Err(FusionError::Configuration(
                "extraction.chunk_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Graph label for a category.
    pub fn label_for(&self, category: Category) -> &str {
        self.category_label_map
            .get(category.as_str())
            .map(String::as_str)
            .unwrap_or(&self.fallback_label)
    }

    /// Categories the similarity scanner visits, in declaration order.
    pub fn categories_to_scan(&self) -> Vec<Category> {
        if self.scan_categories.is_empty() {
            Category::all()
        } else {
            let mut categories = self.scan_categories.clone();
            categories.sort();
            categories.dedup();
            categories
        }
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> FusionConfigBuilder {
        FusionConfigBuilder::default()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> FusionResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| FusionError::Configuration(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(None),
    }
}

/// Builder for FusionConfig.
#[derive(Default)]
pub struct FusionConfigBuilder {
    config: FusionConfig,
}

impl FusionConfigBuilder {
    pub fn candidate_threshold(mut self, threshold: f32) -> Self {
        self.config.candidate_threshold = threshold;
        self
    }

    pub fn merge_threshold(mut self, threshold: f32) -> Self {
        self.config.merge_threshold = threshold;
        self
    }

    pub fn merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.config.merge_strategy = strategy;
        self
    }

    pub fn scan_categories(mut self, categories: Vec<Category>) -> Self {
        self.config.scan_categories = categories;
        self
    }

    /// Set relational store path.
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.store.path = path.into();
        self
    }

    /// Set graph store configuration.
    pub fn graph_store(mut self, config: GraphStoreConfig) -> Self {
        self.config.graph_store = config;
        self
    }

    /// Set similarity configuration.
    pub fn similarity(mut self, config: SimilarityConfig) -> Self {
        self.config.similarity = config;
        self
    }

    /// Set extraction configuration.
    pub fn extraction(mut self, config: ExtractionConfig) -> Self {
        self.config.extraction = config;
        self
    }

    /// Override the graph label for one category.
    pub fn label(mut self, category: Category, label: impl Into<String>) -> Self {
        self.config
            .category_label_map
            .insert(category.as_str().to_string(), label.into());
        self
    }

    /// Replace the whole label map.
    pub fn category_label_map(mut self, map: BTreeMap<String, String>) -> Self {
        self.config.category_label_map = map;
        self
    }

    pub fn fallback_label(mut self, label: impl Into<String>) -> Self {
        self.config.fallback_label = label.into();
        self
    }

    /// Put every artifact file under `dir`.
    pub fn artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.config.candidate_index_path = dir.join("high_similarity_pairs.json");
        self.config.error_log_path = dir.join("ingestion_errors.log");
        self.config.batches_path = dir.join("extracted_batches.json");
        self.config.progress_path = dir.join("extraction_progress.json");
        self
    }

    pub fn candidate_index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.candidate_index_path = path.into();
        self
    }

    pub fn error_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.error_log_path = path.into();
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> FusionResult<FusionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

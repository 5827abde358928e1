//! Shared state for one CLI invocation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use kfuse_core::{EventBus, FusionConfig, KnowledgeStore, Pipeline};
use kfuse_graph_stores::GraphStoreFactory;
use kfuse_similarity::SimilarityFactory;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::args::Cli;

pub struct Context {
    pub config: FusionConfig,
    pub store: Arc<KnowledgeStore>,
    pub cancel: CancellationToken,
    pub events: EventBus,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = load_config(cli.config.as_deref(), cli.db.clone())?;
        let store = KnowledgeStore::from_config(&config.store)
            .with_context(|| format!("Failed to open store at {}", config.store.path.display()))?;
        debug!(path = %config.store.path.display(), "Opened knowledge store");

        Ok(Self {
            config,
            store: Arc::new(store),
            cancel: CancellationToken::new(),
            events: EventBus::new(),
        })
    }

    /// Build a pipeline with the configured scorer and graph store.
    pub async fn pipeline(&self) -> Result<Pipeline> {
        let scorer = SimilarityFactory::create(&self.config.similarity).context("Failed to create similarity scorer")?;
        let graph = GraphStoreFactory::create(&self.config.graph_store)
            .await
            .context("Failed to connect to graph store")?;

        Ok(Pipeline::new(self.config.clone(), self.store.clone(), scorer, graph)
            .with_events(self.events.clone())
            .with_cancellation(self.cancel.clone()))
    }
}

/// Defaults or file, then `KFUSE_*` variables, then the `--db` flag.
pub fn load_config(path: Option<&Path>, db: Option<PathBuf>) -> Result<FusionConfig> {
    let mut config = match path {
        Some(path) => {
            FusionConfig::from_file(path).with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => FusionConfig::default(),
    };
    config.apply_env()?;
    if let Some(db) = db {
        config.store.path = db;
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_flag_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kfuse.json");
        std::fs::write(&path, r#"{"merge_threshold": 0.97, "store": {"path": "from-file.db"}}"#).unwrap();

        let config = load_config(Some(&path), Some(PathBuf::from("override.db"))).unwrap();
        assert_eq!(config.store.path, PathBuf::from("override.db"));
        assert!((config.merge_threshold - 0.97).abs() < f32::EPSILON);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml")), None).is_err());
    }
}

//! Factory for creating graph store providers.

use std::sync::Arc;

use kfuse_core::error::{FusionError, FusionResult};
use kfuse_core::traits::{GraphStore, GraphStoreConfig, GraphStoreProvider};

/// Factory for creating graph store providers.
pub struct GraphStoreFactory;

impl GraphStoreFactory {
    /// Create a graph store from the given configuration.
    pub async fn create(config: &GraphStoreConfig) -> FusionResult<Arc<dyn GraphStore>> {
        match config.provider {
            #[cfg(feature = "embedded")]
            GraphStoreProvider::Embedded => {
                let store = crate::embedded::EmbeddedGraphStore::from_config(config)?;
                Ok(Arc::new(store))
            }

            #[cfg(feature = "neo4j")]
            GraphStoreProvider::Neo4j => {
                let store = crate::neo4j::Neo4jGraphStore::new(config.clone()).await?;
                Ok(Arc::new(store))
            }

            #[allow(unreachable_patterns)]
            provider => Err(FusionError::UnsupportedProvider {
                provider: format!("{:?} (feature not enabled)", provider),
            }),
        }
    }

    /// Create an in-memory embedded graph store.
    #[cfg(feature = "embedded")]
    pub fn in_memory() -> FusionResult<Arc<dyn GraphStore>> {
        Ok(Arc::new(crate::embedded::EmbeddedGraphStore::in_memory()?))
    }

    /// Create a Neo4j graph store.
    #[cfg(feature = "neo4j")]
    pub async fn neo4j(uri: &str, username: &str, password: &str) -> FusionResult<Arc<dyn GraphStore>> {
        let config = GraphStoreConfig {
            provider: GraphStoreProvider::Neo4j,
            url: uri.to_string(),
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            ..Default::default()
        };
        Self::create(&config).await
    }
}

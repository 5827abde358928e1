//! Neo4j graph store implementation.

use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph};
use tracing::debug;

use kfuse_core::error::{ErrorCode, FusionError, FusionResult};
use kfuse_core::traits::{GraphEdge, GraphNode, GraphStore, GraphStoreConfig};

use crate::cypher;

/// Neo4j graph store over Bolt.
pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    /// Connect to Neo4j.
    pub async fn new(config: GraphStoreConfig) -> FusionResult<Self> {
        let username = config.username.clone().unwrap_or_else(|| "neo4j".to_string());
        let password = config.password.clone().unwrap_or_default();

        let mut builder = ConfigBuilder::default()
            .uri(config.url.as_str())
            .user(username.as_str())
            .password(password.as_str());
        if let Some(database) = &config.database {
            builder = builder.db(database.as_str());
        }
        let neo4j_config = builder
            .build()
            .map_err(|e| FusionError::Configuration(format!("Invalid Neo4j configuration: {}", e)))?;

        let graph = Graph::connect(neo4j_config).await.map_err(|e| FusionError::GraphStore {
            message: format!("Failed to connect to Neo4j: {}", e),
            code: ErrorCode::GrpConnectionFailed,
            source: None,
        })?;
        debug!(url = %config.url, "Connected to Neo4j");

        Ok(Self { graph })
    }

    async fn count(&self, statement: &str) -> FusionResult<usize> {
        let mut result = self
            .graph
            .execute(query(statement))
            .await
            .map_err(|e| FusionError::graph_store(format!("Failed to count: {}", e)))?;

        let count: i64 = match result
            .next()
            .await
            .map_err(|e| FusionError::graph_store(format!("Failed to fetch row: {}", e)))?
        {
            Some(row) => row.get("c").unwrap_or_default(),
            None => 0,
        };
        Ok(count.max(0) as usize)
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn upsert_node(&self, node: &GraphNode) -> FusionResult<()> {
        let (statement, params) = cypher::node_upsert(node);
        let mut q = query(&statement);
        for (name, value) in params {
            q = q.param(&name, value);
        }

        self.graph
            .run(q)
            .await
            .map_err(|e| FusionError::graph_store(format!("Failed to upsert node {}: {}", node.id, e)))
    }

    async fn upsert_edge(&self, edge: &GraphEdge) -> FusionResult<()> {
        let q = query(&cypher::edge_upsert(edge))
            .param("source", edge.source_id.clone())
            .param("target", edge.target_id.clone());

        self.graph.run(q).await.map_err(|e| {
            FusionError::graph_store(format!(
                "Failed to upsert edge {} -[{}]-> {}: {}",
                edge.source_id, edge.relation, edge.target_id, e
            ))
        })
    }

    async fn node_count(&self) -> FusionResult<usize> {
        self.count("MATCH (n) RETURN count(n) AS c").await
    }

    async fn edge_count(&self) -> FusionResult<usize> {
        self.count("MATCH ()-[r]->() RETURN count(r) AS c").await
    }

    async fn delete_all(&self) -> FusionResult<()> {
        self.graph
            .run(query("MATCH (n) DETACH DELETE n"))
            .await
            .map_err(|e| FusionError::graph_store(format!("Failed to delete: {}", e)))
    }
}

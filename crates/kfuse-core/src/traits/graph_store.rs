//! Graph store trait and related types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::FusionResult;

/// A node as written to the graph store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Global entity id; the node's identity key.
    pub id: String,
    pub label: String,
    /// Includes `id`, `name` and `category` plus sanitized attributes.
    pub properties: BTreeMap<String, String>,
}

/// A directed labelled edge as written to the graph store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_id: String,
    pub relation: String,
    pub target_id: String,
}

/// Core GraphStore trait - all graph store backends implement this.
///
/// Both writes are upserts keyed by identity: a node by `id`, an edge by
/// `(source_id, relation, target_id)`. Writing the same mutation twice leaves
/// the graph unchanged.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create or update a node, replacing its label and properties.
    async fn upsert_node(&self, node: &GraphNode) -> FusionResult<()>;

    /// Create an edge unless an identical one exists. Both endpoints must
    /// already be present.
    async fn upsert_edge(&self, edge: &GraphEdge) -> FusionResult<()>;

    async fn node_count(&self) -> FusionResult<usize>;

    async fn edge_count(&self) -> FusionResult<usize>;

    /// Remove every node and edge.
    async fn delete_all(&self) -> FusionResult<()>;
}

/// Graph store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphStoreConfig {
    /// Provider type.
    pub provider: GraphStoreProvider,
    /// Connection URL, or the database path for the embedded store.
    pub url: String,
    /// Username for authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Password for authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Database name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Upper bound for one graph call.
    pub timeout_ms: u64,
}

impl Default for GraphStoreConfig {
    fn default() -> Self {
        Self {
            provider: GraphStoreProvider::Embedded,
            url: "kfuse-graph.db".to_string(),
            username: None,
            password: None,
            database: None,
            timeout_ms: 10_000,
        }
    }
}

/// Graph store provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GraphStoreProvider {
    /// petgraph in memory, persisted to SQLite.
    #[default]
    Embedded,
    Neo4j,
}

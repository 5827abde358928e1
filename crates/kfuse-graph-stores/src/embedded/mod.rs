//! Embedded graph store using petgraph + SQLite.
//!
//! Nodes and edges live in a petgraph `DiGraph` for in-process traversal and
//! are written through to SQLite so a projection survives restarts. The
//! SQLite rows are loaded back into the graph on open.

pub mod schema;
pub mod sync;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rusqlite::Connection;
use tracing::debug;

use kfuse_core::error::{ErrorCode, FusionError, FusionResult};
use kfuse_core::traits::{GraphEdge, GraphNode, GraphStore, GraphStoreConfig};

/// In-memory graph: node weights are the projected nodes, edge weights the
/// relation names.
pub type ProjectedGraph = DiGraph<GraphNode, String>;

/// Node id to graph index.
pub type NodeIndexMap = HashMap<String, NodeIndex>;

/// Embedded graph store using petgraph + SQLite.
pub struct EmbeddedGraphStore {
    conn: Mutex<Connection>,
    graph: Mutex<ProjectedGraph>,
    index: Mutex<NodeIndexMap>,
}

impl EmbeddedGraphStore {
    /// Open or create a store at `db_path`.
    pub fn new(db_path: impl AsRef<Path>) -> FusionResult<Self> {
        let conn = Connection::open(db_path).map_err(|e| FusionError::GraphStore {
            message: format!("Failed to open embedded graph: {}", e),
            code: ErrorCode::GrpConnectionFailed,
            source: Some(Box::new(e)),
        })?;
        Self::with_connection(conn)
    }

    /// Create a new in-memory store.
    pub fn in_memory() -> FusionResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    /// Create from a GraphStoreConfig. The URL is the database path.
    pub fn from_config(config: &GraphStoreConfig) -> FusionResult<Self> {
        if config.url.is_empty() || config.url == ":memory:" {
            Self::in_memory()
        } else {
            Self::new(&config.url)
        }
    }

    fn with_connection(conn: Connection) -> FusionResult<Self> {
        schema::init_schema(&conn)?;

        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        sync::load_graph(&conn, &mut graph, &mut index)?;
        debug!(nodes = graph.node_count(), edges = graph.edge_count(), "Loaded embedded graph");

        Ok(Self {
            conn: Mutex::new(conn),
            graph: Mutex::new(graph),
            index: Mutex::new(index),
        })
    }

    /// Look up a node by id.
    pub fn get_node(&self, id: &str) -> FusionResult<Option<GraphNode>> {
        let graph = self.graph.lock().map_err(|e| FusionError::internal(e.to_string()))?;
        let index = self.index.lock().map_err(|e| FusionError::internal(e.to_string()))?;
        Ok(index.get(id).and_then(|&idx| graph.node_weight(idx)).cloned())
    }

    /// Outgoing edges of a node.
    pub fn outgoing(&self, id: &str) -> FusionResult<Vec<GraphEdge>> {
        let graph = self.graph.lock().map_err(|e| FusionError::internal(e.to_string()))?;
        let index = self.index.lock().map_err(|e| FusionError::internal(e.to_string()))?;

        let Some(&idx) = index.get(id) else {
            return Ok(Vec::new());
        };
        let mut edges: Vec<GraphEdge> = graph
            .edges(idx)
            .map(|edge| GraphEdge {
                source_id: id.to_string(),
                relation: edge.weight().clone(),
                target_id: graph[edge.target()].id.clone(),
            })
            .collect();
        edges.sort_by(|a, b| (&a.relation, &a.target_id).cmp(&(&b.relation, &b.target_id)));
        Ok(edges)
    }
}

#[async_trait]
impl GraphStore for EmbeddedGraphStore {
    async fn upsert_node(&self, node: &GraphNode) -> FusionResult<()> {
        let conn = self.conn.lock().map_err(|e| FusionError::internal(e.to_string()))?;
        sync::save_node(&conn, node)?;

        let mut graph = self.graph.lock().map_err(|e| FusionError::internal(e.to_string()))?;
        let mut index = self.index.lock().map_err(|e| FusionError::internal(e.to_string()))?;
        let existing = index.get(&node.id).copied();
        match existing {
            Some(idx) => graph[idx] = node.clone(),
            None => {
                let idx = graph.add_node(node.clone());
                index.insert(node.id.clone(), idx);
            }
        }
        Ok(())
    }

    async fn upsert_edge(&self, edge: &GraphEdge) -> FusionResult<()> {
        let conn = self.conn.lock().map_err(|e| FusionError::internal(e.to_string()))?;
        let mut graph = self.graph.lock().map_err(|e| FusionError::internal(e.to_string()))?;
        let index = self.index.lock().map_err(|e| FusionError::internal(e.to_string()))?;

        let (Some(&source), Some(&target)) = (index.get(&edge.source_id), index.get(&edge.target_id)) else {
            return Err(FusionError::graph_store(format!(
                "edge {} -[{}]-> {} references a missing node",
                edge.source_id, edge.relation, edge.target_id
            )));
        };

        if sync::save_edge(&conn, edge)? {
            graph.add_edge(source, target, edge.relation.clone());
        }
        Ok(())
    }

    async fn node_count(&self) -> FusionResult<usize> {
        let graph = self.graph.lock().map_err(|e| FusionError::internal(e.to_string()))?;
        Ok(graph.node_count())
    }

    async fn edge_count(&self) -> FusionResult<usize> {
        let graph = self.graph.lock().map_err(|e| FusionError::internal(e.to_string()))?;
        Ok(graph.edge_count())
    }

    async fn delete_all(&self) -> FusionResult<()> {
        let conn = self.conn.lock().map_err(|e| FusionError::internal(e.to_string()))?;
        sync::clear(&conn)?;

        let mut graph = self.graph.lock().map_err(|e| FusionError::internal(e.to_string()))?;
        let mut index = self.index.lock().map_err(|e| FusionError::internal(e.to_string()))?;
        graph.clear();
        index.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn node(id: &str, label: &str, name: &str) -> GraphNode {
        let mut properties = BTreeMap::new();
        properties.insert("id".to_string(), id.to_string());
        properties.insert("name".to_string(), name.to_string());
        GraphNode {
            id: id.to_string(),
            label: label.to_string(),
            properties,
        }
    }

    fn edge(source: &str, relation: &str, target: &str) -> GraphEdge {
        GraphEdge {
            source_id: source.to_string(),
            relation: relation.to_string(),
            target_id: target.to_string(),
        }
    }

    #[tokio::test]
    async fn test_upserts_are_idempotent() {
        let store = EmbeddedGraphStore::in_memory().unwrap();
        for _ in 0..2 {
            store.upsert_node(&node("a", "Organization", "Eastern Fleet")).await.unwrap();
            store.upsert_node(&node("b", "Facility", "Port A")).await.unwrap();
            store.upsert_edge(&edge("a", "based_at", "b")).await.unwrap();
        }
        assert_eq!(store.node_count().await.unwrap(), 2);
        assert_eq!(store.edge_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_node_upsert_replaces_properties() {
        let store = EmbeddedGraphStore::in_memory().unwrap();
        store.upsert_node(&node("a", "Organization", "Old")).await.unwrap();
        store.upsert_node(&node("a", "Organization", "New")).await.unwrap();

        let stored = store.get_node("a").unwrap().unwrap();
        assert_eq!(stored.properties["name"], "New");
        assert_eq!(store.node_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_edge_with_missing_endpoint_fails() {
        let store = EmbeddedGraphStore::in_memory().unwrap();
        store.upsert_node(&node("a", "Organization", "Eastern Fleet")).await.unwrap();
        let result = store.upsert_edge(&edge("a", "based_at", "ghost")).await;
        assert!(matches!(result, Err(FusionError::GraphStore { .. })));
        assert_eq!(store.edge_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_parallel_relations_are_distinct_edges() {
        let store = EmbeddedGraphStore::in_memory().unwrap();
        store.upsert_node(&node("a", "Organization", "Eastern Fleet")).await.unwrap();
        store.upsert_node(&node("b", "Facility", "Port A")).await.unwrap();
        store.upsert_edge(&edge("a", "based_at", "b")).await.unwrap();
        store.upsert_edge(&edge("a", "operates", "b")).await.unwrap();

        let out = store.outgoing("a").unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].relation, "based_at");
        assert_eq!(out[1].relation, "operates");
    }

    #[tokio::test]
    async fn test_reopen_restores_graph() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        {
            let store = EmbeddedGraphStore::new(&path).unwrap();
            store.upsert_node(&node("a", "Organization", "Eastern Fleet")).await.unwrap();
            store.upsert_node(&node("b", "Facility", "Port A")).await.unwrap();
            store.upsert_edge(&edge("a", "based_at", "b")).await.unwrap();
        }

        let store = EmbeddedGraphStore::new(&path).unwrap();
        assert_eq!(store.node_count().await.unwrap(), 2);
        assert_eq!(store.edge_count().await.unwrap(), 1);
        assert_eq!(store.outgoing("a").unwrap()[0].target_id, "b");
    }

    #[tokio::test]
    async fn test_delete_all() {
        let store = EmbeddedGraphStore::in_memory().unwrap();
        store.upsert_node(&node("a", "Organization", "Eastern Fleet")).await.unwrap();
        store.delete_all().await.unwrap();
        assert_eq!(store.node_count().await.unwrap(), 0);
        assert!(store.get_node("a").unwrap().is_none());
    }
}

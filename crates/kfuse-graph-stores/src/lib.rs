//! kfuse-graph-stores - Graph store implementations for kfuse.
//!
//! The projector writes nodes and edges through the
//! [`GraphStore`](kfuse_core::traits::GraphStore) trait; this crate provides
//! the backends.
//!
//! # Supported Backends
//!
//! - **Embedded** (feature: `embedded`, default) - petgraph in memory, persisted to SQLite
//! - **Neo4j** (feature: `neo4j`) - Neo4j over Bolt

pub mod cypher;
mod factory;

#[cfg(feature = "embedded")]
pub mod embedded;

#[cfg(feature = "neo4j")]
mod neo4j;

pub use factory::GraphStoreFactory;

#[cfg(feature = "embedded")]
pub use embedded::EmbeddedGraphStore;

#[cfg(feature = "neo4j")]
pub use neo4j::Neo4jGraphStore;

// Re-export core types
pub use kfuse_core::traits::{GraphEdge, GraphNode, GraphStore, GraphStoreConfig, GraphStoreProvider};

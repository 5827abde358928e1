//! SQLite <-> petgraph synchronization.

use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use tracing::warn;

use kfuse_core::error::FusionResult;
use kfuse_core::traits::{GraphEdge, GraphNode};

use super::{NodeIndexMap, ProjectedGraph};

/// Load the persisted graph into petgraph. Called on open.
pub fn load_graph(conn: &Connection, graph: &mut ProjectedGraph, index: &mut NodeIndexMap) -> FusionResult<()> {
    graph.clear();
    index.clear();

    let mut stmt = conn.prepare("SELECT id, label, properties FROM graph_nodes ORDER BY rowid")?;
    let nodes = stmt.query_map([], |row| {
        let id: String = row.get(0)?;
        let label: String = row.get(1)?;
        let properties_str: String = row.get(2)?;
        Ok((id, label, properties_str))
    })?;

    for row in nodes {
        let (id, label, properties_str) = row?;
        let properties: BTreeMap<String, String> = serde_json::from_str(&properties_str).unwrap_or_else(|e| {
            warn!(node = %id, error = %e, "Unreadable node properties, loading empty");
            BTreeMap::new()
        });
        let idx = graph.add_node(GraphNode {
            id: id.clone(),
            label,
            properties,
        });
        index.insert(id, idx);
    }

    let mut stmt = conn.prepare("SELECT source_id, relation, target_id FROM graph_edges ORDER BY id")?;
    let edges = stmt.query_map([], |row| {
        Ok(GraphEdge {
            source_id: row.get(0)?,
            relation: row.get(1)?,
            target_id: row.get(2)?,
        })
    })?;

    for row in edges {
        let edge = row?;
        if let (Some(&source), Some(&target)) = (index.get(&edge.source_id), index.get(&edge.target_id)) {
            graph.add_edge(source, target, edge.relation);
        }
    }

    Ok(())
}

/// Insert or replace a node row.
pub fn save_node(conn: &Connection, node: &GraphNode) -> FusionResult<()> {
    let properties = serde_json::to_string(&node.properties)?;
    conn.execute(
        r#"
        INSERT INTO graph_nodes (id, label, properties, updated_at)
        VALUES (?1, ?2, ?3, datetime('now'))
        ON CONFLICT(id) DO UPDATE SET
            label = excluded.label,
            properties = excluded.properties,
            updated_at = datetime('now')
        "#,
        params![node.id, node.label, properties],
    )?;
    Ok(())
}

/// Insert an edge row unless it already exists. Returns whether a row was added.
pub fn save_edge(conn: &Connection, edge: &GraphEdge) -> FusionResult<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO graph_edges (source_id, relation, target_id) VALUES (?1, ?2, ?3)",
        params![edge.source_id, edge.relation, edge.target_id],
    )?;
    Ok(inserted > 0)
}

/// Remove every node and edge row.
pub fn clear(conn: &Connection) -> FusionResult<()> {
    conn.execute_batch("DELETE FROM graph_edges; DELETE FROM graph_nodes;")?;
    Ok(())
}

//! SQLite schema for the embedded graph store.
//!
//! - `graph_nodes`: one row per projected entity, properties as JSON
//! - `graph_edges`: directed labelled edges, unique per (source, relation, target)

use rusqlite::Connection;

use kfuse_core::error::FusionResult;

/// SQL for the nodes table.
pub const CREATE_NODES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS graph_nodes (
    id TEXT PRIMARY KEY,
    label TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)
"#;

/// Index for label filtering.
pub const CREATE_NODES_LABEL_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_graph_nodes_label ON graph_nodes(label)
"#;

/// SQL for the edges table.
pub const CREATE_EDGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS graph_edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id TEXT NOT NULL REFERENCES graph_nodes(id) ON DELETE CASCADE,
    relation TEXT NOT NULL,
    target_id TEXT NOT NULL REFERENCES graph_nodes(id) ON DELETE CASCADE,
    UNIQUE(source_id, relation, target_id)
)
"#;

/// Index for traversal to target.
pub const CREATE_EDGES_TARGET_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_graph_edges_target ON graph_edges(target_id)
"#;

/// Initialize the graph schema. Idempotent.
pub fn init_schema(conn: &Connection) -> FusionResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute(CREATE_NODES_TABLE, [])?;
    conn.execute(CREATE_NODES_LABEL_INDEX, [])?;
    conn.execute(CREATE_EDGES_TABLE, [])?;
    conn.execute(CREATE_EDGES_TARGET_INDEX, [])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name LIKE 'graph_%' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(tables, vec!["graph_edges".to_string(), "graph_nodes".to_string()]);
    }

    #[test]
    fn test_edge_requires_nodes() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO graph_edges (source_id, relation, target_id) VALUES ('a', 'r', 'b')",
            [],
        );
        assert!(result.is_err());
    }
}

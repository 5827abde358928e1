//! SQLite schema for the relational knowledge store.
//!
//! Three tables:
//! - `entities`: one row per live entity, `seq` records creation order
//! - `entity_attributes`: name/value pairs, unique per entity
//! - `relationships`: directed labelled edges, duplicates allowed

use rusqlite::Connection;

use crate::error::FusionResult;

/// SQL for the entities table.
pub const CREATE_ENTITIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id TEXT NOT NULL UNIQUE,
    category TEXT NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
"#;

/// Index for exact-name grouping.
pub const CREATE_ENTITIES_NAME_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name)
"#;

/// Index for per-category scans.
pub const CREATE_ENTITIES_CATEGORY_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_entities_category ON entities(category)
"#;

/// SQL for the attributes table.
pub const CREATE_ATTRIBUTES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entity_attributes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id TEXT NOT NULL REFERENCES entities(entity_id),
    attribute_name TEXT NOT NULL,
    attribute_value TEXT NOT NULL,
    UNIQUE(entity_id, attribute_name)
)
"#;

/// SQL for the relationships table.
pub const CREATE_RELATIONSHIPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id TEXT NOT NULL REFERENCES entities(entity_id),
    relation TEXT NOT NULL,
    target_id TEXT NOT NULL REFERENCES entities(entity_id)
)
"#;

/// Index for rebinding and cascades from the source side.
pub const CREATE_RELATIONSHIPS_SOURCE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_id)
"#;

/// Index for rebinding and cascades from the target side.
pub const CREATE_RELATIONSHIPS_TARGET_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_id)
"#;

/// Initialize the store schema. Safe to call repeatedly.
pub fn init_schema(conn: &Connection) -> FusionResult<()> {
    // Deletes must clear attributes and relationships first
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(CREATE_ENTITIES_TABLE, [])?;
    conn.execute(CREATE_ATTRIBUTES_TABLE, [])?;
    conn.execute(CREATE_RELATIONSHIPS_TABLE, [])?;

    conn.execute(CREATE_ENTITIES_NAME_INDEX, [])?;
    conn.execute(CREATE_ENTITIES_CATEGORY_INDEX, [])?;
    conn.execute(CREATE_RELATIONSHIPS_SOURCE_INDEX, [])?;
    conn.execute(CREATE_RELATIONSHIPS_TARGET_INDEX, [])?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"entities".to_string()));
        assert!(tables.contains(&"entity_attributes".to_string()));
        assert!(tables.contains(&"relationships".to_string()));
    }

    #[test]
    fn test_init_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='entities'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_foreign_keys_reject_dangling_relationship() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO relationships (source_id, relation, target_id) VALUES ('nope', 'r', 'nada')",
            [],
        );
        assert!(result.is_err());
    }
}

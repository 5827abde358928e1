//! Row-level operations on the knowledge store.
//!
//! Every function takes a borrowed connection so callers decide the
//! transaction boundary: pass a `rusqlite::Transaction` (which derefs to
//! `Connection`) to group writes into one atomic unit.

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

use crate::error::{ErrorCode, FusionError, FusionResult};
use crate::types::{Category, Entity, EntityRecord, Relationship};

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn to_entity((seq, id, category, name): (i64, String, String, String)) -> FusionResult<Entity> {
    let category = Category::from_str_flexible(&category).ok_or_else(|| {
        FusionError::malformed(
            format!("Stored entity {} has unknown category '{}'", id, category),
            ErrorCode::InUnknownCategory,
        )
    })?;
    Ok(Entity { id, category, name, seq })
}

fn collect_entities(
    rows: impl Iterator<Item = rusqlite::Result<(i64, String, String, String)>>,
) -> FusionResult<Vec<Entity>> {
    rows.map(|row| to_entity(row?)).collect()
}

/// Insert a new entity and return it with its creation sequence.
pub fn insert_entity(conn: &Connection, id: &str, category: Category, name: &str) -> FusionResult<Entity> {
    conn.execute(
        "INSERT INTO entities (entity_id, category, name) VALUES (?1, ?2, ?3)",
        params![id, category.as_str(), name],
    )?;
    Ok(Entity {
        id: id.to_string(),
        category,
        name: name.to_string(),
        seq: conn.last_insert_rowid(),
    })
}

/// Insert or overwrite one attribute.
pub fn upsert_attribute(conn: &Connection, entity_id: &str, name: &str, value: &str) -> FusionResult<()> {
    conn.execute(
        r#"
        INSERT INTO entity_attributes (entity_id, attribute_name, attribute_value)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(entity_id, attribute_name) DO UPDATE SET
            attribute_value = excluded.attribute_value
        "#,
        params![entity_id, name, value],
    )?;
    Ok(())
}

/// Insert an attribute unless the entity already has one with that name.
///
/// Returns whether a row was written.
pub fn insert_attribute_if_absent(
    conn: &Connection,
    entity_id: &str,
    name: &str,
    value: &str,
) -> FusionResult<bool> {
    let changed = conn.execute(
        r#"
        INSERT INTO entity_attributes (entity_id, attribute_name, attribute_value)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(entity_id, attribute_name) DO NOTHING
        "#,
        params![entity_id, name, value],
    )?;
    Ok(changed > 0)
}

/// Insert one relationship. Both endpoints must exist.
pub fn insert_relationship(conn: &Connection, rel: &Relationship) -> FusionResult<()> {
    conn.execute(
        "INSERT INTO relationships (source_id, relation, target_id) VALUES (?1, ?2, ?3)",
        params![rel.source_id, rel.relation, rel.target_id],
    )?;
    Ok(())
}

/// Fetch an entity by global id.
pub fn get_entity(conn: &Connection, id: &str) -> FusionResult<Option<Entity>> {
    let row = conn
        .query_row(
            "SELECT seq, entity_id, category, name FROM entities WHERE entity_id = ?1",
            params![id],
            entity_from_row,
        )
        .optional()?;
    row.map(to_entity).transpose()
}

/// Attributes of one entity, keyed by name.
pub fn attributes_of(conn: &Connection, entity_id: &str) -> FusionResult<BTreeMap<String, String>> {
    let mut stmt = conn.prepare(
        "SELECT attribute_name, attribute_value FROM entity_attributes WHERE entity_id = ?1",
    )?;
    let rows = stmt.query_map(params![entity_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut attributes = BTreeMap::new();
    for row in rows {
        let (name, value): (String, String) = row?;
        attributes.insert(name, value);
    }
    Ok(attributes)
}

/// Relationships where the entity is source or target, in insertion order.
pub fn relationships_of(conn: &Connection, entity_id: &str) -> FusionResult<Vec<Relationship>> {
    let mut stmt = conn.prepare(
        "SELECT source_id, relation, target_id FROM relationships
         WHERE source_id = ?1 OR target_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![entity_id], |row| {
        Ok(Relationship {
            source_id: row.get(0)?,
            relation: row.get(1)?,
            target_id: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Full record of one entity, or `None` if it does not exist.
pub fn fetch_record(conn: &Connection, id: &str) -> FusionResult<Option<EntityRecord>> {
    let Some(entity) = get_entity(conn, id)? else {
        return Ok(None);
    };
    Ok(Some(EntityRecord {
        attributes: attributes_of(conn, id)?,
        relationships: relationships_of(conn, id)?,
        entity,
    }))
}

/// Live entities of one category in creation order.
pub fn entities_by_category(conn: &Connection, category: Category) -> FusionResult<Vec<Entity>> {
    let mut stmt = conn.prepare(
        "SELECT seq, entity_id, category, name FROM entities WHERE category = ?1 ORDER BY seq",
    )?;
    let rows = stmt.query_map(params![category.as_str()], entity_from_row)?;
    collect_entities(rows)
}

/// All live entities in creation order.
pub fn all_entities(conn: &Connection) -> FusionResult<Vec<Entity>> {
    let mut stmt = conn.prepare("SELECT seq, entity_id, category, name FROM entities ORDER BY seq")?;
    let rows = stmt.query_map([], entity_from_row)?;
    collect_entities(rows)
}

/// Entities sharing a name with at least one other entity.
///
/// Each group is in creation order; groups are ordered by their earliest member.
pub fn duplicate_name_groups(conn: &Connection) -> FusionResult<Vec<Vec<Entity>>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT e.seq, e.entity_id, e.category, e.name
        FROM entities e
        JOIN (
            SELECT name, MIN(seq) AS first_seq FROM entities
            GROUP BY name HAVING COUNT(*) > 1
        ) d ON d.name = e.name
        ORDER BY d.first_seq, e.seq
        "#,
    )?;
    let rows = stmt.query_map([], entity_from_row)?;

    let mut groups: Vec<Vec<Entity>> = Vec::new();
    for entity in collect_entities(rows)? {
        match groups.last_mut() {
            Some(group) if group[0].name == entity.name => group.push(entity),
            _ => groups.push(vec![entity]),
        }
    }
    Ok(groups)
}

/// Every relationship, in insertion order.
pub fn all_relationships(conn: &Connection) -> FusionResult<Vec<Relationship>> {
    let mut stmt = conn.prepare("SELECT source_id, relation, target_id FROM relationships ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(Relationship {
            source_id: row.get(0)?,
            relation: row.get(1)?,
            target_id: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Delete every relationship touching the entity. Returns the number removed.
pub fn delete_relationships_of(conn: &Connection, entity_id: &str) -> FusionResult<usize> {
    Ok(conn.execute(
        "DELETE FROM relationships WHERE source_id = ?1 OR target_id = ?1",
        params![entity_id],
    )?)
}

/// Delete every attribute of the entity. Returns the number removed.
pub fn delete_attributes_of(conn: &Connection, entity_id: &str) -> FusionResult<usize> {
    Ok(conn.execute(
        "DELETE FROM entity_attributes WHERE entity_id = ?1",
        params![entity_id],
    )?)
}

/// Delete the entity row. Attributes and relationships must already be gone.
pub fn delete_entity_row(conn: &Connection, entity_id: &str) -> FusionResult<bool> {
    let changed = conn.execute("DELETE FROM entities WHERE entity_id = ?1", params![entity_id])?;
    Ok(changed > 0)
}

/// Row counts for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreCounts {
    pub entities: usize,
    pub attributes: usize,
    pub relationships: usize,
}

pub fn counts(conn: &Connection) -> FusionResult<StoreCounts> {
    let count = |table: &str| -> FusionResult<usize> {
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(n as usize)
    };
    Ok(StoreCounts {
        entities: count("entities")?,
        attributes: count("entity_attributes")?,
        relationships: count("relationships")?,
    })
}

/// Relationships whose source or target no longer resolves.
pub fn dangling_relationships(conn: &Connection) -> FusionResult<Vec<Relationship>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT r.source_id, r.relation, r.target_id FROM relationships r
        LEFT JOIN entities s ON s.entity_id = r.source_id
        LEFT JOIN entities t ON t.entity_id = r.target_id
        WHERE s.entity_id IS NULL OR t.entity_id IS NULL
        "#,
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Relationship {
            source_id: row.get(0)?,
            relation: row.get(1)?,
            target_id: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::init_schema;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_insert_and_get_entity() {
        let conn = setup();
        let first = insert_entity(&conn, "a", Category::Weapon, "Type 99").unwrap();
        let second = insert_entity(&conn, "b", Category::Weapon, "Type 99A").unwrap();
        assert!(first.seq < second.seq);

        let fetched = get_entity(&conn, "a").unwrap().unwrap();
        assert_eq!(fetched, first);
        assert!(get_entity(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let conn = setup();
        insert_entity(&conn, "a", Category::Person, "Li").unwrap();
        assert!(insert_entity(&conn, "a", Category::Person, "Wang").is_err());
    }

    #[test]
    fn test_upsert_attribute_last_value_wins() {
        let conn = setup();
        insert_entity(&conn, "a", Category::Facility, "Port A").unwrap();
        upsert_attribute(&conn, "a", "capacity", "10").unwrap();
        upsert_attribute(&conn, "a", "capacity", "12").unwrap();

        let attrs = attributes_of(&conn, "a").unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs["capacity"], "12");
    }

    #[test]
    fn test_insert_attribute_if_absent_keeps_existing() {
        let conn = setup();
        insert_entity(&conn, "a", Category::Facility, "Port A").unwrap();
        assert!(insert_attribute_if_absent(&conn, "a", "capacity", "10").unwrap());
        assert!(!insert_attribute_if_absent(&conn, "a", "capacity", "99").unwrap());
        assert_eq!(attributes_of(&conn, "a").unwrap()["capacity"], "10");
    }

    #[test]
    fn test_fetch_record() {
        let conn = setup();
        insert_entity(&conn, "a", Category::Organization, "Eastern Fleet").unwrap();
        insert_entity(&conn, "b", Category::Facility, "Port A").unwrap();
        upsert_attribute(&conn, "a", "size", "12").unwrap();
        insert_relationship(&conn, &Relationship::new("a", "based_at", "b")).unwrap();

        let record = fetch_record(&conn, "a").unwrap().unwrap();
        assert_eq!(record.entity.name, "Eastern Fleet");
        assert_eq!(record.attributes["size"], "12");
        assert_eq!(record.relationships, vec![Relationship::new("a", "based_at", "b")]);
        assert!(fetch_record(&conn, "zzz").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_name_groups() {
        let conn = setup();
        insert_entity(&conn, "a", Category::Organization, "Eastern Fleet").unwrap();
        insert_entity(&conn, "b", Category::Person, "Li Wei").unwrap();
        insert_entity(&conn, "c", Category::Organization, "Eastern Fleet").unwrap();
        insert_entity(&conn, "d", Category::Person, "Li Wei").unwrap();
        insert_entity(&conn, "e", Category::Person, "Unique").unwrap();

        let groups = duplicate_name_groups(&conn).unwrap();
        assert_eq!(groups.len(), 2);
        let ids: Vec<Vec<&str>> = groups
            .iter()
            .map(|g| g.iter().map(|e| e.id.as_str()).collect())
            .collect();
        assert_eq!(ids, vec![vec!["a", "c"], vec!["b", "d"]]);
    }

    #[test]
    fn test_entities_by_category() {
        let conn = setup();
        insert_entity(&conn, "a", Category::Weapon, "x").unwrap();
        insert_entity(&conn, "b", Category::Person, "y").unwrap();
        insert_entity(&conn, "c", Category::Weapon, "z").unwrap();

        let weapons = entities_by_category(&conn, Category::Weapon).unwrap();
        assert_eq!(weapons.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn test_delete_order_respects_foreign_keys() {
        let conn = setup();
        insert_entity(&conn, "a", Category::Weapon, "x").unwrap();
        insert_entity(&conn, "b", Category::Weapon, "y").unwrap();
        upsert_attribute(&conn, "b", "k", "v").unwrap();
        insert_relationship(&conn, &Relationship::new("a", "r", "b")).unwrap();

        assert!(delete_entity_row(&conn, "b").is_err());

        assert_eq!(delete_relationships_of(&conn, "b").unwrap(), 1);
        assert_eq!(delete_attributes_of(&conn, "b").unwrap(), 1);
        assert!(delete_entity_row(&conn, "b").unwrap());
        assert!(dangling_relationships(&conn).unwrap().is_empty());
        assert_eq!(counts(&conn).unwrap().entities, 1);
    }
}

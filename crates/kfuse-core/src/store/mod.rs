//! Relational knowledge store backed by SQLite.
//!
//! The store is the single shared mutable resource of the pipeline. One
//! connection sits behind a mutex; every mutating stage runs its atomicity
//! unit (an ingestion group, a single merge) through
//! [`KnowledgeStore::transaction`], which commits on `Ok` and rolls back on
//! `Err`.

pub mod ops;
pub mod schema;

use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{FusionError, FusionResult};
use crate::types::{Entity, EntityRecord, Relationship};

pub use ops::StoreCounts;

/// Consistent read of everything the graph projector needs.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub records: Vec<EntityRecord>,
    pub relationships: Vec<Relationship>,
}

/// SQLite-backed entity, attribute and relationship store.
pub struct KnowledgeStore {
    conn: Mutex<Connection>,
}

impl KnowledgeStore {
    /// Open (or create) a store file.
    pub fn open(path: impl AsRef<Path>) -> FusionResult<Self> {
        Self::open_with_timeout(path, Duration::from_millis(StoreConfig::default().busy_timeout_ms))
    }

    fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> FusionResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        schema::init_schema(&conn)?;
        info!(path = %path.display(), "Opened knowledge store");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Create a private in-memory store.
    pub fn in_memory() -> FusionResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open the store described by the configuration.
    pub fn from_config(config: &StoreConfig) -> FusionResult<Self> {
        if config.path.as_os_str() == ":memory:" {
            Self::in_memory()
        } else {
            Self::open_with_timeout(&config.path, Duration::from_millis(config.busy_timeout_ms))
        }
    }

    /// Run read-only work against the connection.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> FusionResult<T>) -> FusionResult<T> {
        let conn = self.conn.lock().map_err(|e| FusionError::internal(e.to_string()))?;
        f(&conn)
    }

    /// Run `f` inside one transaction. Commits if `f` succeeds, rolls back otherwise.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> FusionResult<T>) -> FusionResult<T> {
        let mut conn = self.conn.lock().map_err(|e| FusionError::internal(e.to_string()))?;
        let tx = conn.transaction()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                debug!(error = %e, "Rolling back transaction");
                tx.rollback()?;
                Err(e)
            }
        }
    }

    pub fn get_entity(&self, id: &str) -> FusionResult<Option<Entity>> {
        self.read(|conn| ops::get_entity(conn, id))
    }

    pub fn fetch_record(&self, id: &str) -> FusionResult<Option<EntityRecord>> {
        self.read(|conn| ops::fetch_record(conn, id))
    }

    pub fn all_entities(&self) -> FusionResult<Vec<Entity>> {
        self.read(ops::all_entities)
    }

    pub fn all_relationships(&self) -> FusionResult<Vec<Relationship>> {
        self.read(ops::all_relationships)
    }

    pub fn counts(&self) -> FusionResult<StoreCounts> {
        self.read(ops::counts)
    }

    /// Read every live entity with attributes, plus every relationship, in
    /// one transaction so the view is consistent.
    pub fn snapshot(&self) -> FusionResult<StoreSnapshot> {
        self.transaction(|tx| {
            let mut records = Vec::new();
            for entity in ops::all_entities(tx)? {
                let attributes = ops::attributes_of(tx, &entity.id)?;
                records.push(EntityRecord {
                    entity,
                    attributes,
                    relationships: Vec::new(),
                });
            }
            Ok(StoreSnapshot {
                records,
                relationships: ops::all_relationships(tx)?,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;

    #[test]
    fn test_transaction_commits() {
        let store = KnowledgeStore::in_memory().unwrap();
        store
            .transaction(|tx| {
                ops::insert_entity(tx, "a", Category::Person, "Li Wei")?;
                ops::upsert_attribute(tx, "a", "rank", "captain")
            })
            .unwrap();

        let record = store.fetch_record("a").unwrap().unwrap();
        assert_eq!(record.attributes["rank"], "captain");
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = KnowledgeStore::in_memory().unwrap();
        let result: FusionResult<()> = store.transaction(|tx| {
            ops::insert_entity(tx, "a", Category::Person, "Li Wei")?;
            Err(FusionError::database("simulated failure"))
        });

        assert!(result.is_err());
        assert!(store.get_entity("a").unwrap().is_none());
        assert_eq!(store.counts().unwrap(), StoreCounts::default());
    }

    #[test]
    fn test_snapshot() {
        let store = KnowledgeStore::in_memory().unwrap();
        store
            .transaction(|tx| {
                ops::insert_entity(tx, "a", Category::Organization, "Eastern Fleet")?;
                ops::insert_entity(tx, "b", Category::Facility, "Port A")?;
                ops::upsert_attribute(tx, "a", "size", "12")?;
                ops::insert_relationship(tx, &Relationship::new("a", "based_at", "b"))
            })
            .unwrap();

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.records.len(), 2);
        assert_eq!(snapshot.records[0].attributes["size"], "12");
        assert_eq!(snapshot.relationships.len(), 1);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kfuse.db");

        {
            let store = KnowledgeStore::open(&path).unwrap();
            store
                .transaction(|tx| ops::insert_entity(tx, "a", Category::Country, "Atlantis").map(|_| ()))
                .unwrap();
        }

        let store = KnowledgeStore::open(&path).unwrap();
        assert_eq!(store.get_entity("a").unwrap().unwrap().name, "Atlantis");
    }
}

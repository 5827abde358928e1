//! Persisted entity, attribute and relationship types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Category;

/// A canonical entity row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Globally unique id, assigned once at ingestion.
    pub id: String,
    pub category: Category,
    pub name: String,
    /// Creation order. Lower values were ingested earlier.
    pub seq: i64,
}

impl Entity {
    /// Generate a fresh global id.
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// A directed labelled edge between two live entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: String,
    pub relation: String,
    pub target_id: String,
}

impl Relationship {
    pub fn new(source_id: impl Into<String>, relation: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            relation: relation.into(),
            target_id: target_id.into(),
        }
    }

    /// Whether either endpoint is `entity_id`.
    pub fn touches(&self, entity_id: &str) -> bool {
        self.source_id == entity_id || self.target_id == entity_id
    }

    /// Rewrite every endpoint equal to `from` so it points at `to`.
    ///
    /// A self-loop on `from` becomes a self-loop on `to`.
    pub fn rebind(&self, from: &str, to: &str) -> Self {
        let swap = |id: &str| if id == from { to.to_string() } else { id.to_string() };
        Self {
            source_id: swap(&self.source_id),
            relation: self.relation.clone(),
            target_id: swap(&self.target_id),
        }
    }
}

/// Everything the store knows about one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity: Entity,
    /// Attributes keyed by name, unique per entity.
    pub attributes: BTreeMap<String, String>,
    /// Relationships where the entity is source, target or both.
    pub relationships: Vec<Relationship>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebind_source_and_target() {
        let rel = Relationship::new("b", "deployed_at", "c");
        assert_eq!(rel.rebind("b", "a"), Relationship::new("a", "deployed_at", "c"));

        let rel = Relationship::new("c", "operates", "b");
        assert_eq!(rel.rebind("b", "a"), Relationship::new("c", "operates", "a"));
    }

    #[test]
    fn test_rebind_self_loop() {
        let rel = Relationship::new("b", "upgrades", "b");
        assert_eq!(rel.rebind("b", "a"), Relationship::new("a", "upgrades", "a"));
    }

    #[test]
    fn test_touches() {
        let rel = Relationship::new("x", "r", "y");
        assert!(rel.touches("x"));
        assert!(rel.touches("y"));
        assert!(!rel.touches("z"));
    }

    #[test]
    fn test_new_id_is_unique() {
        assert_ne!(Entity::new_id(), Entity::new_id());
    }
}

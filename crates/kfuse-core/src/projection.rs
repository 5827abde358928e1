//! Graph projection.
//!
//! Turns a read-only snapshot of the knowledge store into graph-store upserts:
//! one labelled node per entity and one typed edge per distinct relationship
//! triple. Node identity is the global entity id and edge identity is the
//! triple, so projecting an unchanged snapshot twice yields the same graph.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::FusionConfig;
use crate::error::{FusionError, FusionResult};
use crate::store::{KnowledgeStore, StoreSnapshot};
use crate::traits::{GraphEdge, GraphNode, GraphStore};

/// Property keys set from the entity row itself.
pub const RESERVED_KEYS: [&str; 3] = ["id", "name", "category"];

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w]").unwrap());

/// Replace every non-word character with `_`.
pub fn sanitize_key(key: &str) -> String {
    NON_WORD.replace_all(key, "_").into_owned()
}

/// Counts from one projection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionReport {
    pub nodes: usize,
    pub edges: usize,
    /// Relationship rows collapsed into an existing triple.
    pub duplicate_edges: usize,
    /// Edges whose endpoint was not projected.
    pub skipped_edges: usize,
    /// Attributes overwritten by a later attribute with the same sanitized key.
    pub key_collisions: usize,
    /// Attributes whose sanitized key clashed with a reserved key.
    pub dropped_attributes: usize,
    /// Node or edge writes that failed.
    pub failed: usize,
    pub errors: Vec<String>,
}

/// The graph mutations derived from one snapshot.
#[derive(Debug, Clone, Default)]
pub struct ProjectionPlan {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub report: ProjectionReport,
}

/// Label lookup with fallback.
#[derive(Debug, Clone)]
pub struct LabelMap {
    labels: BTreeMap<String, String>,
    fallback: String,
}

impl LabelMap {
    pub fn new(labels: BTreeMap<String, String>, fallback: impl Into<String>) -> Self {
        Self {
            labels,
            fallback: fallback.into(),
        }
    }

    pub fn from_config(config: &FusionConfig) -> Self {
        Self::new(config.category_label_map.clone(), config.fallback_label.clone())
    }

    pub fn label(&self, category: &str) -> &str {
        self.labels.get(category).map(String::as_str).unwrap_or(&self.fallback)
    }
}

/// Derive nodes and edges from a snapshot. Pure; touches no store.
pub fn plan(snapshot: &StoreSnapshot, labels: &LabelMap) -> ProjectionPlan {
    let mut out = ProjectionPlan::default();
    let mut projected: HashSet<&str> = HashSet::new();

    for record in &snapshot.records {
        let entity = &record.entity;
        let mut properties = BTreeMap::new();

        // Attribute names iterate in sorted order, so the later name wins a collision
        for (name, value) in &record.attributes {
            let key = sanitize_key(name);
            if RESERVED_KEYS.contains(&key.as_str()) {
                warn!(entity = %entity.id, attribute = %name, "Attribute clashes with a reserved key, dropping");
                out.report.dropped_attributes += 1;
                continue;
            }
            if let Some(previous) = properties.insert(key.clone(), value.clone()) {
                warn!(
                    entity = %entity.id,
                    key = %key,
                    attribute = %name,
                    overwritten = %previous,
                    "Sanitized attribute keys collide, last write wins"
                );
                out.report.key_collisions += 1;
            }
        }
        properties.insert("id".to_string(), entity.id.clone());
        properties.insert("name".to_string(), entity.name.clone());
        properties.insert("category".to_string(), entity.category.as_str().to_string());

        out.nodes.push(GraphNode {
            id: entity.id.clone(),
            label: labels.label(entity.category.as_str()).to_string(),
            properties,
        });
        projected.insert(entity.id.as_str());
    }

    let mut seen: HashSet<GraphEdge> = HashSet::new();
    for rel in &snapshot.relationships {
        if !projected.contains(rel.source_id.as_str()) || !projected.contains(rel.target_id.as_str()) {
            warn!(source = %rel.source_id, target = %rel.target_id, relation = %rel.relation, "Edge endpoint not projected, skipping");
            out.report.skipped_edges += 1;
            continue;
        }
        let edge = GraphEdge {
            source_id: rel.source_id.clone(),
            relation: rel.relation.clone(),
            target_id: rel.target_id.clone(),
        };
        if seen.insert(edge.clone()) {
            out.edges.push(edge);
        } else {
            out.report.duplicate_edges += 1;
        }
    }

    out
}

/// Writes the consolidated store into a graph store.
pub struct GraphProjector {
    store: Arc<KnowledgeStore>,
    graph: Arc<dyn GraphStore>,
    labels: LabelMap,
    timeout: Duration,
    cancel: CancellationToken,
}

impl GraphProjector {
    pub fn new(store: Arc<KnowledgeStore>, graph: Arc<dyn GraphStore>, labels: LabelMap, timeout: Duration) -> Self {
        Self {
            store,
            graph,
            labels,
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(store: Arc<KnowledgeStore>, graph: Arc<dyn GraphStore>, config: &FusionConfig) -> Self {
        Self::new(
            store,
            graph,
            LabelMap::from_config(config),
            Duration::from_millis(config.graph_store.timeout_ms),
        )
    }

    /// Stop between writes once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Project the current store contents. Nodes are written before edges.
    pub async fn project(&self) -> FusionResult<ProjectionReport> {
        let span = info_span!("graph_projection");
        async {
            let snapshot = self.store.snapshot()?;
            let ProjectionPlan { nodes, edges, mut report } = plan(&snapshot, &self.labels);
            debug!(nodes = nodes.len(), edges = edges.len(), "Projection planned");

            let mut failed_nodes: HashSet<String> = HashSet::new();
            for node in &nodes {
                self.check_cancelled()?;
                match self.bounded("upsert_node", self.graph.upsert_node(node)).await {
                    Ok(()) => report.nodes += 1,
                    Err(e) => {
                        warn!(id = %node.id, error = %e, "Node write failed");
                        report.failed += 1;
                        report.errors.push(format!("node {}: {}", node.id, e));
                        failed_nodes.insert(node.id.clone());
                    }
                }
            }

            for edge in &edges {
                self.check_cancelled()?;
                if failed_nodes.contains(&edge.source_id) || failed_nodes.contains(&edge.target_id) {
                    report.skipped_edges += 1;
                    continue;
                }
                match self.bounded("upsert_edge", self.graph.upsert_edge(edge)).await {
                    Ok(()) => report.edges += 1,
                    Err(e) => {
                        warn!(source = %edge.source_id, relation = %edge.relation, target = %edge.target_id, error = %e, "Edge write failed");
                        report.failed += 1;
                        report
                            .errors
                            .push(format!("edge {} -[{}]-> {}: {}", edge.source_id, edge.relation, edge.target_id, e));
                    }
                }
            }

            info!(
                nodes = report.nodes,
                edges = report.edges,
                duplicates = report.duplicate_edges,
                collisions = report.key_collisions,
                failed = report.failed,
                "Graph projection complete"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    fn check_cancelled(&self) -> FusionResult<()> {
        if self.cancel.is_cancelled() {
            info!("Graph projection cancelled");
            return Err(FusionError::cancelled("graph projection"));
        }
        Ok(())
    }

    async fn bounded<F>(&self, operation: &str, call: F) -> FusionResult<()>
    where
        F: std::future::Future<Output = FusionResult<()>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(FusionError::timeout(operation, self.timeout.as_millis() as u64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, Entity, EntityRecord, Relationship};

    fn record(id: &str, category: Category, name: &str, attrs: &[(&str, &str)]) -> EntityRecord {
        EntityRecord {
            entity: Entity {
                id: id.to_string(),
                category,
                name: name.to_string(),
                seq: 0,
            },
            attributes: attrs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            relationships: Vec::new(),
        }
    }

    fn labels() -> LabelMap {
        LabelMap::from_config(&FusionConfig::default())
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("max speed (km/h)"), "max_speed__km_h_");
        assert_eq!(sanitize_key("射程"), "射程");
        assert_eq!(sanitize_key("already_ok"), "already_ok");
    }

    #[test]
    fn test_plan_nodes_and_labels() {
        let snapshot = StoreSnapshot {
            records: vec![
                record("a", Category::Incident, "Battle", &[("date", "1942")]),
                record("b", Category::Weapon, "Type 99", &[]),
            ],
            relationships: vec![],
        };
        let mut map = FusionConfig::default().category_label_map;
        map.remove("weapon");
        let plan = plan(&snapshot, &LabelMap::new(map, "Unknown"));

        assert_eq!(plan.nodes[0].label, "Event");
        assert_eq!(plan.nodes[0].properties["date"], "1942");
        assert_eq!(plan.nodes[0].properties["category"], "incident");
        assert_eq!(plan.nodes[1].label, "Unknown");
    }

    #[test]
    fn test_plan_key_collisions_and_reserved() {
        let snapshot = StoreSnapshot {
            records: vec![record(
                "a",
                Category::Person,
                "Li Wei",
                &[("home town", "X"), ("home-town", "Y"), ("name", "alias"), ("id", "z")],
            )],
            relationships: vec![],
        };
        let plan = plan(&snapshot, &labels());

        let props = &plan.nodes[0].properties;
        // "home town" < "home-town" in byte order, so the hyphenated value lands last
        assert_eq!(props["home_town"], "Y");
        assert_eq!(props["name"], "Li Wei");
        assert_eq!(props["id"], "a");
        assert_eq!(plan.report.key_collisions, 1);
        assert_eq!(plan.report.dropped_attributes, 2);
    }

    #[test]
    fn test_plan_dedups_edges() {
        let snapshot = StoreSnapshot {
            records: vec![
                record("a", Category::Organization, "Fleet", &[]),
                record("b", Category::Facility, "Port", &[]),
            ],
            relationships: vec![
                Relationship::new("a", "based_at", "b"),
                Relationship::new("a", "based_at", "b"),
                Relationship::new("a", "supplies", "b"),
                Relationship::new("a", "based_at", "ghost"),
            ],
        };
        let plan = plan(&snapshot, &labels());

        assert_eq!(plan.edges.len(), 2);
        assert_eq!(plan.report.duplicate_edges, 1);
        assert_eq!(plan.report.skipped_edges, 1);
    }
}

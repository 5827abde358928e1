//! Integration tests for the fusion pipeline.
//!
//! Runs ingestion through projection against an in-memory store, a table-driven
//! scorer and an in-memory graph.

use async_trait::async_trait;
use kfuse_core::store::ops;
use kfuse_core::{
    CandidateIndex, CandidatePair, Category, EventBus, ExactMatchMerger, FusionConfig, FusionResult, FuzzyMerger,
    GraphEdge, GraphNode, GraphProjector, GraphStore, Ingestor, JobQueue, KnowledgeStore, LabelMap, MergeStrategy,
    Pipeline, PipelineEvent, SimilarityScorer, Stage,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scores listed name pairs, everything else is dissimilar.
struct TableScorer {
    scores: HashMap<(String, String), f32>,
}

impl TableScorer {
    fn new(pairs: &[(&str, &str, f32)]) -> Self {
        let mut scores = HashMap::new();
        for (a, b, score) in pairs {
            scores.insert((a.to_string(), b.to_string()), *score);
            scores.insert((b.to_string(), a.to_string()), *score);
        }
        Self { scores }
    }
}

#[async_trait]
impl SimilarityScorer for TableScorer {
    async fn score(&self, a: &str, b: &str) -> FusionResult<f32> {
        Ok(*self.scores.get(&(a.to_string(), b.to_string())).unwrap_or(&0.1))
    }

    fn name(&self) -> &str {
        "table"
    }
}

#[derive(Default)]
struct MemoryGraph {
    nodes: Mutex<HashMap<String, GraphNode>>,
    edges: Mutex<HashSet<GraphEdge>>,
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn upsert_node(&self, node: &GraphNode) -> FusionResult<()> {
        self.nodes.lock().unwrap().insert(node.id.clone(), node.clone());
        Ok(())
    }

    async fn upsert_edge(&self, edge: &GraphEdge) -> FusionResult<()> {
        self.edges.lock().unwrap().insert(edge.clone());
        Ok(())
    }

    async fn node_count(&self) -> FusionResult<usize> {
        Ok(self.nodes.lock().unwrap().len())
    }

    async fn edge_count(&self) -> FusionResult<usize> {
        Ok(self.edges.lock().unwrap().len())
    }

    async fn delete_all(&self) -> FusionResult<()> {
        self.nodes.lock().unwrap().clear();
        self.edges.lock().unwrap().clear();
        Ok(())
    }
}

fn sample_batches() -> Vec<Value> {
    vec![
        json!([
            {
                "entities": [
                    {"id": "e1", "type": "organization", "name": "Eastern Fleet", "attributes": {"size": "12"}},
                    {"id": "e2", "type": "weapon", "name": "Type 99 Tank"}
                ],
                "relationships": [{"source": "e1", "target": "e2", "relation": "operates"}]
            }
        ]),
        json!([
            {
                "entities": [
                    {"id": "e3", "type": "organization", "name": "Eastern Fleet", "attributes": {"base": "Port A"}},
                    {"id": "e4", "type": "weapon", "name": "Type-99 Tank"},
                    {"id": "e5", "type": "facility", "name": "Port A"}
                ],
                "relationships": [
                    {"source": "e3", "target": "e5", "relation": "based_at"},
                    {"source": "e3", "target": "e4", "relation": "operates"}
                ]
            }
        ]),
    ]
}

fn entity_named(store: &KnowledgeStore, name: &str) -> Vec<kfuse_core::Entity> {
    store
        .all_entities()
        .unwrap()
        .into_iter()
        .filter(|e| e.name == name)
        .collect()
}

fn pipeline(dir: &tempfile::TempDir) -> (Pipeline, Arc<KnowledgeStore>, Arc<MemoryGraph>) {
    let config = FusionConfig::builder().artifact_dir(dir.path()).build().unwrap();
    let store = Arc::new(KnowledgeStore::in_memory().unwrap());
    let graph = Arc::new(MemoryGraph::default());
    let scorer = Arc::new(TableScorer::new(&[("Type 99 Tank", "Type-99 Tank", 0.96)]));
    let pipeline = Pipeline::new(config, store.clone(), scorer, graph.clone());
    (pipeline, store, graph)
}

/// Two groups each naming "Eastern Fleet" collapse into one entity carrying
/// both attribute sets.
#[test]
fn test_exact_merge_collapses_same_name() {
    let store = Arc::new(KnowledgeStore::in_memory().unwrap());
    Ingestor::new(store.clone()).ingest(&sample_batches()).unwrap();
    assert_eq!(entity_named(&store, "Eastern Fleet").len(), 2);

    let report = ExactMatchMerger::new(store.clone()).run().unwrap();
    assert_eq!(report.merged, 1);

    let fleets = entity_named(&store, "Eastern Fleet");
    assert_eq!(fleets.len(), 1);
    let record = store.fetch_record(&fleets[0].id).unwrap().unwrap();
    assert_eq!(record.attributes["size"], "12");
    assert_eq!(record.attributes["base"], "Port A");
    // Relationships from both groups now hang off the survivor.
    assert_eq!(record.relationships.len(), 3);
}

/// A weapon pair scored 0.96 is merged into the earlier entity and every
/// relationship that touched the absorbed one is rebound.
#[test]
fn test_fuzzy_merge_rebinds_relationships() {
    let store = Arc::new(KnowledgeStore::in_memory().unwrap());
    Ingestor::new(store.clone()).ingest(&sample_batches()).unwrap();

    let x1 = entity_named(&store, "Type 99 Tank").remove(0);
    let x2 = entity_named(&store, "Type-99 Tank").remove(0);

    let mut index = CandidateIndex::new();
    index.insert(Category::Weapon, CandidatePair::new(&x1.id, &x2.id, 0.96));

    let report = FuzzyMerger::new(store.clone(), 0.95, MergeStrategy::Transitive)
        .run(&index)
        .unwrap();
    assert_eq!(report.merged, 1);

    assert!(store.get_entity(&x2.id).unwrap().is_none());
    let rels = store.all_relationships().unwrap();
    assert!(rels.iter().all(|r| !r.touches(&x2.id)));
    assert_eq!(rels.iter().filter(|r| r.target_id == x1.id).count(), 2);
    assert!(store.read(ops::dangling_relationships).unwrap().is_empty());
}

/// Replaying a merge that already happened changes nothing.
#[test]
fn test_fuzzy_merge_rerun_is_noop() {
    let store = Arc::new(KnowledgeStore::in_memory().unwrap());
    Ingestor::new(store.clone()).ingest(&sample_batches()).unwrap();

    let x1 = entity_named(&store, "Type 99 Tank").remove(0);
    let x2 = entity_named(&store, "Type-99 Tank").remove(0);
    let mut index = CandidateIndex::new();
    index.insert(Category::Weapon, CandidatePair::new(&x1.id, &x2.id, 0.99));

    let merger = FuzzyMerger::new(store.clone(), 0.95, MergeStrategy::Transitive);
    merger.run(&index).unwrap();
    let counts = store.counts().unwrap();

    let second = merger.run(&index).unwrap();
    assert_eq!(second.merged, 0);
    assert_eq!(store.counts().unwrap(), counts);
}

/// Projecting the same store twice leaves the graph unchanged.
#[tokio::test]
async fn test_projection_is_idempotent() {
    let store = Arc::new(KnowledgeStore::in_memory().unwrap());
    Ingestor::new(store.clone()).ingest(&sample_batches()).unwrap();
    let graph = Arc::new(MemoryGraph::default());

    let projector = GraphProjector::new(
        store.clone(),
        graph.clone(),
        LabelMap::from_config(&FusionConfig::default()),
        Duration::from_secs(5),
    );
    let first = projector.project().await.unwrap();
    let nodes = graph.node_count().await.unwrap();
    let edges = graph.edge_count().await.unwrap();

    let second = projector.project().await.unwrap();
    assert_eq!(first.nodes, second.nodes);
    assert_eq!(graph.node_count().await.unwrap(), nodes);
    assert_eq!(graph.edge_count().await.unwrap(), edges);
    assert_eq!(nodes, 5);
    assert_eq!(edges, 3);
}

#[tokio::test]
async fn test_full_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, store, graph) = pipeline(&dir);

    let report = pipeline.run(&sample_batches()).await.unwrap();
    assert_eq!(report.ingestion.entities_created, 5);
    assert_eq!(report.exact_merge.merged, 1);
    assert_eq!(report.fuzzy_merge.merged, 1);
    assert!(report.completed_at.is_some());

    // Eastern Fleet, one tank, Port A.
    assert_eq!(store.counts().unwrap().entities, 3);
    assert!(store.read(ops::dangling_relationships).unwrap().is_empty());

    let nodes = graph.nodes.lock().unwrap().clone();
    assert_eq!(nodes.len(), 3);
    let fleet = nodes.values().find(|n| n.properties["name"] == "Eastern Fleet").unwrap();
    assert_eq!(fleet.label, "Organization");
    assert_eq!(fleet.properties["size"], "12");
    assert_eq!(fleet.properties["base"], "Port A");

    for edge in graph.edges.lock().unwrap().iter() {
        assert!(nodes.contains_key(&edge.source_id));
        assert!(nodes.contains_key(&edge.target_id));
    }

    let index = CandidateIndex::load(dir.path().join("high_similarity_pairs.json")).unwrap();
    assert_eq!(index.pairs(Category::Weapon).len(), 1);
}

#[tokio::test]
async fn test_pipeline_emits_stage_events_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, _store, _graph) = pipeline(&dir);
    let mut events = pipeline.events().subscribe();

    pipeline.run(&sample_batches()).await.unwrap();

    let mut seen = Vec::new();
    while let Some(event) = events.try_recv() {
        seen.push((event.event_type(), event.stage()));
    }

    let mut expected = Vec::new();
    for stage in [
        Stage::Ingestion,
        Stage::ExactMerge,
        Stage::SimilarityScan,
        Stage::FuzzyMerge,
        Stage::Projection,
    ] {
        expected.push(("stage.started", Some(stage)));
        expected.push(("stage.completed", Some(stage)));
    }
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_malformed_input_lands_in_error_log() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, _store, _graph) = pipeline(&dir);

    let mut batches = sample_batches();
    batches.push(json!({"entities": []}));
    let report = pipeline.ingest(&batches).unwrap();
    assert_eq!(report.malformed, 1);

    let log = std::fs::read_to_string(dir.path().join("ingestion_errors.log")).unwrap();
    assert!(log.starts_with("2: "));
}

#[tokio::test]
async fn test_job_queue_runs_submitted_documents() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, store, _graph) = pipeline(&dir);
    let bus = EventBus::new();
    let mut events = bus.subscribe();
    let queue = JobQueue::start(pipeline.with_events(bus));

    let handle = queue.submit(Value::Array(sample_batches())).await.unwrap();
    let job_id = handle.id().to_string();
    let report = handle.wait().await.unwrap();
    assert_eq!(report.fuzzy_merge.merged, 1);
    assert_eq!(store.counts().unwrap().entities, 3);
    queue.shutdown().await.unwrap();

    let mut seen = Vec::new();
    while let Some(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(PipelineEvent::JobQueued { .. })));
    match seen.last() {
        Some(PipelineEvent::JobFinished { job_id: id, success, .. }) => {
            assert_eq!(id, &job_id);
            assert!(success);
        }
        other => panic!("unexpected last event: {:?}", other),
    }
    assert!(seen
        .iter()
        .filter(|e| e.stage().is_some())
        .all(|e| e.job_id() == Some(job_id.as_str())));
}

/// Fuzzy merge can be re-run on its own from the index file a previous scan wrote.
#[tokio::test]
async fn test_fuzzy_merge_reads_persisted_index() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, store, _graph) = pipeline(&dir);
    pipeline.ingest(&sample_batches()).unwrap();

    let first = entity_named(&store, "Type 99 Tank").remove(0);
    let second = entity_named(&store, "Type-99 Tank").remove(0);
    let mut index = CandidateIndex::new();
    index.insert(Category::Weapon, CandidatePair::new(second.id.clone(), first.id.clone(), 0.96));
    index.save(dir.path().join("high_similarity_pairs.json")).unwrap();

    let report = pipeline.fuzzy_merge().unwrap();

    assert_eq!(report.merged, 1);
    assert!(store.get_entity(&first.id).unwrap().is_some());
    assert!(store.get_entity(&second.id).unwrap().is_none());
    assert!(store.read(ops::dangling_relationships).unwrap().is_empty());
}

#[tokio::test]
async fn test_scan_reports_failure_when_index_cannot_be_written() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();
    let config = FusionConfig::builder()
        .artifact_dir(dir.path())
        .candidate_index_path(blocker.join("pairs.json"))
        .build()
        .unwrap();
    let store = Arc::new(KnowledgeStore::in_memory().unwrap());
    let scorer = Arc::new(TableScorer::new(&[("Type 99 Tank", "Type-99 Tank", 0.96)]));
    let pipeline = Pipeline::new(config, store, scorer, Arc::new(MemoryGraph::default()));
    pipeline.ingest(&sample_batches()).unwrap();
    let mut events = pipeline.events().subscribe();

    assert!(pipeline.scan().await.is_err());

    let mut seen = Vec::new();
    while let Some(event) = events.try_recv() {
        seen.push((event.event_type(), event.stage()));
    }
    assert_eq!(
        seen,
        vec![
            ("stage.started", Some(Stage::SimilarityScan)),
            ("stage.failed", Some(Stage::SimilarityScan)),
        ]
    );
}

//! Stage composition.
//!
//! [`Pipeline`] owns the collaborators every stage needs and runs the stages in
//! order, handing each one the previous stage's typed result. Every stage is
//! also callable on its own against the durable state it reads (the store, the
//! candidate index file), so a failed or cancelled run can be resumed stage by
//! stage.

mod queue;

pub use queue::{JobHandle, JobQueue};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::FusionConfig;
use crate::error::{FusionError, FusionResult};
use crate::events::{EventBus, PipelineEvent, Stage};
use crate::fusion::{
    ExactMatchMerger, ExactMergeReport, FuzzyMergeReport, FuzzyMerger, ScanReport, ScanSettings, SimilarityScanner,
};
use crate::ingestion::{IngestionOutcome, IngestionReport, Ingestor};
use crate::projection::{GraphProjector, ProjectionReport};
use crate::store::KnowledgeStore;
use crate::traits::{GraphStore, SimilarityScorer};
use crate::types::CandidateIndex;

/// Reports from a full run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub ingestion: IngestionReport,
    pub exact_merge: ExactMergeReport,
    pub scan: ScanReport,
    pub fuzzy_merge: FuzzyMergeReport,
    pub projection: ProjectionReport,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineReport {
    fn new() -> Self {
        Self {
            ingestion: IngestionReport::default(),
            exact_merge: ExactMergeReport::default(),
            scan: ScanReport::default(),
            fuzzy_merge: FuzzyMergeReport::default(),
            projection: ProjectionReport::default(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// Get duration in milliseconds.
    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|completed| (completed - self.started_at).num_milliseconds())
    }
}

/// The knowledge-fusion pipeline.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<FusionConfig>,
    store: Arc<KnowledgeStore>,
    scorer: Arc<dyn SimilarityScorer>,
    graph: Arc<dyn GraphStore>,
    events: EventBus,
    cancel: CancellationToken,
    job_id: Option<String>,
}

impl Pipeline {
    pub fn new(
        config: FusionConfig,
        store: Arc<KnowledgeStore>,
        scorer: Arc<dyn SimilarityScorer>,
        graph: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            scorer,
            graph,
            events: EventBus::new(),
            cancel: CancellationToken::new(),
            job_id: None,
        }
    }

    /// Publish stage events on `events` instead of a private bus.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Stop stages between atomicity units once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// A copy whose events carry `job_id`.
    pub fn for_job(&self, job_id: impl Into<String>) -> Self {
        let mut pipeline = self.clone();
        pipeline.job_id = Some(job_id.into());
        pipeline
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Ingest batches and append diverted items to the configured error log.
    pub fn ingest(&self, batches: &[Value]) -> FusionResult<IngestionReport> {
        self.started(Stage::Ingestion);
        let result = self.ingestor().ingest(batches).and_then(|outcome| self.persist_errors(outcome));
        self.finish(Stage::Ingestion, result)
    }

    /// Ingest a whole extraction document (a JSON list of batches).
    pub fn ingest_document(&self, document: &Value) -> FusionResult<IngestionReport> {
        self.started(Stage::Ingestion);
        let result = self
            .ingestor()
            .ingest_document(document)
            .and_then(|outcome| self.persist_errors(outcome));
        self.finish(Stage::Ingestion, result)
    }

    pub fn exact_merge(&self) -> FusionResult<ExactMergeReport> {
        self.started(Stage::ExactMerge);
        let result = ExactMatchMerger::new(self.store.clone())
            .with_cancellation(self.cancel.clone())
            .run();
        self.finish(Stage::ExactMerge, result)
    }

    /// Scan for candidates and persist the index to the configured path.
    pub async fn scan(&self) -> FusionResult<(CandidateIndex, ScanReport)> {
        self.started(Stage::SimilarityScan);
        let scanner = SimilarityScanner::new(
            self.store.clone(),
            self.scorer.clone(),
            ScanSettings::from_config(&self.config),
        )
        .with_cancellation(self.cancel.clone());

        let result = match scanner.scan().await {
            Ok((index, report)) => index
                .save(&self.config.candidate_index_path)
                .map(|()| (index, report)),
            Err(e) => Err(e),
        };
        match result {
            Ok((index, report)) => {
                let report = self.finish(Stage::SimilarityScan, Ok(report))?;
                Ok((index, report))
            }
            Err(e) => {
                self.failed(Stage::SimilarityScan, &e);
                Err(e)
            }
        }
    }

    /// Merge high-confidence pairs from the persisted candidate index.
    pub fn fuzzy_merge(&self) -> FusionResult<FuzzyMergeReport> {
        match CandidateIndex::load(&self.config.candidate_index_path) {
            Ok(index) => self.fuzzy_merge_index(&index),
            Err(e) => {
                self.started(Stage::FuzzyMerge);
                self.finish(Stage::FuzzyMerge, Err(e))
            }
        }
    }

    /// Merge high-confidence pairs from an in-memory index.
    pub fn fuzzy_merge_index(&self, index: &CandidateIndex) -> FusionResult<FuzzyMergeReport> {
        self.started(Stage::FuzzyMerge);
        let result = FuzzyMerger::from_config(self.store.clone(), &self.config)
            .with_cancellation(self.cancel.clone())
            .run(index);
        self.finish(Stage::FuzzyMerge, result)
    }

    pub async fn project(&self) -> FusionResult<ProjectionReport> {
        self.started(Stage::Projection);
        let result = GraphProjector::from_config(self.store.clone(), self.graph.clone(), &self.config)
            .with_cancellation(self.cancel.clone())
            .project()
            .await;
        self.finish(Stage::Projection, result)
    }

    /// Run every stage after extraction, in order.
    pub async fn run(&self, batches: &[Value]) -> FusionResult<PipelineReport> {
        let mut report = PipelineReport::new();
        report.ingestion = self.ingest(batches)?;
        self.run_fusion(&mut report).await?;
        Ok(report)
    }

    /// Like [`Pipeline::run`] for a whole extraction document.
    pub async fn run_document(&self, document: &Value) -> FusionResult<PipelineReport> {
        let mut report = PipelineReport::new();
        report.ingestion = self.ingest_document(document)?;
        self.run_fusion(&mut report).await?;
        Ok(report)
    }

    async fn run_fusion(&self, report: &mut PipelineReport) -> FusionResult<()> {
        report.exact_merge = self.exact_merge()?;
        let (index, scan) = self.scan().await?;
        report.scan = scan;
        report.fuzzy_merge = self.fuzzy_merge_index(&index)?;
        report.projection = self.project().await?;
        report.complete();
        info!(duration_ms = report.duration_ms().unwrap_or_default(), "Pipeline run complete");
        Ok(())
    }

    fn ingestor(&self) -> Ingestor {
        Ingestor::new(self.store.clone()).with_cancellation(self.cancel.clone())
    }

    fn persist_errors(&self, outcome: IngestionOutcome) -> FusionResult<IngestionReport> {
        outcome.errors.append_to(&self.config.error_log_path)?;
        if !outcome.errors.is_empty() {
            info!(
                entries = outcome.errors.len(),
                path = %self.config.error_log_path.display(),
                "Wrote ingestion error log"
            );
        }
        Ok(outcome.report)
    }

    fn started(&self, stage: Stage) {
        info!(%stage, "Stage started");
        self.events
            .emit(PipelineEvent::stage_started(self.job_id.as_deref(), stage));
    }

    fn failed(&self, stage: Stage, e: &FusionError) {
        error!(%stage, error = %e, "Stage failed");
        self.events
            .emit(PipelineEvent::stage_failed(self.job_id.as_deref(), stage, e.to_string()));
    }

    fn finish<T: Serialize>(&self, stage: Stage, result: FusionResult<T>) -> FusionResult<T> {
        match &result {
            Ok(report) => {
                let summary = serde_json::to_value(report).unwrap_or_default();
                self.events
                    .emit(PipelineEvent::stage_completed(self.job_id.as_deref(), stage, summary));
            }
            Err(e) => self.failed(stage, e),
        }
        result
    }
}

//! Similarity scanner.
//!
//! For each category, every unordered pair of live entity names is scored and
//! pairs strictly above the candidate threshold go into a [`CandidateIndex`].
//! Scoring calls run concurrently up to a fixed bound; results are folded into
//! the index by the single consuming task. No blocking keys are applied.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::FusionConfig;
use crate::error::{FusionError, FusionResult};
use crate::store::{ops, KnowledgeStore};
use crate::traits::SimilarityScorer;
use crate::types::{CandidateIndex, CandidatePair, Category, Entity};

/// Counts from one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub categories: usize,
    pub comparisons: usize,
    pub candidates: usize,
    /// Comparisons aborted by a scorer error or timeout.
    pub failed: usize,
}

/// Scanner settings, usually taken from [`FusionConfig`].
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub candidate_threshold: f32,
    pub timeout: Duration,
    pub concurrency: usize,
    pub categories: Vec<Category>,
}

impl ScanSettings {
    pub fn from_config(config: &FusionConfig) -> Self {
        Self {
            candidate_threshold: config.candidate_threshold,
            timeout: Duration::from_millis(config.similarity.timeout_ms),
            concurrency: config.similarity.concurrency.max(1),
            categories: config.categories_to_scan(),
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self::from_config(&FusionConfig::default())
    }
}

/// Produces the candidate-duplicate index.
pub struct SimilarityScanner {
    store: Arc<KnowledgeStore>,
    scorer: Arc<dyn SimilarityScorer>,
    settings: ScanSettings,
    cancel: CancellationToken,
}

impl SimilarityScanner {
    pub fn new(store: Arc<KnowledgeStore>, scorer: Arc<dyn SimilarityScorer>, settings: ScanSettings) -> Self {
        Self {
            store,
            scorer,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort the scan once `token` is cancelled. Nothing is persisted by a
    /// cancelled scan.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Scan every configured category.
    pub async fn scan(&self) -> FusionResult<(CandidateIndex, ScanReport)> {
        let span = info_span!("similarity_scan", scorer = self.scorer.name());
        async {
            let mut index = CandidateIndex::new();
            let mut report = ScanReport::default();

            for category in &self.settings.categories {
                let entities = self.store.read(|conn| ops::entities_by_category(conn, *category))?;
                report.categories += 1;
                self.scan_category(*category, entities, &mut index, &mut report).await?;
            }

            info!(
                categories = report.categories,
                comparisons = report.comparisons,
                candidates = report.candidates,
                failed = report.failed,
                "Similarity scan complete"
            );
            Ok((index, report))
        }
        .instrument(span)
        .await
    }

    async fn scan_category(
        &self,
        category: Category,
        entities: Vec<Entity>,
        index: &mut CandidateIndex,
        report: &mut ScanReport,
    ) -> FusionResult<()> {
        let n = entities.len();
        if n < 2 {
            debug!(%category, entities = n, "Nothing to compare");
            return Ok(());
        }
        debug!(%category, entities = n, pairs = n * (n - 1) / 2, "Scanning category");

        let entities = Arc::new(entities);
        let pairs = (0..n).flat_map(|i| (i + 1..n).map(move |j| (i, j)));
        let timeout = self.settings.timeout;

        let mut scored = stream::iter(pairs)
            .map(|(i, j)| {
                let scorer = self.scorer.clone();
                let entities = entities.clone();
                async move {
                    let (a, b) = (&entities[i], &entities[j]);
                    let result = match tokio::time::timeout(timeout, scorer.score(&a.name, &b.name)).await {
                        Ok(result) => result,
                        Err(_) => Err(FusionError::timeout(
                            format!("similarity({}, {})", a.name, b.name),
                            timeout.as_millis() as u64,
                        )),
                    };
                    (i, j, result)
                }
            })
            .buffer_unordered(self.settings.concurrency);

        while let Some((i, j, result)) = scored.next().await {
            if self.cancel.is_cancelled() {
                info!(%category, "Similarity scan cancelled");
                return Err(FusionError::cancelled("similarity scan"));
            }
            report.comparisons += 1;
            let (a, b) = (&entities[i], &entities[j]);

            let score = match result.and_then(validate_score) {
                Ok(score) => score,
                Err(e) => {
                    warn!(%category, a = %a.id, b = %b.id, error = %e, "Comparison failed, skipping pair");
                    report.failed += 1;
                    continue;
                }
            };

            if score > self.settings.candidate_threshold {
                debug!(%category, a = %a.name, b = %b.name, score, "Candidate pair");
                index.insert(category, CandidatePair::new(a.id.clone(), b.id.clone(), score));
                report.candidates += 1;
            }
        }
        Ok(())
    }
}

fn validate_score(score: f32) -> FusionResult<f32> {
    if score.is_finite() && (0.0..=1.0).contains(&score) {
        Ok(score)
    } else {
        Err(FusionError::invalid_response(format!("score {} outside [0, 1]", score)))
    }
}

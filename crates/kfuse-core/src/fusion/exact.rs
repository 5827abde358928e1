//! Exact-match merger.
//!
//! Entities with identical names are folded into the earliest-created one,
//! whatever their categories. The primary keeps its own category.
//! Merges never change a name, so one pass reaches the fixpoint.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn};

use super::merge::{CategoryRule, MergeOutcome, Merger};
use crate::error::{FusionError, FusionResult};
use crate::store::{ops, KnowledgeStore};

/// Counts from one exact-merge run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactMergeReport {
    /// Names shared by two or more entities.
    pub groups: usize,
    pub merged: usize,
    pub skipped: usize,
    /// Duplicates folded into a primary of another category.
    pub category_conflicts: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Collapses entities that share a name.
pub struct ExactMatchMerger {
    store: Arc<KnowledgeStore>,
    merger: Merger,
    cancel: CancellationToken,
}

impl ExactMatchMerger {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self {
            merger: Merger::new(store.clone()),
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop between merges once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn run(&self) -> FusionResult<ExactMergeReport> {
        let _span = info_span!("exact_merge").entered();
        let groups = self.store.read(ops::duplicate_name_groups)?;
        let mut report = ExactMergeReport {
            groups: groups.len(),
            ..Default::default()
        };

        for group in groups {
            let Some((primary, duplicates)) = group.split_first() else {
                continue;
            };

            for duplicate in duplicates {
                if self.cancel.is_cancelled() {
                    info!(merged = report.merged, "Exact merge cancelled");
                    return Err(FusionError::cancelled("exact merge"));
                }

                if duplicate.category != primary.category {
                    warn!(
                        name = %primary.name,
                        primary = %primary.id,
                        duplicate = %duplicate.id,
                        primary_category = %primary.category,
                        duplicate_category = %duplicate.category,
                        "Same name in different categories, primary keeps its category"
                    );
                    report.category_conflicts += 1;
                }

                match self.merger.merge_with(&primary.id, &duplicate.id, CategoryRule::Any) {
                    Ok(MergeOutcome::Merged { .. }) => report.merged += 1,
                    Ok(MergeOutcome::Skipped(_)) => report.skipped += 1,
                    Err(e) => {
                        error!(primary = %primary.id, duplicate = %duplicate.id, error = %e, "Merge rolled back");
                        report.failed += 1;
                        report
                            .errors
                            .push(format!("{} <- {}: {}", primary.id, duplicate.id, e));
                    }
                }
            }
        }

        info!(
            groups = report.groups,
            merged = report.merged,
            conflicts = report.category_conflicts,
            failed = report.failed,
            "Exact merge complete"
        );
        Ok(report)
    }
}

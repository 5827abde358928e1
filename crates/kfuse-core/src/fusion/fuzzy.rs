//! Fuzzy merger.
//!
//! Consumes a [`CandidateIndex`] and merges pairs scoring strictly above the
//! merge threshold. Pairs between the candidate and merge thresholds stay in
//! the index as review candidates. Merges run one at a time.
//!
//! With [`MergeStrategy::Transitive`] accepted pairs are clustered with
//! union-find, so a chain `a~b, b~c` collapses into one entity even when `a`
//! and `c` were never scored above the threshold. The survivor of a cluster is
//! its earliest-created live member. [`MergeStrategy::Pairwise`] merges each
//! pair on its own; once one side of a pair is consumed, later pairs naming it
//! are skipped.

use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span};

use super::merge::{MergeOutcome, Merger};
use crate::config::{FusionConfig, MergeStrategy};
use crate::error::{FusionError, FusionResult};
use crate::store::KnowledgeStore;
use crate::types::{CandidateIndex, CandidatePair, Category, Entity};

/// Counts from one fuzzy-merge run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzyMergeReport {
    /// Pairs above the merge threshold.
    pub accepted_pairs: usize,
    /// Pairs kept for review without merging.
    pub review_pairs: usize,
    /// Groups of entities merged together (one per pair when pairwise).
    pub clusters: usize,
    pub merged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Merges high-confidence candidate pairs.
pub struct FuzzyMerger {
    store: Arc<KnowledgeStore>,
    merger: Merger,
    merge_threshold: f32,
    strategy: MergeStrategy,
    cancel: CancellationToken,
}

impl FuzzyMerger {
    pub fn new(store: Arc<KnowledgeStore>, merge_threshold: f32, strategy: MergeStrategy) -> Self {
        Self {
            merger: Merger::new(store.clone()),
            store,
            merge_threshold,
            strategy,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(store: Arc<KnowledgeStore>, config: &FusionConfig) -> Self {
        Self::new(store, config.merge_threshold, config.merge_strategy)
    }

    /// Stop between merges once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn run(&self, index: &CandidateIndex) -> FusionResult<FuzzyMergeReport> {
        let _span = info_span!("fuzzy_merge", strategy = ?self.strategy).entered();
        let mut report = FuzzyMergeReport::default();

        for category in index.categories() {
            let (accepted, review): (Vec<CandidatePair>, Vec<CandidatePair>) = index
                .pairs(category)
                .into_iter()
                .partition(|pair| pair.score > self.merge_threshold);
            report.accepted_pairs += accepted.len();
            report.review_pairs += review.len();
            debug!(%category, accepted = accepted.len(), review = review.len(), "Partitioned candidates");

            match self.strategy {
                MergeStrategy::Transitive => self.merge_clusters(category, &accepted, &mut report)?,
                MergeStrategy::Pairwise => self.merge_pairs(&accepted, &mut report)?,
            }
        }

        info!(
            accepted = report.accepted_pairs,
            review = report.review_pairs,
            merged = report.merged,
            skipped = report.skipped,
            failed = report.failed,
            "Fuzzy merge complete"
        );
        Ok(report)
    }

    fn merge_clusters(
        &self,
        category: Category,
        accepted: &[CandidatePair],
        report: &mut FuzzyMergeReport,
    ) -> FusionResult<()> {
        for cluster in clusters(accepted) {
            // Members consumed since the scan no longer take part
            let mut live: Vec<Entity> = Vec::with_capacity(cluster.len());
            for id in &cluster {
                match self.store.get_entity(id)? {
                    Some(entity) => live.push(entity),
                    None => {
                        debug!(%category, id = %id, "Cluster member already consumed");
                        report.skipped += 1;
                    }
                }
            }
            if live.len() < 2 {
                continue;
            }
            live.sort_by_key(|e| e.seq);
            report.clusters += 1;

            let survivor = &live[0];
            for absorbed in &live[1..] {
                self.merge_one(&survivor.id, &absorbed.id, report)?;
            }
        }
        Ok(())
    }

    fn merge_pairs(&self, accepted: &[CandidatePair], report: &mut FuzzyMergeReport) -> FusionResult<()> {
        for pair in accepted {
            let (a, b) = match (self.store.get_entity(&pair.a)?, self.store.get_entity(&pair.b)?) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    info!(a = %pair.a, b = %pair.b, "Skipping pair: entity already consumed");
                    report.skipped += 1;
                    continue;
                }
            };
            report.clusters += 1;
            let (survivor, absorbed) = if a.seq <= b.seq { (a, b) } else { (b, a) };
            self.merge_one(&survivor.id, &absorbed.id, report)?;
        }
        Ok(())
    }

    fn merge_one(&self, survivor: &str, absorbed: &str, report: &mut FuzzyMergeReport) -> FusionResult<()> {
        if self.cancel.is_cancelled() {
            info!(merged = report.merged, "Fuzzy merge cancelled");
            return Err(FusionError::cancelled("fuzzy merge"));
        }
        match self.merger.merge(survivor, absorbed) {
            Ok(MergeOutcome::Merged { .. }) => report.merged += 1,
            Ok(MergeOutcome::Skipped(_)) => report.skipped += 1,
            Err(e) => {
                error!(survivor, absorbed, error = %e, "Merge rolled back");
                report.failed += 1;
                report.errors.push(format!("{} <- {}: {}", survivor, absorbed, e));
            }
        }
        Ok(())
    }
}

/// Connected components of the pair graph, each sorted by id, in order of
/// their smallest id.
fn clusters(pairs: &[CandidatePair]) -> Vec<Vec<String>> {
    let mut ids: Vec<&str> = pairs.iter().flat_map(|p| [p.a.as_str(), p.b.as_str()]).collect();
    ids.sort_unstable();
    ids.dedup();
    let position: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let mut sets = UnionFind::<usize>::new(ids.len());
    for pair in pairs {
        sets.union(position[pair.a.as_str()], position[pair.b.as_str()]);
    }

    let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for (i, id) in ids.iter().enumerate() {
        groups.entry(sets.find(i)).or_default().push(id.to_string());
    }
    let mut out: Vec<Vec<String>> = groups.into_values().collect();
    out.sort_by(|x, y| x[0].cmp(&y[0]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ops;
    use crate::types::Relationship;

    fn store_with(ids: &[&str]) -> Arc<KnowledgeStore> {
        let store = Arc::new(KnowledgeStore::in_memory().unwrap());
        store
            .transaction(|tx| {
                for id in ids {
                    ops::insert_entity(tx, id, Category::Weapon, &format!("name {}", id))?;
                }
                Ok(())
            })
            .unwrap();
        store
    }

    fn index(pairs: &[(&str, &str, f32)]) -> CandidateIndex {
        let mut index = CandidateIndex::new();
        for (a, b, s) in pairs {
            index.insert(Category::Weapon, CandidatePair::new(*a, *b, *s));
        }
        index
    }

    #[test]
    fn test_clusters() {
        let pairs = vec![
            CandidatePair::new("c", "b", 1.0),
            CandidatePair::new("a", "b", 1.0),
            CandidatePair::new("x", "y", 1.0),
        ];
        assert_eq!(
            clusters(&pairs),
            vec![
                vec!["a".to_string(), "b".to_string(), "c".to_string()],
                vec!["x".to_string(), "y".to_string()]
            ]
        );
    }

    #[test]
    fn test_merge_threshold_gates_pairs() {
        let store = store_with(&["x1", "x2", "x3", "x4"]);
        let index = index(&[("x1", "x2", 0.96), ("x3", "x4", 0.95)]);

        let report = FuzzyMerger::new(store.clone(), 0.95, MergeStrategy::Transitive)
            .run(&index)
            .unwrap();

        assert_eq!(report.accepted_pairs, 1);
        assert_eq!(report.review_pairs, 1);
        assert_eq!(report.merged, 1);
        assert!(store.get_entity("x2").unwrap().is_none());
        assert!(store.get_entity("x3").unwrap().is_some());
        assert!(store.get_entity("x4").unwrap().is_some());
    }

    #[test]
    fn test_transitive_chain_collapses_to_earliest() {
        // c is created first, so it survives even though it sorts last
        let store = store_with(&["c", "a", "b"]);
        store
            .transaction(|tx| ops::insert_relationship(tx, &Relationship::new("a", "variant_of", "b")))
            .unwrap();
        let index = index(&[("a", "b", 0.99), ("b", "c", 0.97)]);

        let report = FuzzyMerger::new(store.clone(), 0.95, MergeStrategy::Transitive)
            .run(&index)
            .unwrap();

        assert_eq!(report.clusters, 1);
        assert_eq!(report.merged, 2);
        let live: Vec<String> = store.all_entities().unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(live, vec!["c".to_string()]);
        assert_eq!(
            store.all_relationships().unwrap(),
            vec![Relationship::new("c", "variant_of", "c")]
        );
    }

    #[test]
    fn test_pairwise_does_not_close_chains() {
        let store = store_with(&["a", "b", "c"]);
        let index = index(&[("a", "b", 0.99), ("b", "c", 0.97)]);

        let report = FuzzyMerger::new(store.clone(), 0.95, MergeStrategy::Pairwise)
            .run(&index)
            .unwrap();

        assert_eq!(report.merged, 1);
        assert_eq!(report.skipped, 1);
        let live: Vec<String> = store.all_entities().unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(live, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_later_created_smaller_id_is_absorbed() {
        // "a" sorts first but was created after "z"
        for strategy in [MergeStrategy::Transitive, MergeStrategy::Pairwise] {
            let store = store_with(&["z", "a"]);
            store
                .transaction(|tx| ops::upsert_attribute(tx, "a", "caliber", "125mm"))
                .unwrap();
            let index = index(&[("a", "z", 0.99)]);

            let report = FuzzyMerger::new(store.clone(), 0.95, strategy).run(&index).unwrap();

            assert_eq!(report.merged, 1, "{:?}", strategy);
            assert!(store.get_entity("a").unwrap().is_none());
            let survivor = store.fetch_record("z").unwrap().unwrap();
            assert_eq!(survivor.attributes.get("caliber").map(String::as_str), Some("125mm"));
        }
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let store = store_with(&["x1", "x2"]);
        let index = index(&[("x1", "x2", 0.96)]);
        let merger = FuzzyMerger::new(store.clone(), 0.95, MergeStrategy::Transitive);

        assert_eq!(merger.run(&index).unwrap().merged, 1);
        let before = store.snapshot().unwrap();

        let again = merger.run(&index).unwrap();
        assert_eq!(again.merged, 0);
        assert_eq!(again.failed, 0);
        assert_eq!(again.skipped, 1);
        assert_eq!(store.snapshot().unwrap().records, before.records);
    }
}

//! Candidate pairs produced by the similarity scanner.
//!
//! Pairs are unordered: `(a, b)` and `(b, a)` are the same candidate and are
//! stored once under the lexicographically smaller id first. The index is
//! persisted as JSON keyed by category so it can be inspected by hand and
//! re-read by the fuzzy merger.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use super::Category;
use crate::error::{ErrorCode, FusionError, FusionResult};

/// One scored, unordered pair of entities in the same category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePair {
    pub a: String,
    pub b: String,
    pub score: f32,
}

impl CandidatePair {
    /// Build a pair in canonical id order.
    pub fn new(first: impl Into<String>, second: impl Into<String>, score: f32) -> Self {
        let (first, second) = (first.into(), second.into());
        if first <= second {
            Self { a: first, b: second, score }
        } else {
            Self { a: second, b: first, score }
        }
    }

    fn key(&self) -> (String, String) {
        (self.a.clone(), self.b.clone())
    }
}

/// Per-category set of candidate pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateIndex {
    pairs: BTreeMap<Category, HashMap<(String, String), f32>>,
}

impl CandidateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pair. If the unordered pair is already present the higher
    /// score is kept.
    pub fn insert(&mut self, category: Category, pair: CandidatePair) {
        let slot = self.pairs.entry(category).or_default();
        let score = slot.entry(pair.key()).or_insert(pair.score);
        if pair.score > *score {
            *score = pair.score;
        }
    }

    /// Score recorded for an unordered pair, if any.
    pub fn get(&self, category: Category, first: &str, second: &str) -> Option<f32> {
        let probe = CandidatePair::new(first, second, 0.0);
        self.pairs.get(&category)?.get(&probe.key()).copied()
    }

    /// Pairs for one category, sorted by id for deterministic iteration.
    pub fn pairs(&self, category: Category) -> Vec<CandidatePair> {
        let mut out: Vec<CandidatePair> = self
            .pairs
            .get(&category)
            .map(|slot| {
                slot.iter()
                    .map(|((a, b), score)| CandidatePair {
                        a: a.clone(),
                        b: b.clone(),
                        score: *score,
                    })
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by(|x, y| (&x.a, &x.b).cmp(&(&y.a, &y.b)));
        out
    }

    /// Categories that have at least one pair.
    pub fn categories(&self) -> Vec<Category> {
        self.pairs
            .iter()
            .filter(|(_, slot)| !slot.is_empty())
            .map(|(category, _)| *category)
            .collect()
    }

    /// Total number of pairs across categories.
    pub fn len(&self) -> usize {
        self.pairs.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize to the on-disk JSON shape.
    pub fn to_json(&self) -> serde_json::Value {
        let map: BTreeMap<&'static str, Vec<CandidatePair>> = self
            .categories()
            .into_iter()
            .map(|category| (category.as_str(), self.pairs(category)))
            .collect();
        serde_json::json!(map)
    }

    /// Parse the on-disk JSON shape. Unknown category keys are an error.
    pub fn from_json(value: serde_json::Value) -> FusionResult<Self> {
        let raw: BTreeMap<String, Vec<CandidatePair>> = serde_json::from_value(value)?;
        let mut index = Self::new();
        for (key, pairs) in raw {
            let category = Category::from_str_flexible(&key).ok_or_else(|| {
                FusionError::malformed(
                    format!("Unknown category in candidate index: {}", key),
                    ErrorCode::InUnknownCategory,
                )
            })?;
            for pair in pairs {
                index.insert(category, CandidatePair::new(pair.a, pair.b, pair.score));
            }
        }
        Ok(index)
    }

    /// Write the index as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> FusionResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let body = serde_json::to_string_pretty(&self.to_json())?;
        std::fs::write(path, body)?;
        Ok(())
    }

    /// Read an index written by [`CandidateIndex::save`].
    pub fn load(path: impl AsRef<Path>) -> FusionResult<Self> {
        let body = std::fs::read_to_string(path)?;
        Self::from_json(serde_json::from_str(&body)?)
    }
}

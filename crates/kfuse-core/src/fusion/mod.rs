//! Entity fusion stages: exact-match merging, similarity scanning and fuzzy
//! merging, all built on the single [`merge_into`] procedure.

mod exact;
mod fuzzy;
mod merge;
mod scanner;

pub use exact::{ExactMatchMerger, ExactMergeReport};
pub use fuzzy::{FuzzyMergeReport, FuzzyMerger};
pub use merge::{merge_into, merge_with, CategoryRule, MergeOutcome, Merger, SkipReason};
pub use scanner::{ScanReport, ScanSettings, SimilarityScanner};

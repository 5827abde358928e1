//! The merge procedure: fold one entity into another.
//!
//! 1. Fetch both records; skip if either is gone.
//! 2. Copy attributes the survivor lacks. Existing keys are never overwritten.
//! 3. Rewrite every relationship touching the absorbed entity to the survivor.
//! 4. Delete the absorbed entity's relationships, then attributes, then the row.
//!
//! One call is one transaction, so a failure leaves both entities untouched.

use rusqlite::Connection;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::FusionResult;
use crate::store::{ops, KnowledgeStore};

/// Why a merge did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SameEntity,
    SurvivorMissing,
    AbsorbedMissing,
    CategoryMismatch,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SameEntity => "same entity",
            Self::SurvivorMissing => "survivor no longer exists",
            Self::AbsorbedMissing => "absorbed entity already consumed",
            Self::CategoryMismatch => "categories differ",
        };
        f.write_str(s)
    }
}

/// Result of one merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged {
        attributes_copied: usize,
        relationships_rebound: usize,
    },
    Skipped(SkipReason),
}

impl MergeOutcome {
    pub fn is_merged(&self) -> bool {
        matches!(self, Self::Merged { .. })
    }
}

/// Whether a merge may join entities of different categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryRule {
    /// Skip pairs whose categories differ.
    Same,
    /// Merge regardless; the survivor keeps its own category.
    Any,
}

/// Merge `absorbed` into `survivor` on the given connection.
///
/// Callers own the transaction; use [`Merger::merge`] for the usual
/// one-merge-per-transaction form.
pub fn merge_into(conn: &Connection, survivor: &str, absorbed: &str) -> FusionResult<MergeOutcome> {
    merge_with(conn, survivor, absorbed, CategoryRule::Same)
}

/// Like [`merge_into`], with an explicit category rule.
pub fn merge_with(conn: &Connection, survivor: &str, absorbed: &str, rule: CategoryRule) -> FusionResult<MergeOutcome> {
    if survivor == absorbed {
        return Ok(MergeOutcome::Skipped(SkipReason::SameEntity));
    }

    let Some(keep) = ops::fetch_record(conn, survivor)? else {
        info!(survivor, absorbed, "Skipping merge: survivor no longer exists");
        return Ok(MergeOutcome::Skipped(SkipReason::SurvivorMissing));
    };
    let Some(gone) = ops::fetch_record(conn, absorbed)? else {
        info!(survivor, absorbed, "Skipping merge: entity already consumed");
        return Ok(MergeOutcome::Skipped(SkipReason::AbsorbedMissing));
    };
    if keep.entity.category != gone.entity.category && rule == CategoryRule::Same {
        warn!(
            survivor,
            absorbed,
            survivor_category = %keep.entity.category,
            absorbed_category = %gone.entity.category,
            "Skipping merge: category is immutable"
        );
        return Ok(MergeOutcome::Skipped(SkipReason::CategoryMismatch));
    }

    let mut attributes_copied = 0;
    for (name, value) in &gone.attributes {
        if ops::insert_attribute_if_absent(conn, survivor, name, value)? {
            attributes_copied += 1;
        } else {
            debug!(survivor, attribute = %name, "Keeping survivor's attribute value");
        }
    }

    for rel in &gone.relationships {
        ops::insert_relationship(conn, &rel.rebind(absorbed, survivor))?;
    }

    ops::delete_relationships_of(conn, absorbed)?;
    ops::delete_attributes_of(conn, absorbed)?;
    ops::delete_entity_row(conn, absorbed)?;

    info!(
        survivor,
        absorbed,
        name = %gone.entity.name,
        attributes_copied,
        relationships = gone.relationships.len(),
        "Merged entity"
    );
    Ok(MergeOutcome::Merged {
        attributes_copied,
        relationships_rebound: gone.relationships.len(),
    })
}

/// Runs merges against a store, one transaction each.
#[derive(Clone)]
pub struct Merger {
    store: Arc<KnowledgeStore>,
}

impl Merger {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self { store }
    }

    /// Merge `absorbed` into `survivor` atomically.
    pub fn merge(&self, survivor: &str, absorbed: &str) -> FusionResult<MergeOutcome> {
        self.store.transaction(|tx| merge_into(tx, survivor, absorbed))
    }

    /// Merge atomically under an explicit category rule.
    pub fn merge_with(&self, survivor: &str, absorbed: &str, rule: CategoryRule) -> FusionResult<MergeOutcome> {
        self.store.transaction(|tx| merge_with(tx, survivor, absorbed, rule))
    }
}

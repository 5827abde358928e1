//! Ingestion and identity assignment.
//!
//! Every extracted entity gets a fresh global id. Batch-local ids are resolved
//! through a mapping that lives for one group only, so identical local ids in
//! different groups never collide. Each group commits as one transaction; a
//! failing group is rolled back and the next group proceeds.

mod error_log;
mod input;

pub use error_log::{ErrorEntry, ErrorLog};
pub use input::{
    normalize_value, parse_entity, parse_group, parse_relationship, EntityInput, RawGroup, RelationshipInput,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn};

use crate::error::{FusionError, FusionResult};
use crate::store::{ops, KnowledgeStore};
use crate::types::{Entity, Relationship};

/// Counts from one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub batches: usize,
    pub groups_committed: usize,
    pub groups_failed: usize,
    /// Batches or groups diverted to the error log for their shape.
    pub malformed: usize,
    pub entities_created: usize,
    pub entities_rejected: usize,
    pub attributes_written: usize,
    pub relationships_written: usize,
    pub relationships_rejected: usize,
}

/// Report plus the items diverted along the way.
#[derive(Debug, Clone, Default)]
pub struct IngestionOutcome {
    pub report: IngestionReport,
    pub errors: ErrorLog,
}

#[derive(Debug, Default)]
struct GroupStats {
    entities_created: usize,
    entities_rejected: usize,
    attributes_written: usize,
    relationships_written: usize,
    relationships_rejected: usize,
    rejections: Vec<(Value, String)>,
}

/// Persists extraction batches into the knowledge store.
pub struct Ingestor {
    store: Arc<KnowledgeStore>,
    cancel: CancellationToken,
}

impl Ingestor {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self {
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop between groups once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Ingest a whole extraction document: a JSON list of batches.
    ///
    /// A document that is not a list is diverted as a single error entry.
    pub fn ingest_document(&self, document: &Value) -> FusionResult<IngestionOutcome> {
        match document {
            Value::Array(batches) => self.ingest(batches),
            other => {
                warn!("Extraction document is not a list of batches");
                let mut outcome = IngestionOutcome::default();
                outcome.report.malformed += 1;
                outcome
                    .errors
                    .push_input(other.to_string(), "top level is not a list of batches");
                Ok(outcome)
            }
        }
    }

    /// Ingest batches in order. Returns `Err` only on cancellation; store
    /// failures are contained to their group.
    pub fn ingest(&self, batches: &[Value]) -> FusionResult<IngestionOutcome> {
        let _span = info_span!("ingest", batches = batches.len()).entered();
        let mut outcome = IngestionOutcome::default();

        for (batch_index, batch) in batches.iter().enumerate() {
            outcome.report.batches += 1;
            let Value::Array(groups) = batch else {
                warn!(batch = batch_index, "Batch is not a list, diverting");
                outcome.report.malformed += 1;
                outcome.errors.push(batch_index, batch, "Not a list");
                continue;
            };

            for (group_index, group_value) in groups.iter().enumerate() {
                if self.cancel.is_cancelled() {
                    info!(batch = batch_index, group = group_index, "Ingestion cancelled");
                    return Err(FusionError::cancelled("ingestion"));
                }

                let group = match parse_group(group_value) {
                    Ok(group) => group,
                    Err(reason) => {
                        warn!(batch = batch_index, group = group_index, %reason, "Malformed group, diverting");
                        outcome.report.malformed += 1;
                        outcome.errors.push(batch_index, group_value, reason);
                        continue;
                    }
                };

                match self.store.transaction(|tx| ingest_group(tx, &group)) {
                    Ok(stats) => {
                        let report = &mut outcome.report;
                        report.groups_committed += 1;
                        report.entities_created += stats.entities_created;
                        report.entities_rejected += stats.entities_rejected;
                        report.attributes_written += stats.attributes_written;
                        report.relationships_written += stats.relationships_written;
                        report.relationships_rejected += stats.relationships_rejected;
                        for (raw, reason) in stats.rejections {
                            outcome.errors.push(batch_index, &raw, reason);
                        }
                    }
                    Err(e) => {
                        error!(batch = batch_index, group = group_index, error = %e, "Group rolled back");
                        outcome.report.groups_failed += 1;
                        outcome
                            .errors
                            .push(batch_index, group_value, format!("group rolled back: {}", e));
                    }
                }
            }
        }

        info!(
            groups = outcome.report.groups_committed,
            failed = outcome.report.groups_failed,
            entities = outcome.report.entities_created,
            relationships = outcome.report.relationships_written,
            rejected = outcome.report.relationships_rejected,
            "Ingestion complete"
        );
        Ok(outcome)
    }
}

/// Write one group. Runs inside the caller's transaction.
fn ingest_group(conn: &rusqlite::Connection, group: &RawGroup) -> FusionResult<GroupStats> {
    let mut stats = GroupStats::default();
    let mut local_to_global: HashMap<String, String> = HashMap::new();

    for raw in &group.entities {
        let input = match parse_entity(raw) {
            Ok(input) => input,
            Err(reason) => {
                warn!(%reason, "Entity rejected");
                stats.entities_rejected += 1;
                stats.rejections.push((raw.clone(), reason));
                continue;
            }
        };

        let global_id = Entity::new_id();
        ops::insert_entity(conn, &global_id, input.category, &input.name)?;
        debug!(id = %global_id, local = %input.local_id, name = %input.name, "Inserted entity");
        stats.entities_created += 1;

        for (name, value) in &input.attributes {
            ops::upsert_attribute(conn, &global_id, name, value)?;
            stats.attributes_written += 1;
        }

        if let Some(previous) = local_to_global.insert(input.local_id.clone(), global_id) {
            warn!(local = %input.local_id, previous = %previous, "Local id reused within group, rebinding");
        }
    }

    for raw in &group.relationships {
        let input = match parse_relationship(raw) {
            Ok(input) => input,
            Err(reason) => {
                warn!(%reason, "Relationship rejected");
                stats.relationships_rejected += 1;
                stats.rejections.push((raw.clone(), reason));
                continue;
            }
        };

        match (local_to_global.get(&input.source), local_to_global.get(&input.target)) {
            (Some(source), Some(target)) => {
                ops::insert_relationship(conn, &Relationship::new(source, input.relation, target))?;
                stats.relationships_written += 1;
            }
            (source, target) => {
                let missing = match (source, target) {
                    (None, None) => format!("{} and {}", input.source, input.target),
                    (None, _) => input.source.clone(),
                    _ => input.target.clone(),
                };
                let err = FusionError::unresolved(missing);
                warn!(error = %err, "Relationship rejected");
                stats.relationships_rejected += 1;
                stats.rejections.push((raw.clone(), err.to_string()));
            }
        }
    }

    Ok(stats)
}

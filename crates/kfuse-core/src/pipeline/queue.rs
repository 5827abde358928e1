//! Sequential job queue for pipeline runs.
//!
//! Jobs are executed one at a time by a single background worker so two runs
//! never interleave their merges against the same store.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Pipeline, PipelineReport};
use crate::error::{FusionError, FusionResult};
use crate::events::PipelineEvent;

const DEFAULT_CAPACITY: usize = 64;

struct QueuedJob {
    id: String,
    document: Value,
    reply: oneshot::Sender<FusionResult<PipelineReport>>,
}

/// Handle to a submitted job.
pub struct JobHandle {
    id: String,
    rx: oneshot::Receiver<FusionResult<PipelineReport>>,
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the job to finish.
    pub async fn wait(self) -> FusionResult<PipelineReport> {
        self.rx
            .await
            .map_err(|_| FusionError::internal(format!("job {} dropped before completion", self.id)))?
    }
}

/// Queue of pipeline runs backed by one worker task.
pub struct JobQueue {
    sender: mpsc::Sender<QueuedJob>,
    worker: JoinHandle<()>,
    pipeline: Pipeline,
}

impl JobQueue {
    /// Spawn the worker. Must be called inside a tokio runtime.
    pub fn start(pipeline: Pipeline) -> Self {
        Self::with_capacity(pipeline, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(pipeline: Pipeline, capacity: usize) -> Self {
        let (sender, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(pipeline.clone(), rx));
        debug!(capacity, "Job queue started");
        Self {
            sender,
            worker,
            pipeline,
        }
    }

    /// Queue an extraction document (a JSON list of batches).
    pub async fn submit(&self, document: Value) -> FusionResult<JobHandle> {
        let id = Uuid::new_v4().to_string();
        let (reply, rx) = oneshot::channel();
        self.pipeline.events().emit(PipelineEvent::JobQueued {
            job_id: id.clone(),
            timestamp: chrono::Utc::now(),
        });
        self.sender
            .send(QueuedJob {
                id: id.clone(),
                document,
                reply,
            })
            .await
            .map_err(|_| FusionError::internal("job queue worker has stopped"))?;
        debug!(job_id = %id, "Job queued");
        Ok(JobHandle { id, rx })
    }

    /// Stop accepting jobs and wait for queued ones to finish.
    pub async fn shutdown(self) -> FusionResult<()> {
        drop(self.sender);
        self.worker
            .await
            .map_err(|e| FusionError::internal(format!("job queue worker panicked: {}", e)))?;
        info!("Job queue shut down");
        Ok(())
    }
}

async fn run_worker(pipeline: Pipeline, mut rx: mpsc::Receiver<QueuedJob>) {
    while let Some(job) = rx.recv().await {
        info!(job_id = %job.id, "Job started");
        let result = pipeline.for_job(job.id.clone()).run_document(&job.document).await;

        let error = result.as_ref().err().map(|e| e.to_string());
        if let Some(e) = &error {
            warn!(job_id = %job.id, error = %e, "Job failed");
        }
        pipeline.events().emit(PipelineEvent::JobFinished {
            job_id: job.id.clone(),
            success: error.is_none(),
            error,
            timestamp: chrono::Utc::now(),
        });

        if job.reply.send(result).is_err() {
            debug!(job_id = %job.id, "Job handle dropped before completion");
        }
    }
}

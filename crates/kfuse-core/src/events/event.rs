//! Pipeline progress events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Ingestion,
    ExactMerge,
    SimilarityScan,
    FuzzyMerge,
    Projection,
}

/// Events emitted while stages and jobs run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageStarted {
        #[serde(skip_serializing_if = "Option::is_none")]
        job_id: Option<String>,
        stage: Stage,
        timestamp: DateTime<Utc>,
    },
    StageCompleted {
        #[serde(skip_serializing_if = "Option::is_none")]
        job_id: Option<String>,
        stage: Stage,
        /// The stage report, serialized.
        summary: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    StageFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        job_id: Option<String>,
        stage: Stage,
        error: String,
        timestamp: DateTime<Utc>,
    },
    JobQueued {
        job_id: String,
        timestamp: DateTime<Utc>,
    },
    JobFinished {
        job_id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    pub fn stage_started(job_id: Option<&str>, stage: Stage) -> Self {
        Self::StageStarted {
            job_id: job_id.map(str::to_string),
            stage,
            timestamp: Utc::now(),
        }
    }

    pub fn stage_completed(job_id: Option<&str>, stage: Stage, summary: serde_json::Value) -> Self {
        Self::StageCompleted {
            job_id: job_id.map(str::to_string),
            stage,
            summary,
            timestamp: Utc::now(),
        }
    }

    pub fn stage_failed(job_id: Option<&str>, stage: Stage, error: impl Into<String>) -> Self {
        Self::StageFailed {
            job_id: job_id.map(str::to_string),
            stage,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StageStarted { .. } => "stage.started",
            Self::StageCompleted { .. } => "stage.completed",
            Self::StageFailed { .. } => "stage.failed",
            Self::JobQueued { .. } => "job.queued",
            Self::JobFinished { .. } => "job.finished",
        }
    }

    /// Stage this event concerns, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::StageStarted { stage, .. } | Self::StageCompleted { stage, .. } | Self::StageFailed { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::StageStarted { job_id, .. }
            | Self::StageCompleted { job_id, .. }
            | Self::StageFailed { job_id, .. } => job_id.as_deref(),
            Self::JobQueued { job_id, .. } | Self::JobFinished { job_id, .. } => Some(job_id),
        }
    }
}

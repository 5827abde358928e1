//! Resumable extraction over a chunked document.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use kfuse_core::config::FusionConfig;
use kfuse_core::error::{FusionError, FusionResult};
use kfuse_core::events::{EventBus, PipelineEvent, Stage};
use kfuse_core::traits::Extractor;

use crate::text::split_text;

/// Counts from one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub chunks: usize,
    /// Chunks already processed by an earlier run.
    pub skipped: usize,
    pub extracted: usize,
    pub failed: usize,
    /// Batches in the output file after this run.
    pub total_batches: usize,
}

/// Runs an extractor over chunks, persisting output and progress after every
/// successful chunk.
///
/// The batches file is a JSON list of batches in completion order; the progress
/// file is a JSON list of processed chunk indices. A failed chunk is left out of
/// progress and retried on the next run.
pub struct ExtractionRunner {
    extractor: Arc<dyn Extractor>,
    batches_path: PathBuf,
    progress_path: PathBuf,
    cancel: CancellationToken,
    events: Option<EventBus>,
}

impl ExtractionRunner {
    pub fn new(extractor: Arc<dyn Extractor>, batches_path: impl Into<PathBuf>, progress_path: impl Into<PathBuf>) -> Self {
        Self {
            extractor,
            batches_path: batches_path.into(),
            progress_path: progress_path.into(),
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    pub fn from_config(extractor: Arc<dyn Extractor>, config: &FusionConfig) -> Self {
        Self::new(extractor, &config.batches_path, &config.progress_path)
    }

    /// Stop between chunks once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Report stage start and completion on `events`.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Batches extracted so far.
    pub fn load_batches(&self) -> FusionResult<Vec<Value>> {
        read_json_or_default(&self.batches_path)
    }

    /// Chunk indices extracted so far.
    pub fn load_progress(&self) -> FusionResult<BTreeSet<usize>> {
        read_json_or_default(&self.progress_path)
    }

    /// Split `text` and extract every chunk not yet processed.
    pub async fn run_text(&self, text: &str, chunk_size: usize) -> FusionResult<ExtractionReport> {
        self.run(&split_text(text, chunk_size)).await
    }

    pub async fn run(&self, chunks: &[String]) -> FusionResult<ExtractionReport> {
        self.emit(PipelineEvent::stage_started(None, Stage::Extraction));
        let span = info_span!("extract", chunks = chunks.len());
        let result = self.run_chunks(chunks).instrument(span).await;

        match &result {
            Ok(report) => self.emit(PipelineEvent::stage_completed(
                None,
                Stage::Extraction,
                serde_json::to_value(report).unwrap_or_default(),
            )),
            Err(e) => self.emit(PipelineEvent::stage_failed(None, Stage::Extraction, e.to_string())),
        }
        result
    }

    async fn run_chunks(&self, chunks: &[String]) -> FusionResult<ExtractionReport> {
        let mut batches = self.load_batches()?;
        let mut processed = self.load_progress()?;
        let mut report = ExtractionReport {
            chunks: chunks.len(),
            ..Default::default()
        };

        for (index, chunk) in chunks.iter().enumerate() {
            if processed.contains(&index) {
                report.skipped += 1;
                continue;
            }
            if self.cancel.is_cancelled() {
                info!(chunk = index, "Extraction cancelled");
                return Err(FusionError::cancelled("extraction"));
            }

            match self.extractor.extract(chunk).await {
                Ok(batch) => {
                    batches.push(batch);
                    processed.insert(index);
                    write_json(&self.batches_path, &batches)?;
                    write_json(&self.progress_path, &processed)?;
                    report.extracted += 1;
                }
                Err(e) => {
                    warn!(chunk = index, error = %e, "Chunk extraction failed, leaving for retry");
                    report.failed += 1;
                }
            }
        }

        report.total_batches = batches.len();
        info!(
            extracted = report.extracted,
            skipped = report.skipped,
            failed = report.failed,
            "Extraction complete"
        );
        Ok(report)
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }
}

fn read_json_or_default<T: serde::de::DeserializeOwned + Default>(path: &Path) -> FusionResult<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write through a sibling temp file so a crash never leaves a truncated file.
fn write_json<T: Serialize>(path: &Path, value: &T) -> FusionResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

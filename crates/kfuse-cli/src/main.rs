//! kfuse - command-line driver for the fusion pipeline.

mod args;
mod context;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use kfuse_core::{
    CandidateIndex, ErrorLog, ExactMatchMerger, FusionConfig, FuzzyMerger, GraphProjector, Ingestor, ScanSettings,
    SimilarityScanner,
};
use kfuse_extractors::{read_text_file, ExtractionReport, ExtractionRunner, HttpExtractor};
use kfuse_graph_stores::GraphStoreFactory;
use kfuse_similarity::SimilarityFactory;
use serde::Serialize;
use serde_json::Value;
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::args::{Cli, Commands, FuzzyMergeArgs, RunArgs};
use crate::context::Context;

const CRATES: [&str; 5] = ["kfuse_cli", "kfuse_core", "kfuse_similarity", "kfuse_graph_stores", "kfuse_extractors"];

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs)?;

    let ctx = Context::from_cli(&cli)?;
    spawn_interrupt_handler(&ctx);

    match cli.command {
        Commands::Extract(args) => {
            let report = extract(&ctx, &args.file, args.chunk_size).await?;
            print_json(&report)
        }
        Commands::Ingest(args) => {
            let path = args.input.as_deref().unwrap_or(&ctx.config.batches_path);
            let document = read_document(&ctx.config, path)?;
            let outcome = Ingestor::new(ctx.store.clone())
                .with_cancellation(ctx.cancel.clone())
                .ingest_document(&document)?;
            outcome.errors.append_to(&ctx.config.error_log_path)?;
            if !outcome.errors.is_empty() {
                warn!(
                    rejected = outcome.errors.len(),
                    log = %ctx.config.error_log_path.display(),
                    "Some input was rejected"
                );
            }
            print_json(&outcome.report)
        }
        Commands::ExactMerge => {
            let report = ExactMatchMerger::new(ctx.store.clone())
                .with_cancellation(ctx.cancel.clone())
                .run()?;
            print_json(&report)
        }
        Commands::Scan => {
            let scorer = SimilarityFactory::create(&ctx.config.similarity)?;
            let (index, report) =
                SimilarityScanner::new(ctx.store.clone(), scorer, ScanSettings::from_config(&ctx.config))
                    .with_cancellation(ctx.cancel.clone())
                    .scan()
                    .await?;
            index.save(&ctx.config.candidate_index_path)?;
            info!(path = %ctx.config.candidate_index_path.display(), pairs = index.len(), "Wrote candidate index");
            print_json(&report)
        }
        Commands::FuzzyMerge(args) => fuzzy_merge(&ctx, args),
        Commands::Project(args) => {
            let graph = GraphStoreFactory::create(&ctx.config.graph_store).await?;
            if args.reset {
                warn!("Deleting every node and edge before projecting");
                graph.delete_all().await?;
            }
            let report = GraphProjector::from_config(ctx.store.clone(), graph, &ctx.config)
                .with_cancellation(ctx.cancel.clone())
                .project()
                .await?;
            print_json(&report)
        }
        Commands::Run(args) => run(&ctx, args).await,
        Commands::Stats => print_json(&ctx.store.counts()?),
    }
}

fn init_tracing(verbose: bool, json: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env().add_directive(Level::WARN.into());
    for name in CRATES {
        filter = filter.add_directive(format!("{}={}", name, level).parse()?);
    }

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
    Ok(())
}

/// First Ctrl+C asks running stages to stop after the current unit.
fn spawn_interrupt_handler(ctx: &Context) {
    let token = ctx.cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current unit");
            token.cancel();
        }
    });
}

fn extraction_runner(ctx: &Context) -> Result<ExtractionRunner> {
    let extractor = HttpExtractor::new(&ctx.config.extraction)?;
    Ok(ExtractionRunner::from_config(Arc::new(extractor), &ctx.config)
        .with_cancellation(ctx.cancel.clone())
        .with_events(ctx.events.clone()))
}

async fn extract(ctx: &Context, file: &Path, chunk_size: Option<usize>) -> Result<ExtractionReport> {
    let text = read_text_file(file)?;
    let chunk_size = chunk_size.unwrap_or(ctx.config.extraction.chunk_size);
    let report = extraction_runner(ctx)?.run_text(&text, chunk_size).await?;
    Ok(report)
}

fn fuzzy_merge(ctx: &Context, args: FuzzyMergeArgs) -> Result<()> {
    let index = CandidateIndex::load(&ctx.config.candidate_index_path).with_context(|| {
        format!(
            "Failed to load candidate index from {} (run `kfuse scan` first)",
            ctx.config.candidate_index_path.display()
        )
    })?;
    let threshold = args.threshold.unwrap_or(ctx.config.merge_threshold);
    let strategy = args.strategy.map(Into::into).unwrap_or(ctx.config.merge_strategy);

    let report = FuzzyMerger::new(ctx.store.clone(), threshold, strategy)
        .with_cancellation(ctx.cancel.clone())
        .run(&index)?;
    print_json(&report)
}

async fn run(ctx: &Context, args: RunArgs) -> Result<()> {
    if args.events {
        let mut events = ctx.events.subscribe();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Ok(line) = serde_json::to_string(&event) {
                    eprintln!("{}", line);
                }
            }
        });
    }

    let pipeline = ctx.pipeline().await?;
    let report = match (args.document, args.input) {
        (Some(document), _) => {
            let extraction = extract(ctx, &document, None).await?;
            if extraction.failed > 0 {
                warn!(failed = extraction.failed, "Some chunks failed and will be retried on the next run");
            }
            let batches = extraction_runner(ctx)?.load_batches()?;
            pipeline.run(&batches).await?
        }
        (None, input) => {
            let path = input.unwrap_or_else(|| ctx.config.batches_path.clone());
            let document = read_document(&ctx.config, &path)?;
            pipeline.run_document(&document).await?
        }
    };
    print_json(&report)
}

/// Parse a batches file. A file that is not JSON is recorded in the error log.
fn read_document(config: &FusionConfig, path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    match serde_json::from_str(&content) {
        Ok(document) => Ok(document),
        Err(e) => {
            let mut log = ErrorLog::new();
            log.push_input(path.display().to_string(), format!("not valid JSON: {}", e));
            log.append_to(&config.error_log_path)?;
            Err(anyhow::anyhow!("{} is not valid JSON: {}", path.display(), e))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_document_logs_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let config = FusionConfig::builder().artifact_dir(dir.path()).build().unwrap();
        let input = dir.path().join("batches.json");
        std::fs::write(&input, "[[{\"entities\": ").unwrap();

        assert!(read_document(&config, &input).is_err());
        let log = std::fs::read_to_string(&config.error_log_path).unwrap();
        assert!(log.contains("not valid JSON"));
    }

    #[test]
    fn test_read_document_parses_batches() {
        let dir = tempfile::tempdir().unwrap();
        let config = FusionConfig::builder().artifact_dir(dir.path()).build().unwrap();
        let input = dir.path().join("batches.json");
        std::fs::write(&input, r#"[{"entities": [], "relationships": []}]"#).unwrap();

        let document = read_document(&config, &input).unwrap();
        assert!(document.is_array());
        assert!(!config.error_log_path.exists());
    }
}

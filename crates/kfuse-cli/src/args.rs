//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use kfuse_core::MergeStrategy;

#[derive(Parser, Debug)]
#[command(name = "kfuse")]
#[command(about = "Entity resolution and knowledge fusion pipeline", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(long, short, global = true, env = "KFUSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Relational store path, overriding the configuration
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Verbose output (debug level logging)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract entity batches from a text document
    Extract(ExtractArgs),

    /// Ingest extracted batches into the relational store
    Ingest(IngestArgs),

    /// Merge entities that share a name
    ExactMerge,

    /// Score same-category name pairs and write the candidate index
    Scan,

    /// Merge high-confidence candidate pairs
    FuzzyMerge(FuzzyMergeArgs),

    /// Project the store into the graph database
    Project(ProjectArgs),

    /// Run every stage from ingestion to projection
    Run(RunArgs),

    /// Show store row counts
    Stats,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Text document to extract from
    pub file: PathBuf,

    /// Characters per chunk, overriding the configuration
    #[arg(long)]
    pub chunk_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Extracted batches file, defaults to the configured batches path
    #[arg(long, short)]
    pub input: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct FuzzyMergeArgs {
    /// Merge threshold, overriding the configuration
    #[arg(long)]
    pub threshold: Option<f32>,

    /// How chained candidate pairs are resolved
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,
}

#[derive(Args, Debug)]
pub struct ProjectArgs {
    /// Delete every node and edge before projecting
    #[arg(long)]
    pub reset: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Text document to extract first; without it the batches file is used
    #[arg(long)]
    pub document: Option<PathBuf>,

    /// Extracted batches file, defaults to the configured batches path
    #[arg(long, short)]
    pub input: Option<PathBuf>,

    /// Print pipeline events to stderr as JSON lines
    #[arg(long)]
    pub events: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyArg {
    Transitive,
    Pairwise,
}

impl From<StrategyArg> for MergeStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Transitive => MergeStrategy::Transitive,
            StrategyArg::Pairwise => MergeStrategy::Pairwise,
        }
    }
}

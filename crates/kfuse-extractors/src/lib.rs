//! kfuse-extractors - Text chunking and model-backed entity extraction.
//!
//! Turns a source document into the JSON batches ingestion consumes:
//!
//! 1. [`read_text_file`] and [`split_text`] produce fixed-size chunks
//! 2. an [`Extractor`](kfuse_core::traits::Extractor) turns each chunk into a batch
//! 3. [`ExtractionRunner`] persists batches and progress after every chunk so an
//!    interrupted run resumes where it stopped

mod http;
mod prompt;
mod runner;
mod text;

pub use http::{parse_model_output, HttpExtractor};
pub use prompt::PromptTemplate;
pub use runner::{ExtractionReport, ExtractionRunner};
pub use text::{decode_text, read_text_file, split_text};

// Re-export core types for convenience
pub use kfuse_core::traits::{ExtractionConfig, Extractor};

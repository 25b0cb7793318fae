//! # rustkscholar
//!
//! Korean literature search across KCI and RISS: query normalization,
//! record normalization, detail enrichment, merge and deduplication.
//!
//! ## Modules
//!
//! - [`tree`] / [`extract`] - XML response tree and text extraction
//! - [`kci`] - KCI article search, normalizer and detail lookups
//! - [`enrich`] - Concurrent, cached detail enrichment
//! - [`riss`] - RISS catalog search with title/keyword/yearly strategies
//! - [`merge`] - Canonical records, merge and dedup
//! - [`query`] - Keyword mapping, LLM expansion and query bundles
//! - [`pipeline`] - End-to-end search
//! - [`analysis`] / [`export`] - Summaries and CSV output
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustkscholar::config::{KciConfig, RissConfig};
//! use rustkscholar::pipeline::{Pipeline, SearchRequest};
//! use rustkscholar::query::{KeywordMapping, QueryNormalizer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let normalizer = QueryNormalizer::new(KeywordMapping::default(), None);
//!     let pipeline = Pipeline::from_configs(
//!         normalizer,
//!         Some(KciConfig::new("kci-key")),
//!         Some(RissConfig::new("riss-key")),
//!     )?;
//!     let outcome = pipeline.run(&SearchRequest::new("청년 고용")).await?;
//!     println!("Found {} records", outcome.records.len());
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod enrich;
pub mod error;
pub mod export;
pub mod extract;
pub mod kci;
pub mod merge;
pub mod pipeline;
pub mod prompts;
pub mod query;
pub mod riss;
pub mod tree;

pub use error::{Result, ScholarError};

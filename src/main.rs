//! rustkscholar - KCI + RISS literature search
//!
//! Normalizes a free-text query, searches KCI and RISS, merges and
//! deduplicates the results and writes them as CSV.
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! rustkscholar search "청년 고용" --start-year 2018 --end-year 2025
//! rustkscholar normalize "청년 고용"
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! rustkscholar serve --port 3000
//! ```
//!
//! API keys are read from the environment or a `.env` file:
//! `KCI_API_KEY`, `RISS_API_KEY`, `OPENAI_API_KEY`, `OPENAI_BASE_URL`.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use rustkscholar::analysis::{display_title, source_counts, ViewFilter};
use rustkscholar::config::{KciConfig, LlmConfig, RissConfig, DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL};
use rustkscholar::export::export_all;
use rustkscholar::pipeline::{Pipeline, SearchOutcome, SearchRequest, DEFAULT_END_YEAR, DEFAULT_START_YEAR};
use rustkscholar::query::{KeywordMapping, QueryExpander, QueryNormalizer};
use rustkscholar::riss::{DocType, DEFAULT_MAX_RESULTS};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// KCI + RISS literature search
#[derive(Parser)]
#[command(name = "rustkscholar")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(flatten)]
    keys: ApiKeys,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ApiKeys {
    /// KCI open API key
    #[arg(long, env = "KCI_API_KEY", global = true, hide_env_values = true)]
    kci_key: Option<String>,

    /// RISS open API key
    #[arg(long, env = "RISS_API_KEY", global = true, hide_env_values = true)]
    riss_key: Option<String>,

    /// OpenAI-compatible API key (query expansion)
    #[arg(long, env = "OPENAI_API_KEY", global = true, hide_env_values = true)]
    llm_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", global = true, default_value = DEFAULT_LLM_BASE_URL)]
    llm_base_url: String,

    /// LLM model name
    #[arg(long, global = true, default_value = DEFAULT_LLM_MODEL)]
    llm_model: String,

    /// Keyword mapping CSV
    #[arg(long, global = true, default_value = "keyword_mapping.csv")]
    mapping: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Search KCI and RISS, merge the results and save CSV files
    Search {
        /// Free-text query
        query: String,

        /// First publication year
        #[arg(long, default_value_t = DEFAULT_START_YEAR)]
        start_year: i32,

        /// Last publication year
        #[arg(long, default_value_t = DEFAULT_END_YEAR)]
        end_year: i32,

        /// Skip KCI
        #[arg(long)]
        no_kci: bool,

        /// Skip RISS
        #[arg(long)]
        no_riss: bool,

        /// Skip KCI detail lookups for missing keywords/abstracts
        #[arg(long)]
        no_details: bool,

        /// RISS document type: T, A, F or mixed
        #[arg(long, default_value = "T")]
        doc_type: String,

        /// Maximum RISS results per document type
        #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
        max_riss: usize,

        /// Expand the query with the LLM
        #[arg(long)]
        use_ai: bool,

        /// Keep only records whose title or authors contain this text
        #[arg(long)]
        filter_text: Option<String>,

        /// Keep only records from these years (comma separated)
        #[arg(long, value_delimiter = ',')]
        filter_year: Vec<String>,

        /// Output directory
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,
    },

    /// Print the normalized query bundle
    Normalize {
        /// Free-text query
        query: String,

        /// Expand the query with the LLM
        #[arg(long)]
        use_ai: bool,
    },

    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be loaded before clap reads the env fallbacks
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.json_logs {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }

    match cli.command {
        Commands::Search {
            query,
            start_year,
            end_year,
            no_kci,
            no_riss,
            no_details,
            doc_type,
            max_riss,
            use_ai,
            filter_text,
            filter_year,
            output,
        } => {
            let doc_types = DocType::parse_selection(&doc_type).context("Invalid --doc-type")?;
            let filter = (filter_text.is_some() || !filter_year.is_empty()).then(|| ViewFilter {
                years: filter_year,
                text: filter_text.unwrap_or_default(),
                ..ViewFilter::default()
            });
            let request = SearchRequest {
                query,
                start_year,
                end_year,
                use_kci: !no_kci,
                use_riss: !no_riss,
                fetch_details: !no_details,
                doc_types,
                max_riss,
                use_ai,
                filter,
            };
            run_search(&cli.keys, request, output).await
        }
        Commands::Normalize { query, use_ai } => {
            let normalizer = build_normalizer(&cli.keys, use_ai)?;
            let bundle = normalizer.normalize(&query).await;
            println!("{}", serde_json::to_string_pretty(&bundle)?);
            Ok(())
        }
        Commands::Serve { port, host } => run_server(&cli.keys, host, port).await,
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn build_normalizer(keys: &ApiKeys, use_ai: bool) -> Result<QueryNormalizer> {
    let mapping = KeywordMapping::load(&keys.mapping);

    let expander = match (use_ai, non_empty(&keys.llm_key)) {
        (true, Some(api_key)) => {
            let config = LlmConfig {
                base_url: keys.llm_base_url.clone(),
                model: keys.llm_model.clone(),
                ..LlmConfig::new(api_key)
            };
            Some(QueryExpander::new(config).context("Failed to create LLM client")?)
        }
        (true, None) => {
            warn!("OPENAI_API_KEY is not set, query expansion disabled");
            None
        }
        (false, _) => None,
    };

    Ok(QueryNormalizer::new(mapping, expander))
}

fn build_pipeline(keys: &ApiKeys, use_ai: bool) -> Result<Pipeline> {
    let kci_key = non_empty(&keys.kci_key);
    let riss_key = non_empty(&keys.riss_key);
    if kci_key.is_none() {
        warn!("KCI_API_KEY is not set, KCI searches will be skipped");
    }
    if riss_key.is_none() {
        warn!("RISS_API_KEY is not set, RISS searches will be skipped");
    }

    Pipeline::from_configs(
        build_normalizer(keys, use_ai)?,
        kci_key.map(KciConfig::new),
        riss_key.map(RissConfig::new),
    )
    .context("Failed to create search clients")
}

// ============================================================================
// Search
// ============================================================================

async fn run_search(keys: &ApiKeys, request: SearchRequest, output_dir: PathBuf) -> Result<()> {
    let pipeline = build_pipeline(keys, request.use_ai)?;
    let outcome = pipeline.run(&request).await.context("Search failed")?;

    println!("Query terms: {}", outcome.bundle.terms().join(", "));
    println!("Primary term: {}", outcome.primary_term);
    println!(
        "KCI: {} | RISS: {} (title {}, keyword {}, yearly {}) | merged: {} | shown: {}",
        outcome.kci_count,
        outcome.riss_count,
        outcome.riss_stats.title,
        outcome.riss_stats.keyword,
        outcome.riss_stats.yearly,
        outcome.merged_count,
        outcome.records.len()
    );

    if outcome.records.is_empty() {
        println!("No results. Try a more general query or a wider year range.");
        return Ok(());
    }

    for (i, record) in outcome.records.iter().take(5).enumerate() {
        println!("\n{}. {}", i + 1, display_title(&record.title));
        println!("   {} | {} | {} | {}", record.source, record.authors, record.venue, record.pub_year);
    }

    // Create output folder
    let now = Local::now();
    let safe_query: String = outcome
        .primary_term
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect::<String>()
        .trim()
        .replace(' ', "_");
    let output_folder = output_dir.join(format!("{}_{}", now.format("%Y%m%d_%H%M%S"), safe_query));

    let written = export_all(&output_folder, &outcome.primary_term, &outcome.records, now)
        .context("Failed to write CSV files")?;

    println!();
    for path in &written {
        println!("Saved: {}", path.display());
    }
    for (source, count) in source_counts(&outcome.records) {
        info!(source = %source, count = count, "Merged records by source");
    }
    Ok(())
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(keys: &ApiKeys, host: String, port: u16) -> Result<()> {
    info!(host = %host, port = port, "Starting HTTP server");

    // Built with expansion available; each request decides whether to use it
    let pipeline = build_pipeline(keys, true)?;
    let app_state = Arc::new(AppState { pipeline });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/search", post(search_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

struct AppState {
    pipeline: Pipeline,
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Search response
#[derive(Debug, Serialize)]
struct SearchResponse {
    status: String,
    count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<SearchOutcome>,
}

/// Search endpoint handler
async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> Json<SearchResponse> {
    info!(query = %req.query, start_year = req.start_year, end_year = req.end_year, "Search request");

    match state.pipeline.run(&req).await {
        Ok(outcome) => Json(SearchResponse {
            status: "success".to_string(),
            count: outcome.records.len(),
            outcome: Some(outcome),
        }),
        Err(e) => {
            error!(error = %e, "Search failed");
            Json(SearchResponse {
                status: format!("error: {}", e),
                count: 0,
                outcome: None,
            })
        }
    }
}

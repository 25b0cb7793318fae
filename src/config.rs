//! API settings for the two catalog sources and the query-expansion model.
//!
//! Production values come from [`KciConfig::new`] and friends. Tests point
//! the clients at a mock server with `for_testing`, which also zeroes the
//! politeness delays.

use std::time::Duration;

/// KCI open API endpoint (article search and article detail share it).
pub const KCI_API_URL: &str = "https://open.kci.go.kr/po/openapi/openApiSearch.kci";

/// RISS open API endpoint.
pub const RISS_API_URL: &str = "http://www.riss.kr/openApi";

/// Earliest publication year a search may ask for.
pub const MIN_YEAR: i32 = 1900;

/// Latest publication year a search may ask for.
pub const MAX_YEAR: i32 = 2100;

/// Default OpenAI-compatible endpoint for query expansion.
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model for query expansion.
pub const DEFAULT_LLM_MODEL: &str = "gpt-3.5-turbo";

/// Browser-like user agent; both catalogs reject some bare clients.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";

/// KCI API settings.
#[derive(Debug, Clone)]
pub struct KciConfig {
    pub api_key: String,
    pub base_url: String,
    pub search_timeout: Duration,
    pub detail_timeout: Duration,
    /// Simultaneous detail lookups per enrichment batch
    pub detail_concurrency: usize,
    /// Pause after each detail lookup, per concurrency slot
    pub detail_delay: Duration,
}

impl KciConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: KCI_API_URL.to_string(),
            search_timeout: Duration::from_secs(15),
            detail_timeout: Duration::from_secs(10),
            detail_concurrency: 5,
            detail_delay: Duration::from_millis(100),
        }
    }

    pub fn for_testing(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            search_timeout: Duration::from_secs(5),
            detail_timeout: Duration::from_secs(5),
            detail_delay: Duration::ZERO,
            ..Self::new("test-key")
        }
    }
}

/// RISS API settings.
#[derive(Debug, Clone)]
pub struct RissConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    /// Pause between the per-year queries of the year-sliced strategy
    pub year_delay: Duration,
    /// Pause between document types in a mixed-type search
    pub doc_type_delay: Duration,
}

impl RissConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: RISS_API_URL.to_string(),
            timeout: Duration::from_secs(15),
            year_delay: Duration::from_millis(500),
            doc_type_delay: Duration::from_millis(200),
        }
    }

    pub fn for_testing(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(5),
            year_delay: Duration::ZERO,
            doc_type_delay: Duration::ZERO,
            ..Self::new("test-key")
        }
    }
}

/// OpenAI-compatible chat endpoint used for query expansion.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_LLM_MODEL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn for_testing(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(5),
            ..Self::new("test-key")
        }
    }
}

//! End-to-end search: query bundle → KCI and RISS searches → merge.
//!
//! A [`Pipeline`] is built once and reused across searches, so the KCI
//! detail cache lives as long as the pipeline.

use crate::analysis::ViewFilter;
use crate::config::{KciConfig, RissConfig, MAX_YEAR, MIN_YEAR};
use crate::enrich::DetailEnricher;
use crate::error::{Result, ScholarError};
use crate::kci::{KciArticle, KciClient, KciQuery};
use crate::merge::{merge_sources, CanonicalRecord};
use crate::query::{QueryBundle, QueryNormalizer};
use crate::riss::{DocType, RissClient, RissRecord, StrategyStats, DEFAULT_MAX_RESULTS};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

pub const DEFAULT_START_YEAR: i32 = 2018;
pub const DEFAULT_END_YEAR: i32 = 2025;

fn default_start_year() -> i32 {
    DEFAULT_START_YEAR
}

fn default_end_year() -> i32 {
    DEFAULT_END_YEAR
}

fn default_true() -> bool {
    true
}

fn default_doc_types() -> Vec<DocType> {
    vec![DocType::Thesis]
}

fn default_max_riss() -> usize {
    DEFAULT_MAX_RESULTS
}

/// One search, as submitted by the CLI or the HTTP service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    #[serde(default = "default_end_year")]
    pub end_year: i32,
    #[serde(default = "default_true")]
    pub use_kci: bool,
    #[serde(default = "default_true")]
    pub use_riss: bool,
    /// Backfill missing KCI keywords/abstracts from the detail endpoint
    #[serde(default = "default_true")]
    pub fetch_details: bool,
    #[serde(default = "default_doc_types")]
    pub doc_types: Vec<DocType>,
    /// Per document type
    #[serde(default = "default_max_riss")]
    pub max_riss: usize,
    #[serde(default)]
    pub use_ai: bool,
    /// Narrows the merged records before they are returned
    #[serde(default)]
    pub filter: Option<ViewFilter>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            start_year: DEFAULT_START_YEAR,
            end_year: DEFAULT_END_YEAR,
            use_kci: true,
            use_riss: true,
            fetch_details: true,
            doc_types: default_doc_types(),
            max_riss: DEFAULT_MAX_RESULTS,
            use_ai: false,
            filter: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(ScholarError::Validation("query is empty".to_string()));
        }
        for year in [self.start_year, self.end_year] {
            if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
                return Err(ScholarError::Validation(format!(
                    "year {} is outside {}..={}",
                    year, MIN_YEAR, MAX_YEAR
                )));
            }
        }
        if self.start_year > self.end_year {
            return Err(ScholarError::Validation(format!(
                "start year {} is after end year {}",
                self.start_year, self.end_year
            )));
        }
        if self.use_riss && self.doc_types.is_empty() {
            return Err(ScholarError::Validation("no RISS document type selected".to_string()));
        }
        Ok(())
    }
}

/// Result of one search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub query: String,
    pub bundle: QueryBundle,
    pub primary_term: String,
    pub kci_count: usize,
    pub riss_count: usize,
    pub riss_stats: StrategyStats,
    /// Records after merge, before the request's filter
    pub merged_count: usize,
    pub records: Vec<CanonicalRecord>,
}

/// Query normalizer plus the source clients that have an API key.
pub struct Pipeline {
    normalizer: QueryNormalizer,
    kci: Option<KciClient>,
    kci_enricher: Option<DetailEnricher<KciClient>>,
    riss: Option<RissClient>,
}

impl Pipeline {
    pub fn new(normalizer: QueryNormalizer, kci: Option<KciClient>, riss: Option<RissClient>) -> Self {
        let kci_enricher = kci.as_ref().map(KciClient::enricher);
        Self {
            normalizer,
            kci,
            kci_enricher,
            riss,
        }
    }

    /// Build clients for the sources whose config is present.
    pub fn from_configs(
        normalizer: QueryNormalizer,
        kci: Option<KciConfig>,
        riss: Option<RissConfig>,
    ) -> Result<Self> {
        let kci = kci.map(KciClient::new).transpose()?;
        let riss = riss.map(RissClient::new).transpose()?;
        Ok(Self::new(normalizer, kci, riss))
    }

    pub fn normalizer(&self) -> &QueryNormalizer {
        &self.normalizer
    }

    /// Run one search.
    ///
    /// # Errors
    ///
    /// Only request validation fails. Upstream failures show up as fewer
    /// (or zero) records.
    pub async fn run(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        request.validate()?;
        let started = Instant::now();

        let bundle = self
            .normalizer
            .normalize_with(&request.query, request.use_ai)
            .await;
        let primary_term = bundle
            .primary()
            .unwrap_or_else(|| request.query.trim())
            .to_string();

        let kci_articles = self.search_kci(request, &primary_term).await;
        let (riss_records, riss_stats) = self.search_riss(request, &primary_term).await;

        let mut records = merge_sources(&kci_articles, &riss_records);
        let merged_count = records.len();
        if let Some(filter) = &request.filter {
            records.retain(|r| filter.matches(r));
        }
        info!(
            query = %request.query,
            primary = %primary_term,
            kci = kci_articles.len(),
            riss = riss_records.len(),
            merged = merged_count,
            returned = records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Search complete"
        );

        Ok(SearchOutcome {
            query: request.query.clone(),
            bundle,
            primary_term,
            kci_count: kci_articles.len(),
            riss_count: riss_records.len(),
            riss_stats,
            merged_count,
            records,
        })
    }

    async fn search_kci(&self, request: &SearchRequest, term: &str) -> Vec<KciArticle> {
        if !request.use_kci {
            return Vec::new();
        }
        let Some(client) = &self.kci else {
            warn!("KCI API key is not configured, skipping KCI");
            return Vec::new();
        };

        let query = KciQuery::by_title(term, request.start_year, request.end_year);
        let enricher = self.kci_enricher.as_ref().filter(|_| request.fetch_details);
        client.search_articles(&query, enricher).await
    }

    async fn search_riss(&self, request: &SearchRequest, term: &str) -> (Vec<RissRecord>, StrategyStats) {
        if !request.use_riss {
            return (Vec::new(), StrategyStats::default());
        }
        let Some(client) = &self.riss else {
            warn!("RISS API key is not configured, skipping RISS");
            return (Vec::new(), StrategyStats::default());
        };

        client
            .search_doc_types(
                term,
                &request.doc_types,
                request.start_year,
                request.end_year,
                request.max_riss,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::KeywordMapping;

    #[test]
    fn test_request_defaults_from_json() {
        let request: SearchRequest =
            serde_json::from_str(r#"{"query": "청년 고용"}"#).expect("valid request");
        assert_eq!(request, SearchRequest::new("청년 고용"));

        let mixed: SearchRequest =
            serde_json::from_str(r#"{"query": "q", "doc_types": ["T", "A", "F"], "use_kci": false}"#)
                .expect("valid request");
        assert_eq!(mixed.doc_types, DocType::ALL.to_vec());
        assert!(!mixed.use_kci);
    }

    #[test]
    fn test_request_validation() {
        assert!(SearchRequest::new("  ").validate().is_err());
        let backwards = SearchRequest {
            start_year: 2025,
            end_year: 2018,
            ..SearchRequest::new("q")
        };
        assert!(backwards.validate().is_err());
        assert!(SearchRequest::new("q").validate().is_ok());
    }

    #[test]
    fn test_request_years_bounded() {
        let with_years = |start_year, end_year| SearchRequest {
            start_year,
            end_year,
            ..SearchRequest::new("q")
        };

        assert!(with_years(MIN_YEAR, MAX_YEAR).validate().is_ok());
        for (start, end) in [(i32::MIN, i32::MAX), (1899, 2020), (2020, 2101), (-5, -1)] {
            let err = with_years(start, end).validate().expect_err("year out of range");
            assert!(matches!(err, ScholarError::Validation(_)), "{} {}", start, end);
        }
    }

    #[test]
    fn test_request_filter_from_json() {
        let request: SearchRequest = serde_json::from_str(
            r#"{"query": "q", "filter": {"years": ["2021"], "text": "청년"}}"#,
        )
        .expect("valid request");
        let filter = request.filter.expect("filter present");
        assert_eq!(filter.years, vec!["2021".to_string()]);
        assert_eq!(filter.text, "청년");
        assert!(filter.sources.is_empty());
    }

    #[tokio::test]
    async fn test_run_without_sources() {
        let pipeline = Pipeline::new(QueryNormalizer::new(KeywordMapping::default(), None), None, None);
        let outcome = pipeline
            .run(&SearchRequest::new("노동"))
            .await
            .expect("valid request");

        assert_eq!(outcome.primary_term, "노동");
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.kci_count, 0);
        assert_eq!(outcome.riss_stats, StrategyStats::default());
    }
}

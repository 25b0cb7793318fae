//! RISS catalog client, record normalizer and multi-strategy search.
//!
//! A single RISS query returns at most 100 rows, so a search runs up to
//! three complementary queries (title only, whole-record keyword, one per
//! publication year) and unions them by URL.

use crate::config::{RissConfig, MAX_YEAR, MIN_YEAR, USER_AGENT};
use crate::error::{Result, ScholarError};
use crate::extract::extract_text;
use crate::tree::{Field, RawNode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Upstream row ceiling per call.
pub const MAX_ROWS: usize = 100;

/// Rows requested by the title strategy.
const TITLE_STRATEGY_ROWS: usize = 100;

/// Minimum rows requested per year by the year-sliced strategy.
const MIN_ROWS_PER_YEAR: usize = 10;

/// Default accumulator target for [`RissClient::search_with_strategies`].
pub const DEFAULT_MAX_RESULTS: usize = 200;

/// RISS document type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocType {
    /// `T`: theses and dissertations
    #[serde(rename = "T")]
    Thesis,
    /// `A`: domestic journal articles
    #[serde(rename = "A")]
    DomesticArticle,
    /// `F`: foreign journal articles
    #[serde(rename = "F")]
    ForeignArticle,
}

impl DocType {
    pub const ALL: [DocType; 3] = [DocType::Thesis, DocType::DomesticArticle, DocType::ForeignArticle];

    pub fn code(self) -> &'static str {
        match self {
            DocType::Thesis => "T",
            DocType::DomesticArticle => "A",
            DocType::ForeignArticle => "F",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DocType::Thesis => "학위논문",
            DocType::DomesticArticle => "국내학술논문",
            DocType::ForeignArticle => "해외학술논문",
        }
    }

    pub fn from_code(code: &str) -> Option<DocType> {
        DocType::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Parse a selection: one code, or `mixed` for all three types.
    pub fn parse_selection(value: &str) -> Result<Vec<DocType>> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("mixed") {
            return Ok(DocType::ALL.to_vec());
        }
        value.parse().map(|t| vec![t])
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for DocType {
    type Err = ScholarError;

    fn from_str(s: &str) -> Result<Self> {
        DocType::from_code(&s.trim().to_ascii_uppercase()).ok_or_else(|| {
            ScholarError::Validation(format!("unknown document type '{}' (expected T, A, F or mixed)", s))
        })
    }
}

/// Display label for a document type code; unknown codes pass through.
pub fn doc_type_label(code: &str) -> String {
    DocType::from_code(code)
        .map(|t| t.label().to_string())
        .unwrap_or_else(|| code.to_string())
}

/// One flat RISS catalog row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RissRecord {
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub pub_year: String,
    pub doc_type: String,
    pub material_type: String,
    pub url: String,
    pub has_abstract: String,
    pub has_toc: String,
    pub has_image: String,
    pub doc_type_name: String,
}

/// Normalize one `metadata` entry. Returns `None` when the title is empty;
/// those records are dropped rather than filled.
pub fn normalize_record(record: &RawNode) -> Option<RissRecord> {
    let field = |name: &str| extract_text(record.get(name));

    let title = field("riss.title");
    if title.is_empty() {
        return None;
    }

    let doc_type = field("riss.type");
    Some(RissRecord {
        title,
        author: field("riss.author"),
        publisher: field("riss.publisher"),
        pub_year: field("riss.pubdate"),
        doc_type_name: doc_type_label(&doc_type),
        doc_type,
        material_type: field("riss.mtype"),
        url: field("url"),
        has_abstract: field("riss.abstract"),
        has_toc: field("riss.toc"),
        has_image: field("riss.image"),
    })
}

/// Read the `head`/`metadata` envelope of a search response.
///
/// A response without both parts has no records. A `head.Error` other than
/// `"0"` (including a missing one) is an [`ScholarError::Api`].
pub fn parse_search_response(root: &RawNode) -> Result<Vec<RissRecord>> {
    let (Some(Field::Node(head)), Some(metadata)) = (root.get("head"), root.get("metadata")) else {
        return Ok(Vec::new());
    };

    let error_code = extract_text(head.get("Error"));
    if error_code != "0" {
        let message = extract_text(head.get("ErrorMessage"));
        return Err(ScholarError::Api {
            code: error_code.parse().unwrap_or(-1),
            message: if message.is_empty() {
                "unknown RISS error".to_string()
            } else {
                message
            },
        });
    }

    let total = extract_text(head.get("totalcount"));
    debug!(total = %total, "RISS response head");

    let records = match metadata {
        Field::Node(record) => vec![normalize_record(record)],
        Field::Sequence(records) => records.iter().map(normalize_record).collect(),
        Field::Scalar(_) => Vec::new(),
    };
    Ok(records.into_iter().flatten().collect())
}

/// Which field a query string is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Title,
    Keyword,
}

impl SearchField {
    fn param(self) -> &'static str {
        match self {
            SearchField::Title => "title",
            SearchField::Keyword => "keyword",
        }
    }
}

/// One RISS search call.
#[derive(Debug, Clone, PartialEq)]
pub struct RissQuery {
    pub term: String,
    pub field: SearchField,
    pub doc_type: DocType,
    pub start_year: i32,
    pub end_year: i32,
    pub rows: usize,
}

impl RissQuery {
    fn params(&self, api_key: &str) -> Vec<(&'static str, String)> {
        vec![
            ("key", api_key.to_string()),
            ("version", "1.0".to_string()),
            ("type", self.doc_type.code().to_string()),
            (self.field.param(), self.term.clone()),
            ("spubdate", self.start_year.to_string()),
            ("epubdate", self.end_year.to_string()),
            ("sort", "Y".to_string()),
            ("asc", "D".to_string()),
            ("rsnum", "1".to_string()),
            ("rowcount", self.rows.clamp(1, MAX_ROWS).to_string()),
        ]
    }
}

/// Records contributed by each strategy after URL dedup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub title: usize,
    pub keyword: usize,
    pub yearly: usize,
    /// Calls that produced no records because of an error
    pub failed_calls: usize,
}

impl StrategyStats {
    pub fn total(&self) -> usize {
        self.title + self.keyword + self.yearly
    }

    fn absorb(&mut self, other: &StrategyStats) {
        self.title += other.title;
        self.keyword += other.keyword;
        self.yearly += other.yearly;
        self.failed_calls += other.failed_calls;
    }
}

/// Append the records of `batch` whose URL is not yet in `accumulator`.
/// Returns how many were added.
fn append_new_urls(accumulator: &mut Vec<RissRecord>, batch: Vec<RissRecord>) -> usize {
    let existing: HashSet<String> = accumulator.iter().map(|r| r.url.clone()).collect();
    let before = accumulator.len();
    accumulator.extend(batch.into_iter().filter(|r| !existing.contains(&r.url)));
    accumulator.len() - before
}

/// HTTP client for the RISS open API.
#[derive(Clone)]
pub struct RissClient {
    client: reqwest::Client,
    config: Arc<RissConfig>,
}

impl RissClient {
    pub fn new(config: RissConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ScholarError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Build the request URL for one search call.
    fn build_search_url(&self, query: &RissQuery) -> Result<Url> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| ScholarError::Config(format!("Invalid RISS base URL: {}", e)))?;
        url.query_pairs_mut()
            .extend_pairs(query.params(&self.config.api_key));
        Ok(url)
    }

    /// One search call.
    pub async fn search(&self, query: &RissQuery) -> Result<Vec<RissRecord>> {
        let url = self.build_search_url(query)?;
        debug!(url = %url, "RISS search");

        let response = self
            .client
            .get(url.as_str())
            .header("Accept", "application/xml,text/xml,*/*")
            .header("Accept-Language", "ko-KR,ko;q=0.8")
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ScholarError::Api {
                code: status.as_u16() as i32,
                message: format!("RISS API error: {}", status),
            });
        }

        let body = response.text().await?;
        let root = RawNode::parse_xml(&body)?;
        parse_search_response(&root)
    }

    /// [`search`](Self::search) with failures logged and counted as zero records.
    async fn search_or_empty(&self, query: &RissQuery, stats: &mut StrategyStats) -> Vec<RissRecord> {
        match self.search(query).await {
            Ok(records) => records,
            Err(e) => {
                match &e {
                    ScholarError::Api { .. } => warn!(term = %query.term, error = %e, "RISS returned an error"),
                    _ => error!(term = %query.term, error = %e, "RISS search failed"),
                }
                stats.failed_calls += 1;
                Vec::new()
            }
        }
    }

    /// Title, keyword and year-sliced searches unioned by URL until
    /// `max_results` records are gathered.
    pub async fn search_with_strategies(
        &self,
        term: &str,
        doc_type: DocType,
        start_year: i32,
        end_year: i32,
        max_results: usize,
    ) -> (Vec<RissRecord>, StrategyStats) {
        info!(
            term = %term,
            doc_type = %doc_type,
            start_year,
            end_year,
            max_results,
            "Starting RISS multi-strategy search"
        );

        let mut results = Vec::new();
        let mut stats = StrategyStats::default();
        let query = |field: SearchField, rows: usize| RissQuery {
            term: term.to_string(),
            field,
            doc_type,
            start_year,
            end_year,
            rows,
        };

        let title_results = self
            .search_or_empty(&query(SearchField::Title, TITLE_STRATEGY_ROWS), &mut stats)
            .await;
        stats.title = append_new_urls(&mut results, title_results);
        info!(count = stats.title, "RISS title search");

        if results.len() < max_results {
            let remaining = max_results - results.len();
            let keyword_results = self
                .search_or_empty(&query(SearchField::Keyword, remaining), &mut stats)
                .await;
            let fetched = keyword_results.len();
            stats.keyword = append_new_urls(&mut results, keyword_results);
            info!(fetched, added = stats.keyword, "RISS keyword search");
        }

        if results.len() < max_results {
            let remaining = max_results - results.len();
            let yearly_results = self
                .search_by_years(term, doc_type, start_year, end_year, remaining, &mut stats)
                .await;
            let fetched = yearly_results.len();
            stats.yearly = append_new_urls(&mut results, yearly_results);
            info!(fetched, added = stats.yearly, "RISS yearly search");
        }

        info!(
            total = results.len(),
            title = stats.title,
            keyword = stats.keyword,
            yearly = stats.yearly,
            "RISS search complete"
        );
        (results, stats)
    }

    /// One keyword query per year of the range, clamped to
    /// [`MIN_YEAR`]..=[`MAX_YEAR`].
    async fn search_by_years(
        &self,
        term: &str,
        doc_type: DocType,
        start_year: i32,
        end_year: i32,
        remaining: usize,
        stats: &mut StrategyStats,
    ) -> Vec<RissRecord> {
        let mut results = Vec::new();
        let start_year = start_year.max(MIN_YEAR);
        let end_year = end_year.min(MAX_YEAR);
        if end_year < start_year {
            return results;
        }

        let years = (i64::from(end_year) - i64::from(start_year) + 1) as usize;
        let per_year = (remaining / years).max(MIN_ROWS_PER_YEAR);

        for year in start_year..=end_year {
            if results.len() >= remaining {
                break;
            }
            let query = RissQuery {
                term: term.to_string(),
                field: SearchField::Keyword,
                doc_type,
                start_year: year,
                end_year: year,
                rows: per_year,
            };
            let year_results = self.search_or_empty(&query, stats).await;
            if !year_results.is_empty() {
                debug!(year, count = year_results.len(), "RISS year slice");
                results.extend(year_results);
                if !self.config.year_delay.is_zero() {
                    tokio::time::sleep(self.config.year_delay).await;
                }
            }
        }

        results
    }

    /// Run [`search_with_strategies`](Self::search_with_strategies) once per
    /// document type and concatenate the results.
    pub async fn search_doc_types(
        &self,
        term: &str,
        doc_types: &[DocType],
        start_year: i32,
        end_year: i32,
        max_results: usize,
    ) -> (Vec<RissRecord>, StrategyStats) {
        let mut results = Vec::new();
        let mut stats = StrategyStats::default();

        for (i, doc_type) in doc_types.iter().enumerate() {
            if i > 0 && !self.config.doc_type_delay.is_zero() {
                tokio::time::sleep(self.config.doc_type_delay).await;
            }
            let (records, type_stats) = self
                .search_with_strategies(term, *doc_type, start_year, end_year, max_results)
                .await;
            results.extend(records);
            stats.absorb(&type_stats);
        }

        (results, stats)
    }
}

//! KCI (Korea Citation Index) client and record normalizer.
//!
//! A search returns `outputData.record` entries, each with a `journalInfo`
//! and an `articleInfo` node. [`normalize_record`] turns one entry into a
//! flat [`KciArticle`]. Articles that come back without keywords or an
//! abstract are backfilled from the per-article detail endpoint through a
//! [`DetailEnricher`].

use crate::config::{KciConfig, USER_AGENT};
use crate::enrich::{DetailEnricher, DetailOutcome, DetailSource};
use crate::error::{Result, ScholarError};
use crate::extract::{
    extract_text, first_list, first_text, node_at, node_text, resolve_path, KeyPath,
};
use crate::tree::{Field, RawNode};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Title used when a record has none.
pub const TITLE_PLACEHOLDER: &str = "제목 없음";

/// Authors kept per article.
pub const MAX_AUTHORS: usize = 5;

/// Upstream page-size ceiling.
pub const MAX_DISPLAY_COUNT: u32 = 100;

/// Keyword locations under `articleInfo`, in priority order.
const KEYWORD_PATHS: &[KeyPath] = &[
    &["keyword-group", "keyword"],
    &["kwd-group", "kwd"],
    &["keywords"],
    &["keyword"],
];

/// Keyword locations under the detail payload's `articleInfo`.
const DETAIL_KEYWORD_PATHS: &[KeyPath] = &[&["keyword-group", "keyword"], &["kwd-group", "kwd"]];

const ABSTRACT_PATHS: &[KeyPath] = &[&["abstract"], &["abstract-group", "abstract"]];

const DETAIL_ABSTRACT_PATHS: &[KeyPath] = &[
    &["abstract"],
    &["abstract-group", "abstract"],
    &["abstract", "p"],
    &["abstract", "text"],
    &["abstract-group", "abstract", "p"],
    &["abstract-group", "abstract", "text"],
];

const DETAIL_ARTICLE_INFO: KeyPath = &["outputData", "record", "articleInfo"];

/// One normalized KCI article.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KciArticle {
    pub article_id: String,
    pub title: String,
    /// Up to [`MAX_AUTHORS`] names joined with `"; "`
    pub authors: String,
    pub journal_name: String,
    pub publisher_name: String,
    pub pub_year: String,
    pub pub_month: String,
    pub volume: String,
    pub issue: String,
    pub categories: String,
    pub regularity: String,
    pub abstract_text: String,
    /// Keywords joined with `"; "`
    pub keywords: String,
    pub first_page: String,
    pub last_page: String,
    pub doi: String,
    pub uci: String,
    pub url: String,
    pub citation_count: String,
    pub citation_count_kci: String,
    pub citation_count_wos: String,
    pub verified: String,
    /// `orte-open-yn` flag
    pub open_access: String,
}

impl KciArticle {
    /// Whether a detail lookup could fill a missing field.
    pub fn needs_detail(&self) -> bool {
        !self.article_id.is_empty() && (self.keywords.is_empty() || self.abstract_text.is_empty())
    }
}

fn text_at(node: &RawNode, path: &[&str]) -> String {
    extract_text(resolve_path(node, path))
}

fn candidates<'a>(node: &'a RawNode, paths: &[KeyPath]) -> Vec<(&'a RawNode, &'static [&'static str])> {
    paths.iter().map(|path| (node, *path)).collect()
}

/// Normalize one `record` node. Missing fields become `""`; a missing
/// title becomes [`TITLE_PLACEHOLDER`].
pub fn normalize_record(record: &RawNode) -> KciArticle {
    let title = text_at(record, &["articleInfo", "title-group", "article-title"]);
    let title = if title.is_empty() {
        TITLE_PLACEHOLDER.to_string()
    } else {
        title
    };

    let authors: Vec<String> = match resolve_path(record, &["articleInfo", "author-group", "author"]) {
        Some(Field::Sequence(nodes)) => nodes.iter().take(MAX_AUTHORS).map(node_text).collect(),
        Some(field) => vec![extract_text(Some(field))],
        None => Vec::new(),
    };
    let authors: Vec<String> = authors.into_iter().filter(|a| !a.is_empty()).collect();

    let article_info = node_at(record, &["articleInfo"]);
    let (abstract_text, keywords) = match article_info {
        Some(info) => (
            first_text(&candidates(info, ABSTRACT_PATHS)),
            extract_keywords(info, None),
        ),
        None => (String::new(), String::new()),
    };

    let citation = node_at(record, &["articleInfo", "citation-count"]);
    let citation_count = citation.map(node_text).unwrap_or_default();
    let citation_attr = |name: &str| {
        citation
            .and_then(|c| c.attribute(name))
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| "0".to_string())
    };

    KciArticle {
        article_id: text_at(record, &["articleInfo", "article-id"]),
        title,
        authors: authors.join("; "),
        journal_name: text_at(record, &["journalInfo", "journal-name"]),
        publisher_name: text_at(record, &["journalInfo", "publisher-name"]),
        pub_year: text_at(record, &["journalInfo", "pub-year"]),
        pub_month: text_at(record, &["journalInfo", "pub-mon"]),
        volume: text_at(record, &["journalInfo", "volume"]),
        issue: text_at(record, &["journalInfo", "issue"]),
        categories: text_at(record, &["articleInfo", "article-categories"]),
        regularity: text_at(record, &["articleInfo", "article-regularity"]),
        abstract_text,
        keywords,
        first_page: text_at(record, &["articleInfo", "fpage"]),
        last_page: text_at(record, &["articleInfo", "lpage"]),
        doi: text_at(record, &["articleInfo", "doi"]),
        uci: text_at(record, &["articleInfo", "uci"]),
        url: text_at(record, &["articleInfo", "url"]),
        citation_count: if citation_count.is_empty() {
            "0".to_string()
        } else {
            citation_count
        },
        citation_count_kci: citation_attr("kci"),
        citation_count_wos: citation_attr("wos"),
        verified: text_at(record, &["articleInfo", "verified"]),
        open_access: text_at(record, &["articleInfo", "orte-open-yn"]),
    }
}

/// Keywords from the search payload's `articleInfo`, falling back to a
/// detail payload's `articleInfo` when given. Joined with `"; "`.
pub fn extract_keywords(article_info: &RawNode, detail: Option<&RawNode>) -> String {
    let mut found = first_list(&candidates(article_info, KEYWORD_PATHS));
    if found.is_empty() {
        if let Some(detail_info) = detail.and_then(|d| node_at(d, DETAIL_ARTICLE_INFO)) {
            found = first_list(&candidates(detail_info, DETAIL_KEYWORD_PATHS));
        }
    }
    found.join("; ")
}

/// Fill empty `keywords`/`abstract_text` from a detail payload. Fields that
/// already have a value are never overwritten. Returns whether anything
/// changed.
pub fn apply_detail(article: &mut KciArticle, article_info: Option<&RawNode>, detail: &RawNode) -> bool {
    let Some(detail_info) = node_at(detail, DETAIL_ARTICLE_INFO) else {
        return false;
    };
    let mut changed = false;

    if article.keywords.is_empty() {
        let keywords = match article_info {
            Some(info) => extract_keywords(info, Some(detail)),
            None => first_list(&candidates(detail_info, DETAIL_KEYWORD_PATHS)).join("; "),
        };
        if !keywords.is_empty() {
            article.keywords = keywords;
            changed = true;
        }
    }

    if article.abstract_text.is_empty() {
        let abstract_text = first_text(&candidates(detail_info, DETAIL_ABSTRACT_PATHS));
        if !abstract_text.is_empty() {
            article.abstract_text = abstract_text;
            changed = true;
        }
    }

    changed
}

/// The `record` nodes of a search response, in document order.
pub fn response_records(response: &RawNode) -> Vec<&RawNode> {
    match resolve_path(response, &["outputData", "record"]) {
        Some(Field::Node(record)) => vec![record],
        Some(Field::Sequence(records)) => records.iter().collect(),
        Some(Field::Scalar(_)) | None => Vec::new(),
    }
}

/// Normalize a search response and, when an enricher is given, backfill
/// incomplete articles from their detail payloads.
pub async fn collect_articles<S: DetailSource>(
    response: &RawNode,
    enricher: Option<&DetailEnricher<S>>,
) -> Vec<KciArticle> {
    let started = Instant::now();
    let records = response_records(response);
    let mut articles: Vec<KciArticle> = records.iter().map(|r| normalize_record(r)).collect();
    info!(
        count = articles.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Normalized KCI records"
    );

    let Some(enricher) = enricher else {
        return articles;
    };

    let targets: Vec<usize> = articles
        .iter()
        .enumerate()
        .filter(|(_, a)| a.needs_detail())
        .map(|(i, _)| i)
        .collect();
    if targets.is_empty() {
        return articles;
    }

    let ids: Vec<String> = targets.iter().map(|&i| articles[i].article_id.clone()).collect();
    let outcomes = enricher.fetch_batch(&ids).await;

    let mut enriched = 0;
    for index in targets {
        let detail = outcomes
            .get(&articles[index].article_id)
            .and_then(DetailOutcome::detail);
        let Some(detail) = detail else {
            continue;
        };
        let article_info = node_at(records[index], &["articleInfo"]);
        if apply_detail(&mut articles[index], article_info, detail) {
            enriched += 1;
        }
    }

    info!(
        enriched = enriched,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "KCI detail enrichment complete"
    );
    articles
}

/// Search parameters for the `articleSearch` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KciQuery {
    pub title: Option<String>,
    pub author: Option<String>,
    pub journal: Option<String>,
    /// `YYYYMM`
    pub date_from: Option<String>,
    /// `YYYYMM`
    pub date_to: Option<String>,
    pub page: u32,
    pub display_count: u32,
}

impl KciQuery {
    /// Title search over a year range: `dateFrom={start}01`, `dateTo={end}12`.
    pub fn by_title(title: impl Into<String>, start_year: i32, end_year: i32) -> Self {
        Self {
            title: Some(title.into()),
            date_from: Some(format!("{}01", start_year)),
            date_to: Some(format!("{}12", end_year)),
            page: 1,
            display_count: 50,
            ..Self::default()
        }
    }

    fn params(&self, api_key: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("apiCode", "articleSearch".to_string()),
            ("key", api_key.to_string()),
            ("page", self.page.max(1).to_string()),
            (
                "displayCount",
                self.display_count.clamp(1, MAX_DISPLAY_COUNT).to_string(),
            ),
        ];
        let optional = [
            ("title", &self.title),
            ("author", &self.author),
            ("journal", &self.journal),
            ("dateFrom", &self.date_from),
            ("dateTo", &self.date_to),
        ];
        for (name, value) in optional {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                params.push((name, value.to_string()));
            }
        }
        params
    }
}

/// HTTP client for the KCI open API.
#[derive(Clone)]
pub struct KciClient {
    client: reqwest::Client,
    config: Arc<KciConfig>,
}

impl KciClient {
    pub fn new(config: KciConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ScholarError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &KciConfig {
        &self.config
    }

    /// Enricher over this client, using the configured concurrency and delay.
    pub fn enricher(&self) -> DetailEnricher<KciClient> {
        DetailEnricher::new(self.clone())
            .with_concurrency(self.config.detail_concurrency)
            .with_dispatch_delay(self.config.detail_delay)
    }

    async fn get_xml(
        &self,
        params: &[(&'static str, String)],
        timeout: std::time::Duration,
    ) -> Result<RawNode> {
        let response = self
            .client
            .get(&self.config.base_url)
            .query(params)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ScholarError::Api {
                code: status.as_u16() as i32,
                message: format!("KCI API error: {}", status),
            });
        }

        let body = response.text().await?;
        RawNode::parse_xml(&body)
    }

    /// Raw `articleSearch` response.
    pub async fn search(&self, query: &KciQuery) -> Result<RawNode> {
        debug!(title = ?query.title, page = query.page, "KCI search");
        self.get_xml(&query.params(&self.config.api_key), self.config.search_timeout)
            .await
    }

    /// Search and normalize. Transport and parse failures are logged and
    /// yield an empty list.
    pub async fn search_articles(
        &self,
        query: &KciQuery,
        enricher: Option<&DetailEnricher<KciClient>>,
    ) -> Vec<KciArticle> {
        let started = Instant::now();
        let response = match self.search(query).await {
            Ok(response) => response,
            Err(e) => {
                error!(title = ?query.title, error = %e, "KCI search failed");
                return Vec::new();
            }
        };
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "KCI search response received"
        );
        collect_articles(&response, enricher).await
    }
}

#[async_trait]
impl DetailSource for KciClient {
    async fn fetch_detail(&self, id: &str) -> Result<RawNode> {
        let params = [
            ("apiCode", "articleDetail".to_string()),
            ("key", self.config.api_key.clone()),
            ("id", id.to_string()),
        ];
        self.get_xml(&params, self.config.detail_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SEARCH_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MetaData>
  <outputData>
    <record>
      <journalInfo>
        <journal-name>노동정책연구</journal-name>
        <publisher-name>한국노동연구원</publisher-name>
        <pub-year>2021</pub-year>
        <pub-mon>06</pub-mon>
        <volume>21</volume>
        <issue>2</issue>
      </journalInfo>
      <articleInfo article-id="ART001">
        <title-group>
          <article-title lang="original">청년 고용과 노동시장</article-title>
          <article-title lang="english">Youth Employment</article-title>
        </title-group>
        <author-group>
          <author>김민수</author>
          <author>이영희</author>
        </author-group>
        <abstract-group><abstract>청년층 고용 분석</abstract></abstract-group>
        <keyword-group>
          <keyword>청년</keyword>
          <keyword>고용</keyword>
        </keyword-group>
        <fpage>1</fpage>
        <lpage>24</lpage>
        <doi>10.1234/abc</doi>
        <orte-open-yn>Y</orte-open-yn>
        <url>https://www.kci.go.kr/ART001</url>
        <citation-count kci="3" wos="1">4</citation-count>
      </articleInfo>
    </record>
    <record>
      <journalInfo><journal-name>경제학연구</journal-name><pub-year>2019</pub-year></journalInfo>
      <articleInfo article-id="ART002">
        <author-group><author>박철수</author></author-group>
      </articleInfo>
    </record>
  </outputData>
</MetaData>"#;

    const DETAIL_XML: &str = r#"<MetaData><outputData><record><articleInfo>
        <kwd-group><kwd>임금</kwd><kwd>노동</kwd></kwd-group>
        <abstract><p>상세 초록</p></abstract>
    </articleInfo></record></outputData></MetaData>"#;

    fn parse(xml: &str) -> RawNode {
        RawNode::parse_xml(xml).expect("valid xml")
    }

    #[test]
    fn test_normalize_full_record() {
        let response = parse(SEARCH_XML);
        let records = response_records(&response);
        assert_eq!(records.len(), 2);

        let article = normalize_record(records[0]);
        assert_eq!(article.article_id, "ART001");
        assert_eq!(article.title, "청년 고용과 노동시장");
        assert_eq!(article.authors, "김민수; 이영희");
        assert_eq!(article.journal_name, "노동정책연구");
        assert_eq!(article.publisher_name, "한국노동연구원");
        assert_eq!(article.pub_year, "2021");
        assert_eq!(article.pub_month, "06");
        assert_eq!(article.abstract_text, "청년층 고용 분석");
        assert_eq!(article.keywords, "청년; 고용");
        assert_eq!(article.doi, "10.1234/abc");
        assert_eq!(article.first_page, "1");
        assert_eq!(article.last_page, "24");
        assert_eq!(article.open_access, "Y");
        assert_eq!(article.citation_count, "4");
        assert_eq!(article.citation_count_kci, "3");
        assert_eq!(article.citation_count_wos, "1");
        assert!(!article.needs_detail());
    }

    #[test]
    fn test_normalize_sparse_record() {
        let response = parse(SEARCH_XML);
        let article = normalize_record(response_records(&response)[1]);

        assert_eq!(article.title, TITLE_PLACEHOLDER);
        assert_eq!(article.authors, "박철수");
        assert_eq!(article.keywords, "");
        assert_eq!(article.abstract_text, "");
        assert_eq!(article.citation_count, "0");
        assert_eq!(article.citation_count_kci, "0");
        assert!(article.needs_detail());
    }

    #[test]
    fn test_authors_capped() {
        let mut group = RawNode::new();
        for i in 0..8 {
            group.push_child("author".to_string(), RawNode::new().with_text(format!("저자{}", i)));
        }
        let record = RawNode::new().with_child(
            "articleInfo",
            RawNode::new().with_child("author-group", group),
        );
        let article = normalize_record(&record);
        assert_eq!(article.authors.split("; ").count(), MAX_AUTHORS);
        assert!(article.authors.starts_with("저자0; 저자1"));
    }

    #[test]
    fn test_single_record_response() {
        let response = parse(
            "<MetaData><outputData><record><articleInfo article-id=\"X\"/></record></outputData></MetaData>",
        );
        assert_eq!(response_records(&response).len(), 1);
        assert!(response_records(&parse("<MetaData/>")).is_empty());
    }

    #[test]
    fn test_keywords_fall_back_to_detail() {
        let info = RawNode::new();
        let detail = parse(DETAIL_XML);
        assert_eq!(extract_keywords(&info, Some(&detail)), "임금; 노동");
        assert_eq!(extract_keywords(&info, None), "");
    }

    #[test]
    fn test_apply_detail_fills_only_empty_fields() {
        let detail = parse(DETAIL_XML);

        let mut empty = KciArticle {
            article_id: "ART002".to_string(),
            ..KciArticle::default()
        };
        assert!(apply_detail(&mut empty, None, &detail));
        assert_eq!(empty.keywords, "임금; 노동");
        assert_eq!(empty.abstract_text, "상세 초록");

        let mut filled = KciArticle {
            article_id: "ART003".to_string(),
            abstract_text: "원래 초록".to_string(),
            ..KciArticle::default()
        };
        assert!(apply_detail(&mut filled, None, &detail));
        assert_eq!(filled.abstract_text, "원래 초록");
        assert_eq!(filled.keywords, "임금; 노동");
    }

    #[test]
    fn test_apply_detail_without_article_info_is_noop() {
        let mut article = KciArticle::default();
        assert!(!apply_detail(&mut article, None, &parse("<MetaData/>")));
        assert_eq!(article, KciArticle::default());
    }

    #[test]
    fn test_query_params() {
        let query = KciQuery::by_title("노동", 2018, 2025);
        let params = query.params("secret");
        let get = |name: &str| {
            params
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("apiCode"), Some("articleSearch"));
        assert_eq!(get("key"), Some("secret"));
        assert_eq!(get("title"), Some("노동"));
        assert_eq!(get("dateFrom"), Some("201801"));
        assert_eq!(get("dateTo"), Some("202512"));
        assert_eq!(get("displayCount"), Some("50"));
        assert_eq!(get("author"), None);

        let big = KciQuery {
            display_count: 500,
            ..KciQuery::default()
        };
        let params = big.params("k");
        assert!(params.contains(&("displayCount", "100".to_string())));
        assert!(params.contains(&("page", "1".to_string())));
    }

    struct StaticDetails {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DetailSource for StaticDetails {
        async fn fetch_detail(&self, id: &str) -> Result<RawNode> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if id == "ART002" {
                Ok(parse(DETAIL_XML))
            } else {
                Err(ScholarError::Parse(format!("no detail for {}", id)))
            }
        }
    }

    #[tokio::test]
    async fn test_collect_articles_enriches_incomplete_only() {
        let response = parse(SEARCH_XML);
        let enricher = DetailEnricher::new(StaticDetails {
            calls: AtomicUsize::new(0),
        })
        .with_dispatch_delay(std::time::Duration::ZERO);

        let articles = collect_articles(&response, Some(&enricher)).await;
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].keywords, "청년; 고용");
        assert_eq!(articles[1].keywords, "임금; 노동");
        assert_eq!(articles[1].abstract_text, "상세 초록");
        assert_eq!(enricher.source().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_collect_articles_without_enricher() {
        let response = parse(SEARCH_XML);
        let articles = collect_articles::<KciClient>(&response, None).await;
        assert_eq!(articles[1].keywords, "");
    }
}

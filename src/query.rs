//! Query normalization: free-text query → [`QueryBundle`].
//!
//! Terms come from three places: the query itself, the CSV keyword mapping
//! ([`KeywordMapping`]) and, optionally, an LLM ([`QueryExpander`]). The
//! LLM is best effort; when it is disabled or fails the bundle is built
//! from the other two.

use crate::config::LlmConfig;
use crate::error::{Result, ScholarError};
use crate::prompts::query_expansion::{build_user_prompt, SYSTEM_PROMPT};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Maximum number of terms in a bundle.
pub const MAX_BUNDLE_TERMS: usize = 12;

/// One row of the keyword mapping file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MappingRow {
    pub user_pattern: String,
    pub canonical_term: String,
    pub category: String,
    /// `|`-separated
    pub synonyms: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub weight: Option<f64>,
}

/// Pattern → canonical term table loaded from CSV.
#[derive(Debug, Clone, Default)]
pub struct KeywordMapping {
    rows: Vec<MappingRow>,
}

impl KeywordMapping {
    pub fn new(rows: Vec<MappingRow>) -> Self {
        Self { rows }
    }

    /// Read a mapping from CSV with a header row. Rows that fail to
    /// deserialize are skipped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let mut rows = Vec::new();
        for (line, row) in csv_reader.deserialize::<MappingRow>().enumerate() {
            match row {
                Ok(row) => rows.push(row),
                Err(e) => warn!(line = line + 2, error = %e, "Skipping mapping row"),
            }
        }
        Ok(Self { rows })
    }

    /// Load the mapping file. A missing or unreadable file gives an empty
    /// mapping.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            warn!(path = %path.display(), "Keyword mapping file not found");
            return Self::default();
        }

        let loaded = std::fs::File::open(path)
            .map_err(ScholarError::from)
            .and_then(Self::from_reader);
        match loaded {
            Ok(mapping) => {
                info!(path = %path.display(), rows = mapping.len(), "Loaded keyword mapping");
                mapping
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load keyword mapping");
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Canonical terms and synonyms of every row whose pattern contains
    /// the query or is contained in it (case-insensitive). Sorted and
    /// deduplicated. An empty query matches nothing.
    pub fn map_query(&self, query: &str) -> Vec<String> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        let mut terms = BTreeSet::new();
        for row in &self.rows {
            let pattern = row.user_pattern.to_lowercase();
            if pattern.is_empty() || !(pattern.contains(&query) || query.contains(&pattern)) {
                continue;
            }

            let canonical = row.canonical_term.trim();
            if !canonical.is_empty() {
                terms.insert(canonical.to_string());
            }
            terms.extend(
                row.synonyms
                    .split('|')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }
        terms.into_iter().collect()
    }
}

/// Ordered, capped list of search terms for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryBundle {
    terms: Vec<String>,
}

impl QueryBundle {
    /// Combine the query with mapped and generated terms.
    ///
    /// Terms are trimmed, empty ones dropped and repeats removed keeping
    /// the first occurrence. The rest are stably sorted by character count
    /// and cut to [`MAX_BUNDLE_TERMS`]; the query is put back if the cut
    /// removed it.
    pub fn build(query: &str, csv_terms: &[String], ai_terms: &[String]) -> Self {
        let query = query.trim();
        let mut seen = HashSet::new();
        let mut terms: Vec<String> = std::iter::once(query)
            .chain(csv_terms.iter().map(String::as_str))
            .chain(ai_terms.iter().map(String::as_str))
            .map(str::trim)
            .filter(|t| !t.is_empty() && seen.insert(*t))
            .map(str::to_string)
            .collect();

        terms.sort_by_key(|t| t.chars().count());
        terms.truncate(MAX_BUNDLE_TERMS);

        if !query.is_empty() && !terms.iter().any(|t| t == query) {
            terms.pop();
            terms.push(query.to_string());
        }

        Self { terms }
    }

    /// The shortest term, used as the search string.
    pub fn primary(&self) -> Option<&str> {
        self.terms.first().map(String::as_str)
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// OpenAI-compatible API response structures
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// LLM-backed keyword generator.
pub struct QueryExpander {
    client: reqwest::Client,
    config: LlmConfig,
}

impl QueryExpander {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ScholarError::Config("LLM API key is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ScholarError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Ask the model for search keywords.
    pub async fn expand(&self, query: &str) -> Result<Vec<String>> {
        let request_body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_user_prompt(query)}
            ],
            "temperature": 0.3
        });

        let api_url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        debug!(model = %self.config.model, "Sending query expansion request");

        let response = self
            .client
            .post(&api_url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ScholarError::Api {
                code: status.as_u16() as i32,
                message: format!("LLM API error: {} - {}", status, error_text),
            });
        }

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ScholarError::Parse(format!("Failed to parse LLM response: {}", e)))?;

        let content = api_response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default();

        let terms = parse_term_list(content)?;
        info!(count = terms.len(), "Query expansion complete");
        Ok(terms)
    }
}

/// Parse a JSON string array out of model output, tolerating code fences
/// and surrounding prose. Non-string items are stringified.
pub fn parse_term_list(content: &str) -> Result<Vec<String>> {
    let json_str = extract_json_array(content);
    let values: Vec<serde_json::Value> = serde_json::from_str(&json_str)?;
    Ok(values
        .into_iter()
        .map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Extract a JSON array from LLM output (handles markdown code blocks)
fn extract_json_array(content: &str) -> String {
    let trimmed = content.trim();

    if trimmed.starts_with("```") {
        let lines: Vec<&str> = trimmed.lines().collect();
        if lines.len() >= 2 {
            let end = if lines.last().map(|l| l.trim()) == Some("```") {
                lines.len() - 1
            } else {
                lines.len()
            };
            return lines[1..end].join("\n");
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
        if start < end {
            return trimmed[start..=end].to_string();
        }
    }

    trimmed.to_string()
}

/// CSV mapping plus optional LLM expansion.
pub struct QueryNormalizer {
    mapping: KeywordMapping,
    expander: Option<QueryExpander>,
}

impl QueryNormalizer {
    pub fn new(mapping: KeywordMapping, expander: Option<QueryExpander>) -> Self {
        Self { mapping, expander }
    }

    pub fn mapping(&self) -> &KeywordMapping {
        &self.mapping
    }

    pub fn has_expander(&self) -> bool {
        self.expander.is_some()
    }

    /// Build the bundle for `query`, using the expander when one is set.
    pub async fn normalize(&self, query: &str) -> QueryBundle {
        self.normalize_with(query, true).await
    }

    /// Build the bundle for `query`. With `expand` false the expander is
    /// skipped. Expansion failures are logged and contribute nothing.
    pub async fn normalize_with(&self, query: &str, expand: bool) -> QueryBundle {
        let csv_terms = self.mapping.map_query(query);

        let expander = self.expander.as_ref().filter(|_| expand);
        let ai_terms = match expander {
            Some(expander) => match expander.expand(query).await {
                Ok(terms) => terms,
                Err(e) => {
                    warn!(error = %e, "Query expansion failed, using mapped terms only");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let bundle = QueryBundle::build(query, &csv_terms, &ai_terms);
        info!(
            query = %query,
            mapped = csv_terms.len(),
            generated = ai_terms.len(),
            terms = ?bundle.terms(),
            "Normalized query"
        );
        bundle
    }
}

//! Summaries and filtering over merged records.

use crate::kci::TITLE_PLACEHOLDER;
use crate::merge::{CanonicalRecord, Source};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

/// Default length of top-N tables.
pub const DEFAULT_TOP_N: usize = 15;

static KEYWORD_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[;,/]").expect("valid keyword separator"));

/// Title as shown to users: empty titles get the placeholder.
pub fn display_title(title: &str) -> &str {
    if title.trim().is_empty() {
        TITLE_PLACEHOLDER
    } else {
        title
    }
}

/// Records per non-empty `pub_year`, ascending by year.
pub fn year_counts(records: &[CanonicalRecord]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records.iter().filter(|r| !r.pub_year.is_empty()) {
        *counts.entry(record.pub_year.as_str()).or_default() += 1;
    }
    counts.into_iter().map(|(year, n)| (year.to_string(), n)).collect()
}

/// Records per source, in source order.
pub fn source_counts(records: &[CanonicalRecord]) -> Vec<(Source, usize)> {
    let mut counts: BTreeMap<Source, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.source).or_default() += 1;
    }
    counts.into_iter().collect()
}

/// Count values and keep the `n` most frequent. Ties are broken by the
/// value itself so the output is deterministic.
fn top_counts<'a>(values: impl Iterator<Item = &'a str>, n: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }
    let mut sorted: Vec<(&str, usize)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    sorted
        .into_iter()
        .take(n)
        .map(|(value, count)| (value.to_string(), count))
        .collect()
}

/// Most frequent non-empty venues.
pub fn top_venues(records: &[CanonicalRecord], n: usize) -> Vec<(String, usize)> {
    top_counts(
        records
            .iter()
            .map(|r| r.venue.trim())
            .filter(|v| !v.is_empty()),
        n,
    )
}

/// Most frequent keywords. Keyword fields are split on `;`, `,` and `/`;
/// single-character terms are ignored.
pub fn keyword_frequency(records: &[CanonicalRecord], n: usize) -> Vec<(String, usize)> {
    top_counts(
        records
            .iter()
            .flat_map(|r| KEYWORD_SEPARATOR.split(&r.keywords))
            .map(str::trim)
            .filter(|k| k.chars().count() > 1),
        n,
    )
}

/// Result-view filter. Empty selections do not filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewFilter {
    pub sources: Vec<Source>,
    pub years: Vec<String>,
    /// Case-insensitive substring of title or authors
    pub text: String,
}

impl ViewFilter {
    pub fn matches(&self, record: &CanonicalRecord) -> bool {
        if !self.sources.is_empty() && !self.sources.contains(&record.source) {
            return false;
        }
        if !self.years.is_empty() && !self.years.iter().any(|y| *y == record.pub_year) {
            return false;
        }
        let needle = self.text.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        record.title.to_lowercase().contains(&needle) || record.authors.to_lowercase().contains(&needle)
    }

    pub fn apply<'a>(&self, records: &'a [CanonicalRecord]) -> Vec<&'a CanonicalRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

//! Merge and deduplication of KCI and RISS results.
//!
//! Both sources are projected into [`CanonicalRecord`], concatenated (KCI
//! first), year-normalized and then deduplicated twice: by identifier, then
//! by [`title_key`]. Surviving records keep their concatenation order.

use crate::kci::KciArticle;
use crate::riss::RissRecord;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;
use tracing::info;

static YEAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{4}").expect("valid year pattern"));

/// Provenance of a merged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "KCI")]
    Kci,
    #[serde(rename = "RISS")]
    Riss,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Kci => "KCI",
            Source::Riss => "RISS",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column order of merged output.
pub const CANONICAL_COLUMNS: &[&str] = &[
    "title",
    "authors",
    "venue",
    "pub_year",
    "url",
    "doi",
    "abstract",
    "keywords",
    "source",
    "doc_type",
    "material_type",
    "identifier",
];

/// One row of the merged result set. Field order matches
/// [`CANONICAL_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub title: String,
    pub authors: String,
    /// Journal (KCI) or publishing institution (RISS)
    pub venue: String,
    pub pub_year: String,
    pub url: String,
    pub doi: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub keywords: String,
    pub source: Source,
    /// RISS only
    pub doc_type: String,
    /// RISS only
    pub material_type: String,
    /// Primary dedup key; may be empty
    pub identifier: String,
}

impl CanonicalRecord {
    /// Empty record of the given source.
    pub fn empty(source: Source) -> Self {
        Self {
            title: String::new(),
            authors: String::new(),
            venue: String::new(),
            pub_year: String::new(),
            url: String::new(),
            doi: String::new(),
            abstract_text: String::new(),
            keywords: String::new(),
            source,
            doc_type: String::new(),
            material_type: String::new(),
            identifier: String::new(),
        }
    }
}

impl From<&KciArticle> for CanonicalRecord {
    fn from(article: &KciArticle) -> Self {
        let identifier = if article.doi.is_empty() {
            article.article_id.clone()
        } else {
            article.doi.clone()
        };
        Self {
            title: article.title.clone(),
            authors: article.authors.clone(),
            venue: article.journal_name.clone(),
            pub_year: article.pub_year.clone(),
            url: article.url.clone(),
            doi: article.doi.clone(),
            abstract_text: article.abstract_text.clone(),
            keywords: article.keywords.clone(),
            identifier,
            ..Self::empty(Source::Kci)
        }
    }
}

impl From<&RissRecord> for CanonicalRecord {
    fn from(record: &RissRecord) -> Self {
        Self {
            title: record.title.clone(),
            authors: record.author.clone(),
            venue: record.publisher.clone(),
            pub_year: record.pub_year.clone(),
            url: record.url.clone(),
            doc_type: record.doc_type.clone(),
            material_type: record.material_type.clone(),
            ..Self::empty(Source::Riss)
        }
    }
}

/// First run of four ASCII digits, or `""`.
pub fn normalize_year(raw: &str) -> String {
    YEAR_PATTERN
        .find(raw)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || ('가'..='힣').contains(&c) || c == ' '
}

/// Fuzzy title key: lowercase, whitespace runs collapsed, then everything
/// but ASCII letters and digits, Hangul syllables and spaces removed.
pub fn title_key(title: &str) -> String {
    let lowered = title.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().filter(|&c| is_key_char(c)).collect()
}

/// Concatenate `a` then `b`, normalize years and drop duplicates.
///
/// A record is dropped when its non-empty identifier, or its title key, was
/// already seen on an earlier kept record. Empty identifiers never match;
/// empty title keys do.
pub fn merge(a: Vec<CanonicalRecord>, b: Vec<CanonicalRecord>) -> Vec<CanonicalRecord> {
    let mut records: Vec<CanonicalRecord> = a.into_iter().chain(b).collect();
    let total = records.len();

    for record in &mut records {
        record.pub_year = normalize_year(&record.pub_year);
    }

    let mut identifiers = HashSet::new();
    records.retain(|r| r.identifier.is_empty() || identifiers.insert(r.identifier.clone()));
    let after_identifier = records.len();

    let mut title_keys = HashSet::new();
    records.retain(|r| title_keys.insert(title_key(&r.title)));

    info!(
        input = total,
        identifier_duplicates = total - after_identifier,
        title_duplicates = after_identifier - records.len(),
        output = records.len(),
        "Merged result set"
    );
    records
}

/// Project both sources into canonical records and [`merge`] them.
pub fn merge_sources(kci: &[KciArticle], riss: &[RissRecord]) -> Vec<CanonicalRecord> {
    merge(
        kci.iter().map(CanonicalRecord::from).collect(),
        riss.iter().map(CanonicalRecord::from).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(title: &str, identifier: &str, source: Source) -> CanonicalRecord {
        CanonicalRecord {
            title: title.to_string(),
            identifier: identifier.to_string(),
            ..CanonicalRecord::empty(source)
        }
    }

    fn titles(records: &[CanonicalRecord]) -> Vec<&str> {
        records.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge(Vec::new(), Vec::new()).is_empty());
        assert_eq!(CANONICAL_COLUMNS.len(), 12);
    }

    #[test]
    fn test_identifier_duplicate_keeps_first() {
        let merged = merge(
            vec![rec("First title", "10.1/x", Source::Kci)],
            vec![rec("Completely different", "10.1/x", Source::Riss)],
        );
        assert_eq!(titles(&merged), vec!["First title"]);
        assert_eq!(merged[0].source, Source::Kci);
    }

    #[test]
    fn test_empty_identifiers_never_collide() {
        let merged = merge(
            vec![rec("Alpha", "", Source::Kci), rec("Beta", "", Source::Kci)],
            Vec::new(),
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_title_key_collision() {
        let merged = merge(
            vec![rec("Study of X", "", Source::Kci)],
            vec![rec("study  of x", "", Source::Riss)],
        );
        assert_eq!(titles(&merged), vec!["Study of X"]);
    }

    #[test]
    fn test_empty_title_keys_collapse() {
        let merged = merge(
            vec![rec("", "", Source::Kci), rec("!!!", "", Source::Kci)],
            vec![rec("   ", "", Source::Riss)],
        );
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_order_is_stable() {
        let merged = merge(
            vec![rec("a", "1", Source::Kci), rec("b", "2", Source::Kci)],
            vec![rec("c", "", Source::Riss), rec("A", "", Source::Riss), rec("d", "", Source::Riss)],
        );
        assert_eq!(titles(&merged), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_normalize_year() {
        assert_eq!(normalize_year("2023년"), "2023");
        assert_eq!(normalize_year("2023.05"), "2023");
        assert_eq!(normalize_year("2023"), "2023");
        assert_eq!(normalize_year("n/a"), "");
        assert_eq!(normalize_year("12345"), "1234");
        assert_eq!(normalize_year(""), "");
    }

    #[test]
    fn test_title_key() {
        assert_eq!(title_key("  Study\tof   X! "), "study of x");
        assert_eq!(title_key("청년 고용: 정책 (2020)"), "청년 고용 정책 2020");
        assert_eq!(title_key("Café"), "caf");
        assert_eq!(title_key("ㄱㄴ"), "");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let a = vec![
            rec("Study of X", "10.1/a", Source::Kci),
            rec("Other", "10.1/a", Source::Kci),
            CanonicalRecord {
                pub_year: "2021년".to_string(),
                ..rec("Third", "", Source::Kci)
            },
        ];
        let b = vec![rec("study of x", "", Source::Riss), rec("Fourth", "", Source::Riss)];

        let once = merge(a, b);
        let twice = merge(once.clone(), Vec::new());
        assert_eq!(once, twice);
        assert_eq!(titles(&once), vec!["Study of X", "Third", "Fourth"]);
        assert_eq!(once[1].pub_year, "2021");
    }

    #[test]
    fn test_merge_sources_projection() {
        let kci = vec![
            KciArticle {
                article_id: "ART1".to_string(),
                title: "KCI title".to_string(),
                journal_name: "노동정책연구".to_string(),
                pub_year: "2020".to_string(),
                ..KciArticle::default()
            },
            KciArticle {
                article_id: "ART2".to_string(),
                doi: "10.9/z".to_string(),
                title: "With doi".to_string(),
                ..KciArticle::default()
            },
        ];
        let riss = vec![RissRecord {
            title: "RISS title".to_string(),
            author: "홍길동".to_string(),
            publisher: "고려대학교".to_string(),
            pub_year: "2019.02".to_string(),
            doc_type: "T".to_string(),
            material_type: "국내석사".to_string(),
            ..RissRecord::default()
        }];

        let merged = merge_sources(&kci, &riss);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].venue, "노동정책연구");
        assert_eq!(merged[0].identifier, "ART1");
        assert_eq!(merged[1].identifier, "10.9/z");

        let riss_row = &merged[2];
        assert_eq!(riss_row.source, Source::Riss);
        assert_eq!(riss_row.authors, "홍길동");
        assert_eq!(riss_row.venue, "고려대학교");
        assert_eq!(riss_row.pub_year, "2019");
        assert_eq!(riss_row.doc_type, "T");
        assert_eq!(riss_row.identifier, "");
    }

    #[test]
    fn test_source_serializes_as_label() {
        let json = serde_json::to_string(&Source::Riss).expect("serializable");
        assert_eq!(json, "\"RISS\"");
    }
}

//! Detail enrichment: a second, per-record lookup that backfills fields the
//! bulk search left empty.
//!
//! [`DetailEnricher`] owns the detail cache for its lifetime. Identifiers it
//! has already fetched are answered from the cache without touching the
//! network. Each lookup succeeds or fails on its own; a failure is reported
//! as [`DetailOutcome::Failed`] and never aborts the batch.

use crate::error::Result;
use crate::tree::RawNode;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default number of simultaneous detail lookups.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default pause after each lookup, to stay inside upstream quotas.
pub const DEFAULT_DISPATCH_DELAY: Duration = Duration::from_millis(100);

/// Something that can fetch the detail payload for one record identifier.
#[async_trait]
pub trait DetailSource: Send + Sync {
    async fn fetch_detail(&self, id: &str) -> Result<RawNode>;
}

/// Result of one detail lookup.
#[derive(Debug, Clone)]
pub enum DetailOutcome {
    /// Fetched from upstream during this batch
    Fetched(Arc<RawNode>),
    /// Served from the enricher's cache
    Cached(Arc<RawNode>),
    /// Lookup failed; the record keeps its unenriched values
    Failed { reason: String },
}

impl DetailOutcome {
    pub fn detail(&self) -> Option<&RawNode> {
        match self {
            DetailOutcome::Fetched(detail) | DetailOutcome::Cached(detail) => Some(detail),
            DetailOutcome::Failed { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            DetailOutcome::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Concurrent, cached detail lookups against one source.
pub struct DetailEnricher<S> {
    source: S,
    cache: Mutex<HashMap<String, Arc<RawNode>>>,
    concurrency: usize,
    dispatch_delay: Duration,
}

impl<S: DetailSource> DetailEnricher<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
            concurrency: DEFAULT_CONCURRENCY,
            dispatch_delay: DEFAULT_DISPATCH_DELAY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_dispatch_delay(mut self, delay: Duration) -> Self {
        self.dispatch_delay = delay;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Number of identifiers currently cached.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    fn cached(&self, id: &str) -> Option<Arc<RawNode>> {
        let cache = self.cache.lock().ok()?;
        cache.get(id).cloned()
    }

    fn store(&self, id: &str, detail: Arc<RawNode>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(id.to_string(), detail);
        }
    }

    /// Look up every identifier in `ids`, at most `concurrency` at a time.
    ///
    /// Duplicate and empty identifiers are dropped before dispatch. The
    /// returned map has one outcome per distinct non-empty identifier and
    /// is complete only once every lookup has finished.
    pub async fn fetch_batch(&self, ids: &[String]) -> HashMap<String, DetailOutcome> {
        let mut seen = HashSet::new();
        let unique: Vec<&String> = ids
            .iter()
            .filter(|id| !id.is_empty() && seen.insert(id.as_str()))
            .collect();

        let mut outcomes = HashMap::with_capacity(unique.len());
        let mut pending = Vec::new();
        for id in unique {
            match self.cached(id) {
                Some(detail) => {
                    debug!(id = %id, "Detail cache hit");
                    outcomes.insert(id.clone(), DetailOutcome::Cached(detail));
                }
                None => pending.push(id.clone()),
            }
        }

        info!(
            requested = ids.len(),
            cached = outcomes.len(),
            fetching = pending.len(),
            concurrency = self.concurrency,
            "Starting detail lookups"
        );

        let fetched: Vec<(String, DetailOutcome)> = stream::iter(pending)
            .map(|id| async move {
                let outcome = match self.source.fetch_detail(&id).await {
                    Ok(detail) => {
                        let detail = Arc::new(detail);
                        self.store(&id, Arc::clone(&detail));
                        DetailOutcome::Fetched(detail)
                    }
                    Err(e) => {
                        warn!(id = %id, error = %e, "Detail lookup failed");
                        DetailOutcome::Failed {
                            reason: e.to_string(),
                        }
                    }
                };
                if !self.dispatch_delay.is_zero() {
                    tokio::time::sleep(self.dispatch_delay).await;
                }
                (id, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        outcomes.extend(fetched);

        let failed = outcomes.values().filter(|o| o.detail().is_none()).count();
        info!(
            total = outcomes.len(),
            failed = failed,
            cache_size = self.cached_len(),
            "Detail lookups complete"
        );

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScholarError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a one-node payload per id; ids starting with "bad" fail.
    #[derive(Default)]
    struct FakeSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DetailSource for FakeSource {
        async fn fetch_detail(&self, id: &str) -> Result<RawNode> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if id.starts_with("bad") {
                return Err(ScholarError::Api {
                    code: 500,
                    message: format!("detail {} unavailable", id),
                });
            }
            Ok(RawNode::new().with_text(format!("detail of {}", id)))
        }
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn enricher() -> DetailEnricher<FakeSource> {
        DetailEnricher::new(FakeSource::default()).with_dispatch_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_batch_fetches_each_id_once() {
        let enricher = enricher();
        let outcomes = enricher
            .fetch_batch(&ids(&["ART1", "ART2", "ART1", ""]))
            .await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(enricher.source().calls.load(Ordering::SeqCst), 2);
        let detail = outcomes["ART1"].detail().expect("ART1 fetched");
        assert_eq!(detail.text(), Some("detail of ART1"));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_source() {
        let enricher = enricher();
        enricher.fetch_batch(&ids(&["ART1"])).await;
        let outcomes = enricher.fetch_batch(&ids(&["ART1", "ART2"])).await;

        assert!(matches!(outcomes["ART1"], DetailOutcome::Cached(_)));
        assert!(matches!(outcomes["ART2"], DetailOutcome::Fetched(_)));
        assert_eq!(enricher.source().calls.load(Ordering::SeqCst), 2);
        assert_eq!(enricher.cached_len(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_reported_per_item() {
        let enricher = enricher().with_concurrency(2);
        let outcomes = enricher
            .fetch_batch(&ids(&["ART1", "bad-7", "ART3"]))
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes["ART1"].detail().is_some());
        assert!(outcomes["ART3"].detail().is_some());
        assert_eq!(
            outcomes["bad-7"].failure_reason(),
            Some("API error: 500 - detail bad-7 unavailable")
        );
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let enricher = enricher();
        enricher.fetch_batch(&ids(&["bad-1"])).await;
        enricher.fetch_batch(&ids(&["bad-1"])).await;

        assert_eq!(enricher.cached_len(), 0);
        assert_eq!(enricher.source().calls.load(Ordering::SeqCst), 2);
    }

    /// Holds each lookup open briefly and records the most lookups seen in
    /// flight at once.
    #[derive(Default)]
    struct SlowSource {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl DetailSource for SlowSource {
        async fn fetch_detail(&self, id: &str) -> Result<RawNode> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(RawNode::new().with_text(id))
        }
    }

    #[tokio::test]
    async fn test_lookups_respect_concurrency_limit() {
        let enricher = DetailEnricher::new(SlowSource::default())
            .with_concurrency(3)
            .with_dispatch_delay(Duration::ZERO);
        let batch: Vec<String> = (0..12).map(|i| format!("ART{}", i)).collect();

        let outcomes = enricher.fetch_batch(&batch).await;

        assert_eq!(outcomes.len(), 12);
        assert!(outcomes.values().all(|o| o.detail().is_some()));
        let peak = enricher.source().peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak {} exceeds limit", peak);
        assert!(peak > 1, "lookups never overlapped");
        assert_eq!(enricher.source().in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let outcomes = enricher().fetch_batch(&[]).await;
        assert!(outcomes.is_empty());
    }
}

//! Proxy acquisition: the collector trait and its fan-out orchestrator.
//!
//! Collectors pull candidate lists from third-party sources and insert them
//! into the store at the initial score. The orchestrator runs every
//! registered collector concurrently; one source failing never takes down
//! the others.

mod sources;

pub use sources::{default_collectors, GeonodeCollector, PlainTextCollector};

use crate::store::ScoredStore;
use async_trait::async_trait;
use futures::future;
use log::{info, warn};
use std::sync::Arc;

/// One acquisition source.
///
/// `acquire` fetches and parses the source, inserts every candidate with
/// `insert_if_absent`, and returns how many were newly inserted. It may fail;
/// the orchestrator isolates the failure.
#[async_trait]
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;

    async fn acquire(&self, store: &dyn ScoredStore) -> anyhow::Result<usize>;
}

/// Aggregate result of one acquisition run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Newly inserted identifiers across all successful collectors.
    pub inserted: usize,
    /// Collectors that completed.
    pub succeeded: usize,
    /// Collectors that failed.
    pub failed: usize,
}

/// Run every collector concurrently against `store` and tally the yield.
pub async fn run_collectors(
    collectors: &[Arc<dyn Collector>],
    store: &dyn ScoredStore,
) -> CrawlSummary {
    let runs = collectors.iter().map(|collector| {
        let collector = Arc::clone(collector);
        async move {
            let outcome = collector.acquire(store).await;
            (collector, outcome)
        }
    });
    let outcomes = future::join_all(runs).await;

    let mut summary = CrawlSummary::default();
    for (collector, outcome) in outcomes {
        match outcome {
            Ok(inserted) => {
                info!("collector {} inserted {} new proxies", collector.name(), inserted);
                summary.inserted += inserted;
                summary.succeeded += 1;
            }
            Err(e) => {
                warn!("collector {} failed: {e:#}", collector.name());
                summary.failed += 1;
            }
        }
    }

    info!(
        "acquisition finished: {} new proxies from {}/{} sources",
        summary.inserted,
        summary.succeeded,
        summary.succeeded + summary.failed
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyId;
    use crate::store::{MemoryStore, INITIAL_SCORE};

    struct FixedCollector {
        name: &'static str,
        proxies: Vec<&'static str>,
    }

    #[async_trait]
    impl Collector for FixedCollector {
        fn name(&self) -> &str {
            self.name
        }

        async fn acquire(&self, store: &dyn ScoredStore) -> anyhow::Result<usize> {
            let mut inserted = 0;
            for raw in &self.proxies {
                let id = ProxyId::parse(raw)?;
                if store.insert_if_absent(&id, INITIAL_SCORE).await? {
                    inserted += 1;
                }
            }
            Ok(inserted)
        }
    }

    struct FailingCollector;

    #[async_trait]
    impl Collector for FailingCollector {
        fn name(&self) -> &str {
            "failing"
        }

        async fn acquire(&self, _store: &dyn ScoredStore) -> anyhow::Result<usize> {
            anyhow::bail!("source unreachable")
        }
    }

    #[tokio::test]
    async fn one_failing_collector_does_not_sink_the_rest() {
        let store = MemoryStore::new();
        let collectors: Vec<Arc<dyn Collector>> = vec![
            Arc::new(FixedCollector {
                name: "a",
                proxies: vec!["http://1.1.1.1:80", "http://2.2.2.2:80"],
            }),
            Arc::new(FailingCollector),
            Arc::new(FixedCollector {
                name: "b",
                proxies: vec!["http://3.3.3.3:80"],
            }),
        ];

        let summary = run_collectors(&collectors, &store).await;
        assert_eq!(summary.inserted, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn duplicate_candidates_across_sources_dedupe() {
        let store = MemoryStore::new();
        let collectors: Vec<Arc<dyn Collector>> = vec![
            Arc::new(FixedCollector {
                name: "a",
                proxies: vec!["http://1.1.1.1:80"],
            }),
            Arc::new(FixedCollector {
                name: "b",
                proxies: vec!["http://1.1.1.1:80", "http://2.2.2.2:80"],
            }),
        ];

        let summary = run_collectors(&collectors, &store).await;
        assert_eq!(summary.inserted, 2);
        assert_eq!(store.count().await.unwrap(), 2);
    }
}

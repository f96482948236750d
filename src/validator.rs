//! Concurrent liveness checking and speed scoring.
//!
//! The validator is a pure computation over a batch: it probes every
//! identifier through the candidate proxy itself, normalizes the latencies of
//! the survivors into a relative speed score, and reports the dead set for
//! the caller to evict. It never touches the store.

use crate::proxy::{Protocol, ProxyId};
use async_trait::async_trait;
use futures::future;
use log::{debug, info};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Outcome of probing a single proxy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeResult {
    /// The proxy relayed a request; elapsed time to the first success.
    Alive(Duration),
    /// Every probe attempt timed out or failed.
    Dead,
    /// No probe could even be scheduled through this identifier.
    Unusable,
}

/// A single liveness check against one proxy.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, proxy: &ProxyId) -> ProbeResult;
}

/// Probe that issues an HTTP GET through the candidate proxy.
///
/// The primary endpoint is tried first, then at most one alternate before
/// the proxy is declared dead. For https proxies the https endpoint is the
/// primary.
pub struct HttpProbe {
    probe_url: String,
    fallback_url: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(
        probe_url: impl Into<String>,
        fallback_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            probe_url: probe_url.into(),
            fallback_url: fallback_url.into(),
            timeout,
        }
    }

    fn endpoints_for(&self, protocol: Protocol) -> [&str; 2] {
        match protocol {
            Protocol::Https => [&self.fallback_url, &self.probe_url],
            _ => [&self.probe_url, &self.fallback_url],
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, proxy: &ProxyId) -> ProbeResult {
        let upstream = match reqwest::Proxy::all(proxy.as_str()) {
            Ok(upstream) => upstream,
            Err(e) => {
                debug!("proxy {proxy} not usable as an upstream: {e}");
                return ProbeResult::Unusable;
            }
        };
        let client = match reqwest::Client::builder()
            .timeout(self.timeout)
            .proxy(upstream)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                debug!("could not build probe client for {proxy}: {e}");
                return ProbeResult::Unusable;
            }
        };

        for target in self.endpoints_for(proxy.protocol()) {
            let start = Instant::now();
            match client.get(target).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return ProbeResult::Alive(start.elapsed());
                }
                Ok(resp) => debug!("probe via {proxy} got status {}", resp.status()),
                Err(e) => debug!("probe via {proxy} failed: {e}"),
            }
        }
        ProbeResult::Dead
    }
}

/// Result of validating one batch.
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Identifiers that passed, each with its new score in [10, 20].
    pub survivors: Vec<(ProxyId, f64)>,
    /// Identifiers whose probes all failed.
    pub dead: Vec<ProxyId>,
    /// Identifiers no probe could be scheduled through.
    pub unusable: Vec<ProxyId>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.survivors.is_empty() && self.dead.is_empty() && self.unusable.is_empty()
    }
}

/// Batch validator with a bounded admission gate.
pub struct Validator {
    probe: Arc<dyn Probe>,
    gate: Arc<Semaphore>,
}

impl Validator {
    /// Create a validator running at most `concurrency` probes at once.
    pub fn new(probe: Arc<dyn Probe>, concurrency: usize) -> Self {
        Self {
            probe,
            gate: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Probe every identifier in `batch` and score the survivors.
    pub async fn validate(&self, batch: &[ProxyId]) -> ValidationReport {
        if batch.is_empty() {
            return ValidationReport::default();
        }

        let probes = batch.iter().map(|id| {
            let probe = Arc::clone(&self.probe);
            let gate = Arc::clone(&self.gate);
            let id = id.clone();
            async move {
                // The gate is never closed; a failed acquire means shutdown,
                // in which case the proxy is simply not judged this pass.
                let Ok(_permit) = gate.acquire_owned().await else {
                    return (id, ProbeResult::Unusable);
                };
                let result = probe.probe(&id).await;
                (id, result)
            }
        });
        let outcomes = future::join_all(probes).await;

        let mut alive: Vec<(ProxyId, Duration)> = Vec::new();
        let mut report = ValidationReport::default();
        for (id, result) in outcomes {
            match result {
                ProbeResult::Alive(latency) => alive.push((id, latency)),
                ProbeResult::Dead => report.dead.push(id),
                ProbeResult::Unusable => report.unusable.push(id),
            }
        }

        let latencies: Vec<Duration> = alive.iter().map(|(_, l)| *l).collect();
        let scores = score_latencies(&latencies);
        report.survivors = alive
            .into_iter()
            .zip(scores)
            .map(|((id, _), score)| (id, score))
            .collect();

        info!(
            "validated {} proxies: {} alive, {} dead, {} unusable",
            batch.len(),
            report.survivors.len(),
            report.dead.len(),
            report.unusable.len()
        );
        report
    }
}

/// Min-max normalize batch latencies into final scores in [10, 20].
///
/// The fastest survivor scores 20, the slowest 10; when all latencies are
/// equal (including a single survivor) everyone scores 20.
pub fn score_latencies(latencies: &[Duration]) -> Vec<f64> {
    if latencies.is_empty() {
        return Vec::new();
    }

    let ms: Vec<f64> = latencies
        .iter()
        .map(|l| l.as_secs_f64() * 1000.0)
        .collect();
    let min = ms.iter().copied().fold(f64::INFINITY, f64::min);
    let max = ms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = (max - min).max(1.0);

    ms.into_iter()
        .map(|l| {
            let speed = (10.0 * (1.0 - (l - min) / span)).clamp(0.0, 10.0);
            10.0 + speed
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyId;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Probe that replays a fixed script of outcomes.
    struct ScriptedProbe {
        outcomes: HashMap<String, ProbeResult>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProbe {
        fn new(outcomes: &[(&str, ProbeResult)]) -> Arc<Self> {
            Arc::new(Self {
                outcomes: outcomes
                    .iter()
                    .map(|(id, r)| (id.to_string(), *r))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        async fn probe(&self, proxy: &ProxyId) -> ProbeResult {
            self.calls.lock().push(proxy.as_str().to_string());
            *self
                .outcomes
                .get(proxy.as_str())
                .unwrap_or(&ProbeResult::Dead)
        }
    }

    fn id(raw: &str) -> ProxyId {
        ProxyId::parse(raw).unwrap()
    }

    #[test]
    fn scores_are_min_max_normalized() {
        let scores = score_latencies(&[
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(300),
        ]);
        for (got, want) in scores.iter().zip([20.0, 15.0, 10.0]) {
            assert!((got - want).abs() < 1e-9, "got {got}, want {want}");
        }
    }

    #[test]
    fn equal_latencies_all_score_twenty() {
        let scores = score_latencies(&[Duration::from_millis(150); 4]);
        assert!(scores.iter().all(|s| *s == 20.0));
    }

    #[test]
    fn single_survivor_scores_twenty() {
        assert_eq!(score_latencies(&[Duration::from_millis(42)]), vec![20.0]);
    }

    #[test]
    fn scores_stay_in_bounds() {
        let scores = score_latencies(&[
            Duration::from_millis(1),
            Duration::from_millis(7),
            Duration::from_millis(9000),
            Duration::from_millis(123),
        ]);
        assert!(scores.iter().all(|s| (10.0..=20.0).contains(s)));
        // Fastest survivor always gets the full score.
        assert_eq!(scores[0], 20.0);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let probe = ScriptedProbe::new(&[]);
        let validator = Validator::new(probe.clone(), 4);
        let report = validator.validate(&[]).await;
        assert!(report.is_empty());
        assert!(probe.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn partitions_survivors_dead_and_unusable() {
        let probe = ScriptedProbe::new(&[
            ("http://1.1.1.1:80", ProbeResult::Alive(Duration::from_millis(100))),
            ("http://2.2.2.2:80", ProbeResult::Dead),
            ("http://3.3.3.3:80", ProbeResult::Unusable),
        ]);
        let validator = Validator::new(probe, 4);

        let batch = vec![
            id("http://1.1.1.1:80"),
            id("http://2.2.2.2:80"),
            id("http://3.3.3.3:80"),
        ];
        let report = validator.validate(&batch).await;

        assert_eq!(report.survivors, vec![(id("http://1.1.1.1:80"), 20.0)]);
        assert_eq!(report.dead, vec![id("http://2.2.2.2:80")]);
        assert_eq!(report.unusable, vec![id("http://3.3.3.3:80")]);
    }

    #[tokio::test]
    async fn narrow_gate_still_drains_the_batch() {
        let outcomes: Vec<(String, ProbeResult)> = (0..20)
            .map(|i| {
                (
                    format!("http://10.0.0.{i}:80"),
                    ProbeResult::Alive(Duration::from_millis(100 + i as u64)),
                )
            })
            .collect();
        let borrowed: Vec<(&str, ProbeResult)> =
            outcomes.iter().map(|(s, r)| (s.as_str(), *r)).collect();
        let probe = ScriptedProbe::new(&borrowed);
        let validator = Validator::new(probe, 2);

        let batch: Vec<ProxyId> = outcomes.iter().map(|(s, _)| id(s)).collect();
        let report = validator.validate(&batch).await;
        assert_eq!(report.survivors.len(), 20);
        assert!(report
            .survivors
            .iter()
            .all(|(_, s)| (10.0..=20.0).contains(s)));
    }
}

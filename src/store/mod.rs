//! The scored store: a ranked, capacity-bounded mapping from proxy
//! identifier to score.
//!
//! The store is the single point of synchronization in the engine. The
//! production backend is a Redis sorted set; an in-process backend with the
//! same contract backs the demo example and the test suite.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use crate::error::Result;
use crate::proxy::{Protocol, ProxyId};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

/// Score assigned to a freshly acquired, not yet validated candidate.
pub const INITIAL_SCORE: f64 = 10.0;

/// Ranked mapping from proxy identifier to score.
///
/// All operations are safe to call concurrently; compound mutations
/// (`update_scores`, `trim_to_capacity`) are atomic against interleaved
/// inserts.
#[async_trait]
pub trait ScoredStore: Send + Sync {
    /// Insert `id` with `score` only if it is not already present.
    /// Returns whether the insertion happened. First insert wins; a second
    /// call never overwrites the existing score.
    async fn insert_if_absent(&self, id: &ProxyId, score: f64) -> Result<bool>;

    /// Overwrite scores for the given identifiers in one transaction.
    /// Identifiers not present are ignored, never inserted.
    async fn update_scores(&self, batch: &[(ProxyId, f64)]) -> Result<()>;

    /// Remove one identifier. Returns whether it was present.
    async fn remove(&self, id: &ProxyId) -> Result<bool>;

    /// Remove a batch of identifiers, returning how many were present.
    async fn remove_many(&self, ids: &[ProxyId]) -> Result<usize>;

    /// The top `n` entries by score, descending. Ties are broken
    /// deterministically within a single call.
    async fn top(&self, n: usize) -> Result<Vec<(ProxyId, f64)>>;

    /// Number of entries in the store.
    async fn count(&self) -> Result<usize>;

    /// Evict the lowest-scoring entries until at most `max_n` remain.
    /// Returns the number evicted.
    async fn trim_to_capacity(&self, max_n: usize) -> Result<usize>;

    /// Draw up to `k` distinct random identifiers from the top `window`
    /// entries, optionally restricted to one protocol. Fails with
    /// `NoProxyAvailable` when the filtered window is empty.
    async fn sample(
        &self,
        window: usize,
        k: usize,
        protocol: Option<Protocol>,
    ) -> Result<Vec<ProxyId>>;
}

/// Read-only view of the pool, computed on demand from the store.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub total: usize,
    pub protocols: BTreeMap<String, usize>,
}

impl PoolSnapshot {
    /// Compute the current snapshot from the ranked contents of `store`.
    pub async fn collect(store: &dyn ScoredStore) -> Result<Self> {
        let total = store.count().await?;
        let mut protocols = BTreeMap::new();
        for (id, _) in store.top(total).await? {
            *protocols
                .entry(id.protocol().as_str().to_string())
                .or_insert(0) += 1;
        }
        Ok(Self { total, protocols })
    }
}

/// Filter a ranked window down to one protocol and draw `k` distinct random
/// members. Shared by both store backends.
pub(crate) fn sample_from_window(
    window: Vec<(ProxyId, f64)>,
    k: usize,
    protocol: Option<Protocol>,
) -> crate::error::Result<Vec<ProxyId>> {
    use rand::seq::IndexedRandom;

    let eligible: Vec<ProxyId> = window
        .into_iter()
        .map(|(id, _)| id)
        .filter(|id| protocol.map_or(true, |p| id.protocol() == p))
        .collect();

    if eligible.is_empty() || k == 0 {
        return Err(crate::error::PoolError::NoProxyAvailable);
    }

    let picked = eligible
        .choose_multiple(&mut rand::rng(), k.min(eligible.len()))
        .cloned()
        .collect();
    Ok(picked)
}

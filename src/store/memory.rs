//! In-process store with the same contract as the Redis backend.

use super::{sample_from_window, ScoredStore};
use crate::error::{PoolError, Result};
use crate::proxy::{Protocol, ProxyId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// `ScoredStore` held entirely in process memory.
///
/// Useful for tests and for embedding the engine without a Redis instance.
/// The whole map sits behind one `RwLock`, so every compound operation is
/// trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, f64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ranked(&self) -> Vec<(String, f64)> {
        Self::rank(&self.entries.read())
    }

    /// Score descending, identifier ascending for deterministic ties.
    fn rank(entries: &HashMap<String, f64>) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = entries.iter().map(|(k, v)| (k.clone(), *v)).collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked
    }
}

#[async_trait]
impl ScoredStore for MemoryStore {
    async fn insert_if_absent(&self, id: &ProxyId, score: f64) -> Result<bool> {
        let mut entries = self.entries.write();
        if entries.contains_key(id.as_str()) {
            return Ok(false);
        }
        entries.insert(id.as_str().to_string(), score);
        Ok(true)
    }

    async fn update_scores(&self, batch: &[(ProxyId, f64)]) -> Result<()> {
        let mut entries = self.entries.write();
        for (id, score) in batch {
            if let Some(existing) = entries.get_mut(id.as_str()) {
                *existing = *score;
            }
        }
        Ok(())
    }

    async fn remove(&self, id: &ProxyId) -> Result<bool> {
        Ok(self.entries.write().remove(id.as_str()).is_some())
    }

    async fn remove_many(&self, ids: &[ProxyId]) -> Result<usize> {
        let mut entries = self.entries.write();
        Ok(ids
            .iter()
            .filter(|id| entries.remove(id.as_str()).is_some())
            .count())
    }

    async fn top(&self, n: usize) -> Result<Vec<(ProxyId, f64)>> {
        Ok(self
            .ranked()
            .into_iter()
            .take(n)
            .filter_map(|(raw, score)| ProxyId::parse(&raw).ok().map(|id| (id, score)))
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().len())
    }

    async fn trim_to_capacity(&self, max_n: usize) -> Result<usize> {
        // Rank and evict under one write guard so a concurrent insert can
        // never slip between the two and leave the store over capacity.
        let mut entries = self.entries.write();
        let ranked = Self::rank(&entries);
        let mut removed = 0;
        for (id, _) in ranked.into_iter().skip(max_n) {
            if entries.remove(&id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn sample(
        &self,
        window: usize,
        k: usize,
        protocol: Option<Protocol>,
    ) -> Result<Vec<ProxyId>> {
        let top = self.top(window).await?;
        if top.is_empty() {
            return Err(PoolError::NoProxyAvailable);
        }
        sample_from_window(top, k, protocol)
    }
}

//! Redis-backed store: one sorted set, score-ranked.

use super::{sample_from_window, ScoredStore};
use crate::error::{PoolError, Result};
use crate::proxy::{Protocol, ProxyId};
use async_trait::async_trait;
use log::{debug, info};
use redis::aio::ConnectionManager;

/// `ScoredStore` backed by a Redis sorted set.
///
/// Holds a `ConnectionManager`, which multiplexes and reconnects under the
/// hood, so the store is cheap to clone and share.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    key: String,
}

impl RedisStore {
    /// Connect to Redis and bind to the sorted set named `key`.
    pub async fn connect(url: &str, key: &str) -> Result<Self> {
        info!("connecting to redis at {url}");
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            key: key.to_string(),
        })
    }
}

#[async_trait]
impl ScoredStore for RedisStore {
    async fn insert_if_absent(&self, id: &ProxyId, score: f64) -> Result<bool> {
        let mut conn = self.conn.clone();
        // NX makes the first insert win atomically across callers.
        let added: i64 = redis::cmd("ZADD")
            .arg(&self.key)
            .arg("NX")
            .arg(score)
            .arg(id.as_str())
            .query_async(&mut conn)
            .await?;
        Ok(added == 1)
    }

    async fn update_scores(&self, batch: &[(ProxyId, f64)]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        // XX updates existing members only; a record removed concurrently is
        // skipped rather than resurrected.
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (id, score) in batch {
            pipe.cmd("ZADD")
                .arg(&self.key)
                .arg("XX")
                .arg(*score)
                .arg(id.as_str())
                .ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        debug!("committed {} score updates", batch.len());
        Ok(())
    }

    async fn remove(&self, id: &ProxyId) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("ZREM")
            .arg(&self.key)
            .arg(id.as_str())
            .query_async(&mut conn)
            .await?;
        Ok(removed == 1)
    }

    async fn remove_many(&self, ids: &[ProxyId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("ZREM");
        cmd.arg(&self.key);
        for id in ids {
            cmd.arg(id.as_str());
        }
        let removed: i64 = cmd.query_async(&mut conn).await?;
        Ok(removed as usize)
    }

    async fn top(&self, n: usize) -> Result<Vec<(ProxyId, f64)>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let entries: Vec<(String, f64)> = redis::cmd("ZREVRANGE")
            .arg(&self.key)
            .arg(0)
            .arg(n as isize - 1)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;

        // Skip any member that no longer parses as an identifier.
        Ok(entries
            .into_iter()
            .filter_map(|(raw, score)| ProxyId::parse(&raw).ok().map(|id| (id, score)))
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        let n: i64 = redis::cmd("ZCARD")
            .arg(&self.key)
            .query_async(&mut conn)
            .await?;
        Ok(n as usize)
    }

    async fn trim_to_capacity(&self, max_n: usize) -> Result<usize> {
        let mut conn = self.conn.clone();
        // A single ZREMRANGEBYRANK keeps exactly the top max_n members and is
        // atomic against concurrent inserts; when the set is already within
        // capacity the negative stop index yields an empty range.
        let removed: i64 = redis::cmd("ZREMRANGEBYRANK")
            .arg(&self.key)
            .arg(0)
            .arg(-(max_n as i64 + 1))
            .query_async(&mut conn)
            .await?;
        if removed > 0 {
            debug!("trimmed {removed} lowest-scoring proxies");
        }
        Ok(removed as usize)
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

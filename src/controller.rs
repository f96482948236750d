//! The scheduling loop: decides each tick whether to validate, evict, or
//! acquire, under cooldown and backpressure rules.

use crate::collector::{run_collectors, Collector};
use crate::config::PoolConfig;
use crate::error::Result;
use crate::store::ScoredStore;
use crate::validator::Validator;
use log::{error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Sleep after a failed tick before the loop resumes.
const TICK_FAILURE_BACKOFF: Duration = Duration::from_secs(60);

/// Work the HTTP layer enqueues for the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run an acquisition pass now, ignoring cooldown.
    Crawl,
    /// Run a full validation pass now.
    Validate,
    /// Validate a single identifier (used after manual inserts).
    ValidateOne(crate::proxy::ProxyId),
}

/// Drives the pool: periodic validation, capacity trimming, and
/// cooldown-gated acquisition.
pub struct PoolController {
    store: Arc<dyn ScoredStore>,
    validator: Validator,
    collectors: Vec<Arc<dyn Collector>>,
    config: PoolConfig,
    last_crawl: Mutex<Option<Instant>>,
}

impl PoolController {
    pub fn new(
        store: Arc<dyn ScoredStore>,
        validator: Validator,
        collectors: Vec<Arc<dyn Collector>>,
        config: PoolConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            validator,
            collectors,
            config,
            last_crawl: Mutex::new(None),
        })
    }

    /// Run the scheduling loop until `token` is cancelled.
    ///
    /// A failing tick is logged and followed by a fixed backoff; the loop
    /// itself only exits on cancellation.
    pub async fn run(
        self: Arc<Self>,
        mut commands: mpsc::Receiver<Command>,
        token: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "pool controller started (check every {:?}, min {}, max {})",
            self.config.check_interval, self.config.min_proxies, self.config.max_proxies
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once(&token).await {
                        error!("pool tick failed: {e}");
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = tokio::time::sleep(TICK_FAILURE_BACKOFF) => {}
                        }
                    }
                }
                Some(cmd) = commands.recv() => {
                    if let Err(e) = self.handle_command(cmd).await {
                        error!("command failed: {e}");
                    }
                }
            }
        }

        info!("pool controller stopped");
    }

    /// One scheduling pass: validate the whole pool, trim, and decide
    /// whether acquisition should run.
    pub async fn run_once(&self, token: &CancellationToken) -> Result<()> {
        let size = self.store.count().await?;

        if size == 0 {
            info!("pool is empty, requesting acquisition");
            self.spawn_crawl(true);
            return Ok(());
        }

        let survivors = self.validate_all(size).await?;
        if token.is_cancelled() {
            return Ok(());
        }

        if survivors < self.config.min_proxies {
            info!(
                "pool below threshold after validation ({survivors} < {}), requesting acquisition",
                self.config.min_proxies
            );
            self.spawn_crawl(true);
        } else if self.freshness_lapsed() {
            info!("pool is stale, requesting freshness acquisition");
            self.spawn_crawl(true);
        }

        Ok(())
    }

    /// Validate every identifier currently in the store, commit survivor
    /// scores, evict the dead, then trim to capacity.
    ///
    /// Score updates are committed before the trim so eviction never acts on
    /// stale pre-validation scores. Returns the survivor count.
    async fn validate_all(&self, size: usize) -> Result<usize> {
        let batch: Vec<_> = self
            .store
            .top(size)
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        let report = self.validator.validate(&batch).await;

        self.store.update_scores(&report.survivors).await?;
        let survivors = report.survivors.len();

        let mut doomed = report.dead;
        if !report.unusable.is_empty() {
            warn!(
                "removing {} identifiers no probe could be scheduled through",
                report.unusable.len()
            );
            doomed.extend(report.unusable);
        }
        let removed = self.store.remove_many(&doomed).await?;
        let trimmed = self.store.trim_to_capacity(self.config.max_proxies).await?;

        info!("validation pass done: {survivors} survivors, {removed} removed, {trimmed} trimmed");
        Ok(survivors)
    }

    async fn handle_command(&self, cmd: Command) -> Result<()> {
        match cmd {
            Command::Crawl => {
                self.spawn_crawl(false);
                Ok(())
            }
            Command::Validate => {
                let size = self.store.count().await?;
                if size > 0 {
                    self.validate_all(size).await?;
                }
                Ok(())
            }
            Command::ValidateOne(id) => {
                let report = self.validator.validate(std::slice::from_ref(&id)).await;
                self.store.update_scores(&report.survivors).await?;
                if !report.dead.is_empty() || !report.unusable.is_empty() {
                    self.store.remove(&id).await?;
                }
                self.store.trim_to_capacity(self.config.max_proxies).await?;
                Ok(())
            }
        }
    }

    /// Spawn an acquisition run as an independent task so it never blocks
    /// the next validation tick. When `respect_cooldown` is set, a run
    /// inside `crawl_min_interval` of the previous one is skipped.
    fn spawn_crawl(&self, respect_cooldown: bool) {
        {
            let mut last_crawl = self.last_crawl.lock();
            if respect_cooldown {
                if let Some(last) = *last_crawl {
                    if last.elapsed() < self.config.crawl_min_interval {
                        info!(
                            "acquisition still cooling down ({:?} of {:?})",
                            last.elapsed(),
                            self.config.crawl_min_interval
                        );
                        return;
                    }
                }
            }
            *last_crawl = Some(Instant::now());
        }

        let store = Arc::clone(&self.store);
        let collectors = self.collectors.clone();
        tokio::spawn(async move {
            let summary = run_collectors(&collectors, store.as_ref()).await;
            if summary.inserted == 0 && summary.failed > 0 {
                warn!("acquisition yielded nothing ({} sources failed)", summary.failed);
            }
        });
    }

    /// Whether the freshness policy calls for a crawl even though the pool
    /// is above threshold.
    fn freshness_lapsed(&self) -> bool {
        match *self.last_crawl.lock() {
            Some(last) => last.elapsed() > self.config.crawl_interval,
            None => true,
        }
    }
}

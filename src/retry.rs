//! Shared retry policy for outbound fetches.

use log::warn;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter, shared by every collector fetch.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per retry.
    pub base_delay: Duration,
    /// Fraction of the delay randomized away in either direction, in [0, 1].
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        let spread = base * self.jitter.clamp(0.0, 1.0);
        let jittered = if spread > 0.0 {
            base + rand::rng().random_range(-spread..spread)
        } else {
            base
        };
        Duration::from_secs_f64(jittered.max(0.0))
    }

    /// Fetch `url` as text, retrying per this policy.
    pub async fn fetch_text(&self, client: &reqwest::Client, url: &str) -> anyhow::Result<String> {
        let mut last_err = None;
        for attempt in 0..self.max_attempts.max(1) {
            if attempt > 0 {
                tokio::time::sleep(self.delay_for(attempt - 1)).await;
            }
            match client.get(url).send().await {
                Ok(resp) => match resp.error_for_status() {
                    Ok(resp) => return Ok(resp.text().await?),
                    Err(e) => {
                        warn!(
                            "fetch {url} got error status (attempt {}/{}): {e}",
                            attempt + 1,
                            self.max_attempts
                        );
                        last_err = Some(e.into());
                    }
                },
                Err(e) => {
                    warn!(
                        "fetch {url} failed (attempt {}/{}): {e}",
                        attempt + 1,
                        self.max_attempts
                    );
                    last_err = Some(e.into());
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("fetch {url} failed")))
    }
}

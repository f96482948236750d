//! # proxy-pool
//!
//! A self-refreshing pool of network proxy endpoints.
//!
//! The engine acquires candidates from pluggable collectors, concurrently
//! health-checks them through the proxies themselves, ranks survivors by
//! relative speed in a scored store, and serves the healthiest ones over a
//! small HTTP API while trimming stale or dead entries.

pub mod api;
pub mod collector;
pub mod config;
pub mod controller;
pub mod error;
pub mod proxy;
pub mod retry;
pub mod store;
pub mod validator;

pub use collector::{default_collectors, run_collectors, Collector, CrawlSummary};
pub use config::{PoolConfig, PoolConfigBuilder};
pub use controller::{Command, PoolController};
pub use error::{PoolError, Result};
pub use proxy::{Protocol, ProxyId};
pub use retry::RetryPolicy;
pub use store::{MemoryStore, PoolSnapshot, RedisStore, ScoredStore, INITIAL_SCORE};
pub use validator::{HttpProbe, Probe, ProbeResult, ValidationReport, Validator};

//! Error types for the proxy-pool crate.

use thiserror::Error;

/// Errors surfaced by the pool engine.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool (or the requested slice of it) holds no usable proxy.
    #[error("no proxy available in pool")]
    NoProxyAvailable,

    /// The identifier is not a `protocol://host:port` string with a
    /// supported protocol.
    #[error("malformed proxy identifier: {0}")]
    MalformedProxy(String),

    /// The backing store is unreachable or rejected an operation.
    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),
}

pub type Result<T> = std::result::Result<T, PoolError>;

//! Storage backends for sliding-window counters.

use std::time::Duration;

mod memory;
mod redis;
mod redis_pool;

pub use memory::InMemoryStorage;
pub use redis::RedisStorage;

/// One counter to evaluate: the fully-qualified store key and the rule limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counter {
    /// Store key, including prefix and identifier.
    pub key: String,
    /// Events admitted per window.
    pub capacity: u32,
    /// Window length in whole seconds.
    pub window: u64,
}

/// State of one counter after an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
    /// Events inside the window after this evaluation.
    pub count: u32,
    /// Whether this evaluation recorded an event.
    pub counted: bool,
}

/// Trait for counter storage backends.
///
/// An implementation evaluates all counters of one call as a single
/// indivisible step: for each counter it prunes events at least `window`
/// old, records a new event when fewer than `capacity` remain, and refreshes
/// the counter's expiry to `window`. States are returned in input order.
#[allow(async_fn_in_trait)]
pub trait RateLimitStorage: Send + Sync {
    /// Evaluate the counters atomically.
    async fn evaluate(&self, counters: &[Counter]) -> Result<Vec<CounterState>, StorageError>;
}

/// Errors that can occur in storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Could not reach the store.
    #[error("Storage connection error: {0}")]
    Connection(String),

    /// The store rejected or failed the evaluation.
    #[error("Storage query error: {0}")]
    Query(String),

    /// The store did not answer in time.
    #[error("Storage did not respond within {0:?}")]
    Timeout(Duration),

    /// The store answered with something that is not an evaluation result.
    #[error("Malformed storage reply: {0}")]
    MalformedReply(String),

    /// Internal storage error.
    #[error("Storage error: {0}")]
    Internal(String),
}

//! Redis-based sliding-window log storage shared by every gate instance.

use std::time::Duration;

use redis::{ErrorKind, RedisError, Script};

use super::{
    Counter, CounterState, RateLimitStorage, StorageError,
    redis_pool::{self, Pool},
};
use config::RedisConfig;

/// Redis-based storage implementation.
///
/// Each evaluation runs one Lua script over all of its keys, so Redis
/// executes it without interleaving other clients. Event timestamps are taken
/// from the Redis server clock.
pub struct RedisStorage {
    pool: Pool,
    script: Script,
    response_timeout: Duration,
}

impl RedisStorage {
    /// Create a new Redis storage instance and check that the server answers.
    pub async fn new(config: &RedisConfig) -> Result<Self, StorageError> {
        let storage = Self::lazy(config)?;

        let mut conn = storage
            .pool
            .get()
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to get Redis connection from pool: {e}")))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to ping Redis server: {e}")))?;

        Ok(storage)
    }

    /// Create a new Redis storage instance without contacting the server.
    /// Connections are opened on first use.
    pub fn lazy(config: &RedisConfig) -> Result<Self, StorageError> {
        let pool = redis_pool::create_pool(config)
            .map_err(|e| StorageError::Connection(format!("Failed to create Redis connection pool: {e}")))?;

        Ok(Self {
            pool,
            script: Script::new(include_str!("sliding_window.lua")),
            response_timeout: config.response_timeout,
        })
    }

    async fn invoke(&self, counters: &[Counter], nonce: &str) -> Result<Vec<i64>, StorageError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut invocation = self.script.prepare_invoke();
        invocation.arg(nonce);

        for counter in counters {
            invocation.key(&counter.key).arg(counter.capacity).arg(counter.window);
        }

        invocation
            .invoke_async::<Vec<i64>>(&mut *conn)
            .await
            .map_err(classify_error)
    }
}

impl RateLimitStorage for RedisStorage {
    async fn evaluate(&self, counters: &[Counter]) -> Result<Vec<CounterState>, StorageError> {
        if counters.is_empty() {
            return Ok(Vec::new());
        }

        let nonce = uuid::Uuid::new_v4().simple().to_string();

        let reply = tokio::time::timeout(self.response_timeout, self.invoke(counters, &nonce))
            .await
            .map_err(|_| StorageError::Timeout(self.response_timeout))??;

        parse_reply(counters, &reply)
    }
}

fn classify_error(error: RedisError) -> StorageError {
    match error.kind() {
        ErrorKind::TypeError => StorageError::MalformedReply(error.to_string()),
        ErrorKind::IoError => StorageError::Connection(error.to_string()),
        _ => StorageError::Query(error.to_string()),
    }
}

fn parse_reply(counters: &[Counter], reply: &[i64]) -> Result<Vec<CounterState>, StorageError> {
    if reply.len() != counters.len() * 2 {
        return Err(StorageError::MalformedReply(format!(
            "expected {} values for {} counters, got {}",
            counters.len() * 2,
            counters.len(),
            reply.len()
        )));
    }

    reply
        .chunks_exact(2)
        .map(|pair| {
            let count = u32::try_from(pair[0])
                .map_err(|_| StorageError::MalformedReply(format!("invalid counter value {}", pair[0])))?;

            let counted = match pair[1] {
                0 => false,
                1 => true,
                other => return Err(StorageError::MalformedReply(format!("invalid counted flag {other}"))),
            };

            Ok(CounterState { count, counted })
        })
        .collect()
}

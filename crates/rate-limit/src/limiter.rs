//! Atomic multi-rule evaluation against the configured counter store.

use std::{sync::Arc, time::Duration};

use config::{RateLimitConfig, StorageConfig};

use crate::{
    LimiterError, Rule,
    storage::{Counter, CounterState, InMemoryStorage, RateLimitStorage, RedisStorage, StorageError},
};

/// Storage backend for rate limiting.
enum Storage {
    Memory(InMemoryStorage),
    Redis(RedisStorage),
}

impl Storage {
    async fn evaluate(&self, counters: &[Counter]) -> Result<Vec<CounterState>, StorageError> {
        match self {
            Storage::Memory(storage) => storage.evaluate(counters).await,
            Storage::Redis(storage) => storage.evaluate(counters).await,
        }
    }
}

/// Evaluates sets of rules for an identifier. Cheap to clone.
#[derive(Clone)]
pub struct Limiter {
    storage: Arc<Storage>,
    key_prefix: Arc<str>,
}

impl Limiter {
    /// Create a limiter with the configured storage backend.
    pub async fn new(config: &RateLimitConfig) -> Result<Self, StorageError> {
        let storage = match &config.storage {
            StorageConfig::Memory => Storage::Memory(InMemoryStorage::new()),
            StorageConfig::Redis(redis_config) => Storage::Redis(RedisStorage::new(redis_config).await?),
        };

        Ok(Self {
            storage: Arc::new(storage),
            key_prefix: Arc::from(config.key_prefix.as_str()),
        })
    }

    /// Like [`Limiter::new`], but a Redis backend is not contacted until the
    /// first evaluation. Until Redis is reachable every evaluation fails.
    pub fn connect_lazy(config: &RateLimitConfig) -> Result<Self, StorageError> {
        let storage = match &config.storage {
            StorageConfig::Memory => Storage::Memory(InMemoryStorage::new()),
            StorageConfig::Redis(redis_config) => Storage::Redis(RedisStorage::lazy(redis_config)?),
        };

        Ok(Self {
            storage: Arc::new(storage),
            key_prefix: Arc::from(config.key_prefix.as_str()),
        })
    }

    /// Create a limiter backed by process-local memory.
    pub fn memory(key_prefix: &str) -> Self {
        Self {
            storage: Arc::new(Storage::Memory(InMemoryStorage::new())),
            key_prefix: Arc::from(key_prefix),
        }
    }

    /// Store key of `rule`'s counter for `identifier`.
    ///
    /// The limits are part of the key: rules with the same key but different
    /// capacity or window keep separate event logs.
    pub fn counter_key(&self, identifier: &str, rule: &Rule) -> String {
        format!(
            "{}{identifier}:{}:{}/{}",
            self.key_prefix,
            rule.key(),
            rule.capacity(),
            rule.window_secs()
        )
    }

    /// Evaluate `rules` for `identifier` in one atomic store operation.
    ///
    /// Every rule is counted on its own: a rule with room left records the
    /// request even when another rule of the same call denies it. The store
    /// round-trip runs on its own task and completes even if the caller is
    /// dropped.
    pub async fn check(&self, identifier: &str, rules: &[&Rule]) -> Result<Evaluation, LimiterError> {
        if rules.is_empty() {
            return Ok(Evaluation::default());
        }

        // Rules mapping to the same counter record one event per request.
        let mut counters: Vec<Counter> = Vec::with_capacity(rules.len());
        let mut slots = Vec::with_capacity(rules.len());

        for rule in rules {
            let key = self.counter_key(identifier, rule);

            let slot = match counters.iter().position(|counter| counter.key == key) {
                Some(slot) => slot,
                None => {
                    counters.push(Counter {
                        key,
                        capacity: rule.capacity(),
                        window: rule.window_secs(),
                    });

                    counters.len() - 1
                }
            };

            slots.push(slot);
        }

        let expected = counters.len();
        let storage = self.storage.clone();
        let task = tokio::spawn(async move { storage.evaluate(&counters).await });

        let states = task.await.map_err(|e| LimiterError::Aborted(e.to_string()))??;

        if states.len() != expected {
            return Err(StorageError::MalformedReply(format!(
                "expected {expected} counter states, got {}",
                states.len()
            ))
            .into());
        }

        let outcomes = rules
            .iter()
            .zip(slots)
            .map(|(rule, slot)| RuleOutcome {
                key: rule.key().to_string(),
                capacity: rule.capacity(),
                window: rule.window(),
                count: states[slot].count,
                counted: states[slot].counted,
            })
            .collect();

        let evaluation = Evaluation { outcomes };

        log::debug!(
            "Evaluated {} rule(s) for '{identifier}': {}",
            rules.len(),
            if evaluation.is_allowed() { "allowed" } else { "denied" }
        );

        Ok(evaluation)
    }
}

/// Result of one rule in an evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    /// Rule key, without prefix and identifier.
    pub key: String,
    /// Requests admitted per window.
    pub capacity: u32,
    /// Window length.
    pub window: Duration,
    /// Events in the window after this evaluation.
    pub count: u32,
    /// Whether this request was recorded against the rule.
    pub counted: bool,
}

impl RuleOutcome {
    /// Requests still admitted in the current window.
    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.count)
    }
}

/// Result of evaluating a set of rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    outcomes: Vec<RuleOutcome>,
}

impl Evaluation {
    /// Outcomes in the order the rules were given.
    pub fn outcomes(&self) -> &[RuleOutcome] {
        &self.outcomes
    }

    /// Whether every rule recorded the request.
    pub fn is_allowed(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.counted)
    }

    /// Whether at least one rule refused the request.
    pub fn is_denied(&self) -> bool {
        !self.is_allowed()
    }

    /// The longest window among the rules that refused the request.
    pub fn retry_after(&self) -> Option<Duration> {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.counted)
            .map(|outcome| outcome.window)
            .max()
    }
}

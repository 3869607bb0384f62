//! Rule-based request throttling for Gatekeeper.
//!
//! This crate provides:
//! - [`Rule`] and [`Limit`]: immutable throttle constraints and their declaration form
//! - [`RuleRegistry`]: the table mapping each protected operation to its [`RuleSet`]
//! - [`Limiter`]: an atomic sliding-window log evaluated in memory or in Redis

#![deny(missing_docs)]

mod error;
mod limiter;
mod registry;
mod rule;
mod storage;

pub use error::{LimiterError, RuleError};
pub use limiter::{Evaluation, Limiter, RuleOutcome};
pub use registry::{Operation, RuleRegistry, RuleRegistryBuilder, RuleSet, operation_name};
pub use rule::{Limit, Rule};
pub use storage::{Counter, CounterState, InMemoryStorage, RateLimitStorage, RedisStorage, StorageError};

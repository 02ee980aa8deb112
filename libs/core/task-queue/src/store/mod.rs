//! Store capabilities the queue engine needs.
//!
//! [`QueueStore`] is deliberately narrow: every method maps to one Redis
//! command (or one script) so that [`RedisStore`] is a thin adapter and
//! [`MemoryStore`] can reproduce the same semantics for tests.

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use crate::error::QueueResult;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Where an enqueued task landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// Priority queue, eligible for the next pop
    Ready,
    /// Delayed queue, waiting for promotion
    Delayed,
}

/// Backing store for queues, markers, the dead letter list and counters.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Atomically insert `member` into `ready_key` (score `priority`) when
    /// `due_ms <= now_ms`, otherwise into `delayed_key` (score `due_ms`).
    async fn enqueue(
        &self,
        ready_key: &str,
        delayed_key: &str,
        member: &str,
        priority: i32,
        due_ms: i64,
        now_ms: i64,
    ) -> QueueResult<Placement>;

    /// Pop the highest-scored member, waiting at most `timeout`.
    async fn pop_max(&self, key: &str, timeout: Duration) -> QueueResult<Option<String>>;

    /// Push to the head of a list.
    async fn list_push(&self, key: &str, value: &str) -> QueueResult<()>;

    /// Remove the first occurrence of `value`; returns how many were removed.
    async fn list_remove(&self, key: &str, value: &str) -> QueueResult<usize>;

    /// Members with score `<= max`, ascending, at most `limit`.
    async fn range_by_score(&self, key: &str, max: i64, limit: usize)
        -> QueueResult<Vec<String>>;

    async fn sorted_insert(&self, key: &str, member: &str, score: f64) -> QueueResult<()>;

    /// Returns true when the member existed.
    async fn sorted_remove(&self, key: &str, member: &str) -> QueueResult<bool>;

    /// Atomically add `by` to a hash field; returns the new value.
    async fn incr_field(&self, key: &str, field: &str, by: i64) -> QueueResult<i64>;

    /// All hash fields parsed as integers; unparsable values read as 0.
    async fn fields(&self, key: &str) -> QueueResult<HashMap<String, i64>>;

    async fn list_len(&self, key: &str) -> QueueResult<usize>;

    /// Inclusive range with Redis `LRANGE` index semantics.
    async fn list_range(&self, key: &str, start: isize, stop: isize) -> QueueResult<Vec<String>>;

    async fn ping(&self) -> QueueResult<()>;
}

//! Queue configuration
//!
//! `QueueConfig` gathers everything the engine needs: shard count, key names,
//! the accepted priority range, the retry policy and loop timings. Values are
//! read from the environment through [`core_config::FromEnv`] or assembled with
//! the builder methods.

use crate::error::{QueueError, QueueResult};
use crate::retry::RetryPolicy;
use core_config::{env_or_default, env_parse, ConfigError, FromEnv};
use std::time::Duration;

/// Redis key names used by the queue.
///
/// Per-shard structures are addressed as `{prefix}:{shard}`; the dead letter
/// queue and the counters hash are global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    pub priority_prefix: String,
    pub delayed_prefix: String,
    pub processing_prefix: String,
    pub dead_letter: String,
    pub metrics: String,
}

impl KeySpace {
    pub fn priority_queue(&self, shard: u32) -> String {
        format!("{}:{}", self.priority_prefix, shard)
    }

    pub fn delayed_queue(&self, shard: u32) -> String {
        format!("{}:{}", self.delayed_prefix, shard)
    }

    pub fn processing_queue(&self, shard: u32) -> String {
        format!("{}:{}", self.processing_prefix, shard)
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self {
            priority_prefix: "priority_queue".to_string(),
            delayed_prefix: "delayed_queue".to_string(),
            processing_prefix: "processing_queue".to_string(),
            dead_letter: "dead_letter_queue".to_string(),
            metrics: "task_metrics".to_string(),
        }
    }
}

/// Accepted task priorities, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityRange {
    pub low: i32,
    pub medium: i32,
    pub high: i32,
}

impl PriorityRange {
    pub fn contains(&self, priority: i32) -> bool {
        (self.low..=self.high).contains(&priority)
    }
}

impl Default for PriorityRange {
    fn default() -> Self {
        Self {
            low: 1,
            medium: 2,
            high: 3,
        }
    }
}

/// Configuration for the queue engine
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of shards. Fixed for the lifetime of the stored data: changing it
    /// orphans tasks enqueued under the previous mapping.
    pub shards: u32,

    /// Redis key names
    pub keys: KeySpace,

    /// Accepted priority range
    pub priorities: PriorityRange,

    /// Retry and backoff policy for failed executions
    pub retry: RetryPolicy,

    /// Maximum delayed tasks promoted per promoter iteration
    pub promoter_batch_size: usize,

    /// Promoter sleep when nothing is due
    pub promoter_idle_interval: Duration,

    /// Upper bound of a single blocking pop; shutdown is observed between pops
    pub block_timeout: Duration,

    /// Worker pause after a failed pop
    pub error_pause: Duration,

    /// How long shutdown waits for in-flight executions
    pub shutdown_grace: Duration,
}

impl QueueConfig {
    /// Create a configuration with the given shard count and defaults elsewhere.
    pub fn new(shards: u32) -> Self {
        Self {
            shards,
            ..Self::default()
        }
    }

    /// Set the Redis key names
    pub fn with_keys(mut self, keys: KeySpace) -> Self {
        self.keys = keys;
        self
    }

    /// Set the priority range
    pub fn with_priorities(mut self, priorities: PriorityRange) -> Self {
        self.priorities = priorities;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the promoter batch size
    pub fn with_promoter_batch_size(mut self, size: usize) -> Self {
        self.promoter_batch_size = size.max(1);
        self
    }

    /// Set the promoter idle interval
    pub fn with_promoter_idle_interval(mut self, interval: Duration) -> Self {
        self.promoter_idle_interval = interval;
        self
    }

    /// Set the blocking pop window
    pub fn with_block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = timeout;
        self
    }

    /// Set the pause after a failed pop
    pub fn with_error_pause(mut self, pause: Duration) -> Self {
        self.error_pause = pause;
        self
    }

    /// Set the shutdown grace period
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Check invariants the engine relies on.
    pub fn validate(&self) -> QueueResult<()> {
        if self.shards == 0 {
            return Err(QueueError::Config("shard count must be at least 1".into()));
        }
        let p = &self.priorities;
        if !(p.low <= p.medium && p.medium <= p.high) {
            return Err(QueueError::Config(format!(
                "priorities must satisfy low <= medium <= high (got {}/{}/{})",
                p.low, p.medium, p.high
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(QueueError::Config("max attempts must be at least 1".into()));
        }
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 1.0 {
            return Err(QueueError::Config(format!(
                "backoff factor must be >= 1 (got {})",
                self.retry.backoff_factor
            )));
        }
        if self.promoter_batch_size == 0 {
            return Err(QueueError::Config("promoter batch size must be at least 1".into()));
        }
        if self.block_timeout.is_zero() {
            return Err(QueueError::Config("block timeout must be positive".into()));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            shards: 4,
            keys: KeySpace::default(),
            priorities: PriorityRange::default(),
            retry: RetryPolicy::default(),
            promoter_batch_size: 100,
            promoter_idle_interval: Duration::from_secs(1),
            block_timeout: Duration::from_secs(1),
            error_pause: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(1),
        }
    }
}

fn env_millis(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    let millis = env_parse(key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}

impl FromEnv for QueueConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = QueueConfig::default();
        let key_defaults = KeySpace::default();
        let priority_defaults = PriorityRange::default();
        let retry_defaults = RetryPolicy::default();

        let config = Self {
            shards: env_parse("QUEUE_SHARDS", defaults.shards)?,
            keys: KeySpace {
                priority_prefix: env_or_default(
                    "QUEUE_PRIORITY_KEY",
                    &key_defaults.priority_prefix,
                ),
                delayed_prefix: env_or_default(
                    "QUEUE_DELAYED_KEY",
                    &key_defaults.delayed_prefix,
                ),
                processing_prefix: env_or_default(
                    "QUEUE_PROCESSING_KEY",
                    &key_defaults.processing_prefix,
                ),
                dead_letter: env_or_default("QUEUE_DEAD_LETTER_KEY", &key_defaults.dead_letter),
                metrics: env_or_default("METRICS_KEY", &key_defaults.metrics),
            },
            priorities: PriorityRange {
                low: env_parse("PRIORITY_LOW", priority_defaults.low)?,
                medium: env_parse("PRIORITY_MEDIUM", priority_defaults.medium)?,
                high: env_parse("PRIORITY_HIGH", priority_defaults.high)?,
            },
            retry: RetryPolicy {
                max_attempts: env_parse("RETRY_MAX_ATTEMPTS", retry_defaults.max_attempts)?,
                backoff_initial: env_millis(
                    "RETRY_BACKOFF_INITIAL_MS",
                    retry_defaults.backoff_initial,
                )?,
                backoff_factor: env_parse("RETRY_BACKOFF_FACTOR", retry_defaults.backoff_factor)?,
            },
            promoter_batch_size: env_parse("PROMOTER_BATCH_SIZE", defaults.promoter_batch_size)?,
            promoter_idle_interval: env_millis(
                "PROMOTER_IDLE_INTERVAL_MS",
                defaults.promoter_idle_interval,
            )?,
            block_timeout: env_millis("WORKER_BLOCK_TIMEOUT_MS", defaults.block_timeout)?,
            error_pause: env_millis("WORKER_ERROR_PAUSE_MS", defaults.error_pause)?,
            shutdown_grace: env_millis("SHUTDOWN_GRACE_MS", defaults.shutdown_grace)?,
        };

        config
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names() {
        let keys = KeySpace::default();
        assert_eq!(keys.priority_queue(0), "priority_queue:0");
        assert_eq!(keys.delayed_queue(3), "delayed_queue:3");
        assert_eq!(keys.processing_queue(7), "processing_queue:7");
        assert_eq!(keys.dead_letter, "dead_letter_queue");
    }

    #[test]
    fn test_priority_range_is_inclusive() {
        let range = PriorityRange::default();
        assert!(range.contains(1));
        assert!(range.contains(3));
        assert!(!range.contains(0));
        assert!(!range.contains(4));
    }

    #[test]
    fn test_builder_pattern() {
        let config = QueueConfig::new(8)
            .with_promoter_batch_size(0)
            .with_block_timeout(Duration::from_millis(250))
            .with_retry(RetryPolicy::new(5, Duration::from_millis(10), 3.0));

        assert_eq!(config.shards, 8);
        assert_eq!(config.promoter_batch_size, 1);
        assert_eq!(config.block_timeout, Duration::from_millis(250));
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_shards() {
        let err = QueueConfig::new(0).validate().unwrap_err();
        assert!(err.to_string().contains("shard"));
    }

    #[test]
    fn test_validate_rejects_inverted_priorities() {
        let config = QueueConfig::default().with_priorities(PriorityRange {
            low: 3,
            medium: 2,
            high: 1,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shrinking_backoff() {
        let config =
            QueueConfig::default().with_retry(RetryPolicy::new(3, Duration::from_secs(1), 0.5));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_defaults() {
        temp_env::with_vars_unset(
            [
                "QUEUE_SHARDS",
                "QUEUE_PRIORITY_KEY",
                "RETRY_MAX_ATTEMPTS",
                "RETRY_BACKOFF_INITIAL_MS",
                "RETRY_BACKOFF_FACTOR",
                "PRIORITY_HIGH",
            ],
            || {
                let config = QueueConfig::from_env().unwrap();
                assert_eq!(config.shards, 4);
                assert_eq!(config.keys.priority_prefix, "priority_queue");
                assert_eq!(config.retry.max_attempts, 3);
                assert_eq!(config.retry.backoff_initial, Duration::from_millis(1000));
                assert_eq!(config.priorities.high, 3);
            },
        );
    }

    #[test]
    fn test_from_env_overrides() {
        temp_env::with_vars(
            [
                ("QUEUE_SHARDS", Some("16")),
                ("QUEUE_PRIORITY_KEY", Some("pq")),
                ("RETRY_MAX_ATTEMPTS", Some("5")),
                ("RETRY_BACKOFF_INITIAL_MS", Some("250")),
                ("RETRY_BACKOFF_FACTOR", Some("3")),
                ("PRIORITY_HIGH", Some("10")),
            ],
            || {
                let config = QueueConfig::from_env().unwrap();
                assert_eq!(config.shards, 16);
                assert_eq!(config.keys.priority_queue(2), "pq:2");
                assert_eq!(config.retry.max_attempts, 5);
                assert_eq!(config.retry.backoff_initial, Duration::from_millis(250));
                assert_eq!(config.retry.backoff_factor, 3.0);
                assert_eq!(config.priorities.high, 10);
            },
        );
    }

    #[test]
    fn test_from_env_rejects_zero_shards() {
        temp_env::with_var("QUEUE_SHARDS", Some("0"), || {
            let err = QueueConfig::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)));
        });
    }
}

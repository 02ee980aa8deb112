//! Sharded priority task queue on Redis
//!
//! Producers add tasks with a priority and an optional execution time. Tasks are
//! spread over a fixed number of shards; each shard has a priority queue (sorted
//! set scored by priority), a delayed queue (sorted set scored by due time in
//! Unix milliseconds) and a processing list. Per shard, one worker executes
//! ready tasks and one promoter moves due delayed tasks into the priority queue.
//!
//! Failed executions are retried with exponential backoff; after the configured
//! number of attempts a task moves to the global dead letter queue. Delivery is
//! at-least-once.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use task_queue::{QueueConfig, RedisStore, SimulatedExecutor, TaskQueue};
//! use tokio::sync::watch;
//!
//! let store = Arc::new(RedisStore::connect("redis://localhost:6379").await?);
//! let executor = Arc::new(SimulatedExecutor::default());
//! let queue = TaskQueue::new(store, executor, QueueConfig::default())?;
//!
//! queue.add_task("send-welcome-email", 3, None).await?;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let handle = queue.process_tasks(shutdown_rx);
//! // ...
//! shutdown_tx.send(true)?;
//! handle.shutdown(queue.config().shutdown_grace).await;
//! ```

pub mod config;
pub mod dlq;
pub mod error;
pub mod executor;
pub mod health;
pub mod metrics;
pub mod producer;
pub mod promoter;
pub mod queue;
pub mod retry;
pub mod shard;
pub mod store;
pub mod task;
pub mod worker;

pub use config::{KeySpace, PriorityRange, QueueConfig};
pub use dlq::DeadLetters;
pub use error::{QueueError, QueueResult};
pub use executor::{SimulatedExecutor, TaskExecutor};
pub use health::{admin_router, AdminState};
pub use metrics::{init_metrics, MetricsSink, MetricsSnapshot};
pub use producer::{Enqueued, TaskProducer};
pub use promoter::{DelayPromoter, PromotionBatch};
pub use queue::{ProcessingHandle, TaskQueue};
pub use retry::RetryPolicy;
pub use shard::ShardRouter;
pub use store::{MemoryStore, Placement, QueueStore, RedisStore};
pub use task::Task;
pub use worker::{Outcome, ShardWorker};

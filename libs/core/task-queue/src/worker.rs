//! Per-shard worker loop
//!
//! Each shard has exactly one worker. An iteration pops the highest-priority
//! ready task, records it in the shard's processing list, executes it and then
//! resolves it to success, a delayed retry or the dead letter queue.

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::executor::TaskExecutor;
use crate::metrics::MetricsSink;
use crate::retry::RetryPolicy;
use crate::store::QueueStore;
use crate::task::Task;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// How a popped task was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Executor succeeded
    Succeeded,
    /// Executor failed, task re-queued in the delayed queue
    Retried { attempts: u32, execute_at: DateTime<Utc> },
    /// Executor failed for the last allowed time
    DeadLettered { attempts: u32 },
    /// Stored record could not be decoded
    Dropped,
    /// Executor failed and the task could not be written back
    Lost { attempts: u32 },
}

/// Worker for a single shard
pub struct ShardWorker<S: QueueStore, E: TaskExecutor> {
    shard: u32,
    store: Arc<S>,
    executor: Arc<E>,
    metrics: MetricsSink<S>,
    retry: RetryPolicy,
    ready_key: String,
    delayed_key: String,
    processing_key: String,
    dead_letter_key: String,
    block_timeout: Duration,
    error_pause: Duration,
}

impl<S: QueueStore, E: TaskExecutor> ShardWorker<S, E> {
    pub fn new(shard: u32, store: Arc<S>, executor: Arc<E>, config: &QueueConfig) -> Self {
        Self {
            shard,
            metrics: MetricsSink::new(store.clone(), config.keys.metrics.clone()),
            store,
            executor,
            retry: config.retry.clone(),
            ready_key: config.keys.priority_queue(shard),
            delayed_key: config.keys.delayed_queue(shard),
            processing_key: config.keys.processing_queue(shard),
            dead_letter_key: config.keys.dead_letter.clone(),
            block_timeout: config.block_timeout,
            error_pause: config.error_pause,
        }
    }

    pub fn shard(&self) -> u32 {
        self.shard
    }

    /// Run until the shutdown flag flips to true.
    ///
    /// The flag is checked between pops, so an execution that has started
    /// always runs to its resolution.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            shard = self.shard,
            executor = self.executor.name(),
            queue = %self.ready_key,
            "Starting shard worker"
        );

        loop {
            if *shutdown.borrow() {
                info!(shard = self.shard, "Received shutdown signal, stopping worker");
                break;
            }

            if let Err(e) = self.poll_once().await {
                if e.is_connection_error() {
                    warn!(shard = self.shard, error = %e, "Redis connection error, backing off");
                } else {
                    error!(shard = self.shard, error = %e, "Worker iteration failed");
                }

                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(self.error_pause) => {}
                }
            }
        }

        info!(shard = self.shard, "Shard worker stopped");
    }

    /// Pop and resolve at most one task.
    ///
    /// Returns `Ok(None)` when the blocking window elapsed with nothing ready.
    pub async fn poll_once(&self) -> QueueResult<Option<Outcome>> {
        let Some(raw) = self.store.pop_max(&self.ready_key, self.block_timeout).await? else {
            return Ok(None);
        };

        if let Err(e) = self.store.list_push(&self.processing_key, &raw).await {
            warn!(shard = self.shard, error = %e, "Failed to mark task as processing");
        }

        let task = match Task::from_json(&raw) {
            Ok(task) => task,
            Err(e) => {
                error!(shard = self.shard, error = %e, "Dropping undecodable task");
                self.unmark(&raw).await;
                return Ok(Some(Outcome::Dropped));
            }
        };

        Ok(Some(self.resolve(task, &raw).await))
    }

    async fn resolve(&self, task: Task, raw: &str) -> Outcome {
        debug!(
            shard = self.shard,
            task_id = %task.id,
            priority = task.priority,
            attempt = task.attempts.saturating_add(1),
            "Executing task"
        );

        match self.executor.execute(&task).await {
            Ok(()) => {
                self.unmark(raw).await;
                record(self.metrics.increment_success().await);
                record(self.metrics.increment_total_processed().await);
                info!(shard = self.shard, task_id = %task.id, "Task succeeded");
                Outcome::Succeeded
            }
            Err(e) => {
                record(self.metrics.increment_failed().await);
                let outcome = self.handle_failure(task, &e).await;
                self.unmark(raw).await;
                record(self.metrics.increment_total_processed().await);
                outcome
            }
        }
    }

    /// Route a failed task to the delayed queue or the dead letter queue.
    async fn handle_failure(&self, mut task: Task, cause: &QueueError) -> Outcome {
        task.attempts = task.attempts.saturating_add(1);
        let attempts = task.attempts;

        let written = if self.retry.is_terminal(attempts) {
            self.dead_letter(&task, cause)
                .await
                .map(|()| Outcome::DeadLettered { attempts })
        } else {
            self.requeue(&mut task, cause)
                .await
                .map(|execute_at| Outcome::Retried {
                    attempts,
                    execute_at,
                })
        };

        written.unwrap_or_else(|e| {
            error!(
                shard = self.shard,
                task_id = %task.id,
                attempt = attempts,
                error = %e,
                "Failed to write back failed task, dropping it"
            );
            Outcome::Lost { attempts }
        })
    }

    async fn dead_letter(&self, task: &Task, cause: &QueueError) -> QueueResult<()> {
        let member = task.to_json()?;
        self.store.list_push(&self.dead_letter_key, &member).await?;
        record(self.metrics.increment_dead_letter().await);
        error!(
            shard = self.shard,
            task_id = %task.id,
            attempt = task.attempts,
            error = %cause,
            "Task exhausted retries, moved to dead letter queue"
        );
        Ok(())
    }

    async fn requeue(&self, task: &mut Task, cause: &QueueError) -> QueueResult<DateTime<Utc>> {
        let execute_at = self.retry.next_execute_at(task.attempts, Utc::now());
        task.execute_at = execute_at;
        let member = task.to_json()?;
        self.store
            .sorted_insert(&self.delayed_key, &member, task.due_score() as f64)
            .await?;

        warn!(
            shard = self.shard,
            task_id = %task.id,
            attempt = task.attempts,
            retry_at = %execute_at,
            error = %cause,
            "Task failed, scheduled for retry"
        );
        Ok(execute_at)
    }

    async fn unmark(&self, raw: &str) {
        if let Err(e) = self.store.list_remove(&self.processing_key, raw).await {
            warn!(shard = self.shard, error = %e, "Failed to clear processing marker");
        }
    }
}

fn record(result: QueueResult<()>) {
    if let Err(e) = result {
        warn!(error = %e, "Failed to update task counters");
    }
}

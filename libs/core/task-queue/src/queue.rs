//! Queue facade
//!
//! `TaskQueue` wires a store, an executor and a configuration together. It
//! exposes the two entry points callers need: [`TaskQueue::add_task`] and
//! [`TaskQueue::process_tasks`].

use crate::config::QueueConfig;
use crate::dlq::DeadLetters;
use crate::error::QueueResult;
use crate::executor::TaskExecutor;
use crate::metrics::MetricsSink;
use crate::producer::{Enqueued, TaskProducer};
use crate::promoter::DelayPromoter;
use crate::shard::ShardRouter;
use crate::store::QueueStore;
use crate::worker::ShardWorker;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Sharded priority task queue
pub struct TaskQueue<S: QueueStore, E: TaskExecutor> {
    store: Arc<S>,
    executor: Arc<E>,
    config: QueueConfig,
    router: ShardRouter,
    producer: TaskProducer<S>,
}

impl<S, E> TaskQueue<S, E>
where
    S: QueueStore + 'static,
    E: TaskExecutor + 'static,
{
    /// Build a queue, rejecting an invalid configuration.
    pub fn new(store: Arc<S>, executor: Arc<E>, config: QueueConfig) -> QueueResult<Self> {
        config.validate()?;
        let router = ShardRouter::new(config.shards)?;
        let producer = TaskProducer::new(
            store.clone(),
            router,
            config.keys.clone(),
            config.priorities,
        );

        Ok(Self {
            store,
            executor,
            config,
            router,
            producer,
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Validate and enqueue a task. See [`TaskProducer::add_task`].
    pub async fn add_task(
        &self,
        payload: impl Into<String>,
        priority: i32,
        execute_at: Option<DateTime<Utc>>,
    ) -> QueueResult<Enqueued> {
        self.producer.add_task(payload, priority, execute_at).await
    }

    pub fn metrics(&self) -> MetricsSink<S> {
        MetricsSink::new(self.store.clone(), self.config.keys.metrics.clone())
    }

    pub fn dead_letters(&self) -> DeadLetters<S> {
        DeadLetters::new(self.store.clone(), self.config.keys.dead_letter.clone())
    }

    /// Spawn one worker and one promoter per shard and return immediately.
    ///
    /// Every loop watches `shutdown`; send `true` on the paired sender, then
    /// call [`ProcessingHandle::shutdown`] to wait for them.
    pub fn process_tasks(&self, shutdown: watch::Receiver<bool>) -> ProcessingHandle {
        let mut tasks = JoinSet::new();

        for shard in self.router.shards() {
            let worker = ShardWorker::new(
                shard,
                self.store.clone(),
                self.executor.clone(),
                &self.config,
            );
            let rx = shutdown.clone();
            tasks.spawn(async move { worker.run(rx).await });

            let promoter = DelayPromoter::new(shard, self.store.clone(), &self.config);
            let rx = shutdown.clone();
            tasks.spawn(async move { promoter.run(rx).await });
        }

        info!(
            shards = self.config.shards,
            loops = tasks.len(),
            executor = self.executor.name(),
            "Task processing started"
        );

        ProcessingHandle { tasks }
    }
}

/// Running worker and promoter loops
pub struct ProcessingHandle {
    tasks: JoinSet<()>,
}

impl ProcessingHandle {
    /// Number of loops still running
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait up to `grace` for every loop to finish, then abort the rest.
    ///
    /// Returns how many loops had to be aborted.
    pub async fn shutdown(mut self, grace: Duration) -> usize {
        let drained = tokio::time::timeout(grace, async {
            while let Some(result) = self.tasks.join_next().await {
                if let Err(e) = result {
                    if e.is_panic() {
                        error!(error = %e, "Queue loop panicked");
                    }
                }
            }
        })
        .await;

        if drained.is_ok() {
            info!("All queue loops stopped");
            return 0;
        }

        let aborted = self.tasks.len();
        warn!(aborted, "Grace period elapsed, aborting remaining queue loops");
        self.tasks.shutdown().await;
        aborted
    }
}

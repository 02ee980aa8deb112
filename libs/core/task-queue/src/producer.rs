use crate::config::{KeySpace, PriorityRange};
use crate::error::{QueueError, QueueResult};
use crate::shard::ShardRouter;
use crate::store::{Placement, QueueStore};
use crate::task::Task;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Result of a successful enqueue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Enqueued {
    pub task_id: String,
    pub shard: u32,
    pub placement: Placement,
}

/// Validates new tasks and writes them to their shard.
pub struct TaskProducer<S: QueueStore> {
    store: Arc<S>,
    router: ShardRouter,
    keys: KeySpace,
    priorities: PriorityRange,
}

impl<S: QueueStore> TaskProducer<S> {
    pub fn new(
        store: Arc<S>,
        router: ShardRouter,
        keys: KeySpace,
        priorities: PriorityRange,
    ) -> Self {
        Self {
            store,
            router,
            keys,
            priorities,
        }
    }

    fn validate(&self, payload: &str, priority: i32) -> QueueResult<()> {
        if payload.is_empty() {
            return Err(QueueError::EmptyPayload);
        }
        if !self.priorities.contains(priority) {
            return Err(QueueError::PriorityOutOfRange {
                priority,
                low: self.priorities.low,
                high: self.priorities.high,
            });
        }
        Ok(())
    }

    /// Add a task, due immediately unless `execute_at` is given.
    ///
    /// Nothing is written when validation or serialization fails. The ready or
    /// delayed placement is decided and written in a single atomic store call.
    #[instrument(skip(self, payload))]
    pub async fn add_task(
        &self,
        payload: impl Into<String>,
        priority: i32,
        execute_at: Option<DateTime<Utc>>,
    ) -> QueueResult<Enqueued> {
        let payload = payload.into();
        self.validate(&payload, priority)?;

        let now = Utc::now();
        let task = Task::new(payload, priority, execute_at.unwrap_or(now));
        let member = task.to_json()?;
        let shard = self.router.shard(&task.id);

        let placement = self
            .store
            .enqueue(
                &self.keys.priority_queue(shard),
                &self.keys.delayed_queue(shard),
                &member,
                priority,
                task.due_score(),
                now.timestamp_millis(),
            )
            .await
            .inspect_err(|e| {
                error!(task_id = %task.id, shard, error = %e, "Failed to enqueue task");
            })?;

        debug!(task_id = %task.id, shard, placement = ?placement, "Task enqueued");

        Ok(Enqueued {
            task_id: task.id,
            shard,
            placement,
        })
    }
}

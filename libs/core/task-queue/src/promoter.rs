use crate::config::QueueConfig;
use crate::error::QueueResult;
use crate::store::QueueStore;
use crate::task::Task;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Counts from one promotion pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromotionBatch {
    pub promoted: usize,
    pub dropped: usize,
}

impl PromotionBatch {
    pub fn is_empty(&self) -> bool {
        self.promoted == 0 && self.dropped == 0
    }
}

/// Moves due tasks from a shard's delayed queue into its priority queue.
///
/// Insert then remove: a crash in between leaves the task in both queues and
/// it may run twice, never zero times.
pub struct DelayPromoter<S: QueueStore> {
    shard: u32,
    store: Arc<S>,
    ready_key: String,
    delayed_key: String,
    batch_size: usize,
    idle_interval: Duration,
}

impl<S: QueueStore> DelayPromoter<S> {
    pub fn new(shard: u32, store: Arc<S>, config: &QueueConfig) -> Self {
        Self {
            shard,
            store,
            ready_key: config.keys.priority_queue(shard),
            delayed_key: config.keys.delayed_queue(shard),
            batch_size: config.promoter_batch_size,
            idle_interval: config.promoter_idle_interval,
        }
    }

    /// Promote up to one batch of tasks due at `now`, oldest first.
    pub async fn promote_due(&self, now: DateTime<Utc>) -> QueueResult<PromotionBatch> {
        let due = self
            .store
            .range_by_score(&self.delayed_key, now.timestamp_millis(), self.batch_size)
            .await?;

        let mut batch = PromotionBatch::default();
        for raw in due {
            match Task::from_json(&raw) {
                Ok(task) => {
                    self.store
                        .sorted_insert(&self.ready_key, &raw, f64::from(task.priority))
                        .await?;
                    self.store.sorted_remove(&self.delayed_key, &raw).await?;
                    debug!(shard = self.shard, task_id = %task.id, "Promoted delayed task");
                    batch.promoted += 1;
                }
                Err(e) => {
                    error!(shard = self.shard, error = %e, "Dropping undecodable delayed task");
                    self.store.sorted_remove(&self.delayed_key, &raw).await?;
                    batch.dropped += 1;
                }
            }
        }

        Ok(batch)
    }

    /// Run until the shutdown flag flips to true.
    ///
    /// A non-empty batch is followed immediately by the next one; otherwise
    /// the loop idles for `idle_interval`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            shard = self.shard,
            queue = %self.delayed_key,
            batch_size = self.batch_size,
            "Starting delay promoter"
        );

        loop {
            if *shutdown.borrow() {
                info!(shard = self.shard, "Received shutdown signal, stopping promoter");
                break;
            }

            match self.promote_due(Utc::now()).await {
                Ok(batch) if !batch.is_empty() => continue,
                Ok(_) => {}
                Err(e) => warn!(shard = self.shard, error = %e, "Promotion pass failed"),
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.idle_interval) => {}
            }
        }

        info!(shard = self.shard, "Delay promoter stopped");
    }
}

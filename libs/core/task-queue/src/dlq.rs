use crate::error::QueueResult;
use crate::store::QueueStore;
use crate::task::Task;
use std::sync::Arc;
use tracing::warn;

/// Read-only view of the dead letter queue.
///
/// Entries are listed newest first, the order in which workers push them.
pub struct DeadLetters<S: QueueStore> {
    store: Arc<S>,
    key: String,
}

impl<S: QueueStore> DeadLetters<S> {
    pub fn new(store: Arc<S>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub async fn len(&self) -> QueueResult<usize> {
        self.store.list_len(&self.key).await
    }

    pub async fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Up to `count` entries starting at `offset`. Undecodable entries are skipped.
    pub async fn list(&self, offset: usize, count: usize) -> QueueResult<Vec<Task>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let start = isize::try_from(offset).unwrap_or(isize::MAX);
        let stop = start.saturating_add(isize::try_from(count).unwrap_or(isize::MAX) - 1);
        let raw = self.store.list_range(&self.key, start, stop).await?;

        Ok(raw
            .iter()
            .filter_map(|entry| match Task::from_json(entry) {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable dead letter entry");
                    None
                }
            })
            .collect())
    }
}

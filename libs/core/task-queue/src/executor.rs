use crate::error::QueueError;
use crate::task::Task;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Runs a task's work.
///
/// Delivery is at-least-once, so implementations must tolerate seeing the
/// same task more than once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<(), QueueError>;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

/// Executor that sleeps for a fixed time and always succeeds.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    work: Duration,
}

impl SimulatedExecutor {
    pub fn new(work: Duration) -> Self {
        Self { work }
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[async_trait]
impl TaskExecutor for SimulatedExecutor {
    async fn execute(&self, task: &Task) -> Result<(), QueueError> {
        debug!(task_id = %task.id, payload = %task.payload, "Simulating task");
        tokio::time::sleep(self.work).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

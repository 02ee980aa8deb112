//! Task outcome counters
//!
//! Counters live in a store hash so every worker process shares them, and each
//! increment is mirrored to a process-local Prometheus counter.

use crate::error::QueueResult;
use crate::store::QueueStore;
use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize the Prometheus recorder
///
/// Call this once at startup. Subsequent calls are no-ops. If another recorder
/// is already installed, metrics are only kept in the store hash.
pub fn init_metrics() {
    if PROMETHEUS_HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_ok() {
                info!("Prometheus metrics initialized");
            }
        }
        Err(e) => warn!(error = %e, "Failed to install Prometheus recorder"),
    }
}

/// Get the Prometheus handle, if the recorder was installed
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus format
pub fn render_metrics() -> String {
    prometheus_handle().map(|h| h.render()).unwrap_or_default()
}

/// Hash field names
pub mod fields {
    pub const SUCCESS: &str = "success";
    pub const FAILED: &str = "failed";
    pub const TOTAL_PROCESSED: &str = "total_processed";
    pub const DEAD_LETTER: &str = "dead_letter";
}

/// Point-in-time counter values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub success: i64,
    pub failed: i64,
    pub total_processed: i64,
    pub dead_letter: i64,
}

/// Store-backed counters for task outcomes
pub struct MetricsSink<S: QueueStore> {
    store: Arc<S>,
    key: String,
}

impl<S: QueueStore> Clone for MetricsSink<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            key: self.key.clone(),
        }
    }
}

impl<S: QueueStore> MetricsSink<S> {
    pub fn new(store: Arc<S>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    async fn increment(&self, field: &'static str) -> QueueResult<()> {
        counter!("task_queue_tasks_total", "outcome" => field).increment(1);
        self.store.incr_field(&self.key, field, 1).await?;
        Ok(())
    }

    pub async fn increment_success(&self) -> QueueResult<()> {
        self.increment(fields::SUCCESS).await
    }

    pub async fn increment_failed(&self) -> QueueResult<()> {
        self.increment(fields::FAILED).await
    }

    pub async fn increment_total_processed(&self) -> QueueResult<()> {
        self.increment(fields::TOTAL_PROCESSED).await
    }

    pub async fn increment_dead_letter(&self) -> QueueResult<()> {
        self.increment(fields::DEAD_LETTER).await
    }

    /// Read all counters; missing fields read as zero.
    pub async fn snapshot(&self) -> QueueResult<MetricsSnapshot> {
        let values = self.store.fields(&self.key).await?;
        let get = |field: &str| values.get(field).copied().unwrap_or(0);

        Ok(MetricsSnapshot {
            success: get(fields::SUCCESS),
            failed: get(fields::FAILED),
            total_processed: get(fields::TOTAL_PROCESSED),
            dead_letter: get(fields::DEAD_LETTER),
        })
    }
}

//! Operational HTTP endpoints
//!
//! - `/health`: liveness
//! - `/ready`: readiness, pings the store
//! - `/metrics`: Prometheus text format
//! - `/stats`: store-backed outcome counters
//! - `/admin/dlq`: paginated dead letter listing

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::dlq::DeadLetters;
use crate::metrics::{self, MetricsSink};
use crate::store::QueueStore;

/// Shared state for the admin endpoints.
pub struct AdminState<S: QueueStore> {
    pub store: Arc<S>,
    pub metrics: MetricsSink<S>,
    pub dead_letter_key: String,
    pub app_name: String,
    pub app_version: String,
}

impl<S: QueueStore> Clone for AdminState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            metrics: self.metrics.clone(),
            dead_letter_key: self.dead_letter_key.clone(),
            app_name: self.app_name.clone(),
            app_version: self.app_version.clone(),
        }
    }
}

impl<S: QueueStore> AdminState<S> {
    pub fn new(
        store: Arc<S>,
        metrics_key: impl Into<String>,
        dead_letter_key: impl Into<String>,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            metrics: MetricsSink::new(store.clone(), metrics_key),
            store,
            dead_letter_key: dead_letter_key.into(),
            app_name: app_name.into(),
            app_version: app_version.into(),
        }
    }

    fn dead_letters(&self) -> DeadLetters<S> {
        DeadLetters::new(self.store.clone(), self.dead_letter_key.clone())
    }
}

/// Health response for liveness probes.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub name: String,
    pub version: String,
}

/// Liveness probe handler.
pub async fn health_handler<S: QueueStore>(
    State(state): State<AdminState<S>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        name: state.app_name,
        version: state.app_version,
    })
}

/// Readiness probe handler. Fails while the store does not answer a ping.
pub async fn ready_handler<S: QueueStore>(
    State(state): State<AdminState<S>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.store.ping().await {
        Ok(()) => Ok(Json(json!({
            "status": "ready",
            "checks": { "redis": "ok" }
        }))),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": { "redis": format!("error: {}", e) }
            })),
        )),
    }
}

/// Prometheus metrics endpoint handler.
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::prometheus_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Metrics not initialized. Call init_metrics() at startup.".to_string(),
        )
            .into_response(),
    }
}

/// Outcome counters from the store hash.
///
/// `GET /stats`
pub async fn stats_handler<S: QueueStore>(
    State(state): State<AdminState<S>>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    match state.metrics.snapshot().await {
        Ok(snapshot) => Ok(Json(snapshot)),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

/// Query parameters for the dead letter listing.
#[derive(Debug, Deserialize)]
pub struct DlqListParams {
    /// Entries to skip (default: 0)
    #[serde(default)]
    pub offset: usize,
    /// Maximum entries to return (default: 10, max: 100)
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_count() -> usize {
    10
}

/// List dead-lettered tasks, newest first.
///
/// `GET /admin/dlq?offset=0&count=10`
pub async fn dlq_list_handler<S: QueueStore>(
    State(state): State<AdminState<S>>,
    Query(params): Query<DlqListParams>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let dlq = state.dead_letters();
    let count = params.count.min(100);

    let internal = |e: crate::QueueError| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    };

    let length = dlq.len().await.map_err(internal)?;
    let entries = dlq.list(params.offset, count).await.map_err(internal)?;

    Ok(Json(json!({
        "length": length,
        "offset": params.offset,
        "count": count,
        "entries": entries,
    })))
}

/// Router with every admin endpoint.
pub fn admin_router<S: QueueStore + 'static>(state: AdminState<S>) -> Router {
    Router::new()
        .route("/health", get(health_handler::<S>))
        .route("/ready", get(ready_handler::<S>))
        .route("/metrics", get(metrics_handler))
        .route("/stats", get(stats_handler::<S>))
        .route("/admin/dlq", get(dlq_list_handler::<S>))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;
    use crate::store::{MemoryStore, MockQueueStore};
    use crate::task::Task;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn state<S: QueueStore>(store: Arc<S>) -> AdminState<S> {
        AdminState::new(store, "task_metrics", "dead_letter_queue", "task-queue", "0.1.0")
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let app = admin_router(state(Arc::new(MemoryStore::new())));
        let (status, body) = get_json(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["name"], "task-queue");
    }

    #[tokio::test]
    async fn test_ready_reports_store_failure() {
        let mut store = MockQueueStore::new();
        store
            .expect_ping()
            .returning(|| Err(QueueError::store("connection refused")));

        let app = admin_router(state(Arc::new(store)));
        let (status, body) = get_json(app, "/ready").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "not_ready");
    }

    #[tokio::test]
    async fn test_ready_ok() {
        let app = admin_router(state(Arc::new(MemoryStore::new())));
        let (status, body) = get_json(app, "/ready").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["redis"], "ok");
    }

    #[tokio::test]
    async fn test_stats() {
        let store = Arc::new(MemoryStore::new());
        store.incr_field("task_metrics", "success", 4).await.unwrap();

        let (status, body) = get_json(admin_router(state(store)), "/stats").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], 4);
        assert_eq!(body["dead_letter"], 0);
    }

    #[tokio::test]
    async fn test_dlq_listing() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..3 {
            let task = Task::new(format!("job-{i}"), 2, Utc::now());
            store
                .list_push("dead_letter_queue", &task.to_json().unwrap())
                .await
                .unwrap();
        }

        let app = admin_router(state(store));
        let (status, body) = get_json(app, "/admin/dlq?offset=1&count=500").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["length"], 3);
        assert_eq!(body["count"], 100);
        assert_eq!(body["entries"].as_array().unwrap().len(), 2);
        assert_eq!(body["entries"][0]["payload"], "job-1");
    }
}

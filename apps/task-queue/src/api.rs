//! Ingestion API
//!
//! `POST /tasks` accepts `{payload, priority, execute_at?}` and enqueues it.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use task_queue::{QueueError, QueueStore, TaskExecutor, TaskQueue};
use thiserror::Error;
use tracing::{error, info};

/// Body of `POST /tasks`
#[derive(Debug, Deserialize)]
pub struct AddTaskRequest {
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub priority: i32,
    pub execute_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request body")]
    InvalidBody(#[from] JsonRejection),

    #[error("{0}")]
    Rejected(String),

    #[error("Failed to add task")]
    Enqueue(#[source] QueueError),

    #[error("Not found")]
    NotFound,
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::EmptyPayload => ApiError::Rejected("Payload is required".to_string()),
            QueueError::PriorityOutOfRange { .. } => {
                ApiError::Rejected("Invalid priority".to_string())
            }
            other => ApiError::Enqueue(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidBody(rejection) => {
                tracing::debug!(error = %rejection, "Rejected request body");
                StatusCode::BAD_REQUEST
            }
            ApiError::Rejected(_) => StatusCode::BAD_REQUEST,
            ApiError::Enqueue(e) => {
                error!(error = %e, "Failed to add task");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::NotFound => StatusCode::NOT_FOUND,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// `POST /tasks`
pub async fn add_task_handler<S, E>(
    State(queue): State<Arc<TaskQueue<S, E>>>,
    body: Result<Json<AddTaskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    S: QueueStore + 'static,
    E: TaskExecutor + 'static,
{
    let Json(request) = body?;
    let enqueued = queue
        .add_task(request.payload, request.priority, request.execute_at)
        .await?;

    info!(
        task_id = %enqueued.task_id,
        shard = enqueued.shard,
        priority = request.priority,
        "Task added"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "task added",
            "task_id": enqueued.task_id,
            "shard": enqueued.shard,
            "placement": enqueued.placement,
        })),
    ))
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Router for the ingestion endpoint. Unknown paths answer 404 JSON.
pub fn router<S, E>(queue: Arc<TaskQueue<S, E>>) -> Router
where
    S: QueueStore + 'static,
    E: TaskExecutor + 'static,
{
    Router::new()
        .route("/tasks", post(add_task_handler::<S, E>))
        .fallback(not_found)
        .with_state(queue)
}

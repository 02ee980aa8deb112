use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of work stored in the queue.
///
/// Serialized as JSON; the stored record is also the member value inside the
/// Redis sorted sets and lists, so any field change produces a distinct member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub payload: String,
    pub priority: i32,
    pub execute_at: DateTime<Utc>,
    pub attempts: u32,
}

impl Task {
    /// Create a fresh task with a random v4 id and no attempts.
    pub fn new(payload: impl Into<String>, priority: i32, execute_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload: payload.into(),
            priority,
            execute_at,
            attempts: 0,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.execute_at <= now
    }

    /// Score used in the delayed queue (Unix milliseconds).
    pub fn due_score(&self) -> i64 {
        self.execute_at.timestamp_millis()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

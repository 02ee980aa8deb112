//! Queue error types
//!
//! Errors fall into three groups that callers treat differently:
//! - **Rejected**: the request itself is invalid, nothing was written
//! - **Store**: the backing store failed, the operation may be retried
//! - **Execution**: a task executor reported failure, handled by retry/backoff

use thiserror::Error;

/// Task queue errors
#[derive(Error, Debug)]
pub enum QueueError {
    /// Task payload was empty
    #[error("Payload is required")]
    EmptyPayload,

    /// Priority outside the configured range
    #[error("Invalid priority {priority}: must be between {low} and {high}")]
    PriorityOutOfRange { priority: i32, low: i32, high: i32 },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Non-Redis store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Task executor reported a failure
    #[error("Execution error: {0}")]
    Execution(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl QueueError {
    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        QueueError::Execution(message.into())
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        QueueError::Store(message.into())
    }

    /// True when the caller's input was rejected before touching the store.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            QueueError::EmptyPayload | QueueError::PriorityOutOfRange { .. }
        )
    }

    /// True for failures of the backing store.
    pub fn is_store(&self) -> bool {
        matches!(self, QueueError::Redis(_) | QueueError::Store(_))
    }

    /// True when Redis dropped or refused the connection.
    pub fn is_connection_error(&self) -> bool {
        match self {
            QueueError::Redis(e) => {
                e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error()
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}

impl From<core_config::ConfigError> for QueueError {
    fn from(err: core_config::ConfigError) -> Self {
        QueueError::Config(err.to_string())
    }
}

pub type QueueResult<T> = Result<T, QueueError>;

//! Queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("message parse error: {0}")]
    Parse(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("provider error: {0}")]
    Provider(String),
}

impl From<redis::RedisError> for QueueError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error() || e.is_timeout() {
            QueueError::Connection(e.to_string())
        } else {
            QueueError::Provider(e.to_string())
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(e: serde_json::Error) -> Self {
        QueueError::Parse(e.to_string())
    }
}

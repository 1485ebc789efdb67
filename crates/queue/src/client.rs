//! Queue client trait.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueError;

/// Minimal list-shaped queue: push to the tail, blocking pop from the head.
///
/// Implementations must make `blocking_pop` atomic: either nothing is removed
/// (`Ok(None)` on timeout, or an error) or exactly one element is removed and
/// returned.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Append `payload` to the tail of `queue`.
    async fn push(&self, queue: &str, payload: &str) -> Result<(), QueueError>;

    /// Remove and return the head of `queue`, waiting up to `timeout`.
    ///
    /// Returns `Ok(None)` when the wait elapses with no data.
    async fn blocking_pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, QueueError>;

    /// Round-trip to the broker to prove the connection is usable.
    async fn ping(&self) -> Result<(), QueueError>;

    /// Backend name for logs (e.g. "redis", "memory").
    fn provider(&self) -> &'static str;
}

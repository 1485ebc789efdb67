//! Process-local queue backend.
//!
//! Same FIFO semantics as the Redis list backend, plus failure injection so
//! publisher/consumer error paths can be exercised without a broker.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::client::QueueClient;
use crate::error::QueueError;

#[derive(Default)]
pub struct InMemoryQueue {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    notify: Notify,
    fail_pushes: AtomicBool,
    pop_failures: AtomicU32,
    unreachable: AtomicBool,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent push fail until reset.
    pub fn set_push_failure(&self, fail: bool) {
        self.fail_pushes.store(fail, Ordering::SeqCst);
    }

    /// Make the next `n` pops fail with a connection error.
    pub fn fail_next_pops(&self, n: u32) {
        self.pop_failures.store(n, Ordering::SeqCst);
    }

    /// Make `ping` fail, simulating a broker that is down at startup.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub async fn len(&self, queue: &str) -> usize {
        self.lists.lock().await.get(queue).map_or(0, VecDeque::len)
    }

    pub async fn is_empty(&self, queue: &str) -> bool {
        self.len(queue).await == 0
    }

    /// Remove and return everything currently in `queue`, head first.
    pub async fn drain(&self, queue: &str) -> Vec<String> {
        self.lists
            .lock()
            .await
            .get_mut(queue)
            .map(|list| list.drain(..).collect())
            .unwrap_or_default()
    }

    fn take_pop_failure(&self) -> bool {
        self.pop_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn push(&self, queue: &str, payload: &str) -> Result<(), QueueError> {
        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(QueueError::Connection("injected push failure".into()));
        }
        self.lists
            .lock()
            .await
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_string());
        self.notify.notify_one();
        Ok(())
    }

    async fn blocking_pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, QueueError> {
        if self.take_pop_failure() {
            return Err(QueueError::Connection("injected pop failure".into()));
        }

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(item) = self
                .lists
                .lock()
                .await
                .get_mut(queue)
                .and_then(VecDeque::pop_front)
            {
                return Ok(Some(item));
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }

    async fn ping(&self) -> Result<(), QueueError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(QueueError::Connection("injected: broker unreachable".into()));
        }
        Ok(())
    }

    fn provider(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fifo_order() {
        let q = InMemoryQueue::new();
        q.push("q", "a").await.unwrap();
        q.push("q", "b").await.unwrap();
        q.push("q", "c").await.unwrap();

        let timeout = Duration::from_millis(10);
        assert_eq!(q.blocking_pop("q", timeout).await.unwrap().as_deref(), Some("a"));
        assert_eq!(q.blocking_pop("q", timeout).await.unwrap().as_deref(), Some("b"));
        assert_eq!(q.blocking_pop("q", timeout).await.unwrap().as_deref(), Some("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_times_out_empty() {
        let q = InMemoryQueue::new();
        let started = Instant::now();
        let got = q.blocking_pop("q", Duration::from_secs(5)).await.unwrap();
        assert!(got.is_none());
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_wakes_on_push() {
        let q = Arc::new(InMemoryQueue::new());
        let producer = q.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            producer.push("q", "late").await.unwrap();
        });

        let got = q.blocking_pop("q", Duration::from_secs(5)).await.unwrap();
        assert_eq!(got.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_queues_are_independent() {
        let q = InMemoryQueue::new();
        q.push("one", "x").await.unwrap();
        assert_eq!(q.len("one").await, 1);
        assert!(q.is_empty("two").await);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let q = InMemoryQueue::new();
        q.set_push_failure(true);
        assert!(matches!(q.push("q", "x").await, Err(QueueError::Connection(_))));
        q.set_push_failure(false);
        q.push("q", "x").await.unwrap();

        q.fail_next_pops(1);
        assert!(q.blocking_pop("q", Duration::from_millis(1)).await.is_err());
        // failure consumed without removing the element
        assert_eq!(q.drain("q").await, vec!["x".to_string()]);

        q.set_unreachable(true);
        assert!(q.ping().await.is_err());
    }
}
